use uuid::Uuid;

use crate::store::StoreError;

pub mod book;
mod dto;
pub mod handlers;
pub mod model;
pub mod progress;
pub mod service;

pub use book::FoodLog;
pub use service::LogService;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("a meal needs at least one food item")]
    EmptyMeal,
    #[error("invalid food item: {0}")]
    InvalidFood(&'static str),
    #[error("invalid goal: {0}")]
    InvalidGoal(&'static str),
    #[error("meal {0} not found")]
    MealNotFound(Uuid),
    #[error("food {food_id} not found in meal {meal_id}")]
    FoodNotFound { meal_id: Uuid, food_id: Uuid },
    #[error(transparent)]
    Store(#[from] StoreError),
}
