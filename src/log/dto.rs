use serde::{Deserialize, Serialize};
use time::{Date, UtcOffset};

use super::book::{HistoryLine, Stats};
use super::model::{date_key, Goals, MealEntry, MealType, NewFoodItem};
use super::progress::Progress;

/// Clients send their UTC offset so "today" follows the user's clock.
#[derive(Debug, Default, Deserialize)]
pub struct ClockQuery {
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

/// Longest valid offset, UTC-12:00 .. UTC+14:00 with some slack.
const MAX_OFFSET_MINUTES: u32 = 15 * 60;

pub fn offset_from_minutes(minutes: Option<i32>) -> Option<UtcOffset> {
    let minutes = minutes?;
    if minutes.unsigned_abs() > MAX_OFFSET_MINUTES {
        return None;
    }
    UtcOffset::from_whole_seconds(minutes * 60).ok()
}

#[derive(Debug, Deserialize)]
pub struct CreateMealRequest {
    pub foods: Vec<NewFoodItem>,
    #[serde(default)]
    pub meal_type: MealType,
    /// Key returned by `POST /captures`.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGoalsRequest {
    #[serde(default)]
    pub calorie_goal: Option<u32>,
    #[serde(default)]
    pub protein_goal: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MealView {
    #[serde(flatten)]
    pub meal: MealEntry,
    /// Presigned URL for `image`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DayView {
    #[serde(with = "date_key")]
    pub date: Date,
    pub total_calories: u32,
    pub total_protein: f64,
    pub meals: Vec<MealView>,
}

#[derive(Debug, Serialize)]
pub struct MealGroupView {
    pub meal_type: MealType,
    pub total_calories: u32,
    pub meals: Vec<MealView>,
}

/// Home dashboard.
#[derive(Debug, Serialize)]
pub struct TodayResponse {
    #[serde(with = "date_key")]
    pub date: Date,
    pub goals: Goals,
    pub calories: Progress,
    pub protein: Progress,
    pub meal_count: usize,
    pub meals_by_type: Vec<MealGroupView>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: Stats,
    pub goals: Goals,
    /// Newest first.
    pub history: Vec<HistoryLine>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub removed_meals: usize,
    pub goals: Goals,
}
