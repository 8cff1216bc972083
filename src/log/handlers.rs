use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use time::{macros::format_description, Date, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    offset_from_minutes, ClockQuery, CreateMealRequest, DayView, MealGroupView, MealView, ResetResponse,
    StatsResponse, TodayResponse, UpdateGoalsRequest,
};
use super::model::{DailyLog, Goals, MealEntry, NewFoodItem};
use super::progress::Progress;
use crate::{
    auth::AuthUser,
    captures::services::{discard_images, is_owned_key, presign},
    error::ApiError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/logs", get(list_logs))
        .route("/logs/today", get(today))
        .route("/logs/:date", get(log_for_date))
        .route("/meals", post(create_meal))
        .route("/meals/:id", delete(delete_meal))
        .route("/meals/:id/foods", post(add_food))
        .route("/meals/:id/foods/:food_id", delete(remove_food))
        .route("/goals", get(get_goals).put(update_goals))
        .route("/stats", get(stats))
        .route("/data", delete(reset_data))
}

fn now_in(offset_minutes: Option<i32>) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    match offset_from_minutes(offset_minutes) {
        Some(offset) => now.to_offset(offset),
        None => now,
    }
}

fn check_image(user_id: Uuid, image: Option<&str>) -> Result<(), ApiError> {
    match image {
        Some(key) if !is_owned_key(user_id, key) => Err(ApiError::Validation(
            "image must be a key returned by /captures".into(),
        )),
        _ => Ok(()),
    }
}

/// Image keys referenced by a meal and its foods.
fn meal_images(meal: MealEntry) -> Vec<String> {
    let mut keys: Vec<String> = meal.foods().iter().filter_map(|f| f.image.clone()).collect();
    keys.extend(meal.image);
    keys
}

async fn meal_view(state: &AppState, meal: MealEntry) -> MealView {
    let image_url = match meal.image.as_deref() {
        Some(key) => match presign(state.storage.as_ref(), key).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(meal_id = %meal.id, error = %e, "presign failed");
                None
            }
        },
        None => None,
    };
    MealView { meal, image_url }
}

async fn meal_views(state: &AppState, meals: &[MealEntry]) -> Vec<MealView> {
    let mut out = Vec::with_capacity(meals.len());
    for meal in meals {
        out.push(meal_view(state, meal.clone()).await);
    }
    out
}

async fn day_view(state: &AppState, log: &DailyLog) -> DayView {
    DayView {
        date: log.date,
        total_calories: log.total_calories(),
        total_protein: log.total_protein(),
        meals: meal_views(state, log.meals()).await,
    }
}

#[instrument(skip(state))]
pub async fn list_logs(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<DayView>>, ApiError> {
    let log = state.logs.snapshot(user_id).await?;
    let mut days = Vec::with_capacity(log.logs().len());
    for day in log.logs().iter().rev() {
        days.push(day_view(&state, day).await);
    }
    Ok(Json(days))
}

#[instrument(skip(state))]
pub async fn today(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(clock): Query<ClockQuery>,
) -> Result<Json<TodayResponse>, ApiError> {
    let log = state.logs.snapshot(user_id).await?;
    let now = now_in(clock.utc_offset_minutes);
    let day = log.today_log(now);
    let goals = log.goals();

    let mut meals_by_type = Vec::new();
    for group in log.meals_by_type(day.date) {
        meals_by_type.push(MealGroupView {
            meal_type: group.meal_type,
            total_calories: group.total_calories,
            meals: meal_views(&state, &group.meals).await,
        });
    }

    let calories = Progress::compute(f64::from(day.total_calories()), goals.calorie_goal);
    if calories.exceeded() {
        info!(%user_id, over_by = calories.over_by, "calorie goal exceeded");
    }
    Ok(Json(TodayResponse {
        date: day.date,
        goals,
        calories,
        protein: Progress::compute(day.total_protein(), goals.protein_goal),
        meal_count: day.meals().len(),
        meals_by_type,
    }))
}

#[instrument(skip(state))]
pub async fn log_for_date(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(date): Path<String>,
) -> Result<Json<DayView>, ApiError> {
    let date = Date::parse(&date, format_description!("[year]-[month]-[day]"))
        .map_err(|_| ApiError::Validation(format!("invalid date {date:?}, expected YYYY-MM-DD")))?;
    let log = state.logs.snapshot(user_id).await?;
    Ok(Json(day_view(&state, &log.log_for(date)).await))
}

#[instrument(skip(state, body))]
pub async fn create_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateMealRequest>,
) -> Result<(StatusCode, Json<MealView>), ApiError> {
    check_image(user_id, body.image.as_deref())?;
    for food in &body.foods {
        check_image(user_id, food.image.as_deref())?;
    }
    let meal = state
        .logs
        .add_meal_entry_at(
            user_id,
            body.foods,
            body.meal_type,
            body.image,
            body.notes,
            now_in(body.utc_offset_minutes),
        )
        .await?;
    info!(
        %user_id,
        meal_id = %meal.id,
        meal_type = meal.meal_type.as_str(),
        total_calories = meal.total_calories(),
        "meal logged"
    );
    Ok((StatusCode::CREATED, Json(meal_view(&state, meal).await)))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(meal_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let meal = state.logs.remove_meal_entry(user_id, meal_id).await?;
    discard_images(state.storage.as_ref(), user_id, meal_images(meal)).await;
    info!(%user_id, %meal_id, "meal removed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, item))]
pub async fn add_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(meal_id): Path<Uuid>,
    Json(item): Json<NewFoodItem>,
) -> Result<(StatusCode, Json<MealView>), ApiError> {
    check_image(user_id, item.image.as_deref())?;
    let food = state.logs.add_food_item(user_id, meal_id, item).await?;
    info!(%user_id, %meal_id, food_id = %food.id, calories = food.calories, "food added");
    let meal = updated_meal(&state, user_id, meal_id).await?;
    Ok((StatusCode::CREATED, Json(meal_view(&state, meal).await)))
}

#[instrument(skip(state))]
pub async fn remove_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((meal_id, food_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MealView>, ApiError> {
    let food = state.logs.remove_food_item(user_id, meal_id, food_id).await?;
    discard_images(state.storage.as_ref(), user_id, food.image).await;
    let meal = updated_meal(&state, user_id, meal_id).await?;
    Ok(Json(meal_view(&state, meal).await))
}

async fn updated_meal(state: &AppState, user_id: Uuid, meal_id: Uuid) -> Result<MealEntry, ApiError> {
    state
        .logs
        .snapshot(user_id)
        .await?
        .find_meal(meal_id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("meal {meal_id} not found")))
}

#[instrument(skip(state))]
pub async fn get_goals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Goals>, ApiError> {
    Ok(Json(state.logs.snapshot(user_id).await?.goals()))
}

#[instrument(skip(state))]
pub async fn update_goals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<UpdateGoalsRequest>,
) -> Result<Json<Goals>, ApiError> {
    if body.calorie_goal.is_none() && body.protein_goal.is_none() {
        return Err(ApiError::Validation(
            "set calorie_goal and/or protein_goal".into(),
        ));
    }
    let goals = state
        .logs
        .set_goals(user_id, body.calorie_goal, body.protein_goal)
        .await?;
    info!(%user_id, calorie_goal = goals.calorie_goal, protein_goal = goals.protein_goal, "goals updated");
    Ok(Json(goals))
}

#[instrument(skip(state))]
pub async fn stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<StatsResponse>, ApiError> {
    let log = state.logs.snapshot(user_id).await?;
    let mut history = log.history();
    history.reverse();
    Ok(Json(StatsResponse {
        stats: log.stats(),
        goals: log.goals(),
        history,
    }))
}

#[instrument(skip(state))]
pub async fn reset_data(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ResetResponse>, ApiError> {
    let removed = state.logs.reset(user_id).await?;
    let removed_meals = removed.len();
    let images = removed.into_iter().flat_map(meal_images);
    discard_images(state.storage.as_ref(), user_id, images).await;
    state.chats.clear(user_id).await;
    warn!(%user_id, removed_meals, "all food data reset");
    Ok(Json(ResetResponse {
        removed_meals,
        goals: state.logs.default_goals(),
    }))
}
