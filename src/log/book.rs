use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::model::{
    sum_calories, DailyLog, FoodItem, Goals, MealEntry, MealType, NewFoodItem, UserRecord, MAX_FOOD_CALORIES,
};
use super::LogError;

/// In-memory food log for one user.
///
/// Totals are never trusted from the outside: the record is recomputed when
/// the log is built and after every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodLog {
    record: UserRecord,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MealGroup {
    pub meal_type: MealType,
    pub meals: Vec<MealEntry>,
    pub total_calories: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Stats {
    pub days_tracked: usize,
    pub total_meals: usize,
    pub total_calories: u64,
    pub average_daily_calories: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryLine {
    #[serde(with = "super::model::date_key")]
    pub date: Date,
    pub meals: usize,
    pub total_calories: u32,
    /// Positive when over the calorie goal, negative when under.
    pub goal_delta: i64,
}

impl FoodLog {
    pub fn from_record(mut record: UserRecord) -> Self {
        for log in &mut record.logs {
            log.recompute();
        }
        record.logs.retain(|log| !log.meals().is_empty());
        record.logs.sort_by_key(|log| log.date);
        Self { record }
    }

    pub fn record(&self) -> &UserRecord {
        &self.record
    }

    pub fn into_record(self) -> UserRecord {
        self.record
    }

    pub fn logs(&self) -> &[DailyLog] {
        &self.record.logs
    }

    /// The day's log, or an empty one when nothing was logged that day.
    pub fn log_for(&self, date: Date) -> DailyLog {
        self.record
            .logs
            .iter()
            .find(|log| log.date == date)
            .cloned()
            .unwrap_or_else(|| DailyLog::empty(date))
    }

    pub fn today_log(&self, now: OffsetDateTime) -> DailyLog {
        self.log_for(now.date())
    }

    pub fn today_calories(&self, now: OffsetDateTime) -> u32 {
        self.today_log(now).total_calories()
    }

    pub fn today_protein(&self, now: OffsetDateTime) -> f64 {
        self.today_log(now).total_protein()
    }

    pub fn find_meal(&self, meal_id: Uuid) -> Option<&MealEntry> {
        self.record
            .logs
            .iter()
            .flat_map(|log| log.meals())
            .find(|meal| meal.id == meal_id)
    }

    pub fn add_meal_entry(
        &mut self,
        foods: Vec<NewFoodItem>,
        meal_type: MealType,
        image: Option<String>,
        notes: Option<String>,
        now: OffsetDateTime,
    ) -> Result<MealEntry, LogError> {
        if foods.is_empty() {
            return Err(LogError::EmptyMeal);
        }
        let foods = foods
            .into_iter()
            .map(|f| validate(f).map(NewFoodItem::into_item))
            .collect::<Result<Vec<_>, _>>()?;

        let meal = MealEntry::new(foods, meal_type, image, notes, now);
        let date = now.date();
        match self.record.logs.iter_mut().find(|log| log.date == date) {
            Some(log) => {
                log.meals_mut().push(meal.clone());
                log.recompute();
            }
            None => {
                let mut log = DailyLog::empty(date);
                log.meals_mut().push(meal.clone());
                log.recompute();
                self.record.logs.push(log);
                self.record.logs.sort_by_key(|log| log.date);
            }
        }
        Ok(meal)
    }

    pub fn add_food_item(&mut self, meal_id: Uuid, item: NewFoodItem) -> Result<FoodItem, LogError> {
        let item = validate(item)?.into_item();
        let log = self.log_with_meal(meal_id)?;
        let meal = log
            .meals_mut()
            .iter_mut()
            .find(|m| m.id == meal_id)
            .ok_or(LogError::MealNotFound(meal_id))?;
        meal.push_food(item.clone());
        log.recompute();
        Ok(item)
    }

    /// Removing the last food keeps the meal with a zero total; meals only go
    /// away through [`FoodLog::remove_meal_entry`].
    pub fn remove_food_item(&mut self, meal_id: Uuid, food_id: Uuid) -> Result<FoodItem, LogError> {
        let log = self.log_with_meal(meal_id)?;
        let meal = log
            .meals_mut()
            .iter_mut()
            .find(|m| m.id == meal_id)
            .ok_or(LogError::MealNotFound(meal_id))?;
        let removed = meal
            .take_food(food_id)
            .ok_or(LogError::FoodNotFound { meal_id, food_id })?;
        log.recompute();
        Ok(removed)
    }

    /// Removes the meal; a day left without meals is dropped.
    pub fn remove_meal_entry(&mut self, meal_id: Uuid) -> Result<MealEntry, LogError> {
        let log = self.log_with_meal(meal_id)?;
        let meals = log.meals_mut();
        let idx = meals
            .iter()
            .position(|m| m.id == meal_id)
            .ok_or(LogError::MealNotFound(meal_id))?;
        let removed = meals.remove(idx);
        log.recompute();
        self.record.logs.retain(|log| !log.meals().is_empty());
        Ok(removed)
    }

    pub fn goals(&self) -> Goals {
        Goals {
            calorie_goal: self.record.calorie_goal,
            protein_goal: self.record.protein_goal,
        }
    }

    pub fn set_calorie_goal(&mut self, goal: u32) -> Result<(), LogError> {
        if goal == 0 {
            return Err(LogError::InvalidGoal("calorie goal must be positive"));
        }
        self.record.calorie_goal = goal;
        Ok(())
    }

    pub fn set_protein_goal(&mut self, goal: u32) -> Result<(), LogError> {
        if goal == 0 {
            return Err(LogError::InvalidGoal("protein goal must be positive"));
        }
        self.record.protein_goal = goal;
        Ok(())
    }

    pub fn meals_by_type(&self, date: Date) -> Vec<MealGroup> {
        let log = self.log_for(date);
        MealType::DISPLAY_ORDER
            .iter()
            .filter_map(|&meal_type| {
                let meals: Vec<MealEntry> = log
                    .meals()
                    .iter()
                    .filter(|m| m.meal_type == meal_type)
                    .cloned()
                    .collect();
                if meals.is_empty() {
                    return None;
                }
                let total_calories = sum_calories(meals.iter().map(MealEntry::total_calories));
                Some(MealGroup {
                    meal_type,
                    meals,
                    total_calories,
                })
            })
            .collect()
    }

    pub fn stats(&self) -> Stats {
        let days_tracked = self.record.logs.len();
        let total_meals = self.record.logs.iter().map(|l| l.meals().len()).sum();
        let total_calories: u64 = self
            .record
            .logs
            .iter()
            .map(|l| u64::from(l.total_calories()))
            .sum();
        let average_daily_calories = if days_tracked == 0 {
            0
        } else {
            (total_calories as f64 / days_tracked as f64).round() as u32
        };
        Stats {
            days_tracked,
            total_meals,
            total_calories,
            average_daily_calories,
        }
    }

    pub fn history(&self) -> Vec<HistoryLine> {
        let goal = i64::from(self.record.calorie_goal);
        self.record
            .logs
            .iter()
            .map(|log| HistoryLine {
                date: log.date,
                meals: log.meals().len(),
                total_calories: log.total_calories(),
                goal_delta: i64::from(log.total_calories()) - goal,
            })
            .collect()
    }

    /// Clears every log and restores the given goals.
    pub fn reset(&mut self, goals: Goals) -> Vec<MealEntry> {
        let removed = self
            .record
            .logs
            .drain(..)
            .flat_map(|log| log.meals().to_vec())
            .collect();
        self.record.calorie_goal = goals.calorie_goal;
        self.record.protein_goal = goals.protein_goal;
        removed
    }

    fn log_with_meal(&mut self, meal_id: Uuid) -> Result<&mut DailyLog, LogError> {
        self.record
            .logs
            .iter_mut()
            .find(|log| log.meals().iter().any(|m| m.id == meal_id))
            .ok_or(LogError::MealNotFound(meal_id))
    }
}

fn validate(item: NewFoodItem) -> Result<NewFoodItem, LogError> {
    if item.name.trim().is_empty() {
        return Err(LogError::InvalidFood("name must not be empty"));
    }
    if item.calories > MAX_FOOD_CALORIES {
        return Err(LogError::InvalidFood("calories must not exceed 100000 per food"));
    }
    if let Some(protein) = item.protein {
        if !protein.is_finite() || protein < 0.0 {
            return Err(LogError::InvalidFood("protein must be a non-negative number"));
        }
    }
    Ok(item)
}
