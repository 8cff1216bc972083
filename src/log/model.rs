use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

time::serde::format_description!(pub(crate) date_key, Date, "[year]-[month]-[day]");

pub const DEFAULT_CALORIE_GOAL: u32 = 2000;
pub const DEFAULT_PROTEIN_GOAL: u32 = 150;

/// Largest calorie value accepted for a single food.
pub const MAX_FOOD_CALORIES: u32 = 100_000;

/// Adds calorie values, saturating at `u32::MAX`.
pub fn sum_calories(values: impl IntoIterator<Item = u32>) -> u32 {
    values.into_iter().fold(0, u32::saturating_add)
}

/// Kind of meal a log entry was recorded as.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    #[default]
    Snack,
}

impl MealType {
    /// Order used when a day's meals are grouped for display.
    pub const DISPLAY_ORDER: [MealType; 4] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Snack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        }
    }
}

/// A single food as logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FoodItem {
    pub id: Uuid,
    pub name: String,
    pub calories: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A food before it gets an identity, from manual entry or an estimate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewFoodItem {
    pub name: String,
    pub calories: u32,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub serving: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl NewFoodItem {
    pub fn new(name: impl Into<String>, calories: u32) -> Self {
        Self {
            name: name.into(),
            calories,
            protein: None,
            serving: None,
            image: None,
        }
    }

    pub fn with_protein(mut self, grams: f64) -> Self {
        self.protein = Some(grams);
        self
    }

    pub fn with_serving(mut self, serving: impl Into<String>) -> Self {
        self.serving = Some(serving.into());
        self
    }

    pub(crate) fn into_item(self) -> FoodItem {
        FoodItem {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            calories: self.calories,
            protein: self.protein,
            serving: self.serving.filter(|s| !s.trim().is_empty()),
            image: self.image,
        }
    }
}

/// Foods logged together at one time.
///
/// `total_calories` is derived state: every mutation goes through
/// [`MealEntry::recompute`], and loaded records are recomputed before use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealEntry {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    foods: Vec<FoodItem>,
    #[serde(default)]
    total_calories: u32,
    pub meal_type: MealType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl MealEntry {
    pub(crate) fn new(
        foods: Vec<FoodItem>,
        meal_type: MealType,
        image: Option<String>,
        notes: Option<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        let mut meal = Self {
            id: Uuid::new_v4(),
            timestamp,
            foods,
            total_calories: 0,
            meal_type,
            image,
            notes: notes.filter(|n| !n.trim().is_empty()),
        };
        meal.recompute();
        meal
    }

    pub fn foods(&self) -> &[FoodItem] {
        &self.foods
    }

    pub fn total_calories(&self) -> u32 {
        self.total_calories
    }

    pub fn total_protein(&self) -> f64 {
        self.foods.iter().filter_map(|f| f.protein).sum()
    }

    pub(crate) fn push_food(&mut self, item: FoodItem) {
        self.foods.push(item);
        self.recompute();
    }

    pub(crate) fn take_food(&mut self, food_id: Uuid) -> Option<FoodItem> {
        let idx = self.foods.iter().position(|f| f.id == food_id)?;
        let removed = self.foods.remove(idx);
        self.recompute();
        Some(removed)
    }

    pub(crate) fn recompute(&mut self) {
        self.total_calories = sum_calories(self.foods.iter().map(|f| f.calories));
    }
}

/// All meals of one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyLog {
    #[serde(with = "date_key")]
    pub date: Date,
    meals: Vec<MealEntry>,
    #[serde(default)]
    total_calories: u32,
}

impl DailyLog {
    pub fn empty(date: Date) -> Self {
        Self {
            date,
            meals: Vec::new(),
            total_calories: 0,
        }
    }

    pub fn meals(&self) -> &[MealEntry] {
        &self.meals
    }

    pub fn total_calories(&self) -> u32 {
        self.total_calories
    }

    pub fn total_protein(&self) -> f64 {
        self.meals.iter().map(MealEntry::total_protein).sum()
    }

    pub(crate) fn meals_mut(&mut self) -> &mut Vec<MealEntry> {
        &mut self.meals
    }

    /// Recomputes every meal total, then the day total.
    pub(crate) fn recompute(&mut self) {
        for meal in &mut self.meals {
            meal.recompute();
        }
        self.total_calories = sum_calories(self.meals.iter().map(MealEntry::total_calories));
    }
}

/// Chat transcript author.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goals {
    pub calorie_goal: u32,
    pub protein_goal: u32,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            calorie_goal: DEFAULT_CALORIE_GOAL,
            protein_goal: DEFAULT_PROTEIN_GOAL,
        }
    }
}

/// The persisted per-user document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    #[serde(default)]
    pub logs: Vec<DailyLog>,
    #[serde(default = "default_calorie_goal")]
    pub calorie_goal: u32,
    #[serde(default = "default_protein_goal")]
    pub protein_goal: u32,
}

fn default_calorie_goal() -> u32 {
    DEFAULT_CALORIE_GOAL
}

fn default_protein_goal() -> u32 {
    DEFAULT_PROTEIN_GOAL
}

impl UserRecord {
    pub fn with_goals(goals: Goals) -> Self {
        Self {
            logs: Vec::new(),
            calorie_goal: goals.calorie_goal,
            protein_goal: goals.protein_goal,
        }
    }
}

impl Default for UserRecord {
    fn default() -> Self {
        Self::with_goals(Goals::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn daily_log_serializes_date_key_and_totals() {
        let mut log = DailyLog::empty(date!(2026 - 10 - 19));
        log.meals_mut().push(MealEntry::new(
            vec![NewFoodItem::new("Apple", 95).into_item()],
            MealType::Snack,
            None,
            None,
            datetime!(2026-10-19 10:00 UTC),
        ));
        log.recompute();

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["date"], "2026-10-19");
        assert_eq!(json["total_calories"], 95);
        assert_eq!(json["meals"][0]["meal_type"], "snack");
        assert_eq!(json["meals"][0]["total_calories"], 95);
    }

    #[test]
    fn record_defaults_missing_goals() {
        let record: UserRecord = serde_json::from_str(r#"{"logs":[]}"#).unwrap();
        assert_eq!(record.calorie_goal, DEFAULT_CALORIE_GOAL);
        assert_eq!(record.protein_goal, DEFAULT_PROTEIN_GOAL);
    }

    #[test]
    fn blank_serving_and_notes_are_dropped() {
        let item = NewFoodItem::new("  Toast ", 80).with_serving("  ").into_item();
        assert_eq!(item.name, "Toast");
        assert_eq!(item.serving, None);

        let meal = MealEntry::new(
            vec![item],
            MealType::Breakfast,
            None,
            Some("   ".into()),
            datetime!(2026-10-19 08:00 UTC),
        );
        assert_eq!(meal.notes, None);
    }
}
