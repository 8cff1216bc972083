use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::book::FoodLog;
use super::model::{FoodItem, Goals, MealEntry, MealType, NewFoodItem, UserRecord};
use super::LogError;
use crate::store::{RecordStore, StoreError};

const MAX_SAVE_ATTEMPTS: usize = 3;

/// One async lock per user, created on first use.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn for_user(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(user_id).or_default().clone()
    }

    /// Hands back a lock from [`for_user`](Self::for_user); the entry is
    /// dropped once no other caller holds it.
    pub async fn release(&self, user_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(&user_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&user_id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Food-log operations for authenticated users, backed by a [`RecordStore`].
///
/// Mutations for the same user run one at a time: load, apply, versioned save.
/// A revision conflict (another instance wrote in between) reloads and
/// re-applies the mutation.
pub struct LogService {
    store: Arc<dyn RecordStore>,
    locks: UserLocks,
    default_goals: Goals,
}

impl LogService {
    pub fn new(store: Arc<dyn RecordStore>, default_goals: Goals) -> Self {
        Self {
            store,
            locks: UserLocks::default(),
            default_goals,
        }
    }

    pub fn default_goals(&self) -> Goals {
        self.default_goals
    }

    pub async fn snapshot(&self, user_id: Uuid) -> Result<FoodLog, LogError> {
        Ok(self.load(user_id).await?.0)
    }

    pub async fn add_meal_entry(
        &self,
        user_id: Uuid,
        foods: Vec<NewFoodItem>,
        meal_type: MealType,
        image: Option<String>,
        notes: Option<String>,
    ) -> Result<MealEntry, LogError> {
        self.add_meal_entry_at(user_id, foods, meal_type, image, notes, OffsetDateTime::now_utc())
            .await
    }

    /// Like [`LogService::add_meal_entry`]; the meal lands on `now.date()`,
    /// so pass a time in the user's offset to file it under their local day.
    pub async fn add_meal_entry_at(
        &self,
        user_id: Uuid,
        foods: Vec<NewFoodItem>,
        meal_type: MealType,
        image: Option<String>,
        notes: Option<String>,
        now: OffsetDateTime,
    ) -> Result<MealEntry, LogError> {
        self.mutate(user_id, |log| {
            log.add_meal_entry(foods.clone(), meal_type, image.clone(), notes.clone(), now)
        })
        .await
    }

    pub async fn add_food_item(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        item: NewFoodItem,
    ) -> Result<FoodItem, LogError> {
        self.mutate(user_id, |log| log.add_food_item(meal_id, item.clone()))
            .await
    }

    pub async fn remove_food_item(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        food_id: Uuid,
    ) -> Result<FoodItem, LogError> {
        self.mutate(user_id, |log| log.remove_food_item(meal_id, food_id))
            .await
    }

    pub async fn remove_meal_entry(&self, user_id: Uuid, meal_id: Uuid) -> Result<MealEntry, LogError> {
        self.mutate(user_id, |log| log.remove_meal_entry(meal_id)).await
    }

    pub async fn set_goals(
        &self,
        user_id: Uuid,
        calorie_goal: Option<u32>,
        protein_goal: Option<u32>,
    ) -> Result<Goals, LogError> {
        self.mutate(user_id, |log| {
            if let Some(goal) = calorie_goal {
                log.set_calorie_goal(goal)?;
            }
            if let Some(goal) = protein_goal {
                log.set_protein_goal(goal)?;
            }
            Ok(log.goals())
        })
        .await
    }

    /// Drops every log and restores default goals; returns the removed meals.
    pub async fn reset(&self, user_id: Uuid) -> Result<Vec<MealEntry>, LogError> {
        let goals = self.default_goals;
        self.mutate(user_id, |log| Ok(log.reset(goals))).await
    }

    async fn load(&self, user_id: Uuid) -> Result<(FoodLog, i64), StoreError> {
        Ok(match self.store.load(user_id).await? {
            Some(stored) => (FoodLog::from_record(stored.record), stored.revision),
            None => (
                FoodLog::from_record(UserRecord::with_goals(self.default_goals)),
                0,
            ),
        })
    }

    async fn mutate<T, F>(&self, user_id: Uuid, apply: F) -> Result<T, LogError>
    where
        F: Fn(&mut FoodLog) -> Result<T, LogError>,
    {
        let lock = self.locks.for_user(user_id).await;
        let out = {
            let _guard = lock.lock().await;
            self.apply_and_save(user_id, apply).await
        };
        self.locks.release(user_id, lock).await;
        out
    }

    async fn apply_and_save<T, F>(&self, user_id: Uuid, apply: F) -> Result<T, LogError>
    where
        F: Fn(&mut FoodLog) -> Result<T, LogError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut log, revision) = self.load(user_id).await?;
            let out = apply(&mut log)?;
            match self.store.save(user_id, log.record(), revision).await {
                Ok(new_revision) => {
                    debug!(%user_id, revision = new_revision, "food record saved");
                    return Ok(out);
                }
                Err(StoreError::Conflict { expected, found }) if attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(%user_id, expected, found, attempt, "food record conflict; reapplying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::store::{MemoryRecordStore, StoredRecord};

    fn service() -> LogService {
        LogService::new(Arc::new(MemoryRecordStore::new()), Goals::default())
    }

    #[tokio::test]
    async fn meals_persist_between_calls() {
        let svc = service();
        let user = Uuid::new_v4();
        let meal = svc
            .add_meal_entry(
                user,
                vec![NewFoodItem::new("Egg", 78), NewFoodItem::new("Banana", 105)],
                MealType::Breakfast,
                None,
                None,
            )
            .await
            .unwrap();

        let log = svc.snapshot(user).await.unwrap();
        let stored = log.find_meal(meal.id).unwrap();
        assert_eq!(stored.total_calories(), 183);
        assert_eq!(log.today_calories(OffsetDateTime::now_utc()), 183);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let svc = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        svc.add_meal_entry(a, vec![NewFoodItem::new("Rice", 200)], MealType::Lunch, None, None)
            .await
            .unwrap();
        assert!(svc.snapshot(b).await.unwrap().logs().is_empty());
    }

    #[tokio::test]
    async fn failed_mutation_does_not_save() {
        let svc = service();
        let user = Uuid::new_v4();
        let err = svc.set_goals(user, Some(0), None).await.unwrap_err();
        assert!(matches!(err, LogError::InvalidGoal(_)));
        assert_eq!(svc.snapshot(user).await.unwrap().goals(), Goals::default());
    }

    #[tokio::test]
    async fn concurrent_adds_are_serialized() {
        let svc = Arc::new(service());
        let user = Uuid::new_v4();
        let mut handles = Vec::new();
        for i in 0..8u32 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.add_meal_entry(
                    user,
                    vec![NewFoodItem::new(format!("Snack {i}"), 10 + i)],
                    MealType::Snack,
                    None,
                    None,
                )
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let log = svc.snapshot(user).await.unwrap();
        let meals: usize = log.logs().iter().map(|l| l.meals().len()).sum();
        assert_eq!(meals, 8);
        assert_eq!(svc.locks.len().await, 0);
    }

    #[tokio::test]
    async fn user_locks_are_dropped_when_idle() {
        let svc = service();
        let user = Uuid::new_v4();
        svc.set_goals(user, Some(1800), None).await.unwrap();
        assert_eq!(svc.locks.len().await, 0);

        svc.set_goals(user, Some(0), None).await.unwrap_err();
        assert_eq!(svc.locks.len().await, 0);

        let held = svc.locks.for_user(user).await;
        let other = svc.locks.for_user(user).await;
        svc.locks.release(user, other).await;
        assert_eq!(svc.locks.len().await, 1);
        svc.locks.release(user, held).await;
        assert_eq!(svc.locks.len().await, 0);
    }

    /// Simulates another instance writing between our load and save.
    struct RacingStore {
        inner: MemoryRecordStore,
        races: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for RacingStore {
        async fn load(&self, user_id: Uuid) -> Result<Option<StoredRecord>, StoreError> {
            self.inner.load(user_id).await
        }

        async fn save(
            &self,
            user_id: Uuid,
            record: &UserRecord,
            expected_revision: i64,
        ) -> Result<i64, StoreError> {
            if self.races.load(Ordering::SeqCst) > 0 {
                self.races.fetch_sub(1, Ordering::SeqCst);
                let mut foreign = record.clone();
                foreign.calorie_goal = 2500;
                foreign.logs.clear();
                self.inner.save(user_id, &foreign, expected_revision).await?;
            }
            self.inner.save(user_id, record, expected_revision).await
        }
    }

    #[tokio::test]
    async fn conflict_reapplies_on_fresh_record() {
        let store = Arc::new(RacingStore {
            inner: MemoryRecordStore::new(),
            races: AtomicUsize::new(1),
        });
        let svc = LogService::new(store.clone(), Goals::default());
        let user = Uuid::new_v4();

        let meal = svc
            .add_meal_entry(user, vec![NewFoodItem::new("Soup", 250)], MealType::Dinner, None, None)
            .await
            .unwrap();

        let log = svc.snapshot(user).await.unwrap();
        assert_eq!(log.goals().calorie_goal, 2500, "foreign write kept");
        assert_eq!(log.find_meal(meal.id).unwrap().total_calories(), 250);
    }

    #[tokio::test]
    async fn persistent_conflict_surfaces() {
        let store = Arc::new(RacingStore {
            inner: MemoryRecordStore::new(),
            races: AtomicUsize::new(MAX_SAVE_ATTEMPTS),
        });
        let svc = LogService::new(store, Goals::default());
        let err = svc
            .add_meal_entry(Uuid::new_v4(), vec![NewFoodItem::new("Tea", 2)], MealType::Snack, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Store(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn reset_returns_removed_meals() {
        let svc = service();
        let user = Uuid::new_v4();
        svc.set_goals(user, Some(1500), Some(80)).await.unwrap();
        svc.add_meal_entry(
            user,
            vec![NewFoodItem::new("Pizza", 800)],
            MealType::Dinner,
            Some("captures/x.jpg".into()),
            None,
        )
        .await
        .unwrap();

        let removed = svc.reset(user).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].image.as_deref(), Some("captures/x.jpg"));
        let log = svc.snapshot(user).await.unwrap();
        assert!(log.logs().is_empty());
        assert_eq!(log.goals(), Goals::default());
    }
}
