use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RecordStore, StoreError, StoredRecord};
use crate::log::model::UserRecord;

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<Uuid, StoredRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.lock().await.get(&user_id).cloned())
    }

    async fn save(
        &self,
        user_id: Uuid,
        record: &UserRecord,
        expected_revision: i64,
    ) -> Result<i64, StoreError> {
        let mut records = self.records.lock().await;
        let found = records.get(&user_id).map(|r| r.revision).unwrap_or(0);
        if found != expected_revision {
            return Err(StoreError::Conflict {
                expected: expected_revision,
                found,
            });
        }
        let revision = found + 1;
        records.insert(
            user_id,
            StoredRecord {
                record: record.clone(),
                revision,
            },
        );
        Ok(revision)
    }
}
