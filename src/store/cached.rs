use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use super::{FileRecordStore, RecordStore, StoreError, StoredRecord};
use crate::log::model::UserRecord;

/// A primary store mirrored into a local file cache.
///
/// Reads fall back to the cache when the primary is unreachable; writes only
/// succeed when the primary accepts them.
pub struct CachedRecordStore {
    primary: Arc<dyn RecordStore>,
    cache: FileRecordStore,
}

impl CachedRecordStore {
    pub fn new(primary: Arc<dyn RecordStore>, cache: FileRecordStore) -> Self {
        Self { primary, cache }
    }
}

#[async_trait]
impl RecordStore for CachedRecordStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<StoredRecord>, StoreError> {
        match self.primary.load(user_id).await {
            Ok(Some(stored)) => {
                if let Err(e) = self.cache.mirror(user_id, &stored).await {
                    warn!(error = %e, %user_id, "record cache refresh failed");
                }
                Ok(Some(stored))
            }
            Ok(None) => Ok(None),
            Err(StoreError::Backend(e)) => {
                warn!(error = %e, %user_id, "primary record store failed; serving cached copy");
                match self.cache.load(user_id).await? {
                    Some(cached) => Ok(Some(cached)),
                    None => Err(StoreError::Backend(e)),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn save(
        &self,
        user_id: Uuid,
        record: &UserRecord,
        expected_revision: i64,
    ) -> Result<i64, StoreError> {
        let revision = self.primary.save(user_id, record, expected_revision).await?;
        let stored = StoredRecord {
            record: record.clone(),
            revision,
        };
        if let Err(e) = self.cache.mirror(user_id, &stored).await {
            warn!(error = %e, %user_id, "record cache write failed");
        }
        Ok(revision)
    }
}
