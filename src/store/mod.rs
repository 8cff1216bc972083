//! Durable storage for the per-user food record.
//!
//! Every save names the revision it was derived from; a mismatch is reported
//! as [`StoreError::Conflict`] instead of overwriting a newer write.

use async_trait::async_trait;
use uuid::Uuid;

use crate::log::model::UserRecord;

mod cached;
mod file;
mod memory;
mod pg;

pub use cached::CachedRecordStore;
pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use pg::PgRecordStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record was modified concurrently (expected revision {expected}, found {found})")]
    Conflict { expected: i64, found: i64 },
    #[error("record store failure: {0:#}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub record: UserRecord,
    pub revision: i64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Loads the user's record; `None` means nothing was saved yet (revision 0).
    async fn load(&self, user_id: Uuid) -> Result<Option<StoredRecord>, StoreError>;

    /// Saves `record` if the stored revision still equals `expected_revision`
    /// and returns the new revision.
    async fn save(
        &self,
        user_id: Uuid,
        record: &UserRecord,
        expected_revision: i64,
    ) -> Result<i64, StoreError>;
}
