use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RecordStore, StoreError, StoredRecord};
use crate::log::model::UserRecord;

/// Local JSON persistence: one `<user_id>.json` file per user.
///
/// Files are replaced through a temp file + rename so a crash mid-write
/// leaves the previous version intact.
pub struct FileRecordStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Serialize, Deserialize)]
struct FileDoc {
    revision: i64,
    record: UserRecord,
}

impl FileRecordStore {
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create record dir {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, user_id: Uuid) -> PathBuf {
        self.dir.join(format!("{user_id}.json"))
    }

    async fn read(&self, user_id: Uuid) -> anyhow::Result<Option<StoredRecord>> {
        let path = self.path_for(user_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        let doc: FileDoc = serde_json::from_slice(&bytes)
            .with_context(|| format!("decode {}", path.display()))?;
        Ok(Some(StoredRecord {
            record: doc.record,
            revision: doc.revision,
        }))
    }

    async fn write(&self, user_id: Uuid, record: &UserRecord, revision: i64) -> anyhow::Result<()> {
        let path = self.path_for(user_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&FileDoc {
            revision,
            record: record.clone(),
        })
        .context("encode record")?;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    /// Overwrites the local copy unconditionally; used to mirror another store.
    pub async fn mirror(&self, user_id: Uuid, stored: &StoredRecord) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(user_id, &stored.record, stored.revision).await
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.read(user_id).await?)
    }

    async fn save(
        &self,
        user_id: Uuid,
        record: &UserRecord,
        expected_revision: i64,
    ) -> Result<i64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let found = self.read(user_id).await?.map(|r| r.revision).unwrap_or(0);
        if found != expected_revision {
            return Err(StoreError::Conflict {
                expected: expected_revision,
                found,
            });
        }
        let revision = found + 1;
        self.write(user_id, record, revision).await?;
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::model::Goals;

    #[tokio::test]
    async fn save_and_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let user = Uuid::new_v4();
        let record = UserRecord::with_goals(Goals {
            calorie_goal: 1800,
            protein_goal: 90,
        });

        {
            let store = FileRecordStore::open(dir.path()).await.unwrap();
            assert_eq!(store.save(user, &record, 0).await.unwrap(), 1);
        }

        let reopened = FileRecordStore::open(dir.path()).await.unwrap();
        let loaded = reopened.load(user).await.unwrap().unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.record, record);
        assert!(!dir.path().join(format!("{user}.json.tmp")).exists());
    }

    #[tokio::test]
    async fn conflicting_save_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecordStore::open(dir.path()).await.unwrap();
        let user = Uuid::new_v4();
        store.save(user, &UserRecord::default(), 0).await.unwrap();

        let other = UserRecord::with_goals(Goals {
            calorie_goal: 3000,
            protein_goal: 200,
        });
        let err = store.save(user, &other, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { found: 1, .. }));
        assert_eq!(
            store.load(user).await.unwrap().unwrap().record,
            UserRecord::default()
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_a_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecordStore::open(dir.path()).await.unwrap();
        let user = Uuid::new_v4();
        tokio::fs::write(dir.path().join(format!("{user}.json")), b"{not json")
            .await
            .unwrap();
        assert!(matches!(store.load(user).await, Err(StoreError::Backend(_))));
    }
}
