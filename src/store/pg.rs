use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::{RecordStore, StoreError, StoredRecord};
use crate::log::model::UserRecord;

/// One JSONB document per user in `food_records`, guarded by a revision column.
#[derive(Clone)]
pub struct PgRecordStore {
    db: PgPool,
}

impl PgRecordStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn current_revision(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"SELECT revision FROM food_records WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("read food record revision")?;
        Ok(row.map(|(rev,)| rev).unwrap_or(0))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query_as::<_, (Json<UserRecord>, i64)>(
            r#"
            SELECT doc, revision
            FROM food_records
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("load food record")?;

        Ok(row.map(|(Json(record), revision)| StoredRecord { record, revision }))
    }

    async fn save(
        &self,
        user_id: Uuid,
        record: &UserRecord,
        expected_revision: i64,
    ) -> Result<i64, StoreError> {
        let saved = if expected_revision == 0 {
            sqlx::query_as::<_, (i64,)>(
                r#"
                INSERT INTO food_records (user_id, doc, revision)
                VALUES ($1, $2, 1)
                ON CONFLICT (user_id) DO NOTHING
                RETURNING revision
                "#,
            )
            .bind(user_id)
            .bind(Json(record))
            .fetch_optional(&self.db)
            .await
            .context("insert food record")?
        } else {
            sqlx::query_as::<_, (i64,)>(
                r#"
                UPDATE food_records
                   SET doc = $2, revision = revision + 1, updated_at = now()
                 WHERE user_id = $1 AND revision = $3
                RETURNING revision
                "#,
            )
            .bind(user_id)
            .bind(Json(record))
            .bind(expected_revision)
            .fetch_optional(&self.db)
            .await
            .context("update food record")?
        };

        match saved {
            Some((revision,)) => Ok(revision),
            None => Err(StoreError::Conflict {
                expected: expected_revision,
                found: self.current_revision(user_id).await?,
            }),
        }
    }
}
