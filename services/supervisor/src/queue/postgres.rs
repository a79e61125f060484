//! Postgres-backed admission queue.

use async_trait::async_trait;
use roomvisor_model::{Region, RoomId};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use super::{decode_entry, now_unix, AdmissionQueue, QueueEntry, QueueError, QUEUE_NAME};

/// Admission queue stored in the `admission_queue` table.
///
/// Every operation is a single statement, so each one is atomic without
/// client-side transactions.
#[derive(Clone)]
pub struct PgAdmissionQueue {
    pool: PgPool,
    queue_name: String,
}

impl PgAdmissionQueue {
    pub fn new(pool: PgPool) -> Self {
        Self::with_name(pool, QUEUE_NAME)
    }

    /// Use a queue name other than the default (for isolated tests).
    pub fn with_name(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }

    /// Insert-if-absent and rank lookup in one statement.
    ///
    /// The no-op `DO UPDATE` makes `RETURNING` yield the existing row on
    /// conflict, so the rank is always computed against the stored
    /// `(enqueued_at, member)` and never against the caller's timestamp.
    async fn insert_nx(
        &self,
        member: &str,
        region: Region,
        enqueued_at: i64,
    ) -> Result<u64, QueueError> {
        let rank: i64 = sqlx::query_scalar(
            r#"
            WITH upserted AS (
                INSERT INTO admission_queue (queue_name, member, region, enqueued_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (queue_name, member)
                    DO UPDATE SET region = admission_queue.region
                RETURNING member, enqueued_at
            )
            SELECT COUNT(q.member)::BIGINT
            FROM upserted u
            LEFT JOIN admission_queue q
                ON q.queue_name = $1
                AND (q.enqueued_at, q.member) < (u.enqueued_at, u.member)
            "#,
        )
        .bind(&self.queue_name)
        .bind(member)
        .bind(region.as_str())
        .bind(enqueued_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(rank.max(0) as u64)
    }
}

#[async_trait]
impl AdmissionQueue for PgAdmissionQueue {
    #[instrument(skip(self), fields(queue = %self.queue_name))]
    async fn add(&self, room_id: RoomId, region: Region) -> Result<u64, QueueError> {
        let rank = self
            .insert_nx(&room_id.to_string(), region, now_unix())
            .await?;
        debug!(rank, "Room enqueued");
        Ok(rank)
    }

    #[instrument(skip(self), fields(queue = %self.queue_name, room_id = %entry.room_id))]
    async fn requeue(&self, entry: &QueueEntry) -> Result<u64, QueueError> {
        self.insert_nx(&entry.member(), entry.region, entry.enqueued_at)
            .await
    }

    async fn pop(&self) -> Result<Option<QueueEntry>, QueueError> {
        let row = sqlx::query(
            r#"
            DELETE FROM admission_queue
            WHERE queue_name = $1 AND member = (
                SELECT member
                FROM admission_queue
                WHERE queue_name = $1
                ORDER BY enqueued_at, member
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING member, region, enqueued_at
            "#,
        )
        .bind(&self.queue_name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let member: String = row.try_get("member")?;
                let region: String = row.try_get("region")?;
                let enqueued_at: i64 = row.try_get("enqueued_at")?;
                decode_entry(member, &region, enqueued_at).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn has(&self, room_id: RoomId) -> Result<bool, QueueError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM admission_queue WHERE queue_name = $1 AND member = $2)",
        )
        .bind(&self.queue_name)
        .bind(room_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn size(&self) -> Result<u64, QueueError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM admission_queue WHERE queue_name = $1")
                .bind(&self.queue_name)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }
}
