//! Idempotency-record repository.
//!
//! The claim protocol is insert-or-inspect: an atomic insert wins the slot;
//! losers read the existing record and either replay, reject, or take over
//! an abandoned claim with a compare-and-swap on (status, attempt). The
//! attempt column is a monotonic counter: CAS on the timestamp would be
//! fragile against precision loss on the read/bind round trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use codetop_core::ports::{BeginOutcome, IdempotencyRepository};

const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
const STATUS_COMPLETED: &str = "COMPLETED";

#[derive(Debug, Clone, sqlx::FromRow)]
struct RecordRow {
    status: String,
    result_json: Option<serde_json::Value>,
    attempt: i32,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgIdempotencyRepository {
    pool: PgPool,
}

impl PgIdempotencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for PgIdempotencyRepository {
    async fn begin(
        &self,
        request_id: &str,
        user_id: Uuid,
        operation: &str,
        now: DateTime<Utc>,
        grace_secs: i64,
    ) -> anyhow::Result<BeginOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_records (request_id, user_id, operation, status, created_at)
            VALUES ($1, $2, $3, 'IN_PROGRESS', $4)
            ON CONFLICT (request_id, user_id, operation) DO NOTHING
            "#,
        )
        .bind(request_id)
        .bind(user_id)
        .bind(operation)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(BeginOutcome::Started);
        }

        let record = sqlx::query_as::<_, RecordRow>(
            "SELECT status, result_json, attempt, created_at FROM idempotency_records \
             WHERE request_id = $1 AND user_id = $2 AND operation = $3",
        )
        .bind(request_id)
        .bind(user_id)
        .bind(operation)
        .fetch_one(&self.pool)
        .await?;

        if record.status == STATUS_COMPLETED {
            return Ok(BeginOutcome::Replayed(
                record.result_json.unwrap_or(serde_json::Value::Null),
            ));
        }

        let age_secs = (now - record.created_at).num_seconds();
        if record.status == STATUS_IN_PROGRESS && age_secs < grace_secs {
            return Ok(BeginOutcome::InFlight);
        }

        // Abandoned or failed: take over, guarding against a concurrent
        // taker with a CAS on the observed (status, attempt). A competing
        // takeover bumps the counter first, so exactly one caller wins.
        let taken = sqlx::query(
            r#"
            UPDATE idempotency_records
            SET status = 'IN_PROGRESS', created_at = $4, attempt = attempt + 1,
                result_json = NULL, error_class = NULL
            WHERE request_id = $1 AND user_id = $2 AND operation = $3
              AND status = $5 AND attempt = $6
            "#,
        )
        .bind(request_id)
        .bind(user_id)
        .bind(operation)
        .bind(now)
        .bind(&record.status)
        .bind(record.attempt)
        .execute(&self.pool)
        .await?;

        if taken.rows_affected() == 1 {
            Ok(BeginOutcome::Started)
        } else {
            Ok(BeginOutcome::InFlight)
        }
    }

    async fn complete(
        &self,
        request_id: &str,
        user_id: Uuid,
        operation: &str,
        result: &serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE idempotency_records SET status = 'COMPLETED', result_json = $4 \
             WHERE request_id = $1 AND user_id = $2 AND operation = $3",
        )
        .bind(request_id)
        .bind(user_id)
        .bind(operation)
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(
        &self,
        request_id: &str,
        user_id: Uuid,
        operation: &str,
        error_class: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE idempotency_records SET status = 'FAILED', error_class = $4 \
             WHERE request_id = $1 AND user_id = $2 AND operation = $3",
        )
        .bind(request_id)
        .bind(user_id)
        .bind(operation)
        .bind(error_class)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
