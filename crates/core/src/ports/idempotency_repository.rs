use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of attempting to claim an idempotency slot.
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// No live record existed; the caller owns the operation now.
    Started,
    /// A completed record exists; replay its stored JSON result.
    Replayed(serde_json::Value),
    /// An IN_PROGRESS record younger than the grace period exists.
    InFlight,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Claim `(request_id, user_id, operation)`.
    ///
    /// Inserts an IN_PROGRESS record when none exists. When a record exists:
    /// COMPLETED replays, IN_PROGRESS within `grace_secs` returns
    /// `InFlight`, and older IN_PROGRESS/FAILED records are taken over with
    /// a compare-and-swap on status.
    async fn begin(
        &self,
        request_id: &str,
        user_id: Uuid,
        operation: &str,
        now: DateTime<Utc>,
        grace_secs: i64,
    ) -> anyhow::Result<BeginOutcome>;

    /// Store the successful result as structured JSON.
    async fn complete(
        &self,
        request_id: &str,
        user_id: Uuid,
        operation: &str,
        result: &serde_json::Value,
    ) -> anyhow::Result<()>;

    /// Record a failure class so later retries are allowed.
    async fn fail(
        &self,
        request_id: &str,
        user_id: Uuid,
        operation: &str,
        error_class: &str,
    ) -> anyhow::Result<()>;

    /// Delete records created before the cutoff; returns rows removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}
