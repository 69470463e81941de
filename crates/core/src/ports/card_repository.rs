use async_trait::async_trait;
use chrono::{DateTime, Utc};
use codetop_domain::{Card, CardState, ReviewLog};
use uuid::Uuid;

/// Card counts by state for the stats endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub due_now: i64,
    pub learning: i64,
    pub review: i64,
    pub relearning: i64,
    pub total_cards: i64,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CardRepository: Send + Sync {
    /// Get the card for a (user, problem) pair.
    async fn get_card(&self, user_id: Uuid, problem_id: i64) -> anyhow::Result<Option<Card>>;

    /// Atomically persist a reviewed card and append its review log.
    ///
    /// The implementation must serialize concurrent submissions for the same
    /// card (row-level lock on the (user_id, problem_id) row) and commit the
    /// card update and the log append in one transaction.
    async fn save_review(&self, card: &Card, log: &ReviewLog) -> anyhow::Result<()>;

    /// Due cards in the given states, ordered by next_review asc then
    /// problem id asc.
    async fn list_due(
        &self,
        user_id: Uuid,
        states: &[CardState],
        due_before: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<Card>>;

    /// Cards whose stability exceeds the threshold, most stable first.
    /// Feeds the similarity signal with the user's mastered problems.
    async fn list_mastered(
        &self,
        user_id: Uuid,
        min_stability: f64,
        limit: u32,
    ) -> anyhow::Result<Vec<Card>>;

    /// Per-state counts plus the number currently due.
    async fn state_counts(&self, user_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<StateCounts>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReviewLogRepository: Send + Sync {
    /// Logs reviewed at or after `since`, newest first, capped at `limit`.
    async fn list_recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<ReviewLog>>;

    /// The most recent logs usable for parameter fitting (finite stability
    /// fields), newest first, capped at `limit`.
    async fn list_for_training(&self, user_id: Uuid, limit: u32) -> anyhow::Result<Vec<ReviewLog>>;

    async fn count_for_user(&self, user_id: Uuid) -> anyhow::Result<i64>;

    /// Reviews recorded strictly after the given instant.
    async fn count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> anyhow::Result<i64>;
}
