use async_trait::async_trait;
use codetop_domain::Problem;
use uuid::Uuid;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProblemRepository: Send + Sync {
    async fn get(&self, problem_id: i64) -> anyhow::Result<Option<Problem>>;

    async fn get_many(&self, problem_ids: &[i64]) -> anyhow::Result<Vec<Problem>>;

    /// Problems the user has no card for yet, in creation order.
    /// These surface as the NEW class of the review queue.
    async fn list_unseen(&self, user_id: Uuid, limit: u32) -> anyhow::Result<Vec<Problem>>;
}
