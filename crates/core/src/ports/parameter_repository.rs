use async_trait::async_trait;
use codetop_domain::UserParameters;
use uuid::Uuid;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ParameterRepository: Send + Sync {
    /// The single active parameter row for the user, if any.
    async fn get_active(&self, user_id: Uuid) -> anyhow::Result<Option<UserParameters>>;

    /// Insert a default parameter row for a user seen for the first time.
    async fn insert_initial(&self, params: &UserParameters) -> anyhow::Result<()>;

    /// Deactivate the previous active row and insert the new one as active,
    /// in a single transaction.
    async fn activate(&self, params: &UserParameters) -> anyhow::Result<()>;

    /// Users with at least `min_new_reviews` logs appended since their
    /// `optimized_at` (or since ever, when never optimized but eligible).
    async fn list_reoptimization_candidates(
        &self,
        min_new_reviews: i32,
        limit: u32,
    ) -> anyhow::Result<Vec<Uuid>>;
}
