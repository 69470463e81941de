//! Idempotent execution of write operations.
//!
//! Wraps a write in a `(request_id, user_id, operation)` claim. Completed
//! results replay byte-for-byte from stored JSON; concurrent duplicates
//! inside the grace window are rejected with `DuplicateInFlight`; abandoned
//! claims are taken over by the repository's compare-and-swap.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use codetop_config::IdempotencyConfig;
use codetop_domain::DomainError;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

pub use crate::ports::BeginOutcome;
use crate::ports::IdempotencyRepository;

pub struct IdempotencyService {
    repo: Arc<dyn IdempotencyRepository>,
    config: IdempotencyConfig,
}

impl IdempotencyService {
    pub fn new(repo: Arc<dyn IdempotencyRepository>, config: IdempotencyConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// Run `operation` exactly once per `(request_id, user_id, name)`.
    ///
    /// The result type must round-trip through JSON; the stored form is the
    /// replay source, never a display string.
    pub async fn execute<T, F, Fut>(
        &self,
        request_id: &str,
        user_id: Uuid,
        name: &str,
        operation: F,
    ) -> Result<T, DomainError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let outcome = self
            .repo
            .begin(
                request_id,
                user_id,
                name,
                Utc::now(),
                self.config.in_progress_grace_secs,
            )
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?;

        match outcome {
            BeginOutcome::Replayed(stored) => serde_json::from_value(stored).map_err(|e| {
                DomainError::Internal(anyhow::anyhow!("stored idempotency result corrupt: {e}"))
            }),
            BeginOutcome::InFlight => Err(DomainError::DuplicateInFlight),
            BeginOutcome::Started => match operation().await {
                Ok(result) => {
                    let json = serde_json::to_value(&result).map_err(|e| {
                        DomainError::Internal(anyhow::anyhow!("result not serializable: {e}"))
                    })?;
                    self.repo
                        .complete(request_id, user_id, name, &json)
                        .await
                        .map_err(|e| DomainError::Transient(e.to_string()))?;
                    Ok(result)
                }
                Err(err) => {
                    // Best effort; the original failure is what the caller sees.
                    if let Err(store_err) = self
                        .repo
                        .fail(request_id, user_id, name, err.class())
                        .await
                    {
                        tracing::warn!(%store_err, "failed to record idempotency failure");
                    }
                    Err(err)
                }
            },
        }
    }

    /// Purge records older than the configured TTL; returns rows removed.
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::hours(self.config.record_ttl_hours);
        self.repo.purge_older_than(cutoff).await
    }
}
