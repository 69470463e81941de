//! Concurrency admission control.
//!
//! Two semaphore layers gate the expensive recommendation path: one global
//! and one per user. Acquisition waits at most the configured timeout; a
//! timed-out caller falls through to the terminal default instead of
//! queueing. Permits are owned by the returned guard, so they release on
//! every exit path including panics and cancellation.

use std::sync::Arc;
use std::time::Duration;

use codetop_config::AdmissionConfig;
use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("admission acquire timed out at the {0} level")]
    Timeout(&'static str),
}

/// Both permits for one admitted request. Dropping releases them.
#[derive(Debug)]
pub struct AdmissionGuard {
    _global: OwnedSemaphorePermit,
    _user: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct AdmissionControl {
    global: Arc<Semaphore>,
    per_user: DashMap<Uuid, Arc<Semaphore>>,
    per_user_permits: usize,
    acquire_timeout: Duration,
}

impl AdmissionControl {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            global: Arc::new(Semaphore::new(config.global_permits)),
            per_user: DashMap::new(),
            per_user_permits: config.per_user_permits,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        }
    }

    /// Acquire global then per-user permits within the bounded wait.
    pub async fn acquire(&self, user_id: Uuid) -> Result<AdmissionGuard, AdmissionError> {
        let global = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.global).acquire_owned(),
        )
        .await
        .map_err(|_| AdmissionError::Timeout("global"))?
        .expect("admission semaphore is never closed");

        let user_semaphore = self
            .per_user
            .entry(user_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_user_permits)))
            .clone();

        let user = tokio::time::timeout(self.acquire_timeout, user_semaphore.acquire_owned())
            .await
            .map_err(|_| AdmissionError::Timeout("user"))?
            .expect("admission semaphore is never closed");

        Ok(AdmissionGuard {
            _global: global,
            _user: user,
        })
    }

    pub fn available_global_permits(&self) -> usize {
        self.global.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(global: usize, per_user: usize) -> AdmissionControl {
        AdmissionControl::new(&AdmissionConfig {
            global_permits: global,
            per_user_permits: per_user,
            acquire_timeout_ms: 50,
        })
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let control = control(2, 2);
        let user = Uuid::new_v4();
        {
            let _guard = control.acquire(user).await.unwrap();
            assert_eq!(control.available_global_permits(), 1);
        }
        // Guard dropped: permits back.
        assert_eq!(control.available_global_permits(), 2);
    }

    #[tokio::test]
    async fn test_global_saturation_times_out_instead_of_blocking() {
        let control = control(1, 2);
        let _held = control.acquire(Uuid::new_v4()).await.unwrap();

        let err = control.acquire(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err, AdmissionError::Timeout("global"));
    }

    #[tokio::test]
    async fn test_per_user_saturation() {
        let control = control(10, 1);
        let user = Uuid::new_v4();
        let _held = control.acquire(user).await.unwrap();

        let err = control.acquire(user).await.unwrap_err();
        assert_eq!(err, AdmissionError::Timeout("user"));

        // A different user is unaffected.
        assert!(control.acquire(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_global_permit_released_when_user_level_times_out() {
        let control = control(10, 1);
        let user = Uuid::new_v4();
        let _held = control.acquire(user).await.unwrap();
        let before = control.available_global_permits();

        let _ = control.acquire(user).await.unwrap_err();
        assert_eq!(control.available_global_permits(), before);
    }
}
