//! Post-commit cache invalidation with delayed double delete.
//!
//! Subscribes to the domain event bus. Writers publish only after their
//! transaction committed, so the first delete here always runs post-commit.
//! A second delete fires after a short delay to evict any stale value a
//! concurrent reader repopulated between the commit and the first delete.

use std::sync::Arc;
use std::time::Duration;

use codetop_domain::DomainEvent;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{keys, CacheStore};
use crate::events::EventBus;

pub struct CacheInvalidator {
    cache: CacheStore,
    delay: Duration,
}

impl CacheInvalidator {
    pub fn new(cache: CacheStore, delay: Duration) -> Self {
        Self { cache, delay }
    }

    /// Subscribe to the bus and process events until the bus closes.
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let mut receiver = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "cache invalidator lagged; events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// First delete now, second delete after the configured delay.
    pub fn handle(&self, event: &DomainEvent) {
        let targets = Self::targets(event);
        self.delete_all(&targets);

        let cache = self.cache.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for target in &targets {
                apply(&cache, target);
            }
        });
    }

    fn delete_all(&self, targets: &[InvalidationTarget]) {
        for target in targets {
            apply(&self.cache, target);
        }
    }

    /// Keys and prefixes affected by an event.
    fn targets(event: &DomainEvent) -> Vec<InvalidationTarget> {
        match event {
            DomainEvent::ReviewCompleted { user_id, .. } => user_targets(*user_id),
            DomainEvent::ParametersOptimized { user_id } => user_targets(*user_id),
            DomainEvent::ProblemUpdated { problem_id } => vec![
                InvalidationTarget::Key(keys::problem(*problem_id)),
                // Any user's recommendations may cite the problem.
                InvalidationTarget::Prefix(format!("{}:{}:", keys::NAMESPACE, keys::DOMAIN_RECOMMENDATION)),
            ],
        }
    }
}

fn user_targets(user_id: Uuid) -> Vec<InvalidationTarget> {
    let mut targets = vec![InvalidationTarget::Key(keys::user_profile(user_id))];
    for prefix in keys::fsrs_user_prefix(user_id) {
        targets.push(InvalidationTarget::Prefix(prefix));
    }
    targets.push(InvalidationTarget::Prefix(keys::recommendation_user_prefix(
        user_id,
    )));
    targets
}

#[derive(Debug, Clone)]
enum InvalidationTarget {
    Key(String),
    Prefix(String),
}

fn apply(cache: &CacheStore, target: &InvalidationTarget) {
    match target {
        InvalidationTarget::Key(key) => {
            cache.delete(key);
        }
        InvalidationTarget::Prefix(prefix) => {
            cache.delete_prefix(prefix);
        }
    }
}
