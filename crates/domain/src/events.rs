//! Domain events published by writers after their transaction commits.
//!
//! Cache invalidation listens on these; dispatch must happen strictly
//! post-commit so a listener never evicts ahead of the write it reflects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A review was submitted and the card/log writes committed.
    ReviewCompleted {
        user_id: Uuid,
        problem_id: i64,
        rating: i32,
    },
    /// Problem metadata changed.
    ProblemUpdated { problem_id: i64 },
    /// A new active parameter row was installed for the user.
    ParametersOptimized { user_id: Uuid },
}

impl DomainEvent {
    /// User the event belongs to, when user-scoped.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            DomainEvent::ReviewCompleted { user_id, .. } => Some(*user_id),
            DomainEvent::ParametersOptimized { user_id } => Some(*user_id),
            DomainEvent::ProblemUpdated { .. } => None,
        }
    }
}
