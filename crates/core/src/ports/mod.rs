pub mod card_repository;
pub mod idempotency_repository;
pub mod parameter_repository;
pub mod problem_repository;

pub use card_repository::{CardRepository, ReviewLogRepository, StateCounts};
pub use idempotency_repository::{BeginOutcome, IdempotencyRepository};
pub use parameter_repository::ParameterRepository;
pub use problem_repository::ProblemRepository;

#[cfg(any(test, feature = "testing"))]
pub use card_repository::{MockCardRepository, MockReviewLogRepository};
#[cfg(any(test, feature = "testing"))]
pub use idempotency_repository::MockIdempotencyRepository;
#[cfg(any(test, feature = "testing"))]
pub use parameter_repository::MockParameterRepository;
#[cfg(any(test, feature = "testing"))]
pub use problem_repository::MockProblemRepository;
