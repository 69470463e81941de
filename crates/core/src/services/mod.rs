pub mod optimizer_service;
pub mod profile_service;
pub mod queue_service;
pub mod review_service;

pub use optimizer_service::{OptimizationOutcome, OptimizerService};
pub use profile_service::ProfileService;
pub use queue_service::QueueService;
pub use review_service::ReviewService;
