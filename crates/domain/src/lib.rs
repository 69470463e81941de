//! Domain types for the CodeTop practice backend.

pub mod api;
pub mod auth;
pub mod errors;
pub mod events;
pub mod models;

pub use api::*;
pub use auth::*;
pub use errors::*;
pub use events::*;
pub use models::*;

use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_sha: String,
    pub uptime_seconds: u64,
}

/// Ready check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub database: String,
}
