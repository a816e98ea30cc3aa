//! HTTP API handlers

pub mod analyze;
pub mod cleanup;
pub mod download;
pub mod health;
pub mod separate;

pub use analyze::analyze_routes;
pub use cleanup::cleanup_routes;
pub use download::download_routes;
pub use health::health_routes;
pub use separate::separate_routes;

use crate::ApiError;
use uuid::Uuid;

/// Parse a session id from a path segment; anything malformed is unknown
pub(crate) fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("Session {} not found", raw)))
}
