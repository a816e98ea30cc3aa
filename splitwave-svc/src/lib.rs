//! splitwave-svc library interface
//!
//! Heuristic instrument detection and per-instrument track rendering behind
//! a small HTTP API. Exposed as a library so integration tests can drive the
//! router directly.

pub mod analysis;
pub mod api;
pub mod archive;
pub mod audio;
pub mod dsp;
pub mod error;
pub mod models;
pub mod separation;
pub mod store;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use splitwave_common::ServiceConfig;
use std::sync::Arc;
use store::{SessionStore, SweepReport};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub config: Arc<ServiceConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last processing error, reported by the health endpoint
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(store: SessionStore, config: ServiceConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Opportunistic retention sweep run at the start of most requests
    pub async fn sweep(&self) -> SweepReport {
        self.store.sweep(self.config.retention_minutes).await
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::analyze_routes())
        .merge(api::separate_routes())
        .merge(api::download_routes())
        .merge(api::cleanup_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
