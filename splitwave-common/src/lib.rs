//! # Splitwave Common Library
//!
//! Shared code for the splitwave service and its tooling:
//! - Error type used by the session store and configuration loading
//! - Service configuration resolution (CLI → ENV → TOML → defaults)

pub mod config;
pub mod error;

pub use config::ServiceConfig;
pub use error::{Error, Result};
