//! Utility modules for splitwave-svc

pub mod blocking;

pub use blocking::{run_with_deadline, JobError};
