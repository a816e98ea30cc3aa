//! Test Helper Utilities
//!
//! Shared utilities for testing splitwave-svc

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::{generate_wav_bytes, silent_wav, sine_wav, AudioConfig};

use splitwave_common::ServiceConfig;
use splitwave_svc::models::TrackUpload;
use splitwave_svc::store::SessionStore;
use tempfile::TempDir;

/// Store rooted in a fresh temporary directory
pub async fn create_test_store() -> (SessionStore, ServiceConfig, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let config = ServiceConfig::with_root_folder(dir.path());
    let store = SessionStore::open(&config).await.expect("open store");
    (store, config, dir)
}

/// Track payload with recognisable bytes
pub fn track(key: &str, bytes: &[u8]) -> TrackUpload {
    TrackUpload {
        key: key.to_string(),
        label: key.to_string(),
        sample_rate: 22050,
        duration: 1.0,
        bytes: bytes.to_vec(),
    }
}
