//! Heuristic per-instrument separation

pub mod engine;

pub use engine::{RenderedTrack, SeparationEngine, SeparationError, SeparationRequest};
