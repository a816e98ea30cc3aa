//! Instrument detection: feature extraction and the classification heuristic

pub mod classifier;
pub mod features;

pub use classifier::{classification_result, classify, MAX_CONFIDENCE};
pub use features::{AudioFeatures, DetectionError, DetectionStage, FeatureExtractor, StageError};
