//! Data model shared by the analysis, separation and store layers

pub mod instrument;
pub mod session;

pub use instrument::{
    round_to, track_key, ClassificationResult, InstrumentCandidate, InstrumentLabel,
};
pub use session::{Artifact, ArtifactKind, Session, SessionState, TrackUpload};
