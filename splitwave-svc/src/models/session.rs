//! Session and artifact records as held in the registry

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Uploaded,
    Analyzed,
    Separated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uploaded => "uploaded",
            SessionState::Analyzed => "analyzed",
            SessionState::Separated => "separated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(SessionState::Uploaded),
            "analyzed" => Ok(SessionState::Analyzed),
            "separated" => Ok(SessionState::Separated),
            other => Err(format!("unknown session state '{}'", other)),
        }
    }
}

/// Source upload vs rendered track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Source,
    Track,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Source => "source",
            ArtifactKind::Track => "track",
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(ArtifactKind::Source),
            "track" => Ok(ArtifactKind::Track),
            other => Err(format!("unknown artifact kind '{}'", other)),
        }
    }
}

/// One stored file belonging to a session
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub session_id: Uuid,
    pub kind: ArtifactKind,
    /// Track key (`vocals`, `electric_bass`), or `source`
    pub key: String,
    /// Display label as requested (`Vocals`); the original file name for sources
    pub label: String,
    pub file_name: String,
    pub sample_rate: Option<u32>,
    pub duration: Option<f64>,
    pub byte_size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Registry row for one session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: Uuid,
    pub state: SessionState,
    pub original_file: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Track to be committed: key, display label, encoded WAV bytes
#[derive(Debug, Clone)]
pub struct TrackUpload {
    pub key: String,
    pub label: String,
    pub sample_rate: u32,
    pub duration: f64,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [SessionState::Uploaded, SessionState::Analyzed, SessionState::Separated] {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
        assert!("finished".parse::<SessionState>().is_err());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("track".parse::<ArtifactKind>().unwrap(), ArtifactKind::Track);
        assert!("stem".parse::<ArtifactKind>().is_err());
    }
}
