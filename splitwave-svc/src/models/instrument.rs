//! Instrument vocabulary and classification results

use serde::{Serialize, Serializer};

/// Instrument groups the classifier and separation engine know about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstrumentLabel {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl InstrumentLabel {
    /// Evaluation order, which is also the tie-break order
    pub const ALL: [InstrumentLabel; 4] = [
        InstrumentLabel::Vocals,
        InstrumentLabel::Drums,
        InstrumentLabel::Bass,
        InstrumentLabel::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentLabel::Vocals => "Vocals",
            InstrumentLabel::Drums => "Drums",
            InstrumentLabel::Bass => "Bass",
            InstrumentLabel::Other => "Other",
        }
    }

    pub fn sub_parts(&self) -> &'static [&'static str] {
        match self {
            InstrumentLabel::Vocals => &["Lead", "Tenors"],
            InstrumentLabel::Drums => &["Kick", "Snare", "Hi-hats", "Crash"],
            InstrumentLabel::Bass => &["Electric Bass", "Synth Bass"],
            InstrumentLabel::Other => &["Guitar", "Piano", "Wind", "Strings"],
        }
    }

    /// Resolve a requested track name; anything unrecognised renders as `Other`
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(name))
            .unwrap_or(InstrumentLabel::Other)
    }
}

impl std::fmt::Display for InstrumentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage key for a track: lowercased, whitespace joined with `_`
///
/// Returns `None` if the result is empty or contains anything other than
/// `a-z`, `0-9`, `_` and `-`, so keys are always safe file stems.
pub fn track_key(name: &str) -> Option<String> {
    let key = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();

    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

    valid.then_some(key)
}

/// One detected instrument group
///
/// `confidence` is kept unrounded; rounding happens only when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentCandidate {
    #[serde(rename = "name")]
    pub label: InstrumentLabel,
    #[serde(serialize_with = "serialize_2dp")]
    pub confidence: f64,
    pub sub_parts: &'static [&'static str],
}

impl InstrumentCandidate {
    pub fn new(label: InstrumentLabel, confidence: f64) -> Self {
        Self {
            label,
            confidence,
            sub_parts: label.sub_parts(),
        }
    }
}

/// Ranked classification of one recording
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub instruments: Vec<InstrumentCandidate>,
    #[serde(serialize_with = "serialize_1dp")]
    pub tempo: f64,
    #[serde(serialize_with = "serialize_2dp")]
    pub duration: f64,
    pub sample_rate: u32,
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub(crate) fn serialize_1dp<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 1))
}

pub(crate) fn serialize_2dp<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(InstrumentLabel::from_name("Vocals"), InstrumentLabel::Vocals);
        assert_eq!(InstrumentLabel::from_name("drums"), InstrumentLabel::Drums);
        assert_eq!(InstrumentLabel::from_name(" BASS "), InstrumentLabel::Bass);
        assert_eq!(InstrumentLabel::from_name("Guitar"), InstrumentLabel::Other);
    }

    #[test]
    fn test_track_key() {
        assert_eq!(track_key("Vocals").as_deref(), Some("vocals"));
        assert_eq!(track_key("Electric Bass").as_deref(), Some("electric_bass"));
        assert_eq!(track_key("hi-hats").as_deref(), Some("hi-hats"));
        assert_eq!(track_key("../etc"), None);
        assert_eq!(track_key("   "), None);
        assert_eq!(track_key("a/b"), None);
    }

    #[test]
    fn test_serialization_rounds_for_presentation_only() {
        let candidate = InstrumentCandidate::new(InstrumentLabel::Drums, 0.456789);
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["name"], "Drums");
        assert_eq!(json["confidence"], 0.46);
        assert_eq!(json["sub_parts"][2], "Hi-hats");
        assert_eq!(candidate.confidence, 0.456789);
    }

    #[test]
    fn test_result_rounding() {
        let result = ClassificationResult {
            instruments: vec![],
            tempo: 117.4567,
            duration: 5.004,
            sample_rate: 44100,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["tempo"], 117.5);
        assert_eq!(json["duration"], 5.0);
        assert_eq!(json["sample_rate"], 44100);
    }
}
