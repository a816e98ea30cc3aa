//! Energy-ratio instrument heuristic

use super::features::AudioFeatures;
use crate::models::{round_to, ClassificationResult, InstrumentCandidate, InstrumentLabel};

/// Upper bound for every confidence
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Scale factor and inclusion threshold per label
fn rule(label: InstrumentLabel) -> (f64, f64) {
    match label {
        InstrumentLabel::Vocals => (1.5, 0.30),
        InstrumentLabel::Drums => (1.2, 0.20),
        InstrumentLabel::Bass => (2.0, 0.15),
        InstrumentLabel::Other => (1.8, 0.10),
    }
}

fn numerator(label: InstrumentLabel, features: &AudioFeatures) -> f64 {
    match label {
        InstrumentLabel::Vocals => features.harmonic_energy,
        InstrumentLabel::Drums => features.percussive_energy,
        InstrumentLabel::Bass => features.bass_energy,
        InstrumentLabel::Other => features.harmonic_energy - features.bass_energy,
    }
}

/// Rank the instrument groups present in a recording
///
/// Confidences are `min(0.95, ratio * scale)` and a label is kept only when
/// its unrounded confidence exceeds the label threshold. Ranking uses the
/// reported (2 dp) confidence, so candidates that read the same keep
/// evaluation order. Silent input (`total_energy == 0`) yields no candidates.
pub fn classify(features: &AudioFeatures) -> Vec<InstrumentCandidate> {
    let total = features.total_energy;
    if total == 0.0 || !total.is_finite() {
        return Vec::new();
    }

    let mut candidates: Vec<InstrumentCandidate> = InstrumentLabel::ALL
        .into_iter()
        .filter_map(|label| {
            let (scale, threshold) = rule(label);
            let ratio = numerator(label, features) / total;
            if !ratio.is_finite() {
                return None;
            }
            let confidence = (ratio * scale).clamp(0.0, MAX_CONFIDENCE);
            (confidence > threshold).then(|| InstrumentCandidate::new(label, confidence))
        })
        .collect();

    // stable: equal reported confidences stay in evaluation order
    candidates.sort_by(|a, b| round_to(b.confidence, 2).total_cmp(&round_to(a.confidence, 2)));
    candidates
}

/// Full classification result for the response body
pub fn classification_result(features: &AudioFeatures) -> ClassificationResult {
    ClassificationResult {
        instruments: classify(features),
        tempo: features.tempo,
        duration: features.duration,
        sample_rate: features.sample_rate,
    }
}
