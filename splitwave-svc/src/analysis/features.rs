//! Per-recording aggregate features

use crate::audio::{decode_audio_file, DecodedAudio};
use crate::dsp::{self, estimate_tempo, mel_spectrogram, DspError, Hpss, Stft};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Mel bands in the spectrogram used for the bass estimate
const BASS_MEL_BANDS_TOTAL: usize = 128;
/// Lowest bands counted as bass
const BASS_MEL_BANDS: usize = 8;
/// Harmonic/percussive margin for analysis
const ANALYSIS_MARGIN: f32 = 1.0;

/// Aggregates the classifier works from
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFeatures {
    pub harmonic_energy: f64,
    pub percussive_energy: f64,
    pub total_energy: f64,
    pub bass_energy: f64,
    /// Beats per minute, 0 when no periodicity is found
    pub tempo: f64,
    /// Seconds
    pub duration: f64,
    pub sample_rate: u32,
}

/// Step of the extraction pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStage {
    Decode,
    Tempo,
    Decomposition,
    MelSpectrogram,
    Cancelled,
}

impl DetectionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStage::Decode => "decode",
            DetectionStage::Tempo => "tempo",
            DetectionStage::Decomposition => "decomposition",
            DetectionStage::MelSpectrogram => "mel_spectrogram",
            DetectionStage::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure inside the extraction pipeline, before the source file is checked
#[derive(Debug, Error)]
#[error("{stage}: {message}")]
pub struct StageError {
    pub stage: DetectionStage,
    pub message: String,
}

impl StageError {
    fn dsp(stage: DetectionStage, err: DspError) -> Self {
        Self {
            stage,
            message: err.to_string(),
        }
    }
}

/// Extraction failure as reported to callers
#[derive(Debug, Error)]
#[error("Instrument detection failed at stage '{stage}': {message} (source file present: {source_present})")]
pub struct DetectionError {
    pub stage: DetectionStage,
    /// Whether the stored source was still on disk when the failure was seen
    pub source_present: bool,
    pub message: String,
}

/// Drives the DSP primitives over one recording
pub struct FeatureExtractor {
    stft: Stft,
    hpss: Hpss,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            stft: Stft::standard(),
            hpss: Hpss::standard(),
        }
    }

    /// Decode the stored source and extract its features
    pub fn extract_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<AudioFeatures, DetectionError> {
        let result = decode_audio_file(path)
            .map_err(|e| StageError {
                stage: DetectionStage::Decode,
                message: e.to_string(),
            })
            .and_then(|audio| self.extract(&audio, cancel));

        result.map_err(|err| DetectionError {
            stage: err.stage,
            source_present: path.exists(),
            message: err.message,
        })
    }

    /// Extract features from already-decoded mono audio
    pub fn extract(
        &self,
        audio: &DecodedAudio,
        cancel: &CancellationToken,
    ) -> Result<AudioFeatures, StageError> {
        let samples = &audio.samples;
        let sample_rate = audio.sample_rate;

        check_cancelled(cancel)?;
        let tempo = estimate_tempo(&self.stft, samples, sample_rate)
            .map_err(|e| StageError::dsp(DetectionStage::Tempo, e))?;

        check_cancelled(cancel)?;
        let parts = self
            .hpss
            .decompose(samples, ANALYSIS_MARGIN)
            .map_err(|e| StageError::dsp(DetectionStage::Decomposition, e))?;

        check_cancelled(cancel)?;
        let mel = mel_spectrogram(&self.stft, &parts.harmonic, sample_rate, BASS_MEL_BANDS_TOTAL)
            .map_err(|e| StageError::dsp(DetectionStage::MelSpectrogram, e))?;
        let bass_energy: f64 = mel
            .iter()
            .take(BASS_MEL_BANDS)
            .flat_map(|band| band.iter())
            .map(|&p| (p as f64) * (p as f64))
            .sum();

        let features = AudioFeatures {
            harmonic_energy: dsp::energy(&parts.harmonic),
            percussive_energy: dsp::energy(&parts.percussive),
            total_energy: dsp::energy(samples),
            bass_energy,
            tempo,
            duration: audio.duration_seconds(),
            sample_rate,
        };

        tracing::debug!(
            harmonic = features.harmonic_energy,
            percussive = features.percussive_energy,
            total = features.total_energy,
            bass = features.bass_energy,
            tempo = features.tempo,
            "Features extracted"
        );

        Ok(features)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), StageError> {
    if cancel.is_cancelled() {
        return Err(StageError {
            stage: DetectionStage::Cancelled,
            message: "processing deadline exceeded".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, seconds: f32) -> DecodedAudio {
        let n = (sample_rate as f32 * seconds) as usize;
        DecodedAudio {
            samples: (0..n)
                .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
                .collect(),
            sample_rate,
            channels: 1,
        }
    }

    #[test]
    fn test_sine_is_mostly_harmonic() {
        let audio = sine(440.0, 22050, 2.0);
        let features = FeatureExtractor::new()
            .extract(&audio, &CancellationToken::new())
            .unwrap();

        assert_eq!(features.sample_rate, 22050);
        assert!((features.duration - 2.0).abs() < 1e-6);
        assert!(features.total_energy > 0.0);
        assert!(features.harmonic_energy > 0.8 * features.total_energy);
        assert!(features.percussive_energy < features.harmonic_energy);
        assert!(features.tempo >= 0.0);
    }

    #[test]
    fn test_silence_has_zero_energy() {
        let audio = DecodedAudio {
            samples: vec![0.0; 22050],
            sample_rate: 22050,
            channels: 1,
        };
        let features = FeatureExtractor::new()
            .extract(&audio, &CancellationToken::new())
            .unwrap();
        assert_eq!(features.total_energy, 0.0);
        assert_eq!(features.harmonic_energy, 0.0);
        assert_eq!(features.bass_energy, 0.0);
    }

    #[test]
    fn test_low_tone_has_bass_energy() {
        let low = FeatureExtractor::new()
            .extract(&sine(60.0, 22050, 1.0), &CancellationToken::new())
            .unwrap();
        let high = FeatureExtractor::new()
            .extract(&sine(3000.0, 22050, 1.0), &CancellationToken::new())
            .unwrap();
        assert!(low.bass_energy > high.bass_energy);
    }

    #[test]
    fn test_cancelled_token_stops_extraction() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = FeatureExtractor::new()
            .extract(&sine(440.0, 22050, 0.5), &cancel)
            .unwrap_err();
        assert_eq!(err.stage, DetectionStage::Cancelled);
    }

    #[test]
    fn test_missing_file_reports_decode_stage() {
        let err = FeatureExtractor::new()
            .extract_file(Path::new("/nonexistent/upload.wav"), &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.stage, DetectionStage::Decode);
        assert!(!err.source_present);
        assert!(err.to_string().contains("source file present: false"));
    }
}
