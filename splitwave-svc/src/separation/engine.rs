//! Label-specific rendering of isolated tracks

use crate::audio::{encode_wav, DecodedAudio};
use crate::dsp::{self, DspError, Hpss, Stft};
use crate::models::{track_key, InstrumentLabel};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const VOCALS_PREEMPHASIS: f32 = 0.95;
const VOCALS_MARGIN: f32 = 8.0;
const DRUMS_MARGIN: f32 = 3.0;
const OTHER_MARGIN: f32 = 5.0;
const BASS_CUTOFF_HZ: f32 = 250.0;
const BASS_ATTENUATION: f32 = 0.05;

/// One entry of `selected_instruments`
#[derive(Debug, Clone, Deserialize)]
pub struct SeparationRequest {
    pub name: String,
    #[serde(default)]
    pub sub_parts: Option<Vec<String>>,
}

impl SeparationRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sub_parts: None,
        }
    }
}

/// A rendered, encoded track that has not been committed yet
#[derive(Debug, Clone)]
pub struct RenderedTrack {
    /// Name as requested
    pub name: String,
    pub key: String,
    pub label: InstrumentLabel,
    pub sub_parts: Vec<String>,
    pub sample_rate: u32,
    pub duration: f64,
    pub wav: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("Invalid track name '{0}'")]
    InvalidTrackName(String),

    #[error("No instruments selected")]
    NothingSelected,

    #[error("Filtering failed for {label}: {source}")]
    Dsp {
        label: String,
        #[source]
        source: DspError,
    },

    #[error("Encoding failed for {label}: {source}")]
    Encode {
        label: String,
        #[source]
        source: hound::Error,
    },

    #[error("Separation cancelled before {label}")]
    Cancelled { label: String },
}

/// Renders one isolated waveform per requested label
pub struct SeparationEngine {
    stft: Stft,
    hpss: Hpss,
}

impl Default for SeparationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SeparationEngine {
    pub fn new() -> Self {
        Self {
            stft: Stft::standard(),
            hpss: Hpss::standard(),
        }
    }

    /// Render every request in order
    ///
    /// All-or-nothing: the first failing label aborts the call and no
    /// partial output is returned.
    pub fn separate(
        &self,
        audio: &DecodedAudio,
        requests: &[SeparationRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<RenderedTrack>, SeparationError> {
        if requests.is_empty() {
            return Err(SeparationError::NothingSelected);
        }

        let mut tracks = Vec::with_capacity(requests.len());
        for request in requests {
            if cancel.is_cancelled() {
                return Err(SeparationError::Cancelled {
                    label: request.name.clone(),
                });
            }
            tracks.push(self.render_one(audio, request)?);
        }
        Ok(tracks)
    }

    fn render_one(
        &self,
        audio: &DecodedAudio,
        request: &SeparationRequest,
    ) -> Result<RenderedTrack, SeparationError> {
        let key = track_key(&request.name)
            .ok_or_else(|| SeparationError::InvalidTrackName(request.name.clone()))?;
        let label = InstrumentLabel::from_name(&request.name);

        let span = tracing::debug_span!("render", label = %request.name);
        let _enter = span.enter();

        let mut samples = self
            .filter(label, &audio.samples, audio.sample_rate)
            .map_err(|source| SeparationError::Dsp {
                label: request.name.clone(),
                source,
            })?;
        dsp::peak_normalize(&mut samples);

        let wav = encode_wav(&samples, audio.sample_rate).map_err(|source| SeparationError::Encode {
            label: request.name.clone(),
            source,
        })?;

        let sub_parts = match &request.sub_parts {
            Some(parts) => parts.clone(),
            None => label.sub_parts().iter().map(|s| s.to_string()).collect(),
        };

        tracing::debug!(key = %key, filter = %label, bytes = wav.len(), "Track rendered");

        Ok(RenderedTrack {
            name: request.name.clone(),
            key,
            label,
            sub_parts,
            sample_rate: audio.sample_rate,
            duration: samples.len() as f64 / audio.sample_rate.max(1) as f64,
            wav,
        })
    }

    /// Label-specific filter, before normalization
    pub fn filter(
        &self,
        label: InstrumentLabel,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Vec<f32>, DspError> {
        match label {
            InstrumentLabel::Vocals => {
                let emphasized = dsp::preemphasis(samples, VOCALS_PREEMPHASIS);
                self.hpss.harmonic(&emphasized, VOCALS_MARGIN)
            }
            InstrumentLabel::Drums => self.hpss.percussive(samples, DRUMS_MARGIN),
            InstrumentLabel::Bass => self.low_pass(samples, sample_rate),
            InstrumentLabel::Other => self.hpss.harmonic(samples, OTHER_MARGIN),
        }
    }

    /// Keep bins at or below the cutoff, scale the rest to 5%
    fn low_pass(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, DspError> {
        let mut spec = self.stft.forward(samples)?;
        let cutoff_bin = (0..spec.num_bins())
            .find(|&bin| spec.bin_frequency(bin, sample_rate) > BASS_CUTOFF_HZ)
            .unwrap_or(spec.num_bins());

        for frame in spec.frames.iter_mut() {
            for value in frame.iter_mut().skip(cutoff_bin) {
                *value *= BASS_ATTENUATION;
            }
        }
        self.stft.inverse(&spec, samples.len())
    }
}
