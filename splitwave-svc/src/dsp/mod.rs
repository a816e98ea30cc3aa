//! Signal-processing primitives
//!
//! Pure functions over mono `f32` waveform buffers. Nothing in here touches
//! the filesystem or the session store; the analysis and separation layers
//! call into these the same way they would call an external DSP library.

pub mod hpss;
pub mod mel;
pub mod stft;
pub mod tempo;

pub use hpss::{Decomposition, Hpss};
pub use mel::{mel_spectrogram, MelFilterbank};
pub use stft::{Spectrogram, Stft};
pub use tempo::estimate_tempo;

use thiserror::Error;

/// Errors raised by the DSP primitives
#[derive(Debug, Error)]
pub enum DspError {
    #[error("signal is empty")]
    EmptySignal,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type DspResult<T> = Result<T, DspError>;

/// Sum of squared sample values
pub fn energy(samples: &[f32]) -> f64 {
    samples.iter().map(|&s| (s as f64) * (s as f64)).sum()
}

/// First-order pre-emphasis: `y[n] = x[n] - coef * x[n-1]`
///
/// The sample before the start is extrapolated as `2*x[0] - x[1]`, which keeps
/// the first output sample from carrying a spurious step.
pub fn preemphasis(samples: &[f32], coef: f32) -> Vec<f32> {
    let Some(&first) = samples.first() else {
        return Vec::new();
    };
    let mut previous = match samples.get(1) {
        Some(&second) => 2.0 * first - second,
        None => first,
    };

    samples
        .iter()
        .map(|&s| {
            let out = s - coef * previous;
            previous = s;
            out
        })
        .collect()
}

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
}

/// Scale so the largest absolute sample is exactly 1.0
///
/// A silent buffer stays silent.
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = peak(samples);
    if !peak.is_finite() || peak <= f32::MIN_POSITIVE {
        return;
    }
    for s in samples.iter_mut() {
        *s /= peak;
    }
}
