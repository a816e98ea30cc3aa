//! Harmonic/percussive decomposition
//!
//! ## Algorithm
//!
//! Median filtering of the magnitude spectrogram:
//! 1. Median across time (per bin) → sustained, harmonic energy
//! 2. Median across frequency (per frame) → broadband, percussive energy
//! 3. Soft masks with a separation margin: a bin is assigned to the harmonic
//!    side only when it beats `margin ×` the percussive estimate, and vice
//!    versa. Margin 1.0 splits all energy; larger margins leave a residual
//!    that belongs to neither component.
//! 4. Inverse STFT of the masked spectrogram

use super::stft::{Spectrogram, Stft};
use super::{DspError, DspResult};

/// Median filter length, in frames and in bins
pub const DEFAULT_KERNEL: usize = 31;

/// Soft masks, indexed `[frame][bin]`
#[derive(Debug, Clone)]
pub struct HpssMasks {
    pub harmonic: Vec<Vec<f32>>,
    pub percussive: Vec<Vec<f32>>,
}

/// Time-domain components
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub harmonic: Vec<f32>,
    pub percussive: Vec<f32>,
}

/// Harmonic/percussive separator
pub struct Hpss {
    stft: Stft,
    kernel: usize,
}

impl Hpss {
    /// Standard STFT with a 31-point median kernel
    pub fn standard() -> Self {
        Self {
            stft: Stft::standard(),
            kernel: DEFAULT_KERNEL,
        }
    }

    /// Split a signal into both components with the same margin
    pub fn decompose(&self, signal: &[f32], margin: f32) -> DspResult<Decomposition> {
        check_margin(margin)?;
        let spec = self.stft.forward(signal)?;
        let masks = hpss_masks(&spec.magnitude(), self.kernel, margin, margin);

        Ok(Decomposition {
            harmonic: self.stft.inverse(&apply_mask(&spec, &masks.harmonic), signal.len())?,
            percussive: self.stft.inverse(&apply_mask(&spec, &masks.percussive), signal.len())?,
        })
    }

    /// Harmonic component only
    pub fn harmonic(&self, signal: &[f32], margin: f32) -> DspResult<Vec<f32>> {
        check_margin(margin)?;
        let spec = self.stft.forward(signal)?;
        let masks = hpss_masks(&spec.magnitude(), self.kernel, margin, margin);
        self.stft.inverse(&apply_mask(&spec, &masks.harmonic), signal.len())
    }

    /// Percussive component only
    pub fn percussive(&self, signal: &[f32], margin: f32) -> DspResult<Vec<f32>> {
        check_margin(margin)?;
        let spec = self.stft.forward(signal)?;
        let masks = hpss_masks(&spec.magnitude(), self.kernel, margin, margin);
        self.stft.inverse(&apply_mask(&spec, &masks.percussive), signal.len())
    }
}

fn check_margin(margin: f32) -> DspResult<()> {
    if !margin.is_finite() || margin < 1.0 {
        return Err(DspError::InvalidParameter(format!(
            "separation margin must be >= 1.0, got {}",
            margin
        )));
    }
    Ok(())
}

/// Compute soft harmonic/percussive masks from a magnitude spectrogram
pub fn hpss_masks(
    magnitude: &[Vec<f32>],
    kernel: usize,
    margin_harmonic: f32,
    margin_percussive: f32,
) -> HpssMasks {
    let harmonic_enhanced = median_filter_time(magnitude, kernel);
    let percussive_enhanced = median_filter_freq(magnitude, kernel);

    let mut harmonic = Vec::with_capacity(magnitude.len());
    let mut percussive = Vec::with_capacity(magnitude.len());

    for (h_frame, p_frame) in harmonic_enhanced.iter().zip(percussive_enhanced.iter()) {
        harmonic.push(
            h_frame
                .iter()
                .zip(p_frame.iter())
                .map(|(&h, &p)| soft_mask(h, p * margin_harmonic))
                .collect(),
        );
        percussive.push(
            h_frame
                .iter()
                .zip(p_frame.iter())
                .map(|(&h, &p)| soft_mask(p, h * margin_percussive))
                .collect(),
        );
    }

    HpssMasks {
        harmonic,
        percussive,
    }
}

/// Multiply each bin of a spectrogram by its mask value
pub fn apply_mask(spec: &Spectrogram, mask: &[Vec<f32>]) -> Spectrogram {
    let frames = spec
        .frames
        .iter()
        .zip(mask.iter())
        .map(|(frame, m)| frame.iter().zip(m.iter()).map(|(&c, &w)| c * w).collect())
        .collect();

    Spectrogram {
        frames,
        n_fft: spec.n_fft,
        hop: spec.hop,
    }
}

/// Wiener-style soft mask with power 2; both inputs silent → 0
fn soft_mask(x: f32, reference: f32) -> f32 {
    let z = x.max(reference);
    if z < f32::MIN_POSITIVE {
        return 0.0;
    }
    let xn = (x / z).powi(2);
    let rn = (reference / z).powi(2);
    xn / (xn + rn)
}

/// Median filter along the time axis (enhances harmonics)
fn median_filter_time(magnitude: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let num_frames = magnitude.len();
    let num_bins = magnitude.first().map_or(0, |f| f.len());
    let half = (kernel / 2) as isize;

    let mut filtered = vec![vec![0.0f32; num_bins]; num_frames];
    let mut neighbors = Vec::with_capacity(kernel);

    for f in 0..num_bins {
        for t in 0..num_frames {
            neighbors.clear();
            for offset in -half..=half {
                let idx = reflect_index(t as isize + offset, num_frames);
                neighbors.push(magnitude[idx][f]);
            }
            filtered[t][f] = median(&mut neighbors);
        }
    }

    filtered
}

/// Median filter along the frequency axis (enhances percussive)
fn median_filter_freq(magnitude: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let half = (kernel / 2) as isize;
    let mut neighbors = Vec::with_capacity(kernel);
    let mut filtered = Vec::with_capacity(magnitude.len());

    for frame in magnitude {
        let num_bins = frame.len();
        let mut out = vec![0.0f32; num_bins];
        for (f, slot) in out.iter_mut().enumerate() {
            neighbors.clear();
            for offset in -half..=half {
                neighbors.push(frame[reflect_index(f as isize + offset, num_bins)]);
            }
            *slot = median(&mut neighbors);
        }
        filtered.push(out);
    }

    filtered
}

/// Half-sample symmetric reflection (`d c b a | a b c d | d c b a`)
fn reflect_index(mut idx: isize, len: usize) -> usize {
    let n = len as isize;
    if n <= 1 {
        return 0;
    }
    loop {
        if idx < 0 {
            idx = -idx - 1;
        } else if idx >= n {
            idx = 2 * n - idx - 1;
        } else {
            return idx as usize;
        }
    }
}

/// Median of a slice (reorders input)
fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::energy;
    use std::f32::consts::PI;

    fn sine(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / 44100.0).sin())
            .collect()
    }

    fn clicks(len: usize, every: usize) -> Vec<f32> {
        (0..len).map(|i| if i % every == 0 { 1.0 } else { 0.0 }).collect()
    }

    #[test]
    fn test_median() {
        let mut values = vec![3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(median(&mut values), 3.0);
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 5), 0);
        assert_eq!(reflect_index(-2, 5), 1);
        assert_eq!(reflect_index(5, 5), 4);
        assert_eq!(reflect_index(6, 5), 3);
        assert_eq!(reflect_index(-40, 5), reflect_index(-40 + 10, 5));
        assert_eq!(reflect_index(3, 1), 0);
    }

    #[test]
    fn test_soft_mask_complementary_at_unit_margin() {
        let h = soft_mask(2.0, 1.0);
        let p = soft_mask(1.0, 2.0);
        assert!((h + p - 1.0).abs() < 1e-6);
        assert_eq!(soft_mask(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_sine_is_mostly_harmonic() {
        let signal = sine(22050);
        let parts = Hpss::standard().decompose(&signal, 1.0).unwrap();

        let total = energy(&signal);
        let harmonic = energy(&parts.harmonic);
        let percussive = energy(&parts.percussive);
        assert!(harmonic / total > 0.8, "harmonic ratio {}", harmonic / total);
        assert!(percussive < harmonic);
    }

    #[test]
    fn test_clicks_are_mostly_percussive() {
        let signal = clicks(22050, 4410);
        let parts = Hpss::standard().decompose(&signal, 1.0).unwrap();

        assert!(energy(&parts.percussive) > energy(&parts.harmonic));
    }

    #[test]
    fn test_larger_margin_keeps_less_energy() {
        let signal: Vec<f32> = sine(22050)
            .iter()
            .zip(clicks(22050, 2205))
            .map(|(a, b)| a + b)
            .collect();
        let hpss = Hpss::standard();
        let loose = energy(&hpss.harmonic(&signal, 1.0).unwrap());
        let strict = energy(&hpss.harmonic(&signal, 8.0).unwrap());
        assert!(strict <= loose);
    }

    #[test]
    fn test_margin_below_one_rejected() {
        assert!(Hpss::standard().harmonic(&sine(4096), 0.5).is_err());
    }
}
