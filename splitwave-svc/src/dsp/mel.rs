//! Mel filterbank and mel power spectrogram
//!
//! Uses the Slaney mel scale (linear below 1 kHz, logarithmic above) with
//! area-normalised triangular filters spanning 0 Hz to Nyquist.

use super::stft::Stft;
use super::DspResult;

/// Number of mel bands used for feature extraction
pub const N_MELS: usize = 128;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// One triangular filter, stored sparsely from `start`
#[derive(Debug, Clone)]
struct Band {
    start: usize,
    weights: Vec<f32>,
}

/// Triangular mel filterbank over STFT bins
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    bands: Vec<Band>,
    num_bins: usize,
}

impl MelFilterbank {
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        let num_bins = n_fft / 2 + 1;
        let sr = sample_rate as f64;

        let mel_min = hz_to_mel(0.0);
        let mel_max = hz_to_mel(sr / 2.0);
        let edges: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
            .collect();

        let bands = (0..n_mels)
            .map(|m| {
                let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
                let norm = 2.0 / (right - left);

                let mut start = None;
                let mut weights = Vec::new();
                for bin in 0..num_bins {
                    let freq = bin as f64 * sr / n_fft as f64;
                    let lower = (freq - left) / (center - left);
                    let upper = (right - freq) / (right - center);
                    let w = lower.min(upper).max(0.0) * norm;
                    if w > 0.0 {
                        start.get_or_insert(bin);
                        weights.push(w as f32);
                    } else if start.is_some() {
                        break;
                    }
                }

                Band {
                    start: start.unwrap_or(0),
                    weights,
                }
            })
            .collect();

        Self { bands, num_bins }
    }

    pub fn n_mels(&self) -> usize {
        self.bands.len()
    }

    /// Project one power-spectrum frame onto the mel bands
    pub fn apply(&self, power_frame: &[f32]) -> Vec<f32> {
        debug_assert_eq!(power_frame.len(), self.num_bins);
        self.bands
            .iter()
            .map(|band| {
                band.weights
                    .iter()
                    .zip(power_frame.iter().skip(band.start))
                    .map(|(w, p)| w * p)
                    .sum()
            })
            .collect()
    }
}

/// Mel power spectrogram, indexed `[band][frame]`
pub fn mel_spectrogram(
    stft: &Stft,
    signal: &[f32],
    sample_rate: u32,
    n_mels: usize,
) -> DspResult<Vec<Vec<f32>>> {
    let spec = stft.forward(signal)?;
    let bank = MelFilterbank::new(sample_rate, stft.n_fft(), n_mels);

    let mut mel = vec![Vec::with_capacity(spec.num_frames()); n_mels];
    for frame in spec.power() {
        for (band, value) in mel.iter_mut().zip(bank.apply(&frame)) {
            band.push(value);
        }
    }
    Ok(mel)
}

/// Convert power to decibels relative to 1.0, floored 80 dB below the peak
pub fn power_to_db(mel: &[Vec<f32>]) -> Vec<Vec<f32>> {
    const AMIN: f32 = 1e-10;
    const TOP_DB: f32 = 80.0;

    let mut db: Vec<Vec<f32>> = mel
        .iter()
        .map(|band| band.iter().map(|&p| 10.0 * p.max(AMIN).log10()).collect())
        .collect();

    let max = db
        .iter()
        .flatten()
        .fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let floor = max - TOP_DB;
    for v in db.iter_mut().flatten() {
        *v = v.max(floor);
    }
    db
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_mel_hz_roundtrip() {
        for hz in [0.0, 100.0, 440.0, 1000.0, 4000.0, 22050.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 1e-6 * hz.max(1.0), "{} -> {}", hz, back);
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_filterbank_shape() {
        let bank = MelFilterbank::new(44100, 2048, N_MELS);
        assert_eq!(bank.n_mels(), 128);
        assert_eq!(bank.apply(&vec![1.0; 1025]).len(), 128);
    }

    #[test]
    fn test_low_bands_ignore_high_tone() {
        let sr = 44100;
        let tone: Vec<f32> = (0..sr as usize)
            .map(|i| (2.0 * PI * 5000.0 * i as f32 / sr as f32).sin())
            .collect();
        let mel = mel_spectrogram(&Stft::standard(), &tone, sr, N_MELS).unwrap();

        let low: f32 = mel[..8].iter().flatten().sum();
        let all: f32 = mel.iter().flatten().sum();
        assert!(low < all * 1e-3, "low {} all {}", low, all);
    }

    #[test]
    fn test_power_to_db_floor() {
        let db = power_to_db(&[vec![1.0, 0.0]]);
        assert!((db[0][0] - 0.0).abs() < 1e-6);
        assert!((db[0][1] + 80.0).abs() < 1e-4);
    }
}
