//! Global tempo estimate
//!
//! **Algorithm:**
//! 1. Onset strength: positive spectral flux of the dB mel spectrogram,
//!    averaged across bands
//! 2. Autocorrelation of the onset envelope over lags spanning 30–320 BPM
//! 3. Log-normal prior centred on 120 BPM (one octave deviation)
//! 4. Best weighted lag → BPM
//!
//! Returns 0.0 when the envelope has no periodic structure (silence, steady
//! tones).

use super::mel::{mel_spectrogram, power_to_db, N_MELS};
use super::stft::Stft;
use super::DspResult;

const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 320.0;
const PRIOR_BPM: f64 = 120.0;
const PRIOR_STD_OCTAVES: f64 = 1.0;

/// Estimate tempo in beats per minute
pub fn estimate_tempo(stft: &Stft, signal: &[f32], sample_rate: u32) -> DspResult<f64> {
    let mel = mel_spectrogram(stft, signal, sample_rate, N_MELS)?;
    let envelope = onset_envelope(&power_to_db(&mel));
    let frame_rate = sample_rate as f64 / stft.hop() as f64;
    Ok(tempo_from_envelope(&envelope, frame_rate))
}

/// Mean positive first difference across bands, per frame
pub fn onset_envelope(mel_db: &[Vec<f32>]) -> Vec<f32> {
    let num_frames = mel_db.first().map_or(0, |b| b.len());
    if mel_db.is_empty() || num_frames < 2 {
        return vec![0.0; num_frames];
    }

    let mut envelope = vec![0.0f32; num_frames];
    for band in mel_db {
        for t in 1..num_frames {
            envelope[t] += (band[t] - band[t - 1]).max(0.0);
        }
    }
    let bands = mel_db.len() as f32;
    for v in envelope.iter_mut() {
        *v /= bands;
    }
    envelope
}

/// Pick the prior-weighted autocorrelation peak of an onset envelope
pub fn tempo_from_envelope(envelope: &[f32], frame_rate: f64) -> f64 {
    if envelope.len() < 2 || frame_rate <= 0.0 {
        return 0.0;
    }

    let min_lag = ((60.0 * frame_rate / MAX_BPM).ceil() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_BPM).floor() as usize).min(envelope.len() - 1);
    if min_lag > max_lag {
        return 0.0;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let ac: f64 = envelope
            .iter()
            .zip(envelope.iter().skip(lag))
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        if ac <= 1e-12 {
            continue;
        }

        let bpm = 60.0 * frame_rate / lag as f64;
        let octaves = (bpm / PRIOR_BPM).log2() / PRIOR_STD_OCTAVES;
        let score = ac * (-0.5 * octaves * octaves).exp();

        if best.map_or(true, |(_, s)| score > s) {
            best = Some((lag, score));
        }
    }

    best.map_or(0.0, |(lag, _)| 60.0 * frame_rate / lag as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_envelope_recovers_tempo() {
        // 44100 / 512 frames per second, one pulse every 0.5 s → 120 BPM
        let frame_rate = 44100.0 / 512.0;
        let period = frame_rate * 0.5;
        let envelope: Vec<f32> = (0..2000)
            .map(|t| {
                let phase = (t as f64 / period).fract();
                if phase < 1.0 / period { 1.0 } else { 0.0 }
            })
            .collect();

        let bpm = tempo_from_envelope(&envelope, frame_rate);
        assert!((bpm - 120.0).abs() < 5.0, "estimated {}", bpm);
    }

    #[test]
    fn test_flat_envelope_has_no_tempo() {
        assert_eq!(tempo_from_envelope(&vec![0.0; 500], 86.0), 0.0);
        assert_eq!(tempo_from_envelope(&[], 86.0), 0.0);
    }

    #[test]
    fn test_onset_envelope_rising_edge() {
        let mel_db = vec![vec![0.0, 10.0, 10.0, 0.0]];
        assert_eq!(onset_envelope(&mel_db), vec![0.0, 10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_silence_is_zero_bpm() {
        let bpm = estimate_tempo(&Stft::standard(), &vec![0.0; 44100], 44100).unwrap();
        assert_eq!(bpm, 0.0);
    }
}
