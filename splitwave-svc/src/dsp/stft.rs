//! Short-time Fourier transform and its inverse
//!
//! Frames are centred: the signal is zero-padded by `n_fft / 2` on both sides
//! so frame `t` is centred on sample `t * hop`. The inverse uses weighted
//! overlap-add with the same periodic Hann window and divides by the summed
//! squared window, which reconstructs an unmodified spectrogram exactly.

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use super::{DspError, DspResult};

/// Window size used throughout the service
pub const DEFAULT_N_FFT: usize = 2048;

/// Hop length used throughout the service
pub const DEFAULT_HOP: usize = 512;

/// Complex spectrogram, indexed `[frame][bin]`
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<Complex32>>,
    pub n_fft: usize,
    pub hop: usize,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Centre frequency of a bin in Hz
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.n_fft as f32
    }

    /// Magnitude spectrogram, indexed `[frame][bin]`
    pub fn magnitude(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }

    /// Power spectrogram (`|X|^2`), indexed `[frame][bin]`
    pub fn power(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm_sqr()).collect())
            .collect()
    }
}

/// Planned forward/inverse transform pair
pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    /// 2048-sample window, 512-sample hop
    pub fn standard() -> Self {
        Self::planned(DEFAULT_N_FFT, DEFAULT_HOP)
    }

    fn planned(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            n_fft,
            hop,
            window: hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Forward transform of a mono signal
    pub fn forward(&self, signal: &[f32]) -> DspResult<Spectrogram> {
        if signal.is_empty() {
            return Err(DspError::EmptySignal);
        }

        let pad = self.n_fft / 2;
        let num_bins = self.n_fft / 2 + 1;
        let padded_len = signal.len() + 2 * pad;
        let num_frames = 1 + (padded_len - self.n_fft) / self.hop;

        let mut frames = Vec::with_capacity(num_frames);
        let mut buffer = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.forward.get_inplace_scratch_len()];

        for t in 0..num_frames {
            let start = t * self.hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let idx = start + i;
                let sample = if idx >= pad && idx - pad < signal.len() {
                    signal[idx - pad]
                } else {
                    0.0
                };
                *slot = Complex32::new(sample * self.window[i], 0.0);
            }

            self.forward.process_with_scratch(&mut buffer, &mut scratch);
            frames.push(buffer[..num_bins].to_vec());
        }

        Ok(Spectrogram {
            frames,
            n_fft: self.n_fft,
            hop: self.hop,
        })
    }

    /// Inverse transform, trimmed or zero-padded to `length` samples
    pub fn inverse(&self, spectrogram: &Spectrogram, length: usize) -> DspResult<Vec<f32>> {
        if spectrogram.n_fft != self.n_fft || spectrogram.hop != self.hop {
            return Err(DspError::InvalidParameter(format!(
                "spectrogram was built with n_fft={} hop={}, transform has n_fft={} hop={}",
                spectrogram.n_fft, spectrogram.hop, self.n_fft, self.hop
            )));
        }
        if spectrogram.frames.is_empty() {
            return Ok(vec![0.0; length]);
        }

        let half = self.n_fft / 2;
        let padded_len = self.n_fft + self.hop * (spectrogram.frames.len() - 1);
        let mut output = vec![0.0f32; padded_len];
        let mut window_sum = vec![0.0f32; padded_len];
        let scale = 1.0 / self.n_fft as f32;

        let mut buffer = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.inverse.get_inplace_scratch_len()];

        for (t, frame) in spectrogram.frames.iter().enumerate() {
            if frame.len() != half + 1 {
                return Err(DspError::InvalidParameter(format!(
                    "frame {} has {} bins, expected {}",
                    t,
                    frame.len(),
                    half + 1
                )));
            }

            // Hermitian spectrum of a real signal
            buffer[0] = Complex32::new(frame[0].re, 0.0);
            buffer[half] = Complex32::new(frame[half].re, 0.0);
            for k in 1..half {
                buffer[k] = frame[k];
                buffer[self.n_fft - k] = frame[k].conj();
            }

            self.inverse.process_with_scratch(&mut buffer, &mut scratch);

            let start = t * self.hop;
            for (i, value) in buffer.iter().enumerate() {
                let w = self.window[i];
                output[start + i] += value.re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (out, &norm) in output.iter_mut().zip(window_sum.iter()) {
            if norm > f32::MIN_POSITIVE {
                *out /= norm;
            }
        }

        let mut signal: Vec<f32> = output.into_iter().skip(half).take(length).collect();
        signal.resize(length, 0.0);
        Ok(signal)
    }
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_frame_count_and_bins() {
        let stft = Stft::standard();
        let spec = stft.forward(&vec![0.0; 44100]).unwrap();
        assert_eq!(spec.num_bins(), 1025);
        assert_eq!(spec.num_frames(), 1 + 44100 / 512);
    }

    #[test]
    fn test_round_trip_reconstructs_signal() {
        let stft = Stft::standard();
        let signal = sine(440.0, 44100, 8000);
        let spec = stft.forward(&signal).unwrap();
        let rebuilt = stft.inverse(&spec, signal.len()).unwrap();

        assert_eq!(rebuilt.len(), signal.len());
        let max_err = signal
            .iter()
            .zip(rebuilt.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max reconstruction error {}", max_err);
    }

    #[test]
    fn test_sine_peak_bin() {
        let stft = Stft::standard();
        let signal = sine(1000.0, 44100, 44100);
        let spec = stft.forward(&signal).unwrap();
        let mag = spec.magnitude();
        let middle = &mag[mag.len() / 2];
        let (peak_bin, _) = middle
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (k, &m)| if m > best.1 { (k, m) } else { best });
        let freq = spec.bin_frequency(peak_bin, 44100);
        assert!((freq - 1000.0).abs() < 25.0, "peak at {} Hz", freq);
    }

    #[test]
    fn test_empty_signal_rejected() {
        assert!(matches!(Stft::standard().forward(&[]), Err(DspError::EmptySignal)));
    }
}
