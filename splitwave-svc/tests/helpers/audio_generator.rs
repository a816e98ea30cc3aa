//! WAV fixtures generated on the fly

use std::f64::consts::PI;
use std::io::Cursor;

/// Shape of a generated clip
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sine frequency; `None` renders silence
    pub frequency: Option<f64>,
    pub amplitude: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 1.0,
            sample_rate: 22050,
            channels: 1,
            frequency: Some(440.0),
            amplitude: 0.5,
        }
    }
}

/// Render a 16-bit PCM WAV into memory
pub fn generate_wav_bytes(config: &AudioConfig) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        let total = (config.duration_seconds * config.sample_rate as f64).round() as usize;

        for i in 0..total {
            let value = match config.frequency {
                Some(freq) => {
                    let t = i as f64 / config.sample_rate as f64;
                    config.amplitude * (2.0 * PI * freq * t).sin()
                }
                None => 0.0,
            };
            let sample = (value * i16::MAX as f64) as i16;
            for _ in 0..config.channels {
                writer.write_sample(sample).expect("write sample");
            }
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

/// Mono sine clip
pub fn sine_wav(frequency: f64, seconds: f64, sample_rate: u32) -> Vec<u8> {
    generate_wav_bytes(&AudioConfig {
        duration_seconds: seconds,
        sample_rate,
        frequency: Some(frequency),
        ..Default::default()
    })
}

/// Mono silent clip
pub fn silent_wav(seconds: f64, sample_rate: u32) -> Vec<u8> {
    generate_wav_bytes(&AudioConfig {
        duration_seconds: seconds,
        sample_rate,
        frequency: None,
        ..Default::default()
    })
}
