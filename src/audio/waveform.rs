//! Waveform buffers and where they come from

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AudioError;

/// Interleaved `f32` samples tagged with a sampling rate
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl WaveformBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self, AudioError> {
        if channels == 0 {
            return Err(AudioError::InvalidAudioType("waveform has no channels".to_string()));
        }
        if samples.is_empty() {
            return Err(AudioError::InvalidAudioType("waveform has no samples".to_string()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(AudioError::InvalidAudioType(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        if sample_rate == 0 {
            return Err(AudioError::MissingSamplingRate);
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        Self::new(samples, 1, sample_rate)
    }

    /// Decode a WAV file; its header supplies the sampling rate
    pub fn from_wav(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path)?;
        let reader = hound::WavReader::new(BufReader::new(file))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_val))
                    .collect::<Result<_, _>>()?
            }
        };

        tracing::debug!(
            "Loaded {:?}: {} ch, {} Hz, {} samples",
            path,
            spec.channels,
            spec.sample_rate,
            samples.len()
        );

        Self::new(samples, spec.channels, spec.sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Number of samples whose magnitude is at or above `threshold`
    pub fn count_at_or_above(&self, threshold: f32) -> usize {
        self.samples.iter().filter(|s| s.abs() >= threshold).count()
    }

    /// Copy with every sample multiplied by `gain`
    pub fn scaled(&self, gain: f64) -> Self {
        Self {
            samples: self.samples.iter().map(|&s| (s as f64 * gain) as f32).collect(),
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }
}

/// Something [`PlaybackEngine::load`](crate::audio::PlaybackEngine::load) accepts
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Raw interleaved samples; the sampling rate must be supplied separately
    Samples { samples: Vec<f32>, channels: u16 },
    /// A buffer that already knows its rate
    Buffer(WaveformBuffer),
    /// A WAV file on disk
    File(PathBuf),
}

impl AudioSource {
    pub fn mono(samples: Vec<f32>) -> Self {
        AudioSource::Samples { samples, channels: 1 }
    }

    /// Turn the source into a buffer, failing if no sampling rate is known
    pub fn resolve(self, sampling_rate: Option<u32>) -> Result<WaveformBuffer, AudioError> {
        match self {
            AudioSource::Samples { samples, channels } => {
                let rate = sampling_rate.ok_or(AudioError::MissingSamplingRate)?;
                WaveformBuffer::new(samples, channels, rate)
            }
            AudioSource::Buffer(buffer) => Ok(buffer),
            AudioSource::File(path) => {
                if !is_wav(&path) {
                    return Err(AudioError::InvalidAudioType(format!(
                        "{:?} is not a WAV file",
                        path
                    )));
                }
                let buffer = WaveformBuffer::from_wav(&path)?;
                if let Some(rate) = sampling_rate {
                    if rate != buffer.sample_rate() {
                        tracing::warn!(
                            "Ignoring supplied rate {} Hz; {:?} is {} Hz",
                            rate,
                            path,
                            buffer.sample_rate()
                        );
                    }
                }
                Ok(buffer)
            }
        }
    }
}

impl From<WaveformBuffer> for AudioSource {
    fn from(buffer: WaveformBuffer) -> Self {
        AudioSource::Buffer(buffer)
    }
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        AudioSource::File(path)
    }
}

impl From<&Path> for AudioSource {
    fn from(path: &Path) -> Self {
        AudioSource::File(path.to_path_buf())
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav") || e.eq_ignore_ascii_case("wave"))
        .unwrap_or(false)
}
