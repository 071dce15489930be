//! Error types for the speaker balancer

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid audio type: {0}")]
    InvalidAudioType(String),

    #[error("No sampling rate was provided")]
    MissingSamplingRate,

    #[error("Invalid audio device: {0}")]
    InvalidAudioDevice(String),

    #[error("Invalid routing: {0}")]
    InvalidRouting(String),

    #[error("Clipping: peak {peak:.4} with {clipped_samples} samples at or above full scale")]
    Clipping { peak: f32, clipped_samples: usize },

    #[error("No waveform loaded")]
    NoWaveformLoaded,

    #[error("Output stream failed: {0}")]
    StreamError(String),

    #[error("Failed to read WAV file: {0}")]
    WavRead(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Offset calculation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Channel already registered: {0}")]
    DuplicateChannel(u16),

    #[error("Unknown channel: {0}")]
    UnknownChannel(u16),

    #[error("Channel {channel} cannot be balanced before reference channel {reference} is measured")]
    ReferenceNotEstablished { channel: u16, reference: u16 },

    #[error("Reference channel {channel} must keep a 0 dB offset, got {offset}")]
    ReferenceOffset { channel: u16, offset: f64 },

    #[error("Invalid SLM reading: {0}")]
    InvalidReading(f64),

    #[error("No reference offset has been derived yet")]
    OffsetNotDerived,
}

/// Offset export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Permission denied writing {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
