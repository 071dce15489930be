//! # Speaker Balancer
//!
//! Level calibration for a multi-speaker playback rig.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         Controller (bin/balancer)                     │
//! └──────┬───────────────────────┬──────────────────────────┬────────────┘
//!        │ SLM readings          │ load / play / stop       │ sweep
//!        ▼                       ▼                          ▼
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────────┐
//! │CalibrationEngine │   │  PlaybackEngine  │◄──│   AutomatedSweep     │
//! │  reference rule  │   │ scale, clip test │   │ one channel at a time│
//! └──────┬───────────┘   └──────┬───────────┘   └──────────────────────┘
//!        │                      │ routing::validate
//!        ▼                      ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │   OffsetStore    │   │  OutputBackend   │── cpal stream thread
//! └──────┬───────────┘   └──────────────────┘
//!        │ get_all()
//!        ▼
//! ┌──────────────────┐   ┌──────────────────────────────────────────┐
//! │  OffsetExporter  │   │ CalibrationSession: dB SPL <-> dB FS     │
//! └──────────────────┘   └──────────────────────────────────────────┘
//! ```
//!
//! Balancing: play noise out of the reference speaker, enter its SLM reading,
//! then repeat for each other speaker. Each offset is the reference reading
//! minus the speaker's own reading.

pub mod audio;
pub mod calibration;
pub mod config;
pub mod error;
pub mod export;
pub mod sweep;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for generated noise
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Seed for the white noise generator
    pub const NOISE_SEED: u64 = 4;

    /// Default number of speakers in the rig
    pub const DEFAULT_NUM_SPEAKERS: u16 = 8;

    /// Default presentation length in seconds
    pub const DEFAULT_DURATION_SECS: f64 = 5.0;

    /// Longest accepted noise presentation (seconds)
    pub const MAX_DURATION_SECS: f64 = 3600.0;

    /// Default presentation level in dB FS
    pub const DEFAULT_LEVEL_DBFS: f64 = -30.0;

    /// Default nominal level of the calibration signal in dB SPL
    pub const DEFAULT_NOMINAL_CAL_SPL: f64 = 70.0;

    /// Scaled samples at or above this magnitude clip
    pub const CLIP_THRESHOLD: f32 = 1.0;

    /// Extra time a sweep waits past the signal duration
    pub const SWEEP_GRACE_MS: u64 = 500;

    /// How often the output thread checks for stop/completion
    pub const OUTPUT_POLL_INTERVAL_MS: u64 = 10;
}
