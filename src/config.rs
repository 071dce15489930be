//! Session parameters
//!
//! Loaded once at start-up and handed to each component; nothing reads
//! settings from ambient state. Stored as TOML in the per-user config directory.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::RoutingSpec;
use crate::calibration::ReferenceChannel;
use crate::constants::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of speakers in the rig
    pub num_speakers: u16,
    /// Length of each noise presentation in seconds
    pub duration_secs: f64,
    /// Presentation level in dB FS
    pub level_dbfs: f64,
    pub reference_channel: ReferenceChannel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_speakers: DEFAULT_NUM_SPEAKERS,
            duration_secs: DEFAULT_DURATION_SECS,
            level_dbfs: DEFAULT_LEVEL_DBFS,
            reference_channel: ReferenceChannel::default(),
        }
    }
}

impl SessionConfig {
    pub fn duration(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.duration_secs)
            .map_err(|e| Error::Config(format!("duration_secs {}: {}", self.duration_secs, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device ID; empty selects the host default
    pub device_id: String,
    /// Space-separated 1-based output channels, one per waveform channel
    pub channel_routing: String,
    /// Rate of the generated noise
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            channel_routing: "1".to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl AudioConfig {
    pub fn routing(&self) -> Result<RoutingSpec> {
        Ok(RoutingSpec::parse(&self.channel_routing)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// WAV file presented during level calibration
    pub cal_file: Option<PathBuf>,
    /// Level the calibration file is played at
    pub cal_level_dbfs: f64,
    /// Expected dB SPL of the calibration signal
    pub nominal_cal_spl: f64,
    /// Offset derived by the last calibration
    pub slm_offset: Option<f64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            cal_file: None,
            cal_level_dbfs: DEFAULT_LEVEL_DBFS,
            nominal_cal_spl: DEFAULT_NOMINAL_CAL_SPL,
            slm_offset: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Where offset records go; the working directory when unset
    pub directory: Option<PathBuf>,
}

impl ExportConfig {
    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub audio: AudioConfig,
    pub calibration: CalibrationConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// `<config dir>/speaker-balancer/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "speaker-balancer").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when the file does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.num_speakers == 0 {
            return Err(Error::Config("num_speakers must be at least 1".to_string()));
        }
        let duration = self.session.duration_secs;
        if !(duration > 0.0 && duration <= MAX_DURATION_SECS) {
            return Err(Error::Config(format!(
                "duration_secs must be in (0, {}], got {}",
                MAX_DURATION_SECS, duration
            )));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        if let ReferenceChannel::Fixed(channel) = self.session.reference_channel {
            if channel >= self.session.num_speakers {
                return Err(Error::Config(format!(
                    "reference channel {} is outside a {}-speaker rig",
                    channel, self.session.num_speakers
                )));
            }
        }
        self.audio.routing()?;
        Ok(())
    }
}
