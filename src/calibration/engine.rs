//! Offset calculation from SLM readings
//!
//! The first reading taken on the reference channel fixes the reference level.
//! Every other channel's offset is then `reference_level - slm_level`, so adding
//! the offset to a channel's presentation level brings it up (or down) to the
//! loudness of the reference speaker.

use serde::{Deserialize, Serialize};

use crate::calibration::store::SharedOffsetStore;
use crate::error::CalibrationError;

/// Which channel anchors the offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceChannel {
    /// Always this zero-based channel
    Fixed(u16),
    /// Whichever channel is balanced first
    FirstCalibrated,
}

impl Default for ReferenceChannel {
    fn default() -> Self {
        ReferenceChannel::Fixed(0)
    }
}

pub struct CalibrationEngine {
    store: SharedOffsetStore,
    reference: ReferenceChannel,
    reference_level: Option<f64>,
}

impl CalibrationEngine {
    pub fn new(store: SharedOffsetStore, reference: ReferenceChannel) -> Self {
        Self {
            store,
            reference,
            reference_level: None,
        }
    }

    /// Record an SLM reading for `channel` and return the stored offset
    pub fn calculate_offset(&mut self, channel: u16, slm_level: f64) -> Result<f64, CalibrationError> {
        if !slm_level.is_finite() {
            return Err(CalibrationError::InvalidReading(slm_level));
        }

        let mut store = self.store.write();
        if store.get(channel).is_none() {
            return Err(CalibrationError::UnknownChannel(channel));
        }

        let reference = match (store.reference(), self.reference) {
            (Some(speaker), _) => speaker.channel,
            (None, ReferenceChannel::Fixed(reference)) => reference,
            (None, ReferenceChannel::FirstCalibrated) => channel,
        };
        let is_reference = reference == channel;

        match self.reference_level {
            None if !is_reference => Err(CalibrationError::ReferenceNotEstablished { channel, reference }),
            None => {
                store.mark_reference(channel)?;
                self.reference_level = Some(slm_level);
                tracing::info!("Reference channel {} established at {:.1} dB SPL", channel, slm_level);
                Ok(0.0)
            }
            Some(previous) if is_reference => {
                let stale: Vec<u16> = store
                    .speakers()
                    .iter()
                    .filter(|s| s.channel != channel && s.offset.is_some())
                    .map(|s| s.channel)
                    .collect();
                for other in &stale {
                    store.clear_offset(*other)?;
                }
                store.set_offset(channel, 0.0)?;
                self.reference_level = Some(slm_level);
                if !stale.is_empty() {
                    tracing::warn!(
                        "Reference channel {} re-measured ({:.1} -> {:.1} dB SPL); cleared offsets for {:?}",
                        channel,
                        previous,
                        slm_level,
                        stale
                    );
                }
                Ok(0.0)
            }
            Some(reference_level) => {
                let offset = reference_level - slm_level;
                store.set_offset(channel, offset)?;
                tracing::debug!(
                    "Channel {}: {:.1} dB SPL against reference {:.1} -> offset {:+.2} dB",
                    channel,
                    slm_level,
                    reference_level,
                    offset
                );
                Ok(offset)
            }
        }
    }

    /// Measured level of the reference channel
    pub fn reference_level(&self) -> Option<f64> {
        self.reference_level
    }

    /// Channel the offsets are relative to, once established
    pub fn reference_channel(&self) -> Option<u16> {
        self.store.read().reference().map(|s| s.channel)
    }

    pub fn reference_policy(&self) -> ReferenceChannel {
        self.reference
    }

    pub fn store(&self) -> SharedOffsetStore {
        self.store.clone()
    }
}
