//! Per-channel offset records
//!
//! One [`Speaker`] per physical output channel, kept in registration order.
//! Offsets are `None` until a channel has been balanced, which keeps an
//! unmeasured channel distinct from one that measured exactly 0 dB.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::CalibrationError;

/// A single speaker channel
#[derive(Debug, Clone, PartialEq)]
pub struct Speaker {
    /// Zero-based output channel
    pub channel: u16,
    /// Calibration offset in dB
    pub offset: Option<f64>,
    /// Whether every other offset is relative to this speaker
    pub is_reference: bool,
}

impl Speaker {
    pub fn new(channel: u16) -> Self {
        Self {
            channel,
            offset: None,
            is_reference: false,
        }
    }
}

/// Ordered channel -> speaker records
#[derive(Debug, Default, Clone)]
pub struct OffsetStore {
    speakers: Vec<Speaker>,
}

impl OffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with channels `0..num_speakers` registered
    pub fn with_channels(num_speakers: u16) -> Self {
        Self {
            speakers: (0..num_speakers).map(Speaker::new).collect(),
        }
    }

    /// Register a channel with an unset offset
    pub fn register(&mut self, channel: u16) -> Result<(), CalibrationError> {
        if self.get(channel).is_some() {
            return Err(CalibrationError::DuplicateChannel(channel));
        }
        self.speakers.push(Speaker::new(channel));
        Ok(())
    }

    /// Store an offset; the reference speaker only accepts 0 dB
    pub fn set_offset(&mut self, channel: u16, value: f64) -> Result<(), CalibrationError> {
        let speaker = self.get_mut(channel)?;
        if speaker.is_reference && value != 0.0 {
            return Err(CalibrationError::ReferenceOffset { channel, offset: value });
        }
        speaker.offset = Some(value);
        Ok(())
    }

    pub fn clear_offset(&mut self, channel: u16) -> Result<(), CalibrationError> {
        self.get_mut(channel)?.offset = None;
        Ok(())
    }

    /// Make `channel` the only reference speaker, at 0 dB
    pub fn mark_reference(&mut self, channel: u16) -> Result<(), CalibrationError> {
        self.get_mut(channel)?;
        for speaker in &mut self.speakers {
            speaker.is_reference = speaker.channel == channel;
            if speaker.is_reference {
                speaker.offset = Some(0.0);
            }
        }
        Ok(())
    }

    pub fn get(&self, channel: u16) -> Option<&Speaker> {
        self.speakers.iter().find(|s| s.channel == channel)
    }

    fn get_mut(&mut self, channel: u16) -> Result<&mut Speaker, CalibrationError> {
        self.speakers
            .iter_mut()
            .find(|s| s.channel == channel)
            .ok_or(CalibrationError::UnknownChannel(channel))
    }

    /// The current reference speaker, if any
    pub fn reference(&self) -> Option<&Speaker> {
        self.speakers.iter().find(|s| s.is_reference)
    }

    /// Channel -> offset in registration order, unset offsets included
    pub fn get_all(&self) -> Vec<(u16, Option<f64>)> {
        self.speakers.iter().map(|s| (s.channel, s.offset)).collect()
    }

    /// Channels that have not been balanced yet, in registration order
    pub fn missing_offsets(&self) -> Vec<u16> {
        self.speakers
            .iter()
            .filter(|s| s.offset.is_none())
            .map(|s| s.channel)
            .collect()
    }

    pub fn speakers(&self) -> &[Speaker] {
        &self.speakers
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }
}

/// Thread-safe handle to an offset store; writers are serialized by the lock
pub type SharedOffsetStore = Arc<RwLock<OffsetStore>>;

/// Create a new shared offset store
pub fn create_shared_store(store: OffsetStore) -> SharedOffsetStore {
    Arc::new(RwLock::new(store))
}
