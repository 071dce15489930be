//! Recording output backend shared by the integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use speaker_balancer::audio::{OutputBackend, OutputDeviceInfo, OutputSession, RoutedBlock};
use speaker_balancer::error::AudioError;

pub const DEVICE_ID: &str = "output:Test Rig";

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Output started on these zero-based device outputs
    Start(Vec<usize>),
    Stop,
}

/// Sessions finish on the first `wait`, like a signal running to its end
///
/// A real-time backend instead holds each `wait` until the block's duration
/// has passed since it started.
#[derive(Clone)]
pub struct RecordingBackend {
    pub capacity: u16,
    pub realtime: bool,
    pub events: Arc<Mutex<Vec<Event>>>,
    pub blocks: Arc<Mutex<Vec<RoutedBlock>>>,
    /// Timeout handed to every `wait`, in call order
    pub waits: Arc<Mutex<Vec<Duration>>>,
    /// Device error reported by the session started on this output
    pub fail_on: Option<usize>,
}

impl RecordingBackend {
    pub fn new(capacity: u16) -> Self {
        Self {
            capacity,
            realtime: false,
            events: Arc::new(Mutex::new(Vec::new())),
            blocks: Arc::new(Mutex::new(Vec::new())),
            waits: Arc::new(Mutex::new(Vec::new())),
            fail_on: None,
        }
    }

    pub fn realtime(capacity: u16) -> Self {
        Self {
            realtime: true,
            ..Self::new(capacity)
        }
    }

    pub fn failing_on(capacity: u16, output: usize) -> Self {
        Self {
            fail_on: Some(output),
            ..Self::new(capacity)
        }
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn starts(&self) -> usize {
        self.events.lock().iter().filter(|e| matches!(e, Event::Start(_))).count()
    }
}

struct RecordingSession {
    finished: Arc<AtomicBool>,
    stopped: bool,
    events: Arc<Mutex<Vec<Event>>>,
    waits: Arc<Mutex<Vec<Duration>>>,
    /// When the signal would end on a real device
    ends_at: Option<Instant>,
    fails: bool,
}

impl OutputSession for RecordingSession {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn wait(&mut self, timeout: Duration) -> Result<bool, AudioError> {
        self.waits.lock().push(timeout);
        if self.fails {
            return Err(AudioError::StreamError("device disconnected".to_string()));
        }
        if let Some(ends_at) = self.ends_at {
            let remaining = ends_at.saturating_duration_since(Instant::now());
            std::thread::sleep(remaining.min(timeout));
            if remaining > timeout {
                return Ok(false);
            }
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.events.lock().push(Event::Stop);
        }
    }
}

impl OutputBackend for RecordingBackend {
    fn output_device(&self, device_id: &str) -> Result<OutputDeviceInfo, AudioError> {
        if device_id != DEVICE_ID {
            return Err(AudioError::InvalidAudioDevice(device_id.to_string()));
        }
        Ok(OutputDeviceInfo {
            id: DEVICE_ID.to_string(),
            name: "Test Rig".to_string(),
            is_default: false,
            sample_rates: vec![8000, 48000],
            max_channels: self.capacity,
        })
    }

    fn start(&self, _device: &OutputDeviceInfo, block: RoutedBlock) -> Result<Box<dyn OutputSession>, AudioError> {
        let fails = self.fail_on.is_some_and(|output| block.outputs().contains(&output));
        let ends_at = self.realtime.then(|| Instant::now() + block.duration());
        self.events.lock().push(Event::Start(block.outputs().to_vec()));
        self.blocks.lock().push(block);
        Ok(Box::new(RecordingSession {
            finished: Arc::new(AtomicBool::new(false)),
            stopped: false,
            events: self.events.clone(),
            waits: self.waits.clone(),
            ends_at,
            fails,
        }))
    }
}
