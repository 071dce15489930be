//! Level-scaled, clip-checked playback
//!
//! ```text
//! Idle ──load──► Loaded ──play──► Playing ──► Stopped | Completed
//!                   │                 ▲
//!                   └──play (clips)──►│ Aborted
//! ```
//!
//! A terminal state rests until the next `load` or `play`. The loaded waveform
//! is kept, so it can be played again at another level or on another channel.

use std::time::Duration;

use crate::audio::device::{CpalBackend, OutputDeviceInfo};
use crate::audio::output::{OutputBackend, OutputSession, RoutedBlock};
use crate::audio::routing::{self, RoutingSpec};
use crate::audio::waveform::{AudioSource, WaveformBuffer};
use crate::constants::CLIP_THRESHOLD;
use crate::error::AudioError;

/// Engine lifecycle
///
/// `Stopped`, `Completed` and `Aborted` are terminal for a presentation, not
/// for the engine: the next `play` restarts from `Loaded` because the waveform
/// is still held. Only an engine that never loaded anything is `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loaded,
    Playing,
    Stopped,
    Completed,
    Aborted,
}

impl PlaybackState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlaybackState::Stopped | PlaybackState::Completed | PlaybackState::Aborted
        )
    }
}

/// dB FS -> linear amplitude multiplier
#[inline]
pub fn db_to_gain(level_dbfs: f64) -> f64 {
    10f64.powf(level_dbfs / 20.0)
}

/// One in-flight presentation
pub struct PlaybackSession {
    pub device: OutputDeviceInfo,
    pub routing: RoutingSpec,
    pub level_dbfs: f64,
    pub scaled_waveform: WaveformBuffer,
    output: Box<dyn OutputSession>,
}

pub struct PlaybackEngine<B: OutputBackend = CpalBackend> {
    backend: B,
    state: PlaybackState,
    waveform: Option<WaveformBuffer>,
    session: Option<PlaybackSession>,
    clipped: Option<WaveformBuffer>,
}

impl PlaybackEngine<CpalBackend> {
    /// Engine on the default cpal host
    pub fn cpal() -> Self {
        Self::new(CpalBackend)
    }
}

impl<B: OutputBackend> PlaybackEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: PlaybackState::Idle,
            waveform: None,
            session: None,
            clipped: None,
        }
    }

    /// Load a waveform; an in-memory source needs `sampling_rate`
    pub fn load(&mut self, source: impl Into<AudioSource>, sampling_rate: Option<u32>) -> Result<(), AudioError> {
        let waveform = source.into().resolve(sampling_rate)?;

        self.stop();
        tracing::info!(
            "Loaded waveform: {} ch, {} Hz, {:.2} s",
            waveform.channels(),
            waveform.sample_rate(),
            waveform.duration().as_secs_f64()
        );
        self.waveform = Some(waveform);
        self.clipped = None;
        self.state = PlaybackState::Loaded;
        Ok(())
    }

    /// Scale the loaded waveform to `level_dbfs` and play it on `device_id`
    ///
    /// Any session already playing is stopped first. If the scaled waveform
    /// reaches full scale nothing is played; the scaled copy is kept for
    /// inspection through [`clipped_waveform`](Self::clipped_waveform).
    pub fn play(&mut self, level_dbfs: f64, device_id: &str, routing: &RoutingSpec) -> Result<(), AudioError> {
        self.stop();
        self.settle();

        let waveform = self.waveform.as_ref().ok_or(AudioError::NoWaveformLoaded)?;
        let device = self.backend.output_device(device_id)?;
        let routing = routing::validate(routing, waveform.channels(), device.max_channels)?;

        let scaled = waveform.scaled(db_to_gain(level_dbfs));
        let clipped_samples = scaled.count_at_or_above(CLIP_THRESHOLD);
        if clipped_samples > 0 {
            let peak = scaled.peak();
            tracing::warn!(
                "Clipping at {:.1} dB FS: peak {:.4}, {} samples; aborting",
                level_dbfs,
                peak,
                clipped_samples
            );
            self.clipped = Some(scaled);
            self.state = PlaybackState::Aborted;
            return Err(AudioError::Clipping { peak, clipped_samples });
        }

        let block = RoutedBlock::route(&scaled, &routing, device.max_channels);
        let output = self.backend.start(&device, block)?;

        tracing::info!(
            "Playing at {:.1} dB FS on {} (routing {})",
            level_dbfs,
            device.id,
            routing
        );
        self.clipped = None;
        self.session = Some(PlaybackSession {
            device,
            routing,
            level_dbfs,
            scaled_waveform: scaled,
            output,
        });
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Halt output if playing; otherwise nothing happens
    pub fn stop(&mut self) {
        self.reap();
        if let Some(mut session) = self.session.take() {
            session.output.stop();
            self.state = PlaybackState::Stopped;
            tracing::info!("Playback stopped on {}", session.device.id);
        }
    }

    /// Block until the current session completes or `timeout` elapses
    ///
    /// A device error during output halts the session and leaves the engine
    /// `Aborted`.
    pub fn wait(&mut self, timeout: Duration) -> Result<PlaybackState, AudioError> {
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.output.wait(timeout) {
                tracing::error!("Output failed on {}: {}", session.device.id, e);
                session.output.stop();
                self.session = None;
                self.state = PlaybackState::Aborted;
                return Err(e);
            }
        }
        self.reap();
        Ok(self.state)
    }

    pub fn state(&self) -> PlaybackState {
        match &self.session {
            Some(session) if session.output.is_finished() => PlaybackState::Completed,
            _ => self.state,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn loaded(&self) -> Option<&WaveformBuffer> {
        self.waveform.as_ref()
    }

    /// Scaled waveform of the last play that clipped
    pub fn clipped_waveform(&self) -> Option<&WaveformBuffer> {
        self.clipped.as_ref()
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Close a session whose output has run to the end
    fn reap(&mut self) {
        let finished = self
            .session
            .as_ref()
            .map(|s| s.output.is_finished())
            .unwrap_or(false);
        if finished {
            if let Some(mut session) = self.session.take() {
                session.output.stop();
            }
            self.state = PlaybackState::Completed;
            tracing::debug!("Playback completed");
        }
    }

    /// Terminal states fall back to rest before the next play
    fn settle(&mut self) {
        if self.state.is_terminal() {
            self.state = if self.waveform.is_some() {
                PlaybackState::Loaded
            } else {
                PlaybackState::Idle
            };
        }
    }
}

impl<B: OutputBackend> Drop for PlaybackEngine<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Sessions that never finish on their own
    #[derive(Default, Clone)]
    struct HeldBackend {
        active: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
        starts: Arc<Mutex<Vec<RoutedBlock>>>,
        /// Device error the next session reports while playing
        fail_with: Arc<Mutex<Option<String>>>,
    }

    struct HeldSession {
        live: Arc<AtomicBool>,
        failure: Option<String>,
    }

    impl OutputSession for HeldSession {
        fn is_finished(&self) -> bool {
            false
        }
        fn wait(&mut self, _timeout: Duration) -> Result<bool, AudioError> {
            match self.failure.take() {
                Some(message) => Err(AudioError::StreamError(message)),
                None => Ok(false),
            }
        }
        fn stop(&mut self) {
            self.live.store(false, Ordering::SeqCst);
        }
    }

    impl HeldBackend {
        fn live_sessions(&self) -> usize {
            self.active.lock().iter().filter(|l| l.load(Ordering::SeqCst)).count()
        }
    }

    impl OutputBackend for HeldBackend {
        fn output_device(&self, device_id: &str) -> Result<OutputDeviceInfo, AudioError> {
            if device_id != "output:Rig" {
                return Err(AudioError::InvalidAudioDevice(device_id.to_string()));
            }
            Ok(OutputDeviceInfo {
                id: device_id.to_string(),
                name: "Rig".to_string(),
                is_default: true,
                sample_rates: vec![48000],
                max_channels: 8,
            })
        }

        fn start(&self, _device: &OutputDeviceInfo, block: RoutedBlock) -> Result<Box<dyn OutputSession>, AudioError> {
            let live = Arc::new(AtomicBool::new(true));
            self.active.lock().push(live.clone());
            self.starts.lock().push(block);
            Ok(Box::new(HeldSession {
                live,
                failure: self.fail_with.lock().take(),
            }))
        }
    }

    fn loaded_engine(samples: Vec<f32>) -> PlaybackEngine<HeldBackend> {
        let mut engine = PlaybackEngine::new(HeldBackend::default());
        engine.load(AudioSource::mono(samples), Some(48000)).unwrap();
        engine
    }

    #[test]
    fn test_stop_without_session() {
        let mut engine = PlaybackEngine::new(HeldBackend::default());
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_play_requires_waveform() {
        let mut engine = PlaybackEngine::new(HeldBackend::default());
        let result = engine.play(-20.0, "output:Rig", &RoutingSpec::single(0));
        assert!(matches!(result, Err(AudioError::NoWaveformLoaded)));
    }

    #[test]
    fn test_invalid_device() {
        let mut engine = loaded_engine(vec![0.5; 16]);
        let result = engine.play(-20.0, "output:Nope", &RoutingSpec::single(0));
        assert!(matches!(result, Err(AudioError::InvalidAudioDevice(_))));
        assert_eq!(engine.state(), PlaybackState::Loaded);
    }

    #[test]
    fn test_invalid_routing() {
        let mut engine = loaded_engine(vec![0.5; 16]);
        assert!(matches!(
            engine.play(-20.0, "output:Rig", &RoutingSpec::new(vec![1, 2])),
            Err(AudioError::InvalidRouting(_))
        ));
        assert!(matches!(
            engine.play(-20.0, "output:Rig", &RoutingSpec::new(vec![9])),
            Err(AudioError::InvalidRouting(_))
        ));
        assert!(engine.backend().starts.lock().is_empty());
    }

    #[test]
    fn test_full_scale_peak_clips() {
        let mut engine = loaded_engine(vec![0.25, -1.0, 0.5]);
        let result = engine.play(0.0, "output:Rig", &RoutingSpec::single(0));

        match result {
            Err(AudioError::Clipping { peak, clipped_samples }) => {
                assert_eq!(peak, 1.0);
                assert_eq!(clipped_samples, 1);
            }
            other => panic!("expected clipping, got {:?}", other),
        }
        assert_eq!(engine.state(), PlaybackState::Aborted);
        assert_eq!(engine.clipped_waveform().unwrap().samples(), &[0.25, -1.0, 0.5]);
        assert!(engine.backend().starts.lock().is_empty());
    }

    #[test]
    fn test_just_below_full_scale_plays() {
        let mut engine = loaded_engine(vec![0.25, -0.999_999, 0.5]);
        engine.play(0.0, "output:Rig", &RoutingSpec::single(0)).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.clipped_waveform().is_none());
    }

    #[test]
    fn test_level_scales_and_routes() {
        let mut engine = loaded_engine(vec![0.5, -0.5]);
        engine.play(-6.0, "output:Rig", &RoutingSpec::single(3)).unwrap();

        let starts = engine.backend().starts.lock();
        let block = &starts[0];
        assert_eq!(block.channels(), 8);
        assert_eq!(block.outputs(), &[3]);
        let expected = (0.5 * db_to_gain(-6.0)) as f32;
        assert_eq!(block.samples()[3], expected);
        assert_eq!(block.samples()[11], -expected);
        assert_eq!(block.samples().iter().filter(|s| **s != 0.0).count(), 2);
    }

    #[test]
    fn test_play_while_playing_keeps_one_session() {
        let mut engine = loaded_engine(vec![0.1; 32]);
        engine.play(-20.0, "output:Rig", &RoutingSpec::single(0)).unwrap();
        engine.play(-20.0, "output:Rig", &RoutingSpec::single(1)).unwrap();

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(engine.backend().live_sessions(), 1);
        assert_eq!(engine.backend().starts.lock().len(), 2);
        assert_eq!(engine.session().unwrap().routing, RoutingSpec::single(1));
    }

    #[test]
    fn test_stop_halts_output() {
        let mut engine = loaded_engine(vec![0.1; 32]);
        engine.play(-20.0, "output:Rig", &RoutingSpec::single(0)).unwrap();
        engine.stop();

        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.backend().live_sessions(), 0);

        engine.play(-20.0, "output:Rig", &RoutingSpec::single(0)).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_db_to_gain() {
        assert_eq!(db_to_gain(0.0), 1.0);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-12);
        assert!((db_to_gain(-6.0) - 0.501_187).abs() < 1e-6);
    }

    #[test]
    fn test_wait_on_held_session_keeps_playing() {
        let mut engine = loaded_engine(vec![0.1; 32]);
        engine.play(-20.0, "output:Rig", &RoutingSpec::single(0)).unwrap();

        assert_eq!(engine.wait(Duration::from_millis(1)).unwrap(), PlaybackState::Playing);
        assert_eq!(engine.backend().live_sessions(), 1);
    }

    #[test]
    fn test_device_error_while_playing_aborts() {
        let mut engine = loaded_engine(vec![0.1; 32]);
        *engine.backend().fail_with.lock() = Some("device unplugged".to_string());
        engine.play(-20.0, "output:Rig", &RoutingSpec::single(0)).unwrap();

        let result = engine.wait(Duration::from_millis(1));
        assert!(matches!(result, Err(AudioError::StreamError(ref m)) if m == "device unplugged"));
        assert_eq!(engine.state(), PlaybackState::Aborted);
        assert_eq!(engine.backend().live_sessions(), 0);
        assert!(engine.session().is_none());

        // The waveform survives for another attempt
        engine.play(-20.0, "output:Rig", &RoutingSpec::single(0)).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_non_positive_routing_never_reaches_output() {
        let mut engine = loaded_engine(vec![0.1; 8]);
        for bad in [0, -1, -8] {
            let result = engine.play(-20.0, "output:Rig", &RoutingSpec::new(vec![bad]));
            assert!(matches!(result, Err(AudioError::InvalidRouting(_))), "routing {}", bad);
        }
        assert!(engine.backend().starts.lock().is_empty());
    }
}
