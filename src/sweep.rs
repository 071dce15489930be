//! Automated per-channel verification sweep
//!
//! Plays the session noise out of every speaker in turn so an operator can
//! check routing and offsets before collecting data. Strictly sequential: a
//! channel's output has ended before the next one starts.

use std::time::{Duration, Instant};

use crate::audio::{white_noise, OutputBackend, PlaybackEngine, PlaybackState, RoutingSpec};
use crate::config::AppConfig;
use crate::constants::{NOISE_SEED, SWEEP_GRACE_MS};
use crate::error::Result;

/// Per-channel progress for a presentation layer
pub trait SweepObserver {
    fn on_sweep_start(&mut self, _num_speakers: u16) {}
    fn on_channel_start(&mut self, _channel: u16) {}
    fn on_channel_end(&mut self, _channel: u16) {}
    fn on_sweep_end(&mut self, _report: &SweepReport) {}
}

impl SweepObserver for () {}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub num_speakers: u16,
    pub duration: Duration,
    pub level_dbfs: f64,
    pub device_id: String,
    pub sample_rate: u32,
}

impl SweepSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            num_speakers: config.session.num_speakers,
            duration: config.session.duration()?,
            level_dbfs: config.session.level_dbfs,
            device_id: config.audio.device_id.clone(),
            sample_rate: config.audio.sample_rate,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Channels played to the end or to the duration limit, in order
    pub channels_played: Vec<u16>,
    pub elapsed: Duration,
}

pub struct AutomatedSweep<'a, B: OutputBackend> {
    engine: &'a mut PlaybackEngine<B>,
    settings: SweepSettings,
}

impl<'a, B: OutputBackend> AutomatedSweep<'a, B> {
    pub fn new(engine: &'a mut PlaybackEngine<B>, settings: SweepSettings) -> Self {
        Self { engine, settings }
    }

    /// Play every channel once, blocking for the signal duration on each
    ///
    /// A failed `play`, or a device error while a channel plays, stops output
    /// and ends the sweep with that error.
    pub fn run(&mut self, observer: &mut dyn SweepObserver) -> Result<SweepReport> {
        let started = Instant::now();
        let settings = &self.settings;

        let noise = white_noise(settings.duration.as_secs_f64(), settings.sample_rate, NOISE_SEED)?;
        self.engine.load(noise, None)?;

        tracing::info!("Sweep started: {} speakers", settings.num_speakers);
        observer.on_sweep_start(settings.num_speakers);

        let limit = settings.duration + Duration::from_millis(SWEEP_GRACE_MS);
        let mut report = SweepReport::default();

        for channel in 0..settings.num_speakers {
            observer.on_channel_start(channel);
            let routing = RoutingSpec::single(channel);

            if let Err(e) = self.engine.play(settings.level_dbfs, &settings.device_id, &routing) {
                self.engine.stop();
                observer.on_channel_end(channel);
                tracing::warn!("Sweep aborted on channel {}: {}", channel, e);
                return Err(e.into());
            }

            match self.engine.wait(limit) {
                Ok(PlaybackState::Playing) => {
                    tracing::debug!("Channel {} still playing after {:?}; stopping", channel, limit);
                }
                Ok(_) => {}
                Err(e) => {
                    self.engine.stop();
                    observer.on_channel_end(channel);
                    tracing::warn!("Sweep aborted on channel {}: {}", channel, e);
                    return Err(e.into());
                }
            }
            self.engine.stop();

            report.channels_played.push(channel);
            observer.on_channel_end(channel);
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            "Sweep finished: {} channels in {:.1} s",
            report.channels_played.len(),
            report.elapsed.as_secs_f64()
        );
        observer.on_sweep_end(&report);
        Ok(report)
    }
}
