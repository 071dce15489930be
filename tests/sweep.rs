mod common;

use std::time::Duration;

use common::{Event, RecordingBackend, DEVICE_ID};
use speaker_balancer::audio::{PlaybackEngine, PlaybackState};
use speaker_balancer::config::AppConfig;
use speaker_balancer::constants::SWEEP_GRACE_MS;
use speaker_balancer::error::AudioError;
use speaker_balancer::sweep::{AutomatedSweep, SweepObserver, SweepReport, SweepSettings};
use speaker_balancer::Error;

fn settings(num_speakers: u16) -> SweepSettings {
    SweepSettings {
        num_speakers,
        duration: Duration::from_millis(20),
        level_dbfs: -20.0,
        device_id: DEVICE_ID.to_string(),
        sample_rate: 8000,
    }
}

#[derive(Default)]
struct Recorder {
    log: Vec<String>,
}

impl SweepObserver for Recorder {
    fn on_sweep_start(&mut self, num_speakers: u16) {
        self.log.push(format!("sweep {}", num_speakers));
    }
    fn on_channel_start(&mut self, channel: u16) {
        self.log.push(format!("start {}", channel));
    }
    fn on_channel_end(&mut self, channel: u16) {
        self.log.push(format!("end {}", channel));
    }
    fn on_sweep_end(&mut self, report: &SweepReport) {
        self.log.push(format!("done {}", report.channels_played.len()));
    }
}

#[test]
fn test_sweep_plays_each_channel_once_in_order() {
    let backend = RecordingBackend::new(8);
    let mut engine = PlaybackEngine::new(backend.clone());
    let mut recorder = Recorder::default();

    let report = AutomatedSweep::new(&mut engine, settings(3))
        .run(&mut recorder)
        .unwrap();

    assert_eq!(report.channels_played, vec![0, 1, 2]);
    assert_eq!(
        backend.events(),
        vec![
            Event::Start(vec![0]),
            Event::Stop,
            Event::Start(vec![1]),
            Event::Stop,
            Event::Start(vec![2]),
            Event::Stop,
        ]
    );
    assert_eq!(
        recorder.log,
        vec!["sweep 3", "start 0", "end 0", "start 1", "end 1", "start 2", "end 2", "done 3"]
    );
    assert_ne!(engine.state(), PlaybackState::Playing);
}

#[test]
fn test_sweep_signal_is_scaled_noise() {
    let backend = RecordingBackend::new(2);
    let mut engine = PlaybackEngine::new(backend.clone());

    AutomatedSweep::new(&mut engine, settings(2)).run(&mut ()).unwrap();

    let blocks = backend.blocks.lock();
    assert_eq!(blocks.len(), 2);
    for block in blocks.iter() {
        assert_eq!(block.channels(), 2);
        assert_eq!(block.sample_rate(), 8000);
        assert_eq!(block.frames(), 160);
        let peak = block.samples().iter().fold(0.0f32, |p, s| p.max(s.abs()));
        assert!((peak - 0.1).abs() < 1e-6, "peak {}", peak);
    }
    // Same noise on each speaker, nothing on the silent output
    let first: Vec<f32> = blocks[0].samples().chunks(2).map(|f| f[0]).collect();
    let second: Vec<f32> = blocks[1].samples().chunks(2).map(|f| f[1]).collect();
    assert_eq!(first, second);
    assert!(blocks[0].samples().chunks(2).all(|f| f[1] == 0.0));
    assert!(blocks[1].samples().chunks(2).all(|f| f[0] == 0.0));
}

#[test]
fn test_sweep_stops_on_invalid_device() {
    let backend = RecordingBackend::new(8);
    let mut engine = PlaybackEngine::new(backend.clone());
    let mut settings = settings(3);
    settings.device_id = "output:Missing".to_string();
    let mut recorder = Recorder::default();

    let result = AutomatedSweep::new(&mut engine, settings).run(&mut recorder);

    assert!(matches!(result, Err(Error::Audio(AudioError::InvalidAudioDevice(_)))));
    assert_eq!(backend.starts(), 0);
    assert_eq!(recorder.log, vec!["sweep 3", "start 0", "end 0"]);
}

#[test]
fn test_sweep_beyond_device_capacity_fails_on_that_channel() {
    let backend = RecordingBackend::new(2);
    let mut engine = PlaybackEngine::new(backend.clone());

    let result = AutomatedSweep::new(&mut engine, settings(3)).run(&mut ());

    assert!(matches!(result, Err(Error::Audio(AudioError::InvalidRouting(_)))));
    assert_eq!(
        backend.events(),
        vec![Event::Start(vec![0]), Event::Stop, Event::Start(vec![1]), Event::Stop]
    );
}

#[test]
fn test_settings_from_config() {
    let mut config = AppConfig::default();
    config.session.num_speakers = 5;
    config.session.duration_secs = 2.5;
    config.audio.device_id = DEVICE_ID.to_string();

    let settings = SweepSettings::from_config(&config).unwrap();
    assert_eq!(settings.num_speakers, 5);
    assert_eq!(settings.duration, Duration::from_millis(2500));
    assert_eq!(settings.device_id, DEVICE_ID);
    assert_eq!(settings.level_dbfs, config.session.level_dbfs);
}

#[test]
fn test_settings_reject_unrepresentable_duration() {
    let mut config = AppConfig::default();
    config.session.duration_secs = 1e30;
    assert!(matches!(SweepSettings::from_config(&config), Err(Error::Config(_))));
}

#[test]
fn test_sweep_blocks_for_each_signal() {
    let backend = RecordingBackend::realtime(4);
    let mut engine = PlaybackEngine::new(backend.clone());
    let settings = settings(3);
    let duration = settings.duration;

    let report = AutomatedSweep::new(&mut engine, settings).run(&mut ()).unwrap();

    // Block lengths go through f64 seconds, so allow for rounding
    assert!(
        report.elapsed + Duration::from_millis(1) >= duration * 3,
        "elapsed {:?}",
        report.elapsed
    );
    assert_eq!(
        backend.waits(),
        vec![duration + Duration::from_millis(SWEEP_GRACE_MS); 3]
    );
}

#[test]
fn test_sweep_stops_on_device_error_mid_channel() {
    let backend = RecordingBackend::failing_on(4, 1);
    let mut engine = PlaybackEngine::new(backend.clone());
    let mut recorder = Recorder::default();

    let result = AutomatedSweep::new(&mut engine, settings(3)).run(&mut recorder);

    assert!(matches!(result, Err(Error::Audio(AudioError::StreamError(_)))));
    assert_eq!(
        backend.events(),
        vec![Event::Start(vec![0]), Event::Stop, Event::Start(vec![1]), Event::Stop]
    );
    assert_eq!(recorder.log, vec!["sweep 3", "start 0", "end 0", "start 1", "end 1"]);
    assert_eq!(engine.state(), PlaybackState::Aborted);
}
