//! Speaker Balancer command-line controller
//!
//! ```text
//! balancer [--config <path>] devices
//! balancer [--config <path>] play <speaker>
//! balancer [--config <path>] balance
//! balancer [--config <path>] sweep
//! balancer [--config <path>] calibrate
//! balancer [--config <path>] level <desired dB SPL>
//! ```
//!
//! Speakers are numbered from 1 on the command line.

use anyhow::{anyhow, bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use speaker_balancer::{
    audio::{list_devices, white_noise, AudioSource, PlaybackEngine, RoutingSpec},
    calibration::{create_shared_store, CalibrationEngine, CalibrationSession, OffsetStore, ReferenceChannel},
    config::AppConfig,
    constants::{NOISE_SEED, SWEEP_GRACE_MS},
    error::{AudioError, CalibrationError},
    export::OffsetExporter,
    sweep::{AutomatedSweep, SweepObserver, SweepReport, SweepSettings},
    Error,
};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(pos) => {
            let path = args
                .get(pos + 1)
                .cloned()
                .ok_or_else(|| anyhow!("--config needs a path"))?;
            args.remove(pos + 1);
            args.remove(pos);
            PathBuf::from(path)
        }
        None => AppConfig::default_path().ok_or_else(|| anyhow!("no config directory on this system"))?,
    };

    let config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;

    match args.first().map(String::as_str) {
        Some("devices") => show_devices(),
        Some("play") => {
            let speaker = parse_speaker(args.get(1), config.session.num_speakers)?;
            play_speaker(&config, speaker)
        }
        Some("balance") => balance(&config),
        Some("sweep") => sweep(&config),
        Some("calibrate") => calibrate(config, &config_path),
        Some("level") => {
            let desired: f64 = args
                .get(1)
                .ok_or_else(|| anyhow!("level needs a desired dB SPL"))?
                .parse()
                .context("desired level must be a number")?;
            show_level(&config, desired)
        }
        _ => {
            eprintln!("usage: balancer [--config <path>] <devices|play <speaker>|balance|sweep|calibrate|level <dB SPL>>");
            Ok(())
        }
    }
}

fn show_devices() -> Result<()> {
    println!("\n=== Available Output Devices ===");
    for device in list_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {}", device.max_channels);
    }
    println!();
    Ok(())
}

fn parse_speaker(arg: Option<&String>, num_speakers: u16) -> Result<u16> {
    let speaker: u16 = arg
        .ok_or_else(|| anyhow!("missing speaker number"))?
        .parse()
        .context("speaker must be a number")?;
    if speaker == 0 || speaker > num_speakers {
        bail!("speaker must be between 1 and {}", num_speakers);
    }
    Ok(speaker - 1)
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Turn an error into the guidance an operator needs
fn explain(error: &Error) -> String {
    match error {
        Error::Audio(AudioError::InvalidAudioDevice(_)) => {
            "Invalid audio device! Run `balancer devices` and set audio.device_id in the config.".to_string()
        }
        Error::Audio(AudioError::InvalidRouting(_)) => {
            "Speaker routing must correspond with the number of channels in the audio file! Update audio.channel_routing in the config.".to_string()
        }
        Error::Audio(AudioError::Clipping { .. }) => {
            "The level is too high and caused clipping. Lower the level and try again.".to_string()
        }
        Error::Audio(AudioError::InvalidAudioType(_)) => {
            "The audio type is invalid! Please provide a WAV file.".to_string()
        }
        Error::Audio(AudioError::MissingSamplingRate) => "No sampling rate was provided!".to_string(),
        Error::Audio(AudioError::StreamError(_)) => {
            "The audio device stopped responding. Check the connection and try again.".to_string()
        }
        Error::Calibration(CalibrationError::ReferenceNotEstablished { reference, .. }) => format!(
            "You must start with speaker {} to create a reference level!",
            reference + 1
        ),
        Error::Export(_) => "Data not saved! Cannot write to file!".to_string(),
        other => other.to_string(),
    }
}

fn noise_engine(config: &AppConfig) -> Result<PlaybackEngine> {
    let mut engine = PlaybackEngine::cpal();
    let noise = white_noise(config.session.duration_secs, config.audio.sample_rate, NOISE_SEED)?;
    engine.load(noise, None)?;
    Ok(engine)
}

fn play_speaker(config: &AppConfig, speaker: u16) -> Result<()> {
    let mut engine = noise_engine(config)?;
    let result = engine.play(
        config.session.level_dbfs,
        &config.audio.device_id,
        &RoutingSpec::single(speaker),
    );
    if let Err(e) = result {
        let e = Error::from(e);
        bail!("{} ({})", explain(&e), e);
    }
    let limit = config.session.duration()? + Duration::from_millis(SWEEP_GRACE_MS);
    if let Err(e) = engine.wait(limit) {
        let e = Error::from(e);
        bail!("{} ({})", explain(&e), e);
    }
    engine.stop();
    Ok(())
}

/// Speakers in the order they must be balanced
fn balance_order(config: &AppConfig) -> Vec<u16> {
    let mut order: Vec<u16> = (0..config.session.num_speakers).collect();
    if let ReferenceChannel::Fixed(reference) = config.session.reference_channel {
        order.retain(|&ch| ch != reference);
        order.insert(0, reference);
    }
    order
}

fn balance(config: &AppConfig) -> Result<()> {
    let store = create_shared_store(OffsetStore::with_channels(config.session.num_speakers));
    let mut calibration = CalibrationEngine::new(store.clone(), config.session.reference_channel);
    let mut engine = noise_engine(config)?;

    for channel in balance_order(config) {
        loop {
            if let Err(e) = engine.play(
                config.session.level_dbfs,
                &config.audio.device_id,
                &RoutingSpec::single(channel),
            ) {
                let e = Error::from(e);
                bail!("{} ({})", explain(&e), e);
            }

            let answer = prompt(&format!(
                "Speaker {}: SLM reading in dB SPL (blank to skip, r to replay): ",
                channel + 1
            ))?;
            engine.stop();

            if answer.eq_ignore_ascii_case("r") {
                continue;
            }
            if answer.is_empty() {
                break;
            }
            let reading: f64 = match answer.parse() {
                Ok(reading) => reading,
                Err(_) => {
                    println!("'{}' is not a number", answer);
                    continue;
                }
            };
            match calibration.calculate_offset(channel, reading) {
                Ok(offset) => {
                    println!("  offset {:+.2} dB", offset);
                    break;
                }
                Err(e) => {
                    println!("  {}", explain(&Error::from(e)));
                    break;
                }
            }
        }
    }

    let (records, missing) = {
        let store = store.read();
        (store.get_all(), store.missing_offsets())
    };

    println!("\nChannel  Offset");
    for (channel, offset) in &records {
        match offset {
            Some(offset) => println!("{:>7}  {:+.2}", channel + 1, offset),
            None => println!("{:>7}  -", channel + 1),
        }
    }

    if !missing.is_empty() {
        let missing: Vec<String> = missing.iter().map(|ch| (ch + 1).to_string()).collect();
        let answer = prompt(&format!(
            "Speakers with missing offsets: {}. Proceed with saving? [y/N] ",
            missing.join(", ")
        ))?;
        if !answer.eq_ignore_ascii_case("y") {
            return Ok(());
        }
    }

    let exporter = OffsetExporter::new(config.export.directory());
    match exporter.save(&records) {
        Ok(path) => println!("Saved {}", path.display()),
        Err(e) => {
            let e = Error::from(e);
            bail!("{} ({})", explain(&e), e);
        }
    }
    Ok(())
}

struct ConsoleProgress;

impl SweepObserver for ConsoleProgress {
    fn on_channel_start(&mut self, channel: u16) {
        println!("Speaker {}: playing", channel + 1);
    }

    fn on_sweep_end(&mut self, report: &SweepReport) {
        println!(
            "Sweep done: {} speakers in {:.1} s",
            report.channels_played.len(),
            report.elapsed.as_secs_f64()
        );
    }
}

fn sweep(config: &AppConfig) -> Result<()> {
    let mut engine = PlaybackEngine::cpal();
    let mut sweep = AutomatedSweep::new(&mut engine, SweepSettings::from_config(config)?);
    if let Err(e) = sweep.run(&mut ConsoleProgress) {
        bail!("{} ({})", explain(&e), e);
    }
    Ok(())
}

fn calibrate(mut config: AppConfig, config_path: &Path) -> Result<()> {
    let cal_file = config
        .calibration
        .cal_file
        .clone()
        .ok_or_else(|| anyhow!("Cannot find a calibration file! Set calibration.cal_file in the config."))?;

    let mut engine = PlaybackEngine::cpal();
    engine
        .load(AudioSource::File(cal_file), None)
        .map_err(|e| {
            let e = Error::from(e);
            anyhow!("{} ({})", explain(&e), e)
        })?;

    let channels = engine.loaded().map(|w| w.channels()).unwrap_or(1);
    let routing = if channels == 1 {
        config.audio.routing()?
    } else {
        RoutingSpec::new((1..=i64::from(channels)).collect())
    };

    if let Err(e) = engine.play(config.calibration.cal_level_dbfs, &config.audio.device_id, &routing) {
        let e = Error::from(e);
        bail!("{} ({})", explain(&e), e);
    }

    let mut session = CalibrationSession::new(config.calibration.nominal_cal_spl);
    let answer = prompt("SLM reading of the calibration signal in dB SPL: ")?;
    engine.stop();
    let reading: f64 = answer.parse().context("reading must be a number")?;
    let offset = session.record_reading(reading)?;

    config.calibration.slm_offset = Some(offset);
    config.save(config_path)?;
    println!("Offset {:+.2} dB saved to {}", offset, config_path.display());
    Ok(())
}

fn show_level(config: &AppConfig, desired_spl: f64) -> Result<()> {
    let offset = config
        .calibration
        .slm_offset
        .ok_or_else(|| anyhow!("No calibration offset yet; run `balancer calibrate` first."))?;
    let mut session = CalibrationSession::with_offset(config.calibration.nominal_cal_spl, offset);
    let level = session.level_for(desired_spl)?;
    println!("{:.1} dB SPL -> {:.2} dB FS", desired_spl, level);
    Ok(())
}
