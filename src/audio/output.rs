//! Audio output to a device
//!
//! The playback engine never touches cpal directly. It hands a [`RoutedBlock`]
//! to an [`OutputBackend`] and gets back an [`OutputSession`] it can wait on or
//! stop. [`CpalOutput`] runs the stream on its own thread, so output proceeds
//! independently of the caller once started.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, select, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::{get_device_by_id, OutputDeviceInfo};
use crate::audio::routing::RoutingSpec;
use crate::audio::waveform::WaveformBuffer;
use crate::constants::OUTPUT_POLL_INTERVAL_MS;
use crate::error::AudioError;

/// Interleaved samples in the device's channel layout
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedBlock {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    outputs: Vec<usize>,
}

impl RoutedBlock {
    /// Place each waveform channel on its routed output; other outputs stay silent
    ///
    /// `routing` must already be validated against `device_channels`.
    pub(crate) fn route(waveform: &WaveformBuffer, routing: &RoutingSpec, device_channels: u16) -> Self {
        let in_channels = waveform.channels() as usize;
        let out_channels = device_channels as usize;
        let outputs: Vec<usize> = routing.output_indices().collect();

        let mut samples = vec![0.0f32; waveform.frames() * out_channels];
        for (frame_idx, frame) in waveform.samples().chunks_exact(in_channels).enumerate() {
            let base = frame_idx * out_channels;
            for (src, &dst) in outputs.iter().enumerate() {
                samples[base + dst] = frame[src];
            }
        }

        Self {
            samples,
            channels: device_channels,
            sample_rate: waveform.sample_rate(),
            outputs,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Zero-based outputs carrying signal, in waveform channel order
    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Device access used by the playback engine
pub trait OutputBackend {
    /// Resolve a device ID; anything unresolvable is `InvalidAudioDevice`
    fn output_device(&self, device_id: &str) -> Result<OutputDeviceInfo, AudioError>;

    /// Begin asynchronous output of `block`
    fn start(&self, device: &OutputDeviceInfo, block: RoutedBlock) -> Result<Box<dyn OutputSession>, AudioError>;
}

/// One in-flight output
pub trait OutputSession: Send {
    /// All samples have been handed to the device
    fn is_finished(&self) -> bool;

    /// Block until finished or `timeout` elapses; returns whether it finished
    ///
    /// A device error raised while playing ends the wait with that error.
    fn wait(&mut self, timeout: Duration) -> Result<bool, AudioError>;

    /// Halt output; returns once the device is silent
    fn stop(&mut self);
}

/// A cpal output stream owned by a dedicated thread
pub struct CpalOutput {
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    error_rx: Receiver<AudioError>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open `device_id` and start playing `block`
    ///
    /// Returns after the stream is running, or with the error that kept it
    /// from starting.
    pub fn start(device_id: &str, block: RoutedBlock) -> Result<Self, AudioError> {
        let device = get_device_by_id(device_id)?;

        let config = StreamConfig {
            channels: block.channels(),
            sample_rate: cpal::SampleRate(block.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = Arc::new(AtomicBool::new(true));
        let finished = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded::<()>(1);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running_for_cb = running.clone();
        let running_for_loop = running.clone();
        let finished_for_cb = finished.clone();
        let finished_for_loop = finished.clone();
        let samples = block.samples;
        let total = samples.len();

        let handle = thread::Builder::new()
            .name("speaker-output".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();
                let mut position = 0usize;

                let stream = cpal_device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if !running_for_cb.load(Ordering::Relaxed) {
                            data.fill(0.0);
                            return;
                        }

                        let remaining = &samples[position.min(total)..];
                        let n = remaining.len().min(data.len());
                        data[..n].copy_from_slice(&remaining[..n]);
                        data[n..].fill(0.0);
                        position += n;

                        if position >= total && !finished_for_cb.swap(true, Ordering::SeqCst) {
                            let _ = done_tx.try_send(());
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                let poll = Duration::from_millis(OUTPUT_POLL_INTERVAL_MS);
                while running_for_loop.load(Ordering::Relaxed) && !finished_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(poll);
                }
                // Let the last callback's buffer reach the speaker
                if running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(poll);
                }
                // Stream is dropped here, stopping output
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("output thread exited".to_string())));
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        tracing::debug!("Output stream started on {}", device_id);

        Ok(Self {
            running,
            finished,
            done_rx,
            error_rx,
            thread_handle: Some(handle),
        })
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

impl OutputSession for CpalOutput {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn wait(&mut self, timeout: Duration) -> Result<bool, AudioError> {
        if let Some(e) = self.check_errors() {
            return Err(e);
        }
        if self.is_finished() {
            return Ok(true);
        }
        select! {
            recv(self.done_rx) -> _ => {}
            recv(self.error_rx) -> err => {
                if let Ok(e) = err {
                    return Err(e);
                }
            }
            default(timeout) => {}
        }
        match self.check_errors() {
            Some(e) => Err(e),
            None => Ok(self.is_finished()),
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
