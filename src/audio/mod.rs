//! Audio subsystem module

pub mod device;
pub mod output;
pub mod playback;
pub mod routing;
pub mod signal;
pub mod waveform;

pub use device::{get_device_by_id, list_devices, AudioDevice, CpalBackend, OutputDeviceInfo};
pub use output::{CpalOutput, OutputBackend, OutputSession, RoutedBlock};
pub use playback::{db_to_gain, PlaybackEngine, PlaybackSession, PlaybackState};
pub use routing::RoutingSpec;
pub use signal::white_noise;
pub use waveform::{AudioSource, WaveformBuffer};
