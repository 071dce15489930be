//! Test signal generation

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::waveform::WaveformBuffer;
use crate::error::AudioError;

/// Seeded white Gaussian noise, DC removed and normalized to a peak of 1.0
///
/// The same seed always yields the same signal so repeated presentations to
/// different speakers are identical.
pub fn white_noise(duration_secs: f64, sample_rate: u32, seed: u64) -> Result<WaveformBuffer, AudioError> {
    let len = (duration_secs * sample_rate as f64) as usize;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut noise: Vec<f64> = Vec::with_capacity(len);
    while noise.len() < len {
        let (a, b) = gaussian_pair(&mut rng);
        noise.push(a);
        if noise.len() < len {
            noise.push(b);
        }
    }

    if !noise.is_empty() {
        let mean = noise.iter().sum::<f64>() / noise.len() as f64;
        noise.iter_mut().for_each(|s| *s -= mean);

        let peak = noise.iter().fold(0.0f64, |p, s| p.max(s.abs()));
        if peak > 0.0 {
            noise.iter_mut().for_each(|s| *s /= peak);
        }
    }

    WaveformBuffer::mono(noise.into_iter().map(|s| s as f32).collect(), sample_rate)
}

/// Box-Muller transform: two independent N(0, 1) draws
fn gaussian_pair(rng: &mut StdRng) -> (f64, f64) {
    // `1 - u` keeps the argument of ln() in (0, 1]
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    let radius = (-2.0 * u1.ln()).sqrt();
    let theta = std::f64::consts::TAU * u2;
    (radius * theta.cos(), radius * theta.sin())
}
