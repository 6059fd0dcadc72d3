use std::sync::{Mutex, TryLockError};

use rustfft::{FftPlanner, num_complex::Complex};

pub const SCOPE_CAPACITY: usize = 512;

struct ScopeFrame {
    samples: [f32; SCOPE_CAPACITY],
    frequency: f32,
}

/// Latest rendered block, kept for the waveform display.
///
/// The audio side only ever `try_lock`s: when the display is mid-copy the
/// block is skipped instead of waiting.
pub struct Scope {
    frame: Mutex<ScopeFrame>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(ScopeFrame {
                samples: [0.0; SCOPE_CAPACITY],
                frequency: 0.0,
            }),
        }
    }

    /// Returns `false` when the block was skipped.
    pub fn publish_samples(&self, samples: &[f32], frequency: f32) -> bool {
        let mut frame = match self.frame.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        let count = samples.len().min(SCOPE_CAPACITY);
        frame.samples[..count].copy_from_slice(&samples[..count]);
        frame.samples[count..].fill(0.0);
        frame.frequency = frequency;
        true
    }

    pub fn snapshot(&self) -> (Vec<f32>, f32) {
        let frame = self
            .frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (frame.samples.to_vec(), frame.frequency)
    }
}

pub fn compute_spectrum(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let size = samples.len().next_power_of_two().max(8);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(size);
    let mut buffer = vec![Complex::new(0.0, 0.0); size];
    for (slot, value) in buffer.iter_mut().zip(samples) {
        slot.re = *value;
    }
    fft.process(&mut buffer);
    buffer[..size / 2]
        .iter()
        .map(|c| c.norm() / size as f32)
        .collect()
}
