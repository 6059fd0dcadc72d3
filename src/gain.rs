pub const LEVEL_RAMP_SECONDS: f64 = 0.02;

/// Master level with a linear ramp toward each new target.
#[derive(Debug, Clone)]
pub struct SmoothedGain {
    current: f32,
    target: f32,
    step: f32,
    countdown: usize,
    ramp_samples: usize,
}

impl SmoothedGain {
    pub fn new(initial: f32) -> Self {
        let level = clamp_level(initial);
        Self {
            current: level,
            target: level,
            step: 0.0,
            countdown: 0,
            ramp_samples: 0,
        }
    }

    /// Sets the ramp length and jumps straight to the target.
    pub fn reset(&mut self, sample_rate: f64, ramp_seconds: f64) {
        self.ramp_samples = (sample_rate * ramp_seconds).floor().max(0.0) as usize;
        self.current = self.target;
        self.countdown = 0;
    }

    pub fn set_target(&mut self, level: f32) {
        let level = clamp_level(level);
        if level == self.target {
            return;
        }
        self.target = level;
        if self.ramp_samples == 0 {
            self.current = level;
            self.countdown = 0;
            return;
        }
        self.countdown = self.ramp_samples;
        self.step = (self.target - self.current) / self.countdown as f32;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_smoothing(&self) -> bool {
        self.countdown > 0
    }

    pub fn next_value(&mut self) -> f32 {
        if self.countdown == 0 {
            return self.target;
        }
        self.countdown -= 1;
        self.current = if self.countdown == 0 {
            self.target
        } else {
            self.current + self.step
        };
        self.current
    }
}

fn clamp_level(level: f32) -> f32 {
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
