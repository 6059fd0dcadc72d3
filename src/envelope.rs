//! Linear attack/decay/sustain/release envelope.
//!
//! Each stage ramps at a fixed per-sample rate computed when the stage is
//! entered, so parameter updates only shape stages that start afterwards.

pub const MIN_STAGE_SECONDS: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: 0.05,
            decay: 0.1,
            sustain: 0.8,
            release: 0.5,
        }
    }
}

impl EnvelopeParams {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
        .sanitized()
    }

    pub fn sanitized(self) -> Self {
        Self {
            attack: floor_time(self.attack),
            decay: floor_time(self.decay),
            sustain: if self.sustain.is_finite() {
                self.sustain.clamp(0.0, 1.0)
            } else {
                0.0
            },
            release: floor_time(self.release),
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.attack, self.decay, self.sustain, self.release]
    }

    pub fn from_array(values: [f32; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }
}

fn floor_time(seconds: f32) -> f32 {
    if seconds.is_finite() {
        seconds.max(MIN_STAGE_SECONDS)
    } else {
        MIN_STAGE_SECONDS
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    sample_rate: f32,
    params: EnvelopeParams,
    stage: EnvStage,
    level: f32,
    rate: f32,
    sustain_level: f32,
}

impl Envelope {
    pub fn new(sample_rate: f32) -> Self {
        let params = EnvelopeParams::default();
        Self {
            sample_rate: sample_rate.max(1.0),
            params,
            stage: EnvStage::Idle,
            level: 0.0,
            rate: 0.0,
            sustain_level: params.sustain,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }

    pub fn set_parameters(&mut self, params: EnvelopeParams) {
        self.params = params.sanitized();
    }

    pub fn parameters(&self) -> EnvelopeParams {
        self.params
    }

    pub fn stage(&self) -> EnvStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvStage::Idle
    }

    /// Starts the attack from wherever the level currently is.
    pub fn note_on(&mut self) {
        self.stage = EnvStage::Attack;
        self.rate = 1.0 / self.stage_samples(self.params.attack);
    }

    pub fn note_off(&mut self) {
        if self.stage == EnvStage::Idle {
            return;
        }
        if self.level > 0.0 {
            self.stage = EnvStage::Release;
            self.rate = self.level / self.stage_samples(self.params.release);
        } else {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.stage = EnvStage::Idle;
        self.level = 0.0;
        self.rate = 0.0;
    }

    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvStage::Idle => {}
            EnvStage::Attack => {
                self.level += self.rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.enter_decay();
                }
            }
            EnvStage::Decay => {
                self.level -= self.rate;
                if self.level <= self.sustain_level {
                    self.level = self.sustain_level;
                    self.stage = EnvStage::Sustain;
                }
            }
            EnvStage::Sustain => {
                self.level = self.sustain_level;
            }
            EnvStage::Release => {
                self.level -= self.rate;
                if self.level <= 0.0 {
                    self.reset();
                }
            }
        }
        self.level
    }

    fn enter_decay(&mut self) {
        self.sustain_level = self.params.sustain;
        self.rate = (1.0 - self.sustain_level) / self.stage_samples(self.params.decay);
        self.stage = if self.rate > 0.0 {
            EnvStage::Decay
        } else {
            EnvStage::Sustain
        };
    }

    fn stage_samples(&self, seconds: f32) -> f32 {
        (seconds * self.sample_rate).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn run(env: &mut Envelope, samples: usize) -> f32 {
        let mut last = env.level();
        for _ in 0..samples {
            last = env.next_sample();
        }
        last
    }

    #[test]
    fn attack_completes_in_configured_time() {
        let mut env = Envelope::new(44_100.0);
        env.set_parameters(EnvelopeParams::new(0.01, 0.1, 0.8, 0.5));
        env.note_on();
        assert!(env.is_active());
        assert_abs_diff_eq!(env.next_sample(), 1.0 / 441.0, epsilon = 1e-6);
        let level = run(&mut env, 440);
        assert!(level > 0.999, "attack ended at {level}");
        run(&mut env, 2);
        assert_ne!(env.stage(), EnvStage::Attack);
    }

    #[test]
    fn decay_settles_on_sustain() {
        let mut env = Envelope::new(1_000.0);
        env.set_parameters(EnvelopeParams::new(0.01, 0.1, 0.5, 0.2));
        env.note_on();
        run(&mut env, 10 + 100 + 5);
        assert_eq!(env.stage(), EnvStage::Sustain);
        assert_abs_diff_eq!(env.level(), 0.5);
        assert_abs_diff_eq!(run(&mut env, 1_000), 0.5);
    }

    #[test]
    fn full_sustain_skips_decay() {
        let mut env = Envelope::new(1_000.0);
        env.set_parameters(EnvelopeParams::new(0.001, 0.5, 1.0, 0.2));
        env.note_on();
        run(&mut env, 2);
        assert_eq!(env.stage(), EnvStage::Sustain);
    }

    #[test]
    fn release_lasts_configured_time_then_idles() {
        let mut env = Envelope::new(1_000.0);
        env.set_parameters(EnvelopeParams::new(0.001, 0.001, 0.5, 0.1));
        env.note_on();
        run(&mut env, 20);
        env.note_off();
        assert_eq!(env.stage(), EnvStage::Release);
        run(&mut env, 98);
        assert!(env.is_active());
        run(&mut env, 4);
        assert!(!env.is_active());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn note_off_when_idle_is_a_no_op() {
        let mut env = Envelope::new(48_000.0);
        env.note_off();
        assert!(!env.is_active());
        assert_eq!(env.next_sample(), 0.0);
    }

    #[test]
    fn retrigger_continues_from_current_level() {
        let mut env = Envelope::new(1_000.0);
        env.set_parameters(EnvelopeParams::new(0.1, 0.1, 0.8, 1.0));
        env.note_on();
        let before = run(&mut env, 50);
        env.note_off();
        let released = env.next_sample();
        assert!(released < before);
        env.note_on();
        let after = env.next_sample();
        assert_abs_diff_eq!(after, released + 0.01, epsilon = 1e-5);
    }

    #[test]
    fn parameter_change_waits_for_next_stage() {
        let mut env = Envelope::new(1_000.0);
        env.set_parameters(EnvelopeParams::new(1.0, 0.1, 0.8, 0.1));
        env.note_on();
        env.next_sample();
        env.set_parameters(EnvelopeParams::new(0.001, 0.1, 0.8, 0.1));
        assert_abs_diff_eq!(env.next_sample(), 0.002, epsilon = 1e-6);
    }

    #[test]
    fn params_are_sanitized() {
        let params = EnvelopeParams::new(0.0, -1.0, 3.0, f32::NAN);
        assert_eq!(params.attack, MIN_STAGE_SECONDS);
        assert_eq!(params.decay, MIN_STAGE_SECONDS);
        assert_eq!(params.sustain, 1.0);
        assert_eq!(params.release, MIN_STAGE_SECONDS);
    }
}
