use std::f64::consts::PI;

pub const MIN_CUTOFF_HZ: f32 = 20.0;
/// Fraction of Nyquist the cutoff may reach.
pub const MAX_CUTOFF_RATIO: f32 = 0.98;
pub const MIN_RESONANCE: f32 = std::f32::consts::FRAC_1_SQRT_2;
pub const MAX_RESONANCE: f32 = 18.0;

pub const DEFAULT_CUTOFF_HZ: f32 = 10_000.0;
pub const DEFAULT_RESONANCE: f32 = MIN_RESONANCE;

/// Two-pole state-variable low-pass (topology-preserving transform).
///
/// Cutoff and resonance are clamped whenever they are set, which keeps
/// `g` finite and the damping positive.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    sample_rate: f32,
    cutoff_hz: f32,
    resonance: f32,
    g: f32,
    damping: f32,
    h: f32,
    s1: f32,
    s2: f32,
}

impl LowPassFilter {
    pub fn new(sample_rate: f32) -> Self {
        let mut filter = Self {
            sample_rate: sample_rate.max(1.0),
            cutoff_hz: DEFAULT_CUTOFF_HZ,
            resonance: DEFAULT_RESONANCE,
            g: 0.0,
            damping: 0.0,
            h: 0.0,
            s1: 0.0,
            s2: 0.0,
        };
        filter.cutoff_hz = filter.clamp_cutoff(DEFAULT_CUTOFF_HZ);
        filter.update_coefficients();
        filter
    }

    /// Changes the rate and re-clamps the cutoff against the new Nyquist.
    pub fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
        self.cutoff_hz = self.clamp_cutoff(self.cutoff_hz);
        self.update_coefficients();
        self.reset();
    }

    pub fn max_cutoff(&self) -> f32 {
        self.sample_rate * 0.5 * MAX_CUTOFF_RATIO
    }

    pub fn set_cutoff(&mut self, hz: f32) {
        self.cutoff_hz = self.clamp_cutoff(hz);
        self.update_coefficients();
    }

    pub fn set_resonance(&mut self, q: f32) {
        self.resonance = if q.is_finite() {
            q.clamp(MIN_RESONANCE, MAX_RESONANCE)
        } else {
            MIN_RESONANCE
        };
        self.update_coefficients();
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff_hz
    }

    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let high = self.h * (input - self.s1 * (self.g + self.damping) - self.s2);
        let band = high * self.g + self.s1;
        self.s1 = high * self.g + band;
        let low = band * self.g + self.s2;
        self.s2 = band * self.g + low;
        low
    }

    fn clamp_cutoff(&self, hz: f32) -> f32 {
        if hz.is_finite() {
            hz.clamp(MIN_CUTOFF_HZ, self.max_cutoff().max(MIN_CUTOFF_HZ))
        } else {
            self.max_cutoff()
        }
    }

    fn update_coefficients(&mut self) {
        let g = (PI * self.cutoff_hz as f64 / self.sample_rate as f64).tan();
        let damping = 1.0 / self.resonance as f64;
        self.g = g as f32;
        self.damping = damping as f32;
        self.h = (1.0 / (1.0 + damping * g + g * g)) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine_gain(filter: &mut LowPassFilter, frequency: f32, sample_rate: f32) -> f32 {
        filter.reset();
        let step = std::f32::consts::TAU * frequency / sample_rate;
        let mut peak: f32 = 0.0;
        for n in 0..(sample_rate as usize / 2) {
            let out = filter.process((step * n as f32).sin());
            if n > sample_rate as usize / 4 {
                peak = peak.max(out.abs());
            }
        }
        peak
    }

    #[test]
    fn dc_passes() {
        let mut filter = LowPassFilter::new(48_000.0);
        filter.set_cutoff(1_000.0);
        let mut out = 0.0;
        for _ in 0..2_000 {
            out = filter.process(1.0);
        }
        assert_relative_eq!(out, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn butterworth_corner_is_minus_three_db() {
        let mut filter = LowPassFilter::new(48_000.0);
        filter.set_cutoff(1_000.0);
        filter.set_resonance(MIN_RESONANCE);
        let gain = sine_gain(&mut filter, 1_000.0, 48_000.0);
        assert_relative_eq!(gain, std::f32::consts::FRAC_1_SQRT_2, epsilon = 0.02);
        let above = sine_gain(&mut filter, 8_000.0, 48_000.0);
        assert!(above < 0.05, "stopband gain {above}");
    }

    #[test]
    fn resonance_peaks_at_cutoff() {
        let mut filter = LowPassFilter::new(48_000.0);
        filter.set_cutoff(1_000.0);
        filter.set_resonance(4.0);
        let gain = sine_gain(&mut filter, 1_000.0, 48_000.0);
        assert_relative_eq!(gain, 4.0, epsilon = 0.2);
    }

    #[test]
    fn settings_are_clamped_at_set_time() {
        let mut filter = LowPassFilter::new(44_100.0);
        filter.set_cutoff(30_000.0);
        assert_relative_eq!(filter.cutoff(), 22_050.0 * 0.98);
        filter.set_cutoff(1.0);
        assert_eq!(filter.cutoff(), MIN_CUTOFF_HZ);
        filter.set_resonance(100.0);
        assert_eq!(filter.resonance(), MAX_RESONANCE);
        filter.set_resonance(0.1);
        assert_eq!(filter.resonance(), MIN_RESONANCE);
        filter.set_cutoff(f32::NAN);
        assert!(filter.cutoff().is_finite());
    }

    #[test]
    fn legal_values_read_back_unchanged() {
        let mut filter = LowPassFilter::new(44_100.0);
        filter.set_cutoff(2_500.0);
        filter.set_resonance(2.0);
        assert_eq!(filter.cutoff(), 2_500.0);
        assert_eq!(filter.resonance(), 2.0);
    }

    #[test]
    fn stable_at_extremes() {
        let mut filter = LowPassFilter::new(44_100.0);
        filter.set_cutoff(f32::MAX);
        filter.set_resonance(MAX_RESONANCE);
        let mut sign = 1.0;
        for _ in 0..44_100 {
            sign = -sign;
            let out = filter.process(sign);
            assert!(out.is_finite());
            assert!(out.abs() < 100.0);
        }
    }

    #[test]
    fn prepare_reclamps_and_clears_state() {
        let mut filter = LowPassFilter::new(96_000.0);
        filter.set_cutoff(40_000.0);
        for _ in 0..100 {
            filter.process(1.0);
        }
        filter.prepare(44_100.0);
        assert_relative_eq!(filter.cutoff(), 22_050.0 * 0.98);
        assert_eq!(filter.process(0.0), 0.0);
    }
}
