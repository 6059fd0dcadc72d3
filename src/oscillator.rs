use std::f64::consts::TAU;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Saw,
    Triangle,
}

impl Waveform {
    pub const VALUES: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Saw,
        Waveform::Triangle,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Waveform::Sine => "SINE",
            Waveform::Square => "SQUARE",
            Waveform::Saw => "SAW",
            Waveform::Triangle => "TRI",
        }
    }

    pub fn to_index(self) -> u8 {
        match self {
            Waveform::Sine => 0,
            Waveform::Square => 1,
            Waveform::Saw => 2,
            Waveform::Triangle => 3,
        }
    }

    /// Unknown indices fall back to sine.
    pub fn from_index(index: u8) -> Self {
        Self::VALUES
            .get(index as usize)
            .copied()
            .unwrap_or(Waveform::Sine)
    }

    /// Raw value for a phase angle in radians, `0 <= angle < 2π`.
    pub fn sample(&self, angle: f64) -> f64 {
        let phase = angle / TAU;
        match self {
            Waveform::Sine => angle.sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// Phase increment per sample, zero for non-positive or unusable input.
pub fn angle_delta(frequency: f64, sample_rate: f64) -> f64 {
    if frequency > 0.0 && sample_rate > 0.0 && frequency.is_finite() {
        TAU * frequency / sample_rate
    } else {
        0.0
    }
}

pub fn wrap_angle(angle: f64) -> f64 {
    if (0.0..TAU).contains(&angle) {
        angle
    } else {
        angle.rem_euclid(TAU)
    }
}
