//! Key-to-pitch mapping.
//!
//! A key's position in the letter layout is read as a scale step away from the
//! reference key. Seven steps make an octave, so the mapping only needs the
//! seven semitone intervals of the selected scale and the root pitch class.

pub const MIDI_MIN: i32 = 0;
pub const MIDI_MAX: i32 = 127;
pub const TRANSPOSE_RANGE: i32 = 24;
pub const FINE_TUNE_RANGE: f32 = 1.0;
pub const DEGREES: usize = 7;

const MIDDLE_C: i32 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scale {
    pub name: &'static str,
    pub intervals: [i32; DEGREES],
}

pub const SCALES: [Scale; 7] = [
    Scale {
        name: "Major",
        intervals: [0, 2, 4, 5, 7, 9, 11],
    },
    Scale {
        name: "Natural Minor",
        intervals: [0, 2, 3, 5, 7, 8, 10],
    },
    Scale {
        name: "Dorian",
        intervals: [0, 2, 3, 5, 7, 9, 10],
    },
    Scale {
        name: "Phrygian",
        intervals: [0, 1, 3, 5, 7, 8, 10],
    },
    Scale {
        name: "Lydian",
        intervals: [0, 2, 4, 6, 7, 9, 11],
    },
    Scale {
        name: "Mixolydian",
        intervals: [0, 2, 4, 5, 7, 9, 10],
    },
    Scale {
        name: "Locrian",
        intervals: [0, 1, 3, 5, 6, 8, 10],
    },
];

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub fn scale(index: usize) -> Option<&'static Scale> {
    SCALES.get(index)
}

/// Snapshot of the tuning controls taken when a pitch is computed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tuning {
    pub root_note: i32,
    pub scale_index: usize,
    pub transpose: i32,
    pub fine_tune: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            root_note: 0,
            scale_index: 0,
            transpose: 0,
            fine_tune: 0.0,
        }
    }
}

impl Tuning {
    /// Base note for a key, or `None` when the scale selection is unusable.
    pub fn base_note(&self, key_index: i32, reference_key_index: i32) -> Option<i32> {
        let scale = scale(self.scale_index)?;
        Some(map_key_to_note(
            key_index,
            self.root_note,
            &scale.intervals,
            reference_key_index,
        ))
    }

    pub fn final_note(&self, base_note: i32) -> i32 {
        apply_transpose(base_note, self.transpose)
    }

    pub fn frequency(&self, base_note: i32) -> f64 {
        apply_fine_tune(midi_to_frequency(self.final_note(base_note)), self.fine_tune)
    }
}

/// The root pitch class placed in the octave closest to middle C.
pub fn reference_midi_note(root_note: i32) -> i32 {
    let octaves = ((MIDDLE_C - root_note) as f64 / 12.0).round() as i32;
    12 * octaves + root_note
}

pub fn map_key_to_note(
    key_index: i32,
    root_note: i32,
    intervals: &[i32; DEGREES],
    reference_key_index: i32,
) -> i32 {
    let offset = key_index - reference_key_index;
    let octave_shift = offset.div_euclid(DEGREES as i32);
    let degree = offset.rem_euclid(DEGREES as i32) as usize;
    let note = reference_midi_note(root_note) + 12 * octave_shift + intervals[degree];
    note.clamp(MIDI_MIN, MIDI_MAX)
}

pub fn apply_transpose(base_note: i32, transpose: i32) -> i32 {
    base_note.saturating_add(transpose).clamp(MIDI_MIN, MIDI_MAX)
}

/// Equal temperament, A4 (69) = 440 Hz.
pub fn midi_to_frequency(note: i32) -> f64 {
    440.0 * 2f64.powf((note as f64 - 69.0) / 12.0)
}

pub fn apply_fine_tune(frequency: f64, semitones: f32) -> f64 {
    frequency * 2f64.powf(semitones as f64 / 12.0)
}

pub fn note_name(note: i32) -> String {
    let pitch_class = note.rem_euclid(12) as usize;
    let octave = note.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[pitch_class], octave)
}
