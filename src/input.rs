use std::collections::HashSet;

use log::{debug, warn};
use macroquad::input::KeyCode;

use crate::pitch::{Tuning, note_name};

/// Letters in scale-step order; each key is one scale degree above the last.
pub const KEY_ORDER: [(KeyCode, &str); 26] = [
    (KeyCode::Q, "Q"),
    (KeyCode::W, "W"),
    (KeyCode::E, "E"),
    (KeyCode::R, "R"),
    (KeyCode::T, "T"),
    (KeyCode::Y, "Y"),
    (KeyCode::U, "U"),
    (KeyCode::I, "I"),
    (KeyCode::O, "O"),
    (KeyCode::P, "P"),
    (KeyCode::A, "A"),
    (KeyCode::S, "S"),
    (KeyCode::D, "D"),
    (KeyCode::F, "F"),
    (KeyCode::G, "G"),
    (KeyCode::H, "H"),
    (KeyCode::J, "J"),
    (KeyCode::K, "K"),
    (KeyCode::L, "L"),
    (KeyCode::Z, "Z"),
    (KeyCode::X, "X"),
    (KeyCode::C, "C"),
    (KeyCode::V, "V"),
    (KeyCode::B, "B"),
    (KeyCode::N, "N"),
    (KeyCode::M, "M"),
];

/// `A` plays the root in the octave around middle C.
pub const REFERENCE_KEY_INDEX: i32 = 10;

pub fn key_index(key: KeyCode) -> Option<usize> {
    KEY_ORDER.iter().position(|(code, _)| *code == key)
}

pub fn key_label(key: KeyCode) -> Option<&'static str> {
    KEY_ORDER
        .iter()
        .find(|(code, _)| *code == key)
        .map(|(_, label)| *label)
}

/// Final (transposed) note a key would play, if the scale is usable.
pub fn key_note(key: KeyCode, tuning: &Tuning) -> Option<i32> {
    let index = key_index(key)? as i32;
    let base = tuning.base_note(index, REFERENCE_KEY_INDEX)?;
    Some(tuning.final_note(base))
}

/// What the voice is told to do.
pub trait VoiceControl {
    fn set_frequency(&mut self, hz: f64);
    fn note_on(&mut self);
    fn note_off(&mut self);
}

/// Physical key state as reported by the platform.
pub trait KeyState {
    fn is_down(&self, key: KeyCode) -> bool;
}

/// Snapshot of keys physically down at one instant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeldKeys(HashSet<KeyCode>);

impl HeldKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<KeyCode> for HeldKeys {
    fn from_iter<I: IntoIterator<Item = KeyCode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl KeyState for HeldKeys {
    fn is_down(&self, key: KeyCode) -> bool {
        self.0.contains(&key)
    }
}

/// Monophonic key tracking with highest-key priority and legato re-pitching.
#[derive(Debug, Default)]
pub struct InputController {
    pressed: Vec<KeyCode>,
    sounding: Option<i32>,
}

impl InputController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base note (before transpose) currently sounding.
    pub fn sounding_note(&self) -> Option<i32> {
        self.sounding
    }

    pub fn held_keys(&self) -> &[KeyCode] {
        &self.pressed
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Returns `true` when the key press changed anything.
    pub fn key_down(
        &mut self,
        key: KeyCode,
        tuning: &Tuning,
        voice: &mut impl VoiceControl,
    ) -> bool {
        if self.pressed.contains(&key) {
            return false;
        }
        let Some(index) = key_index(key) else {
            return false;
        };
        let Some(base) = tuning.base_note(index as i32, REFERENCE_KEY_INDEX) else {
            warn!(
                target: "input",
                "scale index {} is not in the catalog, forcing note off",
                tuning.scale_index
            );
            self.force_note_off(voice);
            return false;
        };

        self.pressed.push(key);
        let starting = self.sounding.is_none();
        self.sound(base, tuning, voice);
        if starting {
            voice.note_on();
        }
        debug!(
            target: "input",
            "key {:?} offset={} base={} final={} note_on={}",
            key,
            index as i32 - REFERENCE_KEY_INDEX,
            base,
            tuning.final_note(base),
            starting
        );
        true
    }

    /// Drops keys that are no longer physically down, then follows the
    /// highest held key without retriggering the envelope.
    pub fn reconcile(
        &mut self,
        keys: &impl KeyState,
        tuning: &Tuning,
        voice: &mut impl VoiceControl,
    ) {
        self.pressed.retain(|key| {
            let down = keys.is_down(*key);
            if !down {
                debug!(target: "input", "key {key:?} released");
            }
            down
        });

        match self.highest_held() {
            None => {
                if self.sounding.take().is_some() {
                    debug!(target: "input", "all keys released, note off");
                    voice.note_off();
                }
            }
            Some(index) => self.follow(index, tuning, voice, false),
        }
    }

    /// Re-pitches held keys after a tuning change.
    pub fn refresh(&mut self, tuning: &Tuning, voice: &mut impl VoiceControl) {
        match self.highest_held() {
            Some(index) => self.follow(index, tuning, voice, true),
            None => {
                if let Some(base) = self.sounding {
                    voice.set_frequency(tuning.frequency(base));
                }
            }
        }
    }

    fn follow(
        &mut self,
        index: usize,
        tuning: &Tuning,
        voice: &mut impl VoiceControl,
        always_retune: bool,
    ) {
        let Some(base) = tuning.base_note(index as i32, REFERENCE_KEY_INDEX) else {
            warn!(
                target: "input",
                "scale index {} is not in the catalog, forcing note off",
                tuning.scale_index
            );
            self.force_note_off(voice);
            return;
        };
        if !always_retune && self.sounding == Some(base) {
            return;
        }
        let starting = self.sounding.is_none();
        self.sound(base, tuning, voice);
        if starting {
            voice.note_on();
        }
    }

    fn highest_held(&self) -> Option<usize> {
        self.pressed.iter().filter_map(|key| key_index(*key)).max()
    }

    fn sound(&mut self, base: i32, tuning: &Tuning, voice: &mut impl VoiceControl) {
        self.sounding = Some(base);
        let hz = tuning.frequency(base);
        voice.set_frequency(hz);
        debug!(
            target: "input",
            "sounding {} ({:.2} Hz)",
            note_name(tuning.final_note(base)),
            hz
        );
    }

    fn force_note_off(&mut self, voice: &mut impl VoiceControl) {
        if self.sounding.take().is_some() {
            voice.note_off();
        }
    }
}
