//! Parameter block shared between the control thread and the audio callback.
//!
//! The control side is the only writer. The audio side reads once per block
//! and never waits: scalars are plain atomics, and values that must change
//! together go through a [`ParamGroup`].

use std::sync::atomic::{AtomicI32, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering, fence};

use crate::{
    envelope::EnvelopeParams,
    filter::{DEFAULT_CUTOFF_HZ, DEFAULT_RESONANCE},
    oscillator::Waveform,
    pitch::Tuning,
};

pub const DEFAULT_LEVEL: f32 = 0.75;

/// Lock-free group of `f32`s guarded by a sequence counter.
///
/// An odd sequence means a write is in progress. Readers that observe a
/// write in progress or a sequence change get `None` and try again later.
pub struct ParamGroup<const N: usize> {
    seq: AtomicU32,
    values: [AtomicU32; N],
}

impl<const N: usize> ParamGroup<N> {
    pub fn new(values: [f32; N]) -> Self {
        Self {
            seq: AtomicU32::new(0),
            values: values.map(|value| AtomicU32::new(value.to_bits())),
        }
    }

    /// Must only be called from the single writer thread.
    pub fn write(&self, values: [f32; N]) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        for (slot, value) in self.values.iter().zip(values) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Returns the sequence number with a consistent copy of the values.
    pub fn read(&self) -> Option<(u32, [f32; N])> {
        let before = self.seq.load(Ordering::Acquire);
        if before % 2 == 1 {
            return None;
        }
        let values = std::array::from_fn(|index| {
            f32::from_bits(self.values[index].load(Ordering::Relaxed))
        });
        fence(Ordering::Acquire);
        let after = self.seq.load(Ordering::Relaxed);
        (before == after).then_some((before, values))
    }

    pub fn version(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }
}

pub struct SynthParams {
    waveform: AtomicU8,
    frequency: AtomicU64,
    level: AtomicU32,
    root_note: AtomicI32,
    scale_index: AtomicUsize,
    transpose: AtomicI32,
    fine_tune: AtomicU32,
    pub envelope: ParamGroup<4>,
    pub filter: ParamGroup<2>,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthParams {
    pub fn new() -> Self {
        let tuning = Tuning::default();
        Self {
            waveform: AtomicU8::new(Waveform::default().to_index()),
            frequency: AtomicU64::new(0f64.to_bits()),
            level: AtomicU32::new(DEFAULT_LEVEL.to_bits()),
            root_note: AtomicI32::new(tuning.root_note),
            scale_index: AtomicUsize::new(tuning.scale_index),
            transpose: AtomicI32::new(tuning.transpose),
            fine_tune: AtomicU32::new(tuning.fine_tune.to_bits()),
            envelope: ParamGroup::new(EnvelopeParams::default().to_array()),
            filter: ParamGroup::new([DEFAULT_CUTOFF_HZ, DEFAULT_RESONANCE]),
        }
    }

    pub fn waveform(&self) -> Waveform {
        Waveform::from_index(self.waveform.load(Ordering::Relaxed))
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.waveform.store(waveform.to_index(), Ordering::Relaxed);
    }

    pub fn frequency(&self) -> f64 {
        f64::from_bits(self.frequency.load(Ordering::Relaxed))
    }

    pub fn set_frequency(&self, hz: f64) {
        self.frequency.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: f32) {
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn tuning(&self) -> Tuning {
        Tuning {
            root_note: self.root_note.load(Ordering::Relaxed),
            scale_index: self.scale_index.load(Ordering::Relaxed),
            transpose: self.transpose.load(Ordering::Relaxed),
            fine_tune: f32::from_bits(self.fine_tune.load(Ordering::Relaxed)),
        }
    }

    pub fn set_root_note(&self, root_note: i32) {
        self.root_note.store(root_note, Ordering::Relaxed);
    }

    pub fn set_scale_index(&self, index: usize) {
        self.scale_index.store(index, Ordering::Relaxed);
    }

    pub fn set_transpose(&self, semitones: i32) {
        self.transpose.store(semitones, Ordering::Relaxed);
    }

    pub fn set_fine_tune(&self, semitones: f32) {
        self.fine_tune.store(semitones.to_bits(), Ordering::Relaxed);
    }

    pub fn envelope_params(&self) -> Option<(u32, EnvelopeParams)> {
        self.envelope
            .read()
            .map(|(seq, values)| (seq, EnvelopeParams::from_array(values)))
    }

    pub fn set_envelope_params(&self, params: EnvelopeParams) {
        self.envelope.write(params.to_array());
    }

    pub fn filter_params(&self) -> Option<(u32, f32, f32)> {
        self.filter
            .read()
            .map(|(seq, [cutoff, resonance])| (seq, cutoff, resonance))
    }

    pub fn set_filter_params(&self, cutoff: f32, resonance: f32) {
        self.filter.write([cutoff, resonance]);
    }
}
