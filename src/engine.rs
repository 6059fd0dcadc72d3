use std::sync::{
    Arc,
    mpsc::{self, Receiver, SyncSender, TrySendError},
};

use log::{debug, info, warn};

use crate::{
    envelope::{EnvStage, Envelope, EnvelopeParams},
    filter::LowPassFilter,
    input::VoiceControl,
    oscillator::{Waveform, angle_delta, wrap_angle},
    params::SynthParams,
};

pub const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;
pub const DEFAULT_MAX_BLOCK: usize = 512;
const EVENT_QUEUE: usize = 64;

/// Single voice: oscillator into low-pass filter into amplitude envelope.
///
/// Owned by the audio callback. Waveform and frequency hold for a whole
/// block; phase and envelope advance every sample.
pub struct SynthEngine {
    sample_rate: f64,
    max_block_size: usize,
    waveform: Waveform,
    frequency: f64,
    angle: f64,
    filter: LowPassFilter,
    envelope: Envelope,
}

impl Default for SynthEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthEngine {
    pub fn new() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_MAX_BLOCK,
            waveform: Waveform::default(),
            frequency: 0.0,
            angle: 0.0,
            filter: LowPassFilter::new(DEFAULT_SAMPLE_RATE as f32),
            envelope: Envelope::new(DEFAULT_SAMPLE_RATE as f32),
        }
    }

    /// Resets phase, filter memory and envelope for a new stream.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        self.sample_rate = if sample_rate.is_finite() {
            sample_rate.max(1.0)
        } else {
            DEFAULT_SAMPLE_RATE
        };
        self.max_block_size = max_block_size.max(1);
        self.angle = 0.0;
        self.filter.prepare(self.sample_rate as f32);
        self.envelope.set_sample_rate(self.sample_rate as f32);
        self.envelope.reset();
        info!(
            target: "audio",
            "engine prepared: rate={} block={} cutoff={:.1} q={:.2}",
            self.sample_rate,
            self.max_block_size,
            self.filter.cutoff(),
            self.filter.resonance()
        );
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn set_frequency(&mut self, hz: f64) {
        self.frequency = if hz.is_finite() { hz } else { 0.0 };
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn set_envelope_parameters(&mut self, params: EnvelopeParams) {
        self.envelope.set_parameters(params);
    }

    pub fn envelope_parameters(&self) -> EnvelopeParams {
        self.envelope.parameters()
    }

    pub fn set_filter_parameters(&mut self, cutoff_hz: f32, resonance: f32) {
        self.filter.set_cutoff(cutoff_hz);
        self.filter.set_resonance(resonance);
    }

    pub fn filter_cutoff(&self) -> f32 {
        self.filter.cutoff()
    }

    pub fn filter_resonance(&self) -> f32 {
        self.filter.resonance()
    }

    pub fn note_on(&mut self) {
        self.envelope.note_on();
    }

    pub fn note_off(&mut self) {
        self.envelope.note_off();
    }

    pub fn is_active(&self) -> bool {
        self.envelope.is_active()
    }

    pub fn envelope_stage(&self) -> EnvStage {
        self.envelope.stage()
    }

    pub fn envelope_level(&self) -> f32 {
        self.envelope.level()
    }

    /// Renders interleaved frames, writing the same value to every channel.
    pub fn render_block(&mut self, output: &mut [f32], channels: usize) {
        if !self.envelope.is_active() {
            output.fill(0.0);
            return;
        }

        let channels = channels.max(1);
        let waveform = self.waveform;
        let delta = angle_delta(self.frequency, self.sample_rate);

        for frame in output.chunks_mut(channels) {
            let raw = if delta > 0.0 {
                self.angle = wrap_angle(self.angle + delta);
                waveform.sample(self.angle)
            } else {
                0.0
            };
            let filtered = self.filter.process(raw as f32);
            let value = filtered * self.envelope.next_sample();
            frame.fill(value);
        }
    }
}

impl VoiceControl for SynthEngine {
    fn set_frequency(&mut self, hz: f64) {
        SynthEngine::set_frequency(self, hz);
    }

    fn note_on(&mut self) {
        SynthEngine::note_on(self);
    }

    fn note_off(&mut self) {
        SynthEngine::note_off(self);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceEvent {
    NoteOn,
    NoteOff,
}

/// Control-side handle to the voice running in the audio callback.
#[derive(Clone)]
pub struct EngineHandle {
    params: Arc<SynthParams>,
    events: SyncSender<VoiceEvent>,
}

impl EngineHandle {
    pub fn new(params: Arc<SynthParams>) -> (Self, Receiver<VoiceEvent>) {
        let (events, rx) = mpsc::sync_channel(EVENT_QUEUE);
        (Self { params, events }, rx)
    }

    pub fn params(&self) -> &Arc<SynthParams> {
        &self.params
    }

    fn send(&self, event: VoiceEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(target: "controls", "voice event queue full, dropped {event:?}");
            }
            Err(TrySendError::Disconnected(event)) => {
                debug!(target: "controls", "no audio stream, dropped {event:?}");
            }
        }
    }
}

impl VoiceControl for EngineHandle {
    fn set_frequency(&mut self, hz: f64) {
        self.params.set_frequency(hz);
    }

    fn note_on(&mut self) {
        self.send(VoiceEvent::NoteOn);
    }

    fn note_off(&mut self) {
        self.send(VoiceEvent::NoteOff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn prepared(sample_rate: f64) -> SynthEngine {
        let mut engine = SynthEngine::new();
        engine.prepare(sample_rate, 512);
        engine
    }

    #[test]
    fn idle_engine_writes_silence() {
        let mut engine = prepared(44_100.0);
        engine.set_frequency(440.0);
        let mut block = [0.5f32; 64];
        engine.render_block(&mut block, 2);
        assert!(block.iter().all(|s| *s == 0.0));
        assert!(!engine.is_active());
    }

    #[test]
    fn attack_reaches_full_gain_after_ten_milliseconds() {
        let mut engine = prepared(44_100.0);
        engine.set_waveform(Waveform::Sine);
        engine.set_frequency(440.0);
        engine.set_envelope_parameters(EnvelopeParams::new(0.01, 0.1, 0.8, 0.5));
        engine.note_on();
        let mut block = vec![0.0f32; 441];
        engine.render_block(&mut block, 1);
        assert!(engine.envelope_level() > 0.999);
        assert!(block.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn channels_carry_identical_samples() {
        let mut engine = prepared(48_000.0);
        engine.set_waveform(Waveform::Saw);
        engine.set_frequency(220.0);
        engine.note_on();
        let mut block = vec![0.0f32; 256 * 2];
        engine.render_block(&mut block, 2);
        for frame in block.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn phase_is_continuous_across_blocks() {
        let render = |splits: &[usize]| {
            let mut engine = prepared(48_000.0);
            engine.set_waveform(Waveform::Triangle);
            engine.set_frequency(330.0);
            engine.note_on();
            let mut all = Vec::new();
            for len in splits {
                let mut block = vec![0.0f32; *len];
                engine.render_block(&mut block, 1);
                all.extend(block);
            }
            all
        };
        assert_eq!(render(&[256]), render(&[100, 27, 129]));
    }

    #[test]
    fn zero_frequency_keeps_release_tail_running() {
        let mut engine = prepared(1_000.0);
        engine.set_envelope_parameters(EnvelopeParams::new(0.001, 0.001, 1.0, 0.05));
        engine.set_frequency(100.0);
        engine.note_on();
        let mut block = vec![0.0f32; 20];
        engine.render_block(&mut block, 1);

        engine.set_frequency(0.0);
        engine.note_off();
        let mut tail = vec![0.0f32; 10];
        engine.render_block(&mut tail, 1);
        assert!(engine.is_active());
        assert!(tail.iter().all(|s| s.is_finite()));

        let mut rest = vec![0.0f32; 60];
        engine.render_block(&mut rest, 1);
        assert!(!engine.is_active());
    }

    #[test]
    fn oscillator_is_silent_without_frequency() {
        let mut engine = prepared(44_100.0);
        engine.set_frequency(-20.0);
        engine.note_on();
        let mut block = vec![1.0f32; 128];
        engine.render_block(&mut block, 1);
        assert!(engine.is_active());
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn filter_settings_are_clamped_by_the_engine() {
        let mut engine = prepared(44_100.0);
        engine.set_filter_parameters(1.0e6, 1.0e3);
        assert_abs_diff_eq!(engine.filter_cutoff(), 22_050.0 * 0.98);
        assert_abs_diff_eq!(engine.filter_resonance(), 18.0);
        engine.set_filter_parameters(-5.0, 0.0);
        assert_abs_diff_eq!(engine.filter_cutoff(), 20.0);
        assert_abs_diff_eq!(engine.filter_resonance(), std::f32::consts::FRAC_1_SQRT_2);
    }

    #[test]
    fn prepare_resets_running_voice() {
        let mut engine = prepared(44_100.0);
        engine.set_frequency(440.0);
        engine.note_on();
        let mut block = vec![0.0f32; 64];
        engine.render_block(&mut block, 1);
        engine.prepare(48_000.0, 256);
        assert!(!engine.is_active());
        assert_eq!(engine.max_block_size(), 256);
        engine.note_on();
        engine.set_frequency(0.0);
        engine.render_block(&mut block, 1);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn handle_forwards_events_in_order() {
        let params = Arc::new(SynthParams::new());
        let (mut handle, rx) = EngineHandle::new(params.clone());
        handle.set_frequency(523.25);
        handle.note_on();
        handle.note_off();
        assert_eq!(params.frequency(), 523.25);
        assert_eq!(rx.try_recv(), Ok(VoiceEvent::NoteOn));
        assert_eq!(rx.try_recv(), Ok(VoiceEvent::NoteOff));
        assert!(rx.try_recv().is_err());
    }
}
