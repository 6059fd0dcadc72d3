use std::sync::{Arc, Mutex, mpsc};

use log::{debug, info, warn};
use macroquad::input::KeyCode;
use tokio::runtime::Runtime;

use crate::{
    envelope::EnvelopeParams,
    input::{HeldKeys, InputController, VoiceControl},
    oscillator::Waveform,
    params::SynthParams,
    pitch::{FINE_TUNE_RANGE, NOTE_NAMES, TRANSPOSE_RANGE, note_name, scale},
};

#[derive(Debug)]
pub enum ControlCommand {
    SetWaveform(Waveform),
    SetLevel(f32),
    SetFineTune(f32),
    SetTranspose(i32),
    SetEnvelope(EnvelopeParams),
    SetFilter { cutoff: f32, resonance: f32 },
    SetRootNote(i32),
    SetScale(usize),
    KeyDown(KeyCode),
    KeysChanged(HeldKeys),
}

/// What the window shows about the voice.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControllerStatus {
    pub base_note: Option<i32>,
    pub final_note: Option<i32>,
    pub frequency: f64,
    pub held: Vec<KeyCode>,
}

/// Applies control changes to the shared parameters and the voice.
pub struct Controller<V> {
    params: Arc<SynthParams>,
    voice: V,
    input: InputController,
}

impl<V: VoiceControl> Controller<V> {
    pub fn new(params: Arc<SynthParams>, voice: V) -> Self {
        Self {
            params,
            voice,
            input: InputController::new(),
        }
    }

    pub fn params(&self) -> &Arc<SynthParams> {
        &self.params
    }

    pub fn dispatch(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SetWaveform(waveform) => {
                debug!(target: "controls", "waveform {}", waveform.label());
                self.params.set_waveform(waveform);
            }
            ControlCommand::SetLevel(level) => {
                if !level.is_finite() {
                    warn!(target: "controls", "ignoring level {level}");
                    return;
                }
                self.params.set_level(level.clamp(0.0, 1.0));
            }
            ControlCommand::SetFineTune(semitones) => {
                if !semitones.is_finite() {
                    warn!(target: "controls", "ignoring fine tune {semitones}");
                    return;
                }
                self.params
                    .set_fine_tune(semitones.clamp(-FINE_TUNE_RANGE, FINE_TUNE_RANGE));
                self.repitch();
            }
            ControlCommand::SetTranspose(semitones) => {
                self.params
                    .set_transpose(semitones.clamp(-TRANSPOSE_RANGE, TRANSPOSE_RANGE));
                self.repitch();
            }
            ControlCommand::SetEnvelope(envelope) => {
                self.params.set_envelope_params(envelope.sanitized());
            }
            ControlCommand::SetFilter { cutoff, resonance } => {
                self.params.set_filter_params(cutoff, resonance);
            }
            ControlCommand::SetRootNote(root) => {
                if !(0..NOTE_NAMES.len() as i32).contains(&root) {
                    warn!(target: "controls", "root note {root} out of range, keeping current");
                    return;
                }
                info!(target: "controls", "root {}", NOTE_NAMES[root as usize]);
                self.params.set_root_note(root);
                self.repitch();
            }
            ControlCommand::SetScale(index) => {
                let Some(selected) = scale(index) else {
                    warn!(target: "controls", "scale index {index} not in catalog, keeping current");
                    return;
                };
                info!(target: "controls", "scale {}", selected.name);
                self.params.set_scale_index(index);
                self.repitch();
            }
            ControlCommand::KeyDown(key) => {
                let tuning = self.params.tuning();
                self.input.key_down(key, &tuning, &mut self.voice);
            }
            ControlCommand::KeysChanged(held) => {
                let tuning = self.params.tuning();
                self.input.reconcile(&held, &tuning, &mut self.voice);
            }
        }
    }

    pub fn status(&self) -> ControllerStatus {
        let tuning = self.params.tuning();
        let base_note = self.input.sounding_note();
        ControllerStatus {
            base_note,
            final_note: base_note.map(|base| tuning.final_note(base)),
            frequency: base_note.map_or(0.0, |base| tuning.frequency(base)),
            held: self.input.held_keys().to_vec(),
        }
    }

    fn repitch(&mut self) {
        let tuning = self.params.tuning();
        self.input.refresh(&tuning, &mut self.voice);
        if let Some(base) = self.input.sounding_note() {
            debug!(
                target: "controls",
                "re-pitched to {}",
                note_name(tuning.final_note(base))
            );
        }
    }
}

pub type ControllerHandle = (Arc<Mutex<ControllerStatus>>, mpsc::Sender<ControlCommand>);

pub fn spawn_controller<V>(runtime: &Runtime, mut controller: Controller<V>) -> ControllerHandle
where
    V: VoiceControl + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let status = Arc::new(Mutex::new(controller.status()));
    let thread_status = status.clone();

    runtime.spawn_blocking(move || {
        while let Ok(command) = rx.recv() {
            controller.dispatch(command);
            let snapshot = controller.status();
            let mut guard = thread_status
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = snapshot;
        }
        debug!(target: "controls", "control channel closed");
    });

    (status, tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{EngineHandle, VoiceEvent},
        pitch::midi_to_frequency,
    };
    use approx::assert_relative_eq;
    use std::{
        sync::mpsc::Receiver,
        time::{Duration, Instant},
    };

    fn controller() -> (Controller<EngineHandle>, Receiver<VoiceEvent>) {
        let params = Arc::new(SynthParams::new());
        let (handle, events) = EngineHandle::new(params.clone());
        (Controller::new(params, handle), events)
    }

    fn drain(events: &Receiver<VoiceEvent>) -> Vec<VoiceEvent> {
        events.try_iter().collect()
    }

    #[test]
    fn transpose_is_clamped_and_repitches_without_retrigger() {
        let (mut controller, events) = controller();
        controller.dispatch(ControlCommand::KeyDown(KeyCode::A));
        assert_relative_eq!(controller.params().frequency(), midi_to_frequency(60));
        assert_eq!(drain(&events), vec![VoiceEvent::NoteOn]);

        controller.dispatch(ControlCommand::SetTranspose(30));
        assert_eq!(controller.params().tuning().transpose, TRANSPOSE_RANGE);
        assert_relative_eq!(controller.params().frequency(), midi_to_frequency(84));
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn fine_tune_is_clamped_and_applied() {
        let (mut controller, _events) = controller();
        controller.dispatch(ControlCommand::KeyDown(KeyCode::A));
        controller.dispatch(ControlCommand::SetFineTune(-4.0));
        assert_eq!(controller.params().tuning().fine_tune, -FINE_TUNE_RANGE);
        assert_relative_eq!(
            controller.params().frequency(),
            midi_to_frequency(59),
            max_relative = 1e-9
        );
    }

    #[test]
    fn invalid_root_and_scale_are_rejected() {
        let (mut controller, _events) = controller();
        controller.dispatch(ControlCommand::SetRootNote(12));
        controller.dispatch(ControlCommand::SetRootNote(-1));
        controller.dispatch(ControlCommand::SetScale(99));
        let tuning = controller.params().tuning();
        assert_eq!(tuning.root_note, 0);
        assert_eq!(tuning.scale_index, 0);
    }

    #[test]
    fn scale_change_repitches_held_key() {
        let (mut controller, events) = controller();
        controller.dispatch(ControlCommand::KeyDown(KeyCode::D));
        assert_relative_eq!(controller.params().frequency(), midi_to_frequency(64));
        controller.dispatch(ControlCommand::SetScale(1));
        assert_relative_eq!(controller.params().frequency(), midi_to_frequency(63));
        assert_eq!(drain(&events), vec![VoiceEvent::NoteOn]);
    }

    #[test]
    fn root_change_moves_the_reference_key() {
        let (mut controller, _events) = controller();
        controller.dispatch(ControlCommand::SetRootNote(9));
        controller.dispatch(ControlCommand::KeyDown(KeyCode::A));
        assert_eq!(controller.status().base_note, Some(57));
        assert_relative_eq!(controller.params().frequency(), 220.0);
    }

    #[test]
    fn releasing_every_key_sends_note_off() {
        let (mut controller, events) = controller();
        controller.dispatch(ControlCommand::KeyDown(KeyCode::A));
        controller.dispatch(ControlCommand::KeysChanged(HeldKeys::new()));
        assert_eq!(drain(&events), vec![VoiceEvent::NoteOn, VoiceEvent::NoteOff]);
        assert_eq!(controller.status(), ControllerStatus::default());
    }

    #[test]
    fn envelope_and_filter_are_published() {
        let (mut controller, _events) = controller();
        let raw = EnvelopeParams {
            attack: 0.0,
            decay: -1.0,
            sustain: 2.0,
            release: 0.3,
        };
        controller.dispatch(ControlCommand::SetEnvelope(raw));
        controller.dispatch(ControlCommand::SetFilter {
            cutoff: 1_234.0,
            resonance: 2.0,
        });
        let (_, envelope) = controller.params().envelope_params().expect("no writer active");
        assert_eq!(envelope, EnvelopeParams::new(0.001, 0.001, 1.0, 0.3));
        assert_eq!(
            controller.params().filter_params().map(|(_, c, r)| (c, r)),
            Some((1_234.0, 2.0))
        );
    }

    #[test]
    fn level_is_clamped() {
        let (mut controller, _events) = controller();
        controller.dispatch(ControlCommand::SetLevel(1.5));
        assert_eq!(controller.params().level(), 1.0);
        controller.dispatch(ControlCommand::SetLevel(f32::NAN));
        assert_eq!(controller.params().level(), 1.0);
    }

    #[test]
    fn status_reports_sounding_note() {
        let (mut controller, _events) = controller();
        controller.dispatch(ControlCommand::SetTranspose(-12));
        controller.dispatch(ControlCommand::KeyDown(KeyCode::S));
        let status = controller.status();
        assert_eq!(status.base_note, Some(62));
        assert_eq!(status.final_note, Some(50));
        assert_relative_eq!(status.frequency, midi_to_frequency(50));
        assert_eq!(status.held, vec![KeyCode::S]);
    }

    #[test]
    fn worker_publishes_status() {
        let runtime = Runtime::new().expect("tokio runtime");
        let (controller, _events) = controller();
        let (status, tx) = spawn_controller(&runtime, controller);
        tx.send(ControlCommand::KeyDown(KeyCode::A)).expect("send");

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let current = status.lock().expect("status lock").clone();
            if current.base_note == Some(60) {
                assert_eq!(current.held, vec![KeyCode::A]);
                break;
            }
            assert!(Instant::now() < deadline, "worker never updated status");
            std::thread::sleep(Duration::from_millis(1));
        }
        drop(tx);
    }
}
