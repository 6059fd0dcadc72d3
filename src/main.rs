use std::sync::{Arc, mpsc::Sender};

use keyscale_synth::{
    controls::{ControlCommand, ControllerStatus, Controller, spawn_controller},
    engine::{DEFAULT_SAMPLE_RATE, EngineHandle},
    envelope::{EnvelopeParams, MIN_STAGE_SECONDS},
    filter::{DEFAULT_CUTOFF_HZ, DEFAULT_RESONANCE, MAX_RESONANCE, MIN_CUTOFF_HZ, MIN_RESONANCE},
    input::{HeldKeys, KEY_ORDER, REFERENCE_KEY_INDEX, key_note},
    oscillator::Waveform,
    output::AudioEngine,
    params::{DEFAULT_LEVEL, SynthParams},
    pitch::{FINE_TUNE_RANGE, NOTE_NAMES, SCALES, TRANSPOSE_RANGE, Tuning, note_name},
    scope::{Scope, compute_spectrum},
};
use log::{error, info, warn};
use macroquad::{prelude::*, text::measure_text};
use tokio::runtime::Runtime;

const SCREEN_WIDTH: f32 = 1280.0;
const SCREEN_HEIGHT: f32 = 720.0;
const PANEL_HEIGHT: f32 = 400.0;
const KEY_FONT_SIZE: u16 = 28;
const MAX_ANALYZER_FREQ: f32 = 20_000.0;
const MIN_ANALYZER_DB: f32 = -80.0;
const MAX_ANALYZER_DB: f32 = 0.0;
const MAX_ATTACK_DECAY_SECONDS: f32 = 1.0;
const MAX_RELEASE_SECONDS: f32 = 2.0;
const KNOB_CUTOFF_MAX_HZ: f32 = 20_000.0;
const KEY_ROWS: [&[usize]; 3] = [
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    &[10, 11, 12, 13, 14, 15, 16, 17, 18],
    &[19, 20, 21, 22, 23, 24, 25],
];

const AMBER: Color = Color {
    r: 0.98,
    g: 0.66,
    b: 0.12,
    a: 1.0,
};
const AMBER_DIM: Color = Color {
    r: 0.78,
    g: 0.52,
    b: 0.08,
    a: 0.4,
};
const BACKGROUND: Color = Color {
    r: 0.02,
    g: 0.02,
    b: 0.02,
    a: 1.0,
};

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start tokio runtime: {err}");
            return;
        }
    };

    let params = Arc::new(SynthParams::new());
    let scope = Arc::new(Scope::new());
    let (voice, events) = EngineHandle::new(params.clone());
    let audio = match AudioEngine::start(params.clone(), events, scope.clone()) {
        Ok(audio) => Some(audio),
        Err(err) => {
            warn!(target: "audio", "running without audio output: {err:#}");
            None
        }
    };
    let sample_rate = audio
        .as_ref()
        .map_or(DEFAULT_SAMPLE_RATE, AudioEngine::sample_rate) as f32;

    let (status, commands) = spawn_controller(&runtime, Controller::new(params.clone(), voice));

    let mut panel = PanelState::new();
    let mut knob_drag = KnobDragState::default();
    let mut sent: Option<PanelSettings> = None;
    let mut last_held = HeldKeys::new();
    info!("keyboard ready: A plays the root, rows run up the scale");

    loop {
        clear_background(BACKGROUND);
        let layout = PanelLayout::compute();

        draw_controls(&mut panel, &mut knob_drag, &layout);
        let settings = panel.settings();
        sync_settings(&commands, sent.as_ref(), &settings);
        sent = Some(settings);

        poll_keyboard(&commands, &mut last_held);

        let status = status
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
        let (waveform, frequency) = scope.snapshot();
        let spectrum = compute_spectrum(&waveform);
        draw_scope(&layout, &waveform, &spectrum, frequency, sample_rate);
        draw_status(&layout, &status, &params.tuning());
        draw_keyboard(&status, &params.tuning());

        next_frame().await;
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Keyscale Synth".into(),
        fullscreen: false,
        sample_count: 1,
        window_width: SCREEN_WIDTH as i32,
        window_height: SCREEN_HEIGHT as i32,
        high_dpi: false,
        ..Default::default()
    }
}

fn send(commands: &Sender<ControlCommand>, command: ControlCommand) {
    if let Err(err) = commands.send(command) {
        error!(target: "controls", "control worker stopped: {err}");
    }
}

/// Turns key presses into `KeyDown` and any transition into a held-key snapshot.
fn poll_keyboard(commands: &Sender<ControlCommand>, last_held: &mut HeldKeys) {
    let mut transition = false;
    for (key, _) in KEY_ORDER {
        if is_key_pressed(key) {
            send(commands, ControlCommand::KeyDown(key));
            transition = true;
        }
        if is_key_released(key) {
            transition = true;
        }
    }
    let held: HeldKeys = KEY_ORDER
        .iter()
        .map(|(key, _)| *key)
        .filter(|key| is_key_down(*key))
        .collect();
    if transition || held != *last_held {
        send(commands, ControlCommand::KeysChanged(held.clone()));
        *last_held = held;
    }
}

struct PanelLayout {
    controls_rect: Rect,
    knobs: [Rect; KnobId::COUNT],
    waveform_buttons: [Rect; 4],
    root_buttons: [Rect; 12],
    scale_buttons: [Rect; 7],
    scope_rect: Rect,
    spectrum_rect: Rect,
    status_rect: Rect,
}

impl PanelLayout {
    fn compute() -> Self {
        let controls_rect = Rect::new(20.0, 30.0, 760.0, PANEL_HEIGHT - 50.0);
        let knob_size = 66.0;
        let spacing = (controls_rect.w - 20.0) / KnobId::COUNT as f32;
        let knobs = std::array::from_fn(|index| {
            Rect::new(
                controls_rect.x + 10.0 + index as f32 * spacing + (spacing - knob_size) * 0.5,
                controls_rect.y + 40.0,
                knob_size,
                knob_size,
            )
        });
        let row = |y: f32, count: usize, width: f32| -> Vec<Rect> {
            (0..count)
                .map(|index| {
                    Rect::new(
                        controls_rect.x + 16.0 + index as f32 * (width + 6.0),
                        y,
                        width,
                        28.0,
                    )
                })
                .collect()
        };
        let base = controls_rect.y + 180.0;
        let waveform_buttons = to_array(row(base, 4, 90.0));
        let root_buttons = to_array(row(base + 50.0, 12, 54.0));
        let scale_buttons = to_array(row(base + 100.0, 7, 96.0));

        let scope_rect = Rect::new(810.0, 30.0, 450.0, 140.0);
        let spectrum_rect = Rect::new(850.0, 190.0, 410.0, 110.0);
        let status_rect = Rect::new(810.0, 330.0, 450.0, 50.0);
        Self {
            controls_rect,
            knobs,
            waveform_buttons,
            root_buttons,
            scale_buttons,
            scope_rect,
            spectrum_rect,
            status_rect,
        }
    }
}

fn to_array<const N: usize>(rects: Vec<Rect>) -> [Rect; N] {
    std::array::from_fn(|index| {
        rects
            .get(index)
            .copied()
            .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0))
    })
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum KnobId {
    Level,
    FineTune,
    Transpose,
    Attack,
    Decay,
    Sustain,
    Release,
    Cutoff,
    Resonance,
}

impl KnobId {
    const COUNT: usize = 9;
    const ALL: [KnobId; Self::COUNT] = [
        KnobId::Level,
        KnobId::FineTune,
        KnobId::Transpose,
        KnobId::Attack,
        KnobId::Decay,
        KnobId::Sustain,
        KnobId::Release,
        KnobId::Cutoff,
        KnobId::Resonance,
    ];

    fn label(self) -> &'static str {
        match self {
            KnobId::Level => "LEVEL",
            KnobId::FineTune => "FINE",
            KnobId::Transpose => "TRANS",
            KnobId::Attack => "ATTACK",
            KnobId::Decay => "DECAY",
            KnobId::Sustain => "SUSTAIN",
            KnobId::Release => "RELEASE",
            KnobId::Cutoff => "CUTOFF",
            KnobId::Resonance => "RES",
        }
    }
}

#[derive(Default)]
struct KnobDragState {
    active_knob: Option<KnobId>,
    origin_value: f32,
    origin_y: f32,
}

/// Knob positions and selector choices, all knobs normalized to 0..=1.
struct PanelState {
    knobs: [f32; KnobId::COUNT],
    waveform: Waveform,
    root_note: i32,
    scale_index: usize,
}

/// Engine-facing values derived from the panel.
#[derive(Clone, Copy, Debug, PartialEq)]
struct PanelSettings {
    waveform: Waveform,
    level: f32,
    fine_tune: f32,
    transpose: i32,
    envelope: EnvelopeParams,
    cutoff: f32,
    resonance: f32,
    root_note: i32,
    scale_index: usize,
}

impl PanelState {
    fn new() -> Self {
        let envelope = EnvelopeParams::default();
        let tuning = Tuning::default();
        let mut knobs = [0.0; KnobId::COUNT];
        knobs[KnobId::Level as usize] = DEFAULT_LEVEL;
        knobs[KnobId::FineTune as usize] = bipolar_to_knob(tuning.fine_tune, FINE_TUNE_RANGE);
        knobs[KnobId::Transpose as usize] =
            bipolar_to_knob(tuning.transpose as f32, TRANSPOSE_RANGE as f32);
        knobs[KnobId::Attack as usize] =
            seconds_to_knob(envelope.attack, MAX_ATTACK_DECAY_SECONDS);
        knobs[KnobId::Decay as usize] = seconds_to_knob(envelope.decay, MAX_ATTACK_DECAY_SECONDS);
        knobs[KnobId::Sustain as usize] = envelope.sustain;
        knobs[KnobId::Release as usize] = seconds_to_knob(envelope.release, MAX_RELEASE_SECONDS);
        knobs[KnobId::Cutoff as usize] = cutoff_to_knob(DEFAULT_CUTOFF_HZ);
        knobs[KnobId::Resonance as usize] = resonance_to_knob(DEFAULT_RESONANCE);
        Self {
            knobs,
            waveform: Waveform::default(),
            root_note: tuning.root_note,
            scale_index: tuning.scale_index,
        }
    }

    fn knob(&self, id: KnobId) -> f32 {
        self.knobs[id as usize]
    }

    fn settings(&self) -> PanelSettings {
        PanelSettings {
            waveform: self.waveform,
            level: self.knob(KnobId::Level),
            fine_tune: knob_to_bipolar(self.knob(KnobId::FineTune), FINE_TUNE_RANGE),
            transpose: knob_to_bipolar(self.knob(KnobId::Transpose), TRANSPOSE_RANGE as f32)
                .round() as i32,
            envelope: EnvelopeParams::new(
                knob_to_seconds(self.knob(KnobId::Attack), MAX_ATTACK_DECAY_SECONDS),
                knob_to_seconds(self.knob(KnobId::Decay), MAX_ATTACK_DECAY_SECONDS),
                self.knob(KnobId::Sustain),
                knob_to_seconds(self.knob(KnobId::Release), MAX_RELEASE_SECONDS),
            ),
            cutoff: knob_to_cutoff(self.knob(KnobId::Cutoff)),
            resonance: knob_to_resonance(self.knob(KnobId::Resonance)),
            root_note: self.root_note,
            scale_index: self.scale_index,
        }
    }

    fn display(&self, id: KnobId) -> String {
        let settings = self.settings();
        match id {
            KnobId::Level => format!("{:.0}%", settings.level * 100.0),
            KnobId::FineTune => format!("{:+.2}", settings.fine_tune),
            KnobId::Transpose => format!("{:+}", settings.transpose),
            KnobId::Attack => format!("{:.3}s", settings.envelope.attack),
            KnobId::Decay => format!("{:.3}s", settings.envelope.decay),
            KnobId::Sustain => format!("{:.2}", settings.envelope.sustain),
            KnobId::Release => format!("{:.3}s", settings.envelope.release),
            KnobId::Cutoff => format!("{:.0}Hz", settings.cutoff),
            KnobId::Resonance => format!("{:.2}", settings.resonance),
        }
    }
}

/// Sends a command for every setting that differs from what was last sent.
fn sync_settings(
    commands: &Sender<ControlCommand>,
    previous: Option<&PanelSettings>,
    next: &PanelSettings,
) {
    for command in setting_changes(previous, next) {
        send(commands, command);
    }
}

fn setting_changes(previous: Option<&PanelSettings>, next: &PanelSettings) -> Vec<ControlCommand> {
    let changed = |same: fn(&PanelSettings, &PanelSettings) -> bool| {
        previous.is_none_or(|previous| !same(previous, next))
    };
    let mut changes = Vec::new();
    if changed(|a, b| a.waveform == b.waveform) {
        changes.push(ControlCommand::SetWaveform(next.waveform));
    }
    if changed(|a, b| a.level == b.level) {
        changes.push(ControlCommand::SetLevel(next.level));
    }
    if changed(|a, b| a.root_note == b.root_note) {
        changes.push(ControlCommand::SetRootNote(next.root_note));
    }
    if changed(|a, b| a.scale_index == b.scale_index) {
        changes.push(ControlCommand::SetScale(next.scale_index));
    }
    if changed(|a, b| a.transpose == b.transpose) {
        changes.push(ControlCommand::SetTranspose(next.transpose));
    }
    if changed(|a, b| a.fine_tune == b.fine_tune) {
        changes.push(ControlCommand::SetFineTune(next.fine_tune));
    }
    if changed(|a, b| a.envelope == b.envelope) {
        changes.push(ControlCommand::SetEnvelope(next.envelope));
    }
    if changed(|a, b| a.cutoff == b.cutoff && a.resonance == b.resonance) {
        changes.push(ControlCommand::SetFilter {
            cutoff: next.cutoff,
            resonance: next.resonance,
        });
    }
    changes
}

fn knob_to_bipolar(value: f32, range: f32) -> f32 {
    (value.clamp(0.0, 1.0) * 2.0 - 1.0) * range
}

fn bipolar_to_knob(amount: f32, range: f32) -> f32 {
    ((amount / range) + 1.0) * 0.5
}

/// Squared taper so short times get most of the travel.
fn knob_to_seconds(value: f32, max: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    MIN_STAGE_SECONDS + value * value * (max - MIN_STAGE_SECONDS)
}

fn seconds_to_knob(seconds: f32, max: f32) -> f32 {
    ((seconds - MIN_STAGE_SECONDS) / (max - MIN_STAGE_SECONDS))
        .clamp(0.0, 1.0)
        .sqrt()
}

fn knob_to_cutoff(value: f32) -> f32 {
    MIN_CUTOFF_HZ * (KNOB_CUTOFF_MAX_HZ / MIN_CUTOFF_HZ).powf(value.clamp(0.0, 1.0))
}

fn cutoff_to_knob(hz: f32) -> f32 {
    ((hz / MIN_CUTOFF_HZ).ln() / (KNOB_CUTOFF_MAX_HZ / MIN_CUTOFF_HZ).ln()).clamp(0.0, 1.0)
}

fn knob_to_resonance(value: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    MIN_RESONANCE + value * value * (MAX_RESONANCE - MIN_RESONANCE)
}

fn resonance_to_knob(q: f32) -> f32 {
    ((q - MIN_RESONANCE) / (MAX_RESONANCE - MIN_RESONANCE))
        .clamp(0.0, 1.0)
        .sqrt()
}

fn mouse_position_vec() -> Vec2 {
    let (x, y) = mouse_position();
    vec2(x, y)
}

fn clicked(rect: Rect) -> bool {
    is_mouse_button_pressed(MouseButton::Left) && rect.contains(mouse_position_vec())
}

fn draw_controls(panel: &mut PanelState, knob_drag: &mut KnobDragState, layout: &PanelLayout) {
    draw_section(&layout.controls_rect, "VOICE");
    for (id, rect) in KnobId::ALL.into_iter().zip(layout.knobs) {
        let display = panel.display(id);
        draw_knob_widget(
            knob_drag,
            id,
            rect,
            &mut panel.knobs[id as usize],
            id.label(),
            &display,
        );
    }

    for (waveform, rect) in Waveform::VALUES.into_iter().zip(layout.waveform_buttons) {
        if clicked(rect) {
            panel.waveform = waveform;
        }
        draw_selector(rect, waveform.label(), panel.waveform == waveform);
    }
    for (root, (name, rect)) in NOTE_NAMES.iter().zip(layout.root_buttons).enumerate() {
        if clicked(rect) {
            panel.root_note = root as i32;
        }
        draw_selector(rect, name, panel.root_note == root as i32);
    }
    for (index, (scale, rect)) in SCALES.iter().zip(layout.scale_buttons).enumerate() {
        if clicked(rect) {
            panel.scale_index = index;
        }
        draw_selector(rect, scale.name, panel.scale_index == index);
    }

    let label_x = layout.controls_rect.x + 16.0;
    for (text, rect) in [
        ("WAVE", layout.waveform_buttons[0]),
        ("ROOT", layout.root_buttons[0]),
        ("SCALE", layout.scale_buttons[0]),
    ] {
        draw_text_ex(
            text,
            label_x,
            rect.y - 6.0,
            TextParams {
                font_size: 14,
                color: AMBER_DIM,
                ..Default::default()
            },
        );
    }
}

fn draw_section(rect: &Rect, label: &str) {
    draw_rectangle(
        rect.x,
        rect.y,
        rect.w,
        rect.h,
        Color::new(0.05, 0.03, 0.02, 0.65),
    );
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
    draw_text_ex(
        label,
        rect.x + 6.0,
        rect.y - 6.0,
        TextParams {
            font_size: 18,
            color: AMBER,
            ..Default::default()
        },
    );
}

fn draw_selector(rect: Rect, label: &str, selected: bool) {
    let fill = if selected {
        Color::new(0.3, 0.2, 0.07, 0.9)
    } else {
        Color::new(0.05, 0.03, 0.02, 1.0)
    };
    draw_rectangle(rect.x, rect.y, rect.w, rect.h, fill);
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
    draw_centered_text(label, rect, 14);
}

fn draw_knob_widget(
    knob_drag: &mut KnobDragState,
    knob_id: KnobId,
    rect: Rect,
    value: &mut f32,
    label: &str,
    display: &str,
) {
    handle_knob_drag(knob_drag, knob_id, rect, value);
    let center = vec2(rect.x + rect.w * 0.5, rect.y + rect.h * 0.5);
    let radius = rect.w.min(rect.h) * 0.35;
    draw_circle(
        center.x,
        center.y,
        radius + 6.0,
        Color::new(0.05, 0.03, 0.02, 1.0),
    );
    draw_circle(
        center.x,
        center.y,
        radius,
        Color::new(0.12, 0.12, 0.12, 1.0),
    );
    draw_circle_lines(center.x, center.y, radius + 6.0, 1.0, AMBER_DIM);
    let start_angle = 150.0f32.to_radians();
    let angle_range = 240.0f32.to_radians();
    let theta = start_angle + value.clamp(0.0, 1.0) * angle_range;
    let pointer = vec2(theta.cos(), theta.sin()) * radius * 0.8;
    draw_line(
        center.x,
        center.y,
        center.x + pointer.x,
        center.y + pointer.y,
        3.0,
        AMBER,
    );
    draw_centered_text(display, Rect::new(rect.x, rect.y - 14.0, rect.w, 20.0), 14);
    draw_centered_text(
        label,
        Rect::new(rect.x, rect.y + rect.h + 4.0, rect.w, 18.0),
        16,
    );
}

fn handle_knob_drag(knob_drag: &mut KnobDragState, knob_id: KnobId, rect: Rect, value: &mut f32) {
    let mouse = mouse_position_vec();
    if is_mouse_button_pressed(MouseButton::Left) && rect.contains(mouse) {
        knob_drag.active_knob = Some(knob_id);
        knob_drag.origin_value = *value;
        knob_drag.origin_y = mouse.y;
    }
    if knob_drag.active_knob == Some(knob_id) {
        if is_mouse_button_down(MouseButton::Left) {
            let delta = (knob_drag.origin_y - mouse.y) * 0.005;
            *value = (knob_drag.origin_value + delta).clamp(0.0, 1.0);
        } else {
            knob_drag.active_knob = None;
        }
    }
    let (_x, wheel) = mouse_wheel();
    if rect.contains(mouse) && wheel.abs() > f32::EPSILON {
        *value = (*value + wheel.signum() * 0.02).clamp(0.0, 1.0);
    }
}

fn draw_scope(
    layout: &PanelLayout,
    waveform: &[f32],
    spectrum: &[f32],
    frequency: f32,
    sample_rate: f32,
) {
    let rect = layout.scope_rect;
    draw_section(&rect, "SCOPE");
    let mid = rect.y + rect.h * 0.5;
    draw_line(rect.x, mid, rect.x + rect.w, mid, 0.5, AMBER_DIM);
    draw_waveform(rect, waveform);
    let label = if frequency > 0.0 {
        format!("{frequency:.2} Hz")
    } else {
        "-".to_string()
    };
    draw_text_ex(
        &label,
        rect.x + rect.w - 110.0,
        rect.y + 20.0,
        TextParams {
            font_size: 16,
            color: AMBER,
            ..Default::default()
        },
    );

    let rect = layout.spectrum_rect;
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
    draw_spectrum(rect, spectrum, sample_rate);
}

fn draw_waveform(rect: Rect, samples: &[f32]) {
    if samples.len() < 2 {
        return;
    }
    let step = rect.w / (samples.len() - 1) as f32;
    for (i, pair) in samples.windows(2).enumerate() {
        let x0 = rect.x + i as f32 * step;
        let y0 = rect.y + rect.h * 0.5 - pair[0] * rect.h * 0.45;
        let y1 = rect.y + rect.h * 0.5 - pair[1] * rect.h * 0.45;
        draw_line(x0, y0, x0 + step, y1, 1.0, AMBER);
    }
}

fn draw_spectrum(rect: Rect, spectrum: &[f32], sample_rate: f32) {
    if spectrum.is_empty() {
        return;
    }
    let nyquist = sample_rate * 0.5;
    let max_freq = MAX_ANALYZER_FREQ.min(nyquist);
    let mut prev = None;
    for (bin, magnitude) in spectrum.iter().enumerate() {
        let freq = nyquist * (bin as f32 / spectrum.len() as f32);
        if freq > max_freq {
            break;
        }
        let x = rect.x + (freq / max_freq) * rect.w;
        let db = 20.0 * magnitude.max(1e-6).log10();
        let normalized =
            ((db - MIN_ANALYZER_DB) / (MAX_ANALYZER_DB - MIN_ANALYZER_DB)).clamp(0.0, 1.0);
        let y = rect.y + rect.h - normalized * rect.h;
        if let Some((px, py)) = prev {
            draw_line(px, py, x, y, 1.5, AMBER_DIM);
        }
        prev = Some((x, y));
    }

    for db in [MIN_ANALYZER_DB, -40.0, MAX_ANALYZER_DB] {
        let ratio = (db - MIN_ANALYZER_DB) / (MAX_ANALYZER_DB - MIN_ANALYZER_DB);
        let y = rect.y + rect.h - ratio * rect.h;
        draw_line(
            rect.x,
            y,
            rect.x + rect.w,
            y,
            0.5,
            Color::new(0.2, 0.1, 0.03, 0.4),
        );
        draw_text_ex(
            &format!("{db:.0} dB"),
            rect.x - 40.0,
            y + 4.0,
            TextParams {
                font_size: 12,
                color: AMBER,
                ..Default::default()
            },
        );
    }
    for freq in [0.0, 5_000.0, 10_000.0, 15_000.0, 20_000.0] {
        if freq > max_freq {
            break;
        }
        let x = rect.x + (freq / max_freq) * rect.w;
        draw_text_ex(
            &format!("{:.0}k", freq / 1000.0),
            x - 8.0,
            rect.y + rect.h + 14.0,
            TextParams {
                font_size: 12,
                color: AMBER,
                ..Default::default()
            },
        );
    }
}

fn draw_status(layout: &PanelLayout, status: &ControllerStatus, tuning: &Tuning) {
    let rect = layout.status_rect;
    let note = match (status.base_note, status.final_note) {
        (Some(base), Some(sounding)) if base != sounding => {
            format!("{} -> {}", note_name(base), note_name(sounding))
        }
        (_, Some(sounding)) => note_name(sounding),
        _ => "-".to_string(),
    };
    let scale = SCALES
        .get(tuning.scale_index)
        .map_or("?", |scale| scale.name);
    draw_text_block(
        rect.x,
        rect.y + 16.0,
        &format!(
            "NOTE {note}   {:.2} Hz\nKEY {} {scale}   HELD {}",
            status.frequency,
            NOTE_NAMES[tuning.root_note.rem_euclid(12) as usize],
            status.held.len()
        ),
    );
}

fn draw_text_block(x: f32, mut y: f32, text: &str) {
    for line in text.lines() {
        draw_text_ex(
            line,
            x,
            y,
            TextParams {
                font_size: 18,
                color: AMBER,
                ..Default::default()
            },
        );
        y += 22.0;
    }
}

/// Three letter rows, staggered like a physical keyboard.
fn draw_keyboard(status: &ControllerStatus, tuning: &Tuning) {
    let area = Rect::new(
        40.0,
        PANEL_HEIGHT + 20.0,
        SCREEN_WIDTH - 80.0,
        SCREEN_HEIGHT - PANEL_HEIGHT - 40.0,
    );
    let spacing = 12.0;
    let columns = KEY_ROWS[0].len() as f32;
    let key_size = ((area.w - spacing * (columns - 1.0)) / columns)
        .min((area.h - spacing * 2.0) / 3.0)
        .max(40.0);
    let total_width = columns * key_size + (columns - 1.0) * spacing;
    let start_x = area.x + (area.w - total_width) * 0.5;

    for (row_index, row) in KEY_ROWS.iter().enumerate() {
        let offset = row_index as f32 * key_size * 0.35;
        let y = area.y + row_index as f32 * (key_size + spacing);
        for (column, key_index) in row.iter().enumerate() {
            let Some((key, label)) = KEY_ORDER.get(*key_index) else {
                continue;
            };
            let x = start_x + offset + column as f32 * (key_size + spacing);
            let rect = Rect::new(x, y, key_size, key_size);
            let active = status.held.contains(key);
            let note = key_note(*key, tuning).map(note_name).unwrap_or_default();
            let reference = *key_index as i32 == REFERENCE_KEY_INDEX;
            draw_key(rect, active, reference, label, &note);
        }
    }
}

fn draw_key(rect: Rect, active: bool, reference: bool, label: &str, note: &str) {
    let fill_color = if active {
        Color::new(0.3, 0.2, 0.07, 0.9)
    } else if reference {
        Color::new(0.08, 0.05, 0.03, 0.95)
    } else {
        Color::new(0.02, 0.02, 0.02, 0.95)
    };
    draw_rounded_rect(rect, 10.0, fill_color);
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
    draw_centered_text(
        label,
        Rect::new(rect.x, rect.y, rect.w, rect.h * 0.7),
        KEY_FONT_SIZE,
    );
    draw_centered_text(
        note,
        Rect::new(rect.x, rect.y + rect.h * 0.6, rect.w, rect.h * 0.35),
        14,
    );
}

fn draw_rounded_rect(rect: Rect, radius: f32, color: Color) {
    draw_rectangle(
        rect.x + radius,
        rect.y,
        rect.w - 2.0 * radius,
        rect.h,
        color,
    );
    draw_rectangle(
        rect.x,
        rect.y + radius,
        rect.w,
        rect.h - 2.0 * radius,
        color,
    );
    for (cx, cy) in [
        (rect.x + radius, rect.y + radius),
        (rect.x + rect.w - radius, rect.y + radius),
        (rect.x + radius, rect.y + rect.h - radius),
        (rect.x + rect.w - radius, rect.y + rect.h - radius),
    ] {
        draw_circle(cx, cy, radius, color);
    }
}

fn draw_centered_text(text: &str, rect: Rect, size: u16) {
    let measure = measure_text(text, None, size, 1.0);
    let x = rect.x + rect.w * 0.5 - measure.width * 0.5;
    let y = rect.y + rect.h * 0.5 + measure.height * 0.5;
    draw_text_ex(
        text,
        x,
        y,
        TextParams {
            font_size: size,
            color: AMBER,
            ..Default::default()
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_panel_maps_back_to_defaults() {
        let settings = PanelState::new().settings();
        assert_eq!(settings.level, DEFAULT_LEVEL);
        assert_eq!(settings.transpose, 0);
        assert_relative_eq!(settings.fine_tune, 0.0);
        assert_relative_eq!(settings.cutoff, DEFAULT_CUTOFF_HZ, max_relative = 1e-4);
        assert_relative_eq!(settings.resonance, DEFAULT_RESONANCE, max_relative = 1e-4);
        let envelope = EnvelopeParams::default();
        assert_relative_eq!(settings.envelope.attack, envelope.attack, max_relative = 1e-4);
        assert_relative_eq!(settings.envelope.release, envelope.release, max_relative = 1e-4);
        assert_eq!(settings.envelope.sustain, envelope.sustain);
    }

    #[test]
    fn knob_extremes_cover_control_ranges() {
        assert_eq!(knob_to_bipolar(0.0, TRANSPOSE_RANGE as f32), -24.0);
        assert_eq!(knob_to_bipolar(1.0, TRANSPOSE_RANGE as f32), 24.0);
        assert_relative_eq!(knob_to_seconds(0.0, MAX_RELEASE_SECONDS), MIN_STAGE_SECONDS);
        assert_relative_eq!(
            knob_to_seconds(1.0, MAX_RELEASE_SECONDS),
            MAX_RELEASE_SECONDS,
            max_relative = 1e-6
        );
        assert_relative_eq!(knob_to_cutoff(0.0), MIN_CUTOFF_HZ);
        assert_relative_eq!(knob_to_cutoff(1.0), KNOB_CUTOFF_MAX_HZ, max_relative = 1e-5);
        assert_relative_eq!(knob_to_resonance(1.0), MAX_RESONANCE, max_relative = 1e-6);
    }

    #[test]
    fn first_sync_sends_everything_then_only_changes() {
        let panel = PanelState::new();
        let settings = panel.settings();
        assert_eq!(setting_changes(None, &settings).len(), 8);
        assert!(setting_changes(Some(&settings), &settings).is_empty());

        let mut moved = settings;
        moved.transpose = 12;
        let changes = setting_changes(Some(&settings), &moved);
        assert!(matches!(changes.as_slice(), [ControlCommand::SetTranspose(12)]));
    }

    #[test]
    fn key_rows_cover_every_letter_once() {
        let mut indices: Vec<usize> = KEY_ROWS.iter().flat_map(|row| row.iter().copied()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..KEY_ORDER.len()).collect::<Vec<_>>());
    }
}
