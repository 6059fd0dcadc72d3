use std::sync::{Arc, mpsc::Receiver};

use anyhow::{Result, anyhow};
use cpal::{
    SampleFormat, SizedSample, Stream,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use log::{error, info};

use crate::{
    engine::{DEFAULT_MAX_BLOCK, SynthEngine, VoiceEvent},
    gain::{LEVEL_RAMP_SECONDS, SmoothedGain},
    params::SynthParams,
    scope::Scope,
};

const OUTPUT_LIMIT: f32 = 0.98;

/// Owns the voice inside the audio callback.
///
/// Each chunk picks up parameters, then pending note events, then the
/// pitch, so a note started by an event already uses the latest envelope.
pub struct SynthRenderer {
    engine: SynthEngine,
    params: Arc<SynthParams>,
    events: Receiver<VoiceEvent>,
    gain: SmoothedGain,
    scope: Arc<Scope>,
    scratch: Vec<f32>,
    mono: Vec<f32>,
    channels: usize,
    envelope_seq: Option<u32>,
    filter_seq: Option<u32>,
}

impl SynthRenderer {
    pub fn new(
        params: Arc<SynthParams>,
        events: Receiver<VoiceEvent>,
        scope: Arc<Scope>,
        sample_rate: f64,
        channels: usize,
        max_block: usize,
    ) -> Self {
        let channels = channels.max(1);
        let mut engine = SynthEngine::new();
        engine.prepare(sample_rate, max_block);
        let block = engine.max_block_size();

        let mut gain = SmoothedGain::new(params.level());
        gain.reset(engine.sample_rate(), LEVEL_RAMP_SECONDS);

        let mut renderer = Self {
            engine,
            params,
            events,
            gain,
            scope,
            scratch: vec![0.0; block * channels],
            mono: Vec::with_capacity(block),
            channels,
            envelope_seq: None,
            filter_seq: None,
        };
        renderer.apply_params();
        renderer
    }

    pub fn engine(&self) -> &SynthEngine {
        &self.engine
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Renders into an interleaved device buffer of any sample type.
    pub fn fill<T, F>(&mut self, output: &mut [T], convert: F)
    where
        T: Copy,
        F: Fn(f32) -> T,
    {
        let channels = self.channels;
        let chunk_len = self.engine.max_block_size() * channels;

        for chunk in output.chunks_mut(chunk_len) {
            self.apply_params();
            self.drain_events();
            self.engine.set_frequency(self.params.frequency());

            let block = &mut self.scratch[..chunk.len()];
            self.engine.render_block(block, channels);

            self.mono.clear();
            for (rendered, frame) in block.chunks(channels).zip(chunk.chunks_mut(channels)) {
                let sample =
                    (rendered[0] * self.gain.next_value()).clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT);
                self.mono.push(sample);
                frame.fill(convert(sample));
            }
            self.scope
                .publish_samples(&self.mono, self.engine.frequency() as f32);
        }
    }

    fn apply_params(&mut self) {
        self.engine.set_waveform(self.params.waveform());
        self.gain.set_target(self.params.level());

        if let Some((seq, envelope)) = self.params.envelope_params() {
            if self.envelope_seq != Some(seq) {
                self.engine.set_envelope_parameters(envelope);
                self.envelope_seq = Some(seq);
            }
        }
        if let Some((seq, cutoff, resonance)) = self.params.filter_params() {
            if self.filter_seq != Some(seq) {
                self.engine.set_filter_parameters(cutoff, resonance);
                self.filter_seq = Some(seq);
            }
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                VoiceEvent::NoteOn => self.engine.note_on(),
                VoiceEvent::NoteOff => self.engine.note_off(),
            }
        }
    }
}

pub fn f32_sample(sample: f32) -> f32 {
    sample
}

pub fn i16_sample(sample: f32) -> i16 {
    (sample * i16::MAX as f32) as i16
}

pub fn u16_sample(sample: f32) -> u16 {
    let scaled = (sample * 0.5 + 0.5).clamp(0.0, 1.0);
    (scaled * u16::MAX as f32) as u16
}

pub struct AudioEngine {
    _stream: Stream,
    sample_rate: f64,
}

impl AudioEngine {
    pub fn start(
        params: Arc<SynthParams>,
        events: Receiver<VoiceEvent>,
        scope: Arc<Scope>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default audio output"))?;
        let supported = device.default_output_config()?;
        let config = supported.config();
        let sample_rate = config.sample_rate.0 as f64;

        let renderer = SynthRenderer::new(
            params,
            events,
            scope,
            sample_rate,
            config.channels as usize,
            DEFAULT_MAX_BLOCK,
        );
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream(&device, &config, renderer, f32_sample)?,
            SampleFormat::I16 => build_stream(&device, &config, renderer, i16_sample)?,
            SampleFormat::U16 => build_stream(&device, &config, renderer, u16_sample)?,
            other => return Err(anyhow!("Unsupported sample format {other:?}")),
        };
        stream.play()?;
        info!(
            target: "audio",
            "output started: {} Hz, {} channels, {:?}",
            sample_rate,
            config.channels,
            supported.sample_format()
        );
        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: SynthRenderer,
    convert: fn(f32) -> T,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
{
    let stream = device.build_output_stream(
        config,
        move |output: &mut [T], _| renderer.fill(output, convert),
        move |err| error!(target: "audio", "audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
