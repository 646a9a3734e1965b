//! Deejay - realtime tempo/pitch playback demo
//!
//! Plays a test tone through the latency-compensated processor on the default
//! output device. Controls are typed on stdin:
//!
//! ```text
//! tempo 1.2
//! pitch -3
//! latency 512
//! quit
//! ```

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deejay_audio::{endpoint, ControlEndpoint, Controls, LatencyCompensatedProcessor, ProcessorConfig};

/// Test tone frequency
const TONE_HZ: f32 = 440.0;
/// Test tone amplitude
const TONE_GAIN: f32 = 0.2;
/// Blocks rendered per callback before giving up and writing silence
const MAX_BLOCKS_PER_CALLBACK: usize = 16;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = ProcessorConfig::load();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No audio output device found"))?;
    let supported = device
        .default_output_config()
        .context("Failed to get audio config")?;

    // The device decides the stream format
    config.sample_rate = f64::from(supported.sample_rate().0);
    config.channels = usize::from(supported.channels());

    let processor = LatencyCompensatedProcessor::with_config(&config)?;
    info!(
        engine = processor.engine_kind().name(),
        sample_rate = config.sample_rate,
        channels = config.channels,
        latency = processor.total_latency_samples(),
        "processor ready"
    );

    let endpoints = processor.control_endpoints();
    let (control_tx, control_rx) = crossbeam_channel::unbounded();
    let rendered = Arc::new(AtomicU64::new(0));

    let renderer = ToneRenderer::new(processor, config.buffer_frames, control_rx, rendered.clone());
    let stream_config = supported.config();
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, renderer)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, renderer)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, renderer)?,
        format => bail!("Unsupported sample format: {format:?}"),
    };
    stream.play().context("Failed to start audio stream")?;

    let controls = run_console(config.controls(), &endpoints, &control_tx)?;

    drop(stream);
    info!(frames = rendered.load(Ordering::Relaxed), "playback stopped");

    config.tempo_ratio = controls.tempo_ratio;
    config.pitch_semitones = controls.pitch_semitones;
    config.manual_latency_samples = controls.manual_latency_samples;
    if let Err(e) = config.save() {
        warn!("Failed to save config: {}", e);
    }

    Ok(())
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: ToneRenderer,
) -> anyhow::Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.fill(data),
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .context("Failed to create audio stream")?;
    Ok(stream)
}

/// Read commands from stdin until `quit` or EOF. Returns the last controls sent.
fn run_console(
    mut controls: Controls,
    endpoints: &[ControlEndpoint],
    control_tx: &Sender<Controls>,
) -> anyhow::Result<Controls> {
    println!("Commands: tempo <ratio>, pitch <semitones>, latency <samples>, quit");
    for e in endpoints {
        println!(
            "  {:<14} {:<8} {} to {}  {}",
            e.id,
            e.kind.as_str(),
            e.minimum,
            e.maximum,
            e.description
        );
    }

    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let (command, value) = (words.next(), words.next());

        let updated = match (command, value) {
            (Some("quit"), _) | (Some("q"), _) => break,
            (Some("tempo"), Some(v)) => v.parse().ok().map(|tempo_ratio| Controls {
                tempo_ratio,
                ..controls
            }),
            (Some("pitch"), Some(v)) => v.parse().ok().map(|pitch_semitones| Controls {
                pitch_semitones,
                ..controls
            }),
            (Some("latency"), Some(v)) => v.parse().ok().map(|manual_latency_samples| Controls {
                manual_latency_samples,
                ..controls
            }),
            (None, _) => continue,
            _ => None,
        };

        match updated {
            Some(next) => {
                warn_out_of_range(endpoints, "tempo", next.tempo_ratio);
                warn_out_of_range(endpoints, "pitch", next.pitch_semitones);
                warn_out_of_range(endpoints, "manualLatency", f64::from(next.manual_latency_samples));
                controls = next;
                info!(
                    tempo = controls.tempo_ratio,
                    pitch = controls.pitch_semitones,
                    latency = controls.manual_latency_samples,
                    "controls updated"
                );
                if control_tx.send(controls).is_err() {
                    // Audio callback is gone
                    break;
                }
            }
            None => warn!("Unrecognized command: {}", line.trim()),
        }
    }

    Ok(controls)
}

/// Values outside the advertised range are still sent; the engine clamps them
fn warn_out_of_range(endpoints: &[ControlEndpoint], id: &str, value: f64) {
    if let Some(e) = endpoint::find(endpoints, id) {
        if !e.contains(value) {
            warn!("{} {} outside {} to {}", e.label, value, e.minimum, e.maximum);
        }
    }
}

/// Audio callback state: tone generator, processor and output FIFO
struct ToneRenderer {
    processor: LatencyCompensatedProcessor,
    control_rx: Receiver<Controls>,
    rendered: Arc<AtomicU64>,
    block_frames: usize,
    phase: f32,
    phase_step: f32,
    input: Vec<f32>,
    output: Vec<f32>,
    fifo: VecDeque<f32>,
}

impl ToneRenderer {
    fn new(
        processor: LatencyCompensatedProcessor,
        block_frames: usize,
        control_rx: Receiver<Controls>,
        rendered: Arc<AtomicU64>,
    ) -> Self {
        let channels = processor.channel_count();
        let block_frames = block_frames.max(1);
        let phase_step = TAU * TONE_HZ / processor.sample_rate() as f32;
        Self {
            processor,
            control_rx,
            rendered,
            block_frames,
            phase: 0.0,
            phase_step,
            input: vec![0.0; block_frames * channels],
            output: Vec::with_capacity(block_frames * channels * 4),
            fifo: VecDeque::with_capacity(block_frames * channels * 8),
        }
    }

    fn fill<T>(&mut self, data: &mut [T])
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        // Latest update wins
        if let Some(controls) = self.control_rx.try_iter().last() {
            self.processor.update_controls(controls);
        }

        let channels = self.processor.channel_count();
        let mut blocks = 0;
        while self.fifo.len() < data.len() && blocks < MAX_BLOCKS_PER_CALLBACK {
            self.render_tone(channels);
            let produced = self
                .processor
                .process_block(&self.input, self.block_frames, &mut self.output);
            self.rendered.fetch_add(produced as u64, Ordering::Relaxed);
            self.fifo.extend(self.output.iter().copied());
            blocks += 1;
        }

        for sample in data.iter_mut() {
            *sample = T::from_sample(self.fifo.pop_front().unwrap_or(0.0));
        }
    }

    fn render_tone(&mut self, channels: usize) {
        for frame in self.input.chunks_exact_mut(channels) {
            frame.fill(self.phase.sin() * TONE_GAIN);
            self.phase = (self.phase + self.phase_step) % TAU;
        }
    }
}
