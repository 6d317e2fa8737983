use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Sample, StreamConfig,
};
use tracing::{debug, error, info};

use crate::config::OutputConfig;
use crate::error::{ConductorError, SchedulingError};
use crate::sequencer::{check_due, NoteCommand, SequencerPort};
use crate::state::{lock, SynthState, Voice};
use crate::types::Tick;

/// Built-in software synthesizer. The audio callback is the clock: it
/// renders frames, and commands fire when the rendered time reaches them.
pub struct SynthSequencer {
    state: Arc<SynthState>,
    tolerance: Tick,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SynthSequencer {
    /// Opens the default output device and starts rendering. Returns once
    /// the stream is playing.
    pub fn start(config: &OutputConfig) -> Result<Self, ConductorError> {
        let state = SynthState::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = {
            let state = state.clone();
            let shutdown = shutdown.clone();
            let gain = config.master_gain;
            thread::Builder::new()
                .name("synth".into())
                .spawn(move || run_audio_synthesizer(state, shutdown, gain, ready_tx))
                .map_err(|e| ConductorError::Device(format!("failed to spawn audio thread: {e}")))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                state,
                tolerance: config.late_tolerance,
                shutdown,
                thread: Some(thread),
            }),
            Ok(Err(message)) => {
                let _ = thread.join();
                Err(ConductorError::Device(message))
            }
            Err(_) => {
                let _ = thread.join();
                Err(ConductorError::Device("audio thread exited during startup".into()))
            }
        }
    }

    pub fn state(&self) -> &Arc<SynthState> {
        &self.state
    }
}

impl SequencerPort for SynthSequencer {
    /// Advances once per rendered buffer, and due commands start at the head
    /// of that buffer, so timing resolution is one buffer period.
    fn now(&self) -> Tick {
        self.state.now()
    }

    fn schedule(&mut self, command: NoteCommand) -> Result<(), SchedulingError> {
        if !self.state.running.load(Ordering::Acquire) {
            return Err(SchedulingError::Unavailable("audio stream stopped".into()));
        }
        check_due(command.tick, self.now(), self.tolerance)?;
        lock(&self.state.pending).push(command);
        Ok(())
    }

    fn program_change(&mut self, channel: u8, program: u8) -> Result<(), SchedulingError> {
        lock(&self.state.programs)[usize::from(channel & 0x0F)] = program & 0x7F;
        Ok(())
    }

    fn all_notes_off(&mut self) {
        let mut pending = lock(&self.state.pending);
        let mut voices = lock(&self.state.voices);
        pending.clear();
        voices.clear();
        debug!("synth: all notes off");
    }
}

impl Drop for SynthSequencer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Owns the cpal stream (which must stay on the thread that built it) until
/// `shutdown` is raised.
fn run_audio_synthesizer(
    state: Arc<SynthState>,
    shutdown: Arc<AtomicBool>,
    gain: f32,
    ready: mpsc::Sender<Result<(), String>>,
) {
    // Initialize the audio host and device
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(device) => {
            info!("Default output device found: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));
            device
        }
        None => {
            error!("No output device found");
            let _ = ready.send(Err("no output device found".into()));
            return;
        }
    };

    let supported_config = match device.default_output_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to get default output config: {}", e);
            let _ = ready.send(Err(format!("failed to get output config: {e}")));
            return;
        }
    };

    let config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    info!("Audio stream configuration: {:?}", config);
    state.sample_rate.store(config.sample_rate.0, Ordering::Release);

    let callback_state = state.clone();
    let channels = usize::from(config.channels.max(1));
    let sample_rate = config.sample_rate.0 as f32;
    let stream = match device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            process_audio_data(data, &callback_state, channels, sample_rate, gain);
        },
        |err| {
            error!("An error occurred on the audio stream: {}", err);
        },
        None,
    ) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to build audio stream: {}", e);
            let _ = ready.send(Err(format!("failed to build audio stream: {e}")));
            return;
        }
    };

    info!("Starting audio stream...");
    if let Err(e) = stream.play() {
        error!("Failed to play audio stream: {}", e);
        let _ = ready.send(Err(format!("failed to play audio stream: {e}")));
        return;
    }
    state.running.store(true, Ordering::Release);
    let _ = ready.send(Ok(()));

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));
    }
    state.running.store(false, Ordering::Release);
    drop(stream);
    info!("Audio stream stopped");
}

/// Applies every command due by the end of this buffer, then renders it.
fn process_audio_data(data: &mut [f32], state: &SynthState, channels: usize, sample_rate: f32, gain: f32) {
    let frames = (data.len() / channels) as u64;
    let rate = u64::from(state.sample_rate.load(Ordering::Acquire).max(1));
    let buffer_end = (state.frames_rendered.load(Ordering::Acquire) + frames) * 1000 / rate;

    let programs = *lock(&state.programs);
    let mut voices = {
        let mut pending = lock(&state.pending);
        let mut voices = lock(&state.voices);
        for command in pending.drain_due(buffer_end) {
            apply_command(&mut voices, command);
        }
        voices
    };

    for frame in data.chunks_mut(channels) {
        let mut sample_value: f32 = 0.0;

        for (&(channel, key), voice) in voices.iter_mut() {
            let freq = midi_note_to_freq(key);
            voice.phase = (voice.phase + freq / sample_rate) % 1.0;
            let weights = timbre(programs[usize::from(channel & 0x0F)]);
            let volume = f32::from(voice.velocity) / 127.0;
            sample_value += mix(voice.phase, weights) * volume;
        }

        sample_value = (sample_value * gain).clamp(-1.0, 1.0);

        for sample in frame.iter_mut() {
            *sample = Sample::from_sample(sample_value);
        }
    }
    drop(voices);

    state.frames_rendered.fetch_add(frames, Ordering::AcqRel);
}

fn apply_command(voices: &mut std::collections::HashMap<(u8, u8), Voice>, command: NoteCommand) {
    let id = (command.channel, command.key);
    if command.is_note_on && command.velocity > 0 {
        voices.insert(
            id,
            Voice {
                velocity: command.velocity,
                phase: 0.0,
            },
        );
    } else {
        voices.remove(&id);
    }
}

/// Sine, square, sawtooth and triangle weights for a General MIDI program.
fn timbre(program: u8) -> [f32; 4] {
    match program / 32 {
        // Pianos, chromatic percussion, organs, guitars
        0 => [0.3, 0.3, 0.2, 0.2],
        // Bass, strings, ensembles, brass
        1 => [0.2, 0.1, 0.5, 0.2],
        // Reeds, pipes, synth leads and pads
        2 => [0.4, 0.1, 0.1, 0.4],
        _ => [0.1, 0.5, 0.2, 0.2],
    }
}

fn mix(phase: f32, weights: [f32; 4]) -> f32 {
    let sine_wave = (2.0 * std::f32::consts::PI * phase).sin();
    let square_wave = if phase < 0.5 { 1.0 } else { -1.0 };
    let sawtooth_wave = 2.0 * phase - 1.0;
    let triangle_wave = (2.0 * phase - 1.0).abs() * 2.0 - 1.0;
    weights[0] * sine_wave + weights[1] * square_wave + weights[2] * sawtooth_wave + weights[3] * triangle_wave
}

/// Converts a MIDI note to frequency
fn midi_note_to_freq(note: u8) -> f32 {
    440.0 * (2.0_f32).powf((note as f32 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(key: u8, tick: Tick, is_note_on: bool) -> NoteCommand {
        NoteCommand {
            channel: 0,
            key,
            velocity: 100,
            tick,
            is_note_on,
        }
    }

    fn state_at(rate: u32) -> Arc<SynthState> {
        let state = SynthState::new();
        state.sample_rate.store(rate, Ordering::Release);
        state
    }

    #[test]
    fn a4_is_440() {
        assert_eq!(midi_note_to_freq(69), 440.0);
        assert!((midi_note_to_freq(81) - 880.0).abs() < 1e-3);
    }

    #[test]
    fn due_commands_start_and_stop_voices() {
        let state = state_at(1000);
        lock(&state.pending).push(command(60, 5, true));
        lock(&state.pending).push(command(60, 20, false));

        // 10 stereo frames at 1 kHz cover ticks up to 10.
        let mut data = vec![0.0f32; 20];
        process_audio_data(&mut data, &state, 2, 1000.0, 1.0);
        assert_eq!(state.now(), 10);
        assert!(lock(&state.voices).contains_key(&(0, 60)));
        assert!(data.iter().any(|s| *s != 0.0));
        assert_eq!(lock(&state.pending).len(), 1);

        process_audio_data(&mut data, &state, 2, 1000.0, 1.0);
        assert!(lock(&state.voices).is_empty());
        assert!(lock(&state.pending).is_empty());
    }

    #[test]
    fn silent_without_voices() {
        let state = state_at(48_000);
        let mut data = vec![1.0f32; 64];
        process_audio_data(&mut data, &state, 2, 48_000.0, 1.0);
        assert!(data.iter().all(|s| *s == 0.0));
        assert_eq!(state.frames_rendered.load(Ordering::Acquire), 32);
    }

    #[test]
    fn zero_velocity_note_on_releases() {
        let mut voices = std::collections::HashMap::new();
        apply_command(&mut voices, command(62, 0, true));
        let mut off = command(62, 0, true);
        off.velocity = 0;
        apply_command(&mut voices, off);
        assert!(voices.is_empty());
    }
}
