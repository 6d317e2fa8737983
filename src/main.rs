use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn, Level};

use gesture_conductor::audio::SynthSequencer;
use gesture_conductor::gesture::{SimulatedConductor, SimulationSettings};
use gesture_conductor::midi::MidiSequencer;
use gesture_conductor::sequencer::{NullSequencer, SequencerPort};
use gesture_conductor::{ConductorConfig, ConductorError, ConductorSession, Score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Built-in software synth on the default audio device
    Synth,
    /// External MIDI synthesizer
    Midi,
    /// Discard all notes
    Null,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Conduct a score with a tracked hand")]
struct Args {
    /// Score file
    #[arg(value_name = "SCORE")]
    score: String,

    /// Path to config TOML
    #[arg(long, default_value = "conductor.toml")]
    config: String,

    /// Where the notes go
    #[arg(long, value_enum, default_value_t = Backend::Synth)]
    backend: Backend,

    /// MIDI output port name (substring, overrides config)
    #[arg(long)]
    midi_port: Option<String>,

    /// Tempo of the simulated conducting hand
    #[arg(long, default_value_t = 100.0)]
    bpm: f64,

    /// Frame rate of the simulated hand tracker
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Log every beat (-v) or every frame (-vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn open_port(backend: Backend, config: &ConductorConfig) -> Box<dyn SequencerPort + Send> {
    let opened: Result<Box<dyn SequencerPort + Send>, ConductorError> = match backend {
        Backend::Synth => SynthSequencer::start(&config.output).map(|s| Box::new(s) as Box<dyn SequencerPort + Send>),
        Backend::Midi => MidiSequencer::open(&config.output).map(|m| Box::new(m) as Box<dyn SequencerPort + Send>),
        Backend::Null => Ok(Box::new(NullSequencer::new(config.output.late_tolerance))),
    };
    opened.unwrap_or_else(|e| {
        warn!("{e}; notes will be discarded");
        Box::new(NullSequencer::new(config.output.late_tolerance))
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = ConductorConfig::load_or_default(&args.config);
    if args.midi_port.is_some() {
        config.output.midi_port = args.midi_port.clone();
    }

    let score = match Score::load(&args.score) {
        Ok(score) => score,
        Err(e) => {
            error!("Cannot load score {}: {}", args.score, e);
            return ExitCode::FAILURE;
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = stop.clone();
    let settings = SimulationSettings {
        bpm: args.bpm,
        frames_per_second: args.fps,
        center: config.gesture.center(),
        ..SimulationSettings::default()
    };
    let frames = args.frames;
    let backend = args.backend;

    let control = tokio::task::spawn_blocking(move || -> Result<(), ConductorError> {
        let port = open_port(backend, &config);
        let mut session = ConductorSession::new(&config, score, port)?;
        let mut input = SimulatedConductor::new(settings);
        if let Some(frames) = frames {
            input = input.limit(frames);
        }
        let stats = session.run(&mut input, &loop_stop);
        info!(beats = stats.beats, notes = stats.notes, "performance finished");
        Ok(())
    });

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            signal_stop.store(true, Ordering::SeqCst);
        }
    });

    match control.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Control loop failed: {e}");
            ExitCode::FAILURE
        }
    }
}
