use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use tracing::{debug, info, warn};

use crate::config::OutputConfig;
use crate::error::{ConductorError, SchedulingError};
use crate::sequencer::{check_due, CommandQueue, NoteCommand, SequencerPort};
use crate::state::lock;
use crate::types::Tick;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;
const ALL_NOTES_OFF: u8 = 123;

/// Port names that usually belong to a General MIDI soft synth.
const SYNTH_HINTS: [&str; 5] = ["fluid", "timidity", "microsoft", "gm", "synth"];

struct Dispatch {
    conn: MidiOutputConnection,
    pending: CommandQueue,
    /// Keys currently held, so a panic stop can release them explicitly.
    held: HashSet<(u8, u8)>,
    quit: bool,
}

impl Dispatch {
    fn send(&mut self, message: &[u8]) {
        if let Err(e) = self.conn.send(message) {
            warn!("MIDI send failed: {}", e);
        }
    }

    fn play(&mut self, command: NoteCommand) {
        let channel = command.channel & 0x0F;
        if command.is_note_on && command.velocity > 0 {
            self.send(&[NOTE_ON | channel, command.key, command.velocity]);
            self.held.insert((channel, command.key));
        } else {
            self.send(&[NOTE_OFF | channel, command.key, 0]);
            self.held.remove(&(channel, command.key));
        }
    }
}

struct Shared {
    dispatch: Mutex<Dispatch>,
    wake: Condvar,
}

/// Sends scheduled commands to an external MIDI synthesizer. A dispatcher
/// thread sleeps until the earliest command is due.
pub struct MidiSequencer {
    shared: Arc<Shared>,
    started: Instant,
    tolerance: Tick,
    thread: Option<JoinHandle<()>>,
}

impl MidiSequencer {
    pub fn open(config: &OutputConfig) -> Result<Self, ConductorError> {
        let midi_out = MidiOutput::new("gesture_conductor")
            .map_err(|e| ConductorError::Device(format!("failed to create MIDI output: {e}")))?;

        let ports = midi_out.ports();
        if ports.is_empty() {
            return Err(ConductorError::Device("no MIDI output ports found".into()));
        }
        info!("Available MIDI output ports:");
        for (i, port) in ports.iter().enumerate() {
            info!("Port {}: {}", i, port_name(&midi_out, port));
        }

        let port = select_port(&midi_out, &ports, config.midi_port.as_deref())?;
        let name = port_name(&midi_out, port);
        info!("Using MIDI output: {}", name);

        let conn = midi_out
            .connect(port, "conductor-out")
            .map_err(|e| ConductorError::Device(format!("failed to connect to {name}: {e}")))?;

        let shared = Arc::new(Shared {
            dispatch: Mutex::new(Dispatch {
                conn,
                pending: CommandQueue::new(),
                held: HashSet::new(),
                quit: false,
            }),
            wake: Condvar::new(),
        });
        let started = Instant::now();
        let thread = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("midi-dispatch".into())
                .spawn(move || run_dispatcher(&shared, started))
                .map_err(|e| ConductorError::Device(format!("failed to spawn MIDI dispatcher: {e}")))?
        };

        Ok(Self {
            shared,
            started,
            tolerance: config.late_tolerance,
            thread: Some(thread),
        })
    }
}

impl SequencerPort for MidiSequencer {
    fn now(&self) -> Tick {
        self.started.elapsed().as_millis() as Tick
    }

    fn schedule(&mut self, command: NoteCommand) -> Result<(), SchedulingError> {
        check_due(command.tick, self.now(), self.tolerance)?;
        let mut dispatch = lock(&self.shared.dispatch);
        if dispatch.quit {
            return Err(SchedulingError::Unavailable("MIDI dispatcher stopped".into()));
        }
        dispatch.pending.push(command);
        self.shared.wake.notify_one();
        Ok(())
    }

    fn program_change(&mut self, channel: u8, program: u8) -> Result<(), SchedulingError> {
        let mut dispatch = lock(&self.shared.dispatch);
        dispatch
            .conn
            .send(&[PROGRAM_CHANGE | (channel & 0x0F), program & 0x7F])
            .map_err(|e| SchedulingError::Unavailable(e.to_string()))
    }

    fn all_notes_off(&mut self) {
        let mut dispatch = lock(&self.shared.dispatch);
        dispatch.pending.clear();
        let held: Vec<_> = dispatch.held.drain().collect();
        for (channel, key) in held {
            dispatch.send(&[NOTE_OFF | channel, key, 0]);
        }
        for channel in 0..16u8 {
            dispatch.send(&[CONTROL_CHANGE | channel, ALL_NOTES_OFF, 0]);
        }
        debug!("MIDI: all notes off");
    }
}

impl Drop for MidiSequencer {
    fn drop(&mut self) {
        lock(&self.shared.dispatch).quit = true;
        self.shared.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_dispatcher(shared: &Shared, started: Instant) {
    let mut dispatch = lock(&shared.dispatch);
    loop {
        if dispatch.quit {
            break;
        }
        let now = started.elapsed().as_millis() as Tick;
        for command in dispatch.pending.drain_due(now) {
            dispatch.play(command);
        }
        dispatch = match dispatch.pending.next_due() {
            Some(due) => {
                let wait = Duration::from_millis(due.saturating_sub(now).max(1));
                shared
                    .wake
                    .wait_timeout(dispatch, wait)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner().0)
            }
            None => shared
                .wake
                .wait(dispatch)
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        };
    }
    debug!("MIDI dispatcher stopped");
}

fn port_name(midi_out: &MidiOutput, port: &MidiOutputPort) -> String {
    midi_out.port_name(port).unwrap_or_else(|_| "Unknown".to_string())
}

/// Picks the port whose name contains `wanted`, else the first soft synth,
/// else the first port.
fn select_port<'a>(
    midi_out: &MidiOutput,
    ports: &'a [MidiOutputPort],
    wanted: Option<&str>,
) -> Result<&'a MidiOutputPort, ConductorError> {
    let names: Vec<String> = ports.iter().map(|p| port_name(midi_out, p)).collect();
    let index = match wanted {
        Some(wanted) => find_port(&names, &[wanted]).ok_or_else(|| {
            ConductorError::Device(format!("no MIDI output port matches '{wanted}'"))
        })?,
        None => find_port(&names, &SYNTH_HINTS).unwrap_or(0),
    };
    Ok(&ports[index])
}

fn find_port(names: &[String], needles: &[&str]) -> Option<usize> {
    names.iter().position(|name| {
        let name = name.to_lowercase();
        needles.iter().any(|needle| name.contains(&needle.to_lowercase()))
    })
}
