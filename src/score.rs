//! Score model and the minimal text loader.
//!
//! The text form is a stream of whitespace separated integers (`#` starts a
//! comment that runs to the end of the line):
//!
//! ```text
//! programCount noteCount PPQN
//! channel program                           (programCount times)
//! beatIndex tickOffset channel key isNoteOn (noteCount times)
//! ```

use std::fs;
use std::path::Path;

use crate::error::ScoreError;

pub const MIDI_CHANNELS: i64 = 16;

/// One note-on or note-off, placed `tick_offset` PPQN pulses after the start
/// of beat `beat_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreEvent {
    pub beat_index: i64,
    pub tick_offset: u32,
    pub channel: u8,
    pub key: u8,
    pub is_note_on: bool,
}

impl ScoreEvent {
    fn order_key(&self) -> (i64, u32) {
        (self.beat_index, self.tick_offset)
    }
}

/// Instrument selection applied at start and on every loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAssignment {
    pub channel: u8,
    pub program: u8,
}

/// A validated score: events sorted by `(beat_index, tick_offset)`, every
/// channel, key and program in MIDI range, at least one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    ppqn: u32,
    programs: Vec<ProgramAssignment>,
    events: Vec<ScoreEvent>,
}

impl Score {
    pub fn new(
        ppqn: u32,
        programs: Vec<ProgramAssignment>,
        events: Vec<ScoreEvent>,
    ) -> Result<Self, ScoreError> {
        if ppqn == 0 {
            return Err(ScoreError::InvalidPpqn { ppqn: 0 });
        }
        if events.is_empty() {
            return Err(ScoreError::Empty);
        }
        for program in &programs {
            check_channel(i64::from(program.channel))?;
            check_midi("program", i64::from(program.program))?;
        }
        for event in &events {
            check_channel(i64::from(event.channel))?;
            check_midi("key", i64::from(event.key))?;
            if event.beat_index < 0 {
                return Err(ScoreError::NegativeBeat {
                    beat_index: event.beat_index,
                });
            }
        }
        if let Some(index) = events
            .windows(2)
            .position(|pair| pair[0].order_key() > pair[1].order_key())
        {
            let event = events[index + 1];
            return Err(ScoreError::Unsorted {
                index: index + 1,
                beat_index: event.beat_index,
                tick_offset: event.tick_offset,
            });
        }
        Ok(Self {
            ppqn,
            programs,
            events,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ScoreError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&text)
    }

    /// Parses the text form. Events are stably sorted before validation.
    pub fn parse(text: &str) -> Result<Self, ScoreError> {
        let mut tokens = Tokens::new(text);

        let program_count = tokens.count("program count")?;
        let note_count = tokens.count("note count")?;
        let ppqn = tokens.int("PPQN", "header")?;
        if ppqn <= 0 || ppqn > i64::from(u32::MAX) {
            return Err(ScoreError::InvalidPpqn { ppqn });
        }

        let mut programs = Vec::new();
        for parsed in 0..program_count {
            let what = "program assignments";
            let channel = tokens.entry("channel", what, program_count, parsed)?;
            let program = tokens.entry("program", what, program_count, parsed)?;
            programs.push(ProgramAssignment {
                channel: check_channel(channel)?,
                program: check_midi("program", program)?,
            });
        }

        let mut events = Vec::new();
        for parsed in 0..note_count {
            let what = "note events";
            let beat_index = tokens.entry("beat index", what, note_count, parsed)?;
            let tick_offset = tokens.entry("tick offset", what, note_count, parsed)?;
            let channel = tokens.entry("channel", what, note_count, parsed)?;
            let key = tokens.entry("key", what, note_count, parsed)?;
            let flag = tokens.entry("note-on flag", what, note_count, parsed)?;

            if beat_index < 0 {
                return Err(ScoreError::NegativeBeat { beat_index });
            }
            let tick_offset = u32::try_from(tick_offset).map_err(|_| ScoreError::InvalidNumber {
                field: "tick offset",
                token: tick_offset.to_string(),
            })?;
            let is_note_on = match flag {
                0 => false,
                1 => true,
                value => return Err(ScoreError::InvalidNoteFlag { value }),
            };
            events.push(ScoreEvent {
                beat_index,
                tick_offset,
                channel: check_channel(channel)?,
                key: check_midi("key", key)?,
                is_note_on,
            });
        }

        if let Some(token) = tokens.next_raw() {
            return Err(ScoreError::TrailingData {
                token: token.to_string(),
            });
        }

        events.sort_by_key(ScoreEvent::order_key);
        Self::new(ppqn as u32, programs, events)
    }

    pub fn ppqn(&self) -> u32 {
        self.ppqn
    }

    pub fn programs(&self) -> &[ProgramAssignment] {
        &self.programs
    }

    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Beat index of the final event.
    pub fn last_beat(&self) -> i64 {
        self.events.last().map_or(0, |e| e.beat_index)
    }
}

fn check_channel(channel: i64) -> Result<u8, ScoreError> {
    if (0..MIDI_CHANNELS).contains(&channel) {
        Ok(channel as u8)
    } else {
        Err(ScoreError::ChannelOutOfRange { channel })
    }
}

fn check_midi(field: &'static str, value: i64) -> Result<u8, ScoreError> {
    if (0..128).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ScoreError::MidiValueOutOfRange { field, value })
    }
}

struct Tokens<'a> {
    inner: Box<dyn Iterator<Item = &'a str> + 'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let inner = text
            .lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(str::split_whitespace);
        Self {
            inner: Box::new(inner),
        }
    }

    fn next_raw(&mut self) -> Option<&'a str> {
        self.inner.next()
    }

    fn int(&mut self, field: &'static str, what: &'static str) -> Result<i64, ScoreError> {
        let token = self.next_raw().ok_or(ScoreError::Truncated {
            what,
            expected: 3,
            found: 0,
        })?;
        parse_int(field, token)
    }

    fn count(&mut self, field: &'static str) -> Result<usize, ScoreError> {
        let value = self.int(field, "header")?;
        usize::try_from(value).map_err(|_| ScoreError::InvalidNumber {
            field,
            token: value.to_string(),
        })
    }

    fn entry(
        &mut self,
        field: &'static str,
        what: &'static str,
        expected: usize,
        parsed: usize,
    ) -> Result<i64, ScoreError> {
        let token = self.next_raw().ok_or(ScoreError::Truncated {
            what,
            expected,
            found: parsed,
        })?;
        parse_int(field, token)
    }
}

fn parse_int(field: &'static str, token: &str) -> Result<i64, ScoreError> {
    token.parse::<i64>().map_err(|_| ScoreError::InvalidNumber {
        field,
        token: token.to_string(),
    })
}
