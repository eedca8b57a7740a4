//! Owned Standard MIDI File event stream
//
// Output is SMF Format 1 (multi-track) with metrical timing.

use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};

/// Largest delta time an SMF event can carry
pub const MAX_DELTA: u32 = (1 << 28) - 1;
/// Largest microseconds-per-beat value a tempo event can carry
pub const MAX_TEMPO: u32 = (1 << 24) - 1;
/// General MIDI percussion channel (0-based)
pub const DRUM_CHANNEL: u8 = 9;

/// The subset of MIDI events ogre reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Microseconds per quarter note
    Tempo(u32),
    TrackName(String),
    EndOfTrack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    /// Ticks since the previous event in the track
    pub delta: u32,
    pub kind: EventKind,
}

impl MidiEvent {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiTrack {
    pub events: Vec<MidiEvent>,
}

impl MidiTrack {
    /// Build a track from events at absolute ticks; the sort is stable
    pub fn from_absolute(mut events: Vec<(u32, EventKind)>) -> Self {
        events.sort_by_key(|(tick, _)| *tick);
        let mut last = 0;
        let mut out: Vec<MidiEvent> = events
            .into_iter()
            .map(|(tick, kind)| {
                let delta = tick - last;
                last = tick;
                MidiEvent::new(delta, kind)
            })
            .collect();
        out.push(MidiEvent::new(0, EventKind::EndOfTrack));
        Self { events: out }
    }

    /// Events paired with their absolute tick
    pub fn absolute(&self) -> impl Iterator<Item = (u32, &EventKind)> {
        self.events.iter().scan(0u32, |tick, event| {
            *tick = tick.saturating_add(event.delta);
            Some((*tick, &event.kind))
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match &e.kind {
            EventKind::TrackName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    fn from_midly(events: &[TrackEvent<'_>]) -> Self {
        // Deltas of skipped events are folded into the next kept one
        let mut pending = 0u32;
        let mut out = Vec::with_capacity(events.len());

        for event in events {
            pending = pending.saturating_add(event.delta.as_int());
            let kind = match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                            channel,
                            key: key.as_int(),
                            velocity: vel.as_int(),
                        },
                        MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                            channel,
                            key: key.as_int(),
                            velocity: vel.as_int(),
                        },
                        MidiMessage::Controller { controller, value } => EventKind::ControlChange {
                            channel,
                            controller: controller.as_int(),
                            value: value.as_int(),
                        },
                        MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                            channel,
                            program: program.as_int(),
                        },
                        _ => continue,
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => EventKind::Tempo(tempo.as_int()),
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    let name = String::from_utf8_lossy(name);
                    EventKind::TrackName(name.trim_end_matches('\0').trim().to_string())
                }
                TrackEventKind::Meta(MetaMessage::EndOfTrack) => EventKind::EndOfTrack,
                _ => continue,
            };
            out.push(MidiEvent::new(pending, kind));
            pending = 0;
        }
        Self { events: out }
    }

    fn to_midly(&self) -> Result<Vec<TrackEvent<'_>>> {
        let mut events = Vec::with_capacity(self.events.len() + 1);
        for event in &self.events {
            if event.delta > MAX_DELTA {
                return Err(ConvertError::Midi(format!("delta {} exceeds {MAX_DELTA}", event.delta)));
            }
            let kind = match &event.kind {
                EventKind::NoteOn { channel, key, velocity } => midi(*channel, MidiMessage::NoteOn {
                    key: data_byte(*key, "key")?,
                    vel: data_byte(*velocity, "velocity")?,
                })?,
                EventKind::NoteOff { channel, key, velocity } => midi(*channel, MidiMessage::NoteOff {
                    key: data_byte(*key, "key")?,
                    vel: data_byte(*velocity, "velocity")?,
                })?,
                EventKind::ControlChange { channel, controller, value } => midi(*channel, MidiMessage::Controller {
                    controller: data_byte(*controller, "controller")?,
                    value: data_byte(*value, "controller value")?,
                })?,
                EventKind::ProgramChange { channel, program } => midi(*channel, MidiMessage::ProgramChange {
                    program: data_byte(*program, "program")?,
                })?,
                EventKind::Tempo(tempo) => {
                    if *tempo > MAX_TEMPO {
                        return Err(ConvertError::Midi(format!("tempo {tempo} exceeds {MAX_TEMPO}")));
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(u24::new(*tempo)))
                }
                EventKind::TrackName(name) => TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
                EventKind::EndOfTrack => TrackEventKind::Meta(MetaMessage::EndOfTrack),
            };
            events.push(TrackEvent {
                delta: u28::new(event.delta),
                kind,
            });
        }

        if !matches!(self.events.last().map(|e| &e.kind), Some(EventKind::EndOfTrack)) {
            events.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
        }
        Ok(events)
    }
}

fn data_byte(value: u8, what: &str) -> Result<u7> {
    if value > 127 {
        return Err(ConvertError::Midi(format!("{what} {value} is out of range 0-127")));
    }
    Ok(u7::new(value))
}

fn midi(channel: u8, message: MidiMessage) -> Result<TrackEventKind<'static>> {
    if channel > 15 {
        return Err(ConvertError::Midi(format!("channel {channel} is out of range 0-15")));
    }
    Ok(TrackEventKind::Midi {
        channel: u4::new(channel),
        message,
    })
}

/// A parsed or generated MIDI file, independent of the input buffer
#[derive(Debug, Clone, PartialEq)]
pub struct MidiFile {
    pub format: Format,
    pub ticks_per_beat: u16,
    pub tracks: Vec<MidiTrack>,
}

impl MidiFile {
    pub fn new(ticks_per_beat: u16) -> Self {
        Self {
            format: Format::Parallel,
            ticks_per_beat,
            tracks: Vec::new(),
        }
    }

    /// Parse SMF bytes. Only metrical timing is accepted.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let smf = Smf::parse(bytes)?;
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int(),
            Timing::Timecode(..) => return Err(ConvertError::UnsupportedTiming),
        };
        if ticks_per_beat == 0 {
            return Err(ConvertError::UnsupportedTiming);
        }

        let tracks: Vec<MidiTrack> = smf.tracks.iter().map(|t| MidiTrack::from_midly(t)).collect();
        let file = Self {
            format: smf.header.format,
            ticks_per_beat,
            tracks,
        };
        file.warn_misplaced_tempo();
        debug!(
            tracks = file.tracks.len(),
            ticks_per_beat,
            format = ?file.format,
            "Parsed MIDI file"
        );
        Ok(file)
    }

    /// Serialize to SMF bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.ticks_per_beat == 0 || self.ticks_per_beat > 0x7FFF {
            return Err(ConvertError::Midi(format!(
                "ticks per beat {} is out of range 1-32767",
                self.ticks_per_beat
            )));
        }
        let mut smf = Smf::new(Header::new(self.format, Timing::Metrical(u15::new(self.ticks_per_beat))));
        for track in &self.tracks {
            smf.tracks.push(track.to_midly()?);
        }

        let mut buf = Vec::new();
        smf.write(&mut buf)
            .map_err(|e| ConvertError::Midi(format!("Failed to write MIDI: {e}")))?;
        Ok(buf)
    }

    /// Every tempo event in the file as (tick, microseconds per beat), in tick order
    pub fn tempo_events(&self) -> Vec<(u32, u32)> {
        let mut tempos: Vec<(u32, u32)> = self
            .tracks
            .iter()
            .flat_map(|track| {
                track.absolute().filter_map(|(tick, kind)| match kind {
                    EventKind::Tempo(tempo) => Some((tick, *tempo)),
                    _ => None,
                })
            })
            .collect();
        tempos.sort_by_key(|(tick, _)| *tick);
        tempos
    }

    fn warn_misplaced_tempo(&self) {
        if self.format != Format::Parallel {
            return;
        }
        for (idx, track) in self.tracks.iter().enumerate().skip(1) {
            if track.events.iter().any(|e| matches!(e.kind, EventKind::Tempo(_))) {
                warn!(track = idx, "Tempo event outside the first track of a format 1 file");
            }
        }
    }
}
