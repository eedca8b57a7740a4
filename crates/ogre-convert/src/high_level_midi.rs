//! Conversion from the MIDI event stream to [`MusicDocument`]

use std::collections::{BTreeMap, HashMap, VecDeque};

use ogre_core::{ControlChange, DEFAULT_BPM, MusicDocument, Note, TempoChange, TempoMap, Track};
use tracing::{debug, warn};

use crate::conversion::Conversion;
use crate::error::Result;
use crate::midi_file::{DRUM_CHANNEL, EventKind, MidiFile};

/// Builds a seconds-based document from a MIDI file: note on/off pairs become
/// notes, tempo events become the tempo map, and every (track, channel) pair
/// becomes one [`Track`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertToHighLevelMidi;

impl<'a> Conversion<&'a MidiFile> for ConvertToHighLevelMidi {
    type Output = MusicDocument;

    fn name(&self) -> &'static str {
        "ConvertToHighLevelMidi"
    }

    fn apply(&self, midi: &'a MidiFile) -> Result<MusicDocument> {
        let clock = TickClock::new(midi);
        let mut doc = MusicDocument::new(clock.tempo_map()?);
        doc.ticks_per_beat = midi.ticks_per_beat;

        for (idx, track) in midi.tracks.iter().enumerate() {
            let name = track.name().unwrap_or_default();
            for instrument in collect_instruments(idx, track.absolute(), &clock, name) {
                doc.add_track(instrument);
            }
        }
        doc.sort_notes();

        debug!(tracks = doc.tracks.len(), notes = doc.note_count(), "Decoded MIDI document");
        Ok(doc)
    }
}

impl<'a> Conversion<&'a [u8]> for ConvertToHighLevelMidi {
    type Output = MusicDocument;

    fn name(&self) -> &'static str {
        "ConvertToHighLevelMidi"
    }

    fn apply(&self, input: &'a [u8]) -> Result<MusicDocument> {
        self.apply(&MidiFile::parse(input)?)
    }
}

/// Tick to seconds conversion over a piecewise-constant tempo
struct TickClock {
    ticks_per_beat: f64,
    /// (tick, seconds at tick, microseconds per beat)
    segments: Vec<(u32, f64, u32)>,
}

impl TickClock {
    fn new(midi: &MidiFile) -> Self {
        let ticks_per_beat = f64::from(midi.ticks_per_beat);
        let default_tempo = (60_000_000.0 / DEFAULT_BPM) as u32;
        let tempos = midi.tempo_events();
        if tempos.is_empty() {
            warn!(bpm = DEFAULT_BPM, "MIDI file has no tempo events, assuming default tempo");
        }

        let mut segments: Vec<(u32, f64, u32)> = vec![(0, 0.0, default_tempo)];
        for (tick, tempo) in tempos.into_iter().filter(|(_, t)| *t > 0) {
            let Some(&(last_tick, last_secs, last_tempo)) = segments.last() else {
                continue;
            };
            if tick == last_tick {
                // Later events at the same tick win
                if let Some(last) = segments.last_mut() {
                    last.2 = tempo;
                }
                continue;
            }
            let secs = last_secs + seconds(tick - last_tick, last_tempo, ticks_per_beat);
            segments.push((tick, secs, tempo));
        }
        Self { ticks_per_beat, segments }
    }

    fn seconds_at(&self, tick: u32) -> f64 {
        let (start, secs, tempo) = self
            .segments
            .iter()
            .rev()
            .find(|(t, _, _)| *t <= tick)
            .copied()
            .unwrap_or((0, 0.0, 500_000));
        secs + seconds(tick - start, tempo, self.ticks_per_beat)
    }

    fn tempo_map(&self) -> Result<TempoMap> {
        let changes = self
            .segments
            .iter()
            .map(|&(_, secs, tempo)| TempoChange::new(secs, 60_000_000.0 / f64::from(tempo)))
            .collect();
        Ok(TempoMap::from_changes(changes)?)
    }
}

fn seconds(ticks: u32, tempo: u32, ticks_per_beat: f64) -> f64 {
    f64::from(ticks) * f64::from(tempo) / 1_000_000.0 / ticks_per_beat
}

fn collect_instruments<'a>(
    track_idx: usize,
    events: impl Iterator<Item = (u32, &'a EventKind)>,
    clock: &TickClock,
    name: &str,
) -> Vec<Track> {
    let mut instruments: BTreeMap<u8, Track> = BTreeMap::new();
    let mut programs = [0u8; 16];
    let mut open: HashMap<(u8, u8), VecDeque<(u32, u8)>> = HashMap::new();
    let mut dropped = 0usize;

    for (tick, kind) in events {
        match *kind {
            EventKind::ProgramChange { channel, program } => {
                programs[usize::from(channel & 0x0F)] = program;
            }
            EventKind::NoteOn { channel, key, velocity } if velocity > 0 => {
                open.entry((channel, key)).or_default().push_back((tick, velocity));
            }
            EventKind::NoteOn { channel, key, .. } | EventKind::NoteOff { channel, key, .. } => {
                let Some((on, velocity)) = open.get_mut(&(channel, key)).and_then(VecDeque::pop_front) else {
                    continue;
                };
                let (start, end) = (clock.seconds_at(on), clock.seconds_at(tick));
                if end <= start {
                    dropped += 1;
                    continue;
                }
                instrument(&mut instruments, channel, &programs, name).add_note(Note::new(key, velocity, start, end));
            }
            EventKind::ControlChange { channel, controller, value } => {
                let time = clock.seconds_at(tick);
                instrument(&mut instruments, channel, &programs, name).add_control_change(ControlChange::new(controller, value, time));
            }
            EventKind::Tempo(_) | EventKind::TrackName(_) | EventKind::EndOfTrack => {}
        }
    }

    let unpaired: usize = open.values().map(VecDeque::len).sum();
    if unpaired > 0 {
        warn!(track = track_idx, unpaired, "Dropping note-ons without a matching note-off");
    }
    if dropped > 0 {
        debug!(track = track_idx, dropped, "Dropped zero-length notes");
    }

    instruments.into_values().filter(|t| !t.is_empty() || !t.control_changes.is_empty()).collect()
}

/// The track for `channel`, created with the channel's current program
fn instrument<'m>(
    instruments: &'m mut BTreeMap<u8, Track>,
    channel: u8,
    programs: &[u8; 16],
    name: &str,
) -> &'m mut Track {
    instruments.entry(channel).or_insert_with(|| {
        let program = programs[usize::from(channel & 0x0F)];
        Track::new(program, channel == DRUM_CHANNEL, name)
    })
}
