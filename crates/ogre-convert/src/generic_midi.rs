//! Conversion into the generic MIDI event stream

use ogre_core::{MusicDocument, TempoMap, Track};
use tracing::{debug, warn};

use crate::conversion::Conversion;
use crate::error::Result;
use crate::midi_file::{DRUM_CHANNEL, EventKind, MAX_TEMPO, MidiFile, MidiTrack};

/// Parses SMF bytes, or renders a [`MusicDocument`] as a format 1 file with a
/// leading tempo track and one track per instrument.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertToGenericMidi;

impl<'a> Conversion<&'a [u8]> for ConvertToGenericMidi {
    type Output = MidiFile;

    fn name(&self) -> &'static str {
        "ConvertToGenericMidi"
    }

    fn apply(&self, input: &'a [u8]) -> Result<MidiFile> {
        MidiFile::parse(input)
    }
}

impl<'a> Conversion<&'a MusicDocument> for ConvertToGenericMidi {
    type Output = MidiFile;

    fn name(&self) -> &'static str {
        "ConvertToGenericMidi"
    }

    fn apply(&self, doc: &'a MusicDocument) -> Result<MidiFile> {
        doc.validate()?;
        let tpb = doc.ticks_per_beat;
        let mut file = MidiFile::new(tpb);
        file.tracks.push(tempo_track(&doc.tempo_map, tpb));

        let mut melodic = (0u8..16).filter(|c| *c != DRUM_CHANNEL).cycle();
        for track in &doc.tracks {
            let channel = match track.is_drum {
                true => DRUM_CHANNEL,
                false => melodic.next().unwrap_or(0),
            };
            file.tracks.push(instrument_track(track, channel, &doc.tempo_map, tpb));
        }

        debug!(tracks = file.tracks.len(), notes = doc.note_count(), "Rendered document as MIDI");
        Ok(file)
    }
}

fn to_tick(map: &TempoMap, tpb: u16, seconds: f64) -> u32 {
    (map.beats_at(seconds) * f64::from(tpb)).round().max(0.0) as u32
}

fn tempo_track(map: &TempoMap, tpb: u16) -> MidiTrack {
    let events = map
        .changes()
        .iter()
        .map(|change| {
            let micros = (60_000_000.0 / change.bpm).round().clamp(1.0, f64::from(MAX_TEMPO));
            (to_tick(map, tpb, change.time), EventKind::Tempo(micros as u32))
        })
        .collect();
    MidiTrack::from_absolute(events)
}

fn instrument_track(track: &Track, channel: u8, map: &TempoMap, tpb: u16) -> MidiTrack {
    // Ordering within a tick: name and program, then releases, controllers, onsets
    let mut events: Vec<(u32, u8, EventKind)> = vec![
        (0, 0, EventKind::TrackName(track.name.clone())),
        (0, 0, EventKind::ProgramChange { channel, program: track.program }),
    ];

    for cc in &track.control_changes {
        events.push((
            to_tick(map, tpb, cc.time),
            2,
            EventKind::ControlChange { channel, controller: cc.number, value: cc.value },
        ));
    }

    let mut silent = 0usize;
    for note in &track.notes {
        let on = to_tick(map, tpb, note.start);
        // Notes shorter than a tick keep one tick so they survive the round trip
        let off = to_tick(map, tpb, note.end).max(on.saturating_add(1));
        // A note-on with velocity 0 reads back as a note-off
        if note.velocity == 0 {
            silent += 1;
        }
        let velocity = note.velocity.max(1);
        events.push((on, 3, EventKind::NoteOn { channel, key: note.pitch, velocity }));
        events.push((off, 1, EventKind::NoteOff { channel, key: note.pitch, velocity: 0 }));
    }
    if silent > 0 {
        warn!(track = %track.name, silent, "Raising velocity 0 notes to 1 for MIDI output");
    }

    events.sort_by_key(|(tick, order, _)| (*tick, *order));
    MidiTrack::from_absolute(events.into_iter().map(|(tick, _, kind)| (tick, kind)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogre_core::{ControlChange, Note};

    fn doc() -> MusicDocument {
        let mut piano = Track::new(0, false, "piano").with_notes(vec![
            Note::new(60, 100, 0.0, 0.5),
            Note::new(60, 90, 0.5, 1.0),
        ]);
        piano.add_control_change(ControlChange::new(64, 127, 0.25));
        let drums = Track::new(0, true, "drums").with_notes(vec![Note::new(36, 110, 0.0, 0.1)]);
        MusicDocument::default().with_track(piano).with_track(drums)
    }

    fn kinds(track: &MidiTrack) -> Vec<(u32, &EventKind)> {
        track.absolute().collect()
    }

    #[test]
    fn test_document_layout() {
        let file = ConvertToGenericMidi.apply(&doc()).unwrap();
        assert_eq!(file.ticks_per_beat, 480);
        assert_eq!(file.tracks.len(), 3);
        assert_eq!(kinds(&file.tracks[0])[0], (0, &EventKind::Tempo(500_000)));
        assert_eq!(file.tracks[1].name(), Some("piano"));
        assert_eq!(file.tracks[2].name(), Some("drums"));

        let drum_channels: Vec<u8> = file.tracks[2]
            .events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::NoteOn { channel, .. } => Some(channel),
                _ => None,
            })
            .collect();
        assert_eq!(drum_channels, vec![DRUM_CHANNEL]);
    }

    #[test]
    fn test_release_precedes_repeated_onset() {
        let file = ConvertToGenericMidi.apply(&doc()).unwrap();
        let at_half: Vec<&EventKind> = kinds(&file.tracks[1])
            .into_iter()
            .filter(|(tick, _)| *tick == 480)
            .map(|(_, kind)| kind)
            .collect();
        assert_eq!(
            at_half,
            vec![
                &EventKind::NoteOff { channel: 0, key: 60, velocity: 0 },
                &EventKind::NoteOn { channel: 0, key: 60, velocity: 90 },
            ]
        );
        assert!(kinds(&file.tracks[1]).contains(&(240, &EventKind::ControlChange {
            channel: 0,
            controller: 64,
            value: 127,
        })));
    }

    #[test]
    fn test_melodic_channels_skip_drums() {
        let mut doc = MusicDocument::default();
        for i in 0..11 {
            doc.add_track(Track::new(i, false, format!("t{i}")).with_notes(vec![Note::new(60, 64, 0.0, 1.0)]));
        }
        let file = ConvertToGenericMidi.apply(&doc).unwrap();
        let channels: Vec<u8> = file.tracks[1..]
            .iter()
            .filter_map(|t| {
                t.events.iter().find_map(|e| match e.kind {
                    EventKind::NoteOn { channel, .. } => Some(channel),
                    _ => None,
                })
            })
            .collect();
        assert_eq!(channels, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11]);
    }

    #[test]
    fn test_silent_notes_written_audible() {
        let doc = MusicDocument::default().with_track(Track::new(0, false, "soft").with_notes(vec![
            Note::new(60, 100, 0.0, 2.0),
            Note::new(60, 0, 0.5, 1.0),
        ]));
        let file = ConvertToGenericMidi.apply(&doc).unwrap();
        let onsets: Vec<u8> = file.tracks[1]
            .events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::NoteOn { velocity, .. } => Some(velocity),
                _ => None,
            })
            .collect();
        assert_eq!(onsets, vec![100, 1]);
    }

    #[test]
    fn test_note_at_last_tick_does_not_overflow() {
        let map = TempoMap::new(120.0);
        let track = Track::new(0, false, "long").with_notes(vec![Note::new(60, 100, 1e12, 1e12 + 1.0)]);
        let midi = instrument_track(&track, 0, &map, 480);
        let ticks: Vec<u32> = midi
            .absolute()
            .filter(|(_, kind)| matches!(kind, EventKind::NoteOn { .. } | EventKind::NoteOff { .. }))
            .map(|(tick, _)| tick)
            .collect();
        assert_eq!(ticks, vec![u32::MAX, u32::MAX]);
    }

    #[test]
    fn test_malformed_document_rejected() {
        let doc = MusicDocument::default()
            .with_track(Track::new(0, false, "bad").with_notes(vec![Note::new(60, 100, 1.0, 0.5)]));
        assert!(ConvertToGenericMidi.apply(&doc).is_err());
    }
}
