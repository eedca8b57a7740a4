//! Instrument tracks

use serde::{Deserialize, Serialize};

use crate::note::{ControlChange, Note};

/// One instrument's notes and controller data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    /// General MIDI program number
    pub program: u8,
    /// Percussion track (channel 10); never pitch shifted
    pub is_drum: bool,
    /// Notes, not guaranteed to be sorted after augmentation
    pub notes: Vec<Note>,
    pub control_changes: Vec<ControlChange>,
}

impl Track {
    pub fn new(program: u8, is_drum: bool, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program,
            is_drum,
            notes: Vec::new(),
            control_changes: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: Vec<Note>) -> Self {
        self.notes = notes;
        self
    }

    pub fn add_note(&mut self, note: Note) {
        self.notes.push(note);
    }

    pub fn remove_note(&mut self, index: usize) -> Option<Note> {
        if index < self.notes.len() {
            return Some(self.notes.remove(index));
        }
        None
    }

    pub fn add_control_change(&mut self, cc: ControlChange) {
        self.control_changes.push(cc);
    }

    /// Latest note end in seconds (0 for an empty track)
    pub fn end_time(&self) -> f64 {
        self.notes.iter().map(|n| n.end).fold(0.0, f64::max)
    }

    /// Sort notes by onset, then pitch
    pub fn sort_notes(&mut self) {
        self.notes
            .sort_by(|a, b| a.start.total_cmp(&b.start).then(a.pitch.cmp(&b.pitch)));
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_time_uses_latest_end() {
        let track = Track::new(0, false, "piano").with_notes(vec![
            Note::new(60, 100, 0.0, 3.0),
            Note::new(62, 100, 1.0, 2.0),
        ]);
        assert_eq!(track.end_time(), 3.0);
        assert_eq!(Track::default().end_time(), 0.0);
    }

    #[test]
    fn test_sort_notes() {
        let mut track = Track::new(0, false, "").with_notes(vec![
            Note::new(64, 100, 1.0, 2.0),
            Note::new(62, 100, 0.0, 1.0),
            Note::new(60, 100, 0.0, 1.0),
        ]);
        track.sort_notes();
        let pitches: Vec<u8> = track.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 62, 64]);
    }

    #[test]
    fn test_remove_note_out_of_range() {
        let mut track = Track::new(0, false, "").with_notes(vec![Note::new(60, 100, 0.0, 1.0)]);
        assert!(track.remove_note(3).is_none());
        assert!(track.remove_note(0).is_some());
        assert!(track.is_empty());
    }
}
