//! Song document containing tracks and tempo

use serde::{Deserialize, Serialize};

use crate::error::{OgreError, Result};
use crate::tempo::TempoMap;
use crate::track::Track;

/// Ticks per quarter note used when a document is written back to MIDI
pub const DEFAULT_TICKS_PER_BEAT: u16 = 480;

/// In-memory song: instrument tracks plus a tempo map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicDocument {
    pub tracks: Vec<Track>,
    pub tempo_map: TempoMap,
    pub ticks_per_beat: u16,
}

impl Default for MusicDocument {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            tempo_map: TempoMap::default(),
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
        }
    }
}

impl MusicDocument {
    pub fn new(tempo_map: TempoMap) -> Self {
        Self {
            tempo_map,
            ..Default::default()
        }
    }

    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    /// Latest note end across all tracks
    pub fn end_time(&self) -> f64 {
        self.tracks.iter().map(Track::end_time).fold(0.0, f64::max)
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    pub fn sort_notes(&mut self) {
        self.tracks.iter_mut().for_each(Track::sort_notes);
    }

    /// Shape check run before a transform touches the document
    pub fn validate(&self) -> Result<()> {
        self.tempo_map.validate()?;
        for (track_idx, track) in self.tracks.iter().enumerate() {
            if let Some((note_idx, note)) = track.notes.iter().enumerate().find(|(_, n)| !n.is_valid()) {
                return Err(OgreError::InvalidDocument(format!(
                    "track {track_idx} note {note_idx} is malformed: {note:?}"
                )));
            }
            if track.control_changes.iter().any(|cc| cc.value > 127 || cc.number > 127 || !(cc.time >= 0.0)) {
                return Err(OgreError::InvalidDocument(format!(
                    "track {track_idx} has a malformed control change"
                )));
            }
        }
        Ok(())
    }
}
