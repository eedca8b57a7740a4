//! Random note insertion

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Gate, MIN_NOTE_LENGTH, check_range, impl_transform_boilerplate, selected_tracks, uniform};
use crate::document::MusicDocument;
use crate::error::{OgreError, Result};
use crate::note::{MIDI_MAX, Note};

const NAME: &str = "NoteAdd";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoteAddConfig {
    /// Inclusive pitch range of added notes
    pub note_num_range: (u8, u8),
    /// Inclusive velocity range of added notes
    pub note_velocity_range: (u8, u8),
    /// Duration range in seconds
    pub note_duration_range: (f64, f64),
    /// Insertion attempts per track; each succeeds with `gate.p_note`
    pub max_notes: usize,
    /// Clip added notes to the track's last original note end
    pub restrict_to_instrument_time: bool,
    pub gate: Gate,
}

impl Default for NoteAddConfig {
    fn default() -> Self {
        Self {
            note_num_range: (36, 96),
            note_velocity_range: (40, 110),
            note_duration_range: (0.1, 1.0),
            max_notes: 8,
            restrict_to_instrument_time: true,
            gate: Gate::default().with_p_note(0.5),
        }
    }
}

/// Appends random notes inside each selected track's time span. Added notes
/// may overlap existing ones.
#[derive(Debug, Clone)]
pub struct NoteAdd {
    config: NoteAddConfig,
}

impl NoteAdd {
    pub fn new(config: NoteAddConfig) -> Result<Self> {
        config.gate.validate(NAME)?;
        check_range(NAME, "note_num_range", config.note_num_range)?;
        check_range(NAME, "note_velocity_range", config.note_velocity_range)?;
        check_range(NAME, "note_duration_range", config.note_duration_range)?;
        if config.note_num_range.1 > MIDI_MAX || config.note_velocity_range.1 > MIDI_MAX {
            return Err(OgreError::config(NAME, "note numbers and velocities must be below 128"));
        }
        let (min_duration, max_duration) = config.note_duration_range;
        if !(min_duration.is_finite() && max_duration.is_finite() && min_duration > 0.0) {
            return Err(OgreError::config(
                NAME,
                format!("note durations must be positive, got {min_duration}..{max_duration}"),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &NoteAddConfig {
        &self.config
    }

    fn random_note(&self, rng: &mut dyn RngCore, track_end: f64) -> Note {
        let cfg = &self.config;
        let pitch = rng.gen_range(cfg.note_num_range.0..=cfg.note_num_range.1);
        let velocity = rng.gen_range(cfg.note_velocity_range.0..=cfg.note_velocity_range.1);
        let duration = uniform(rng, cfg.note_duration_range.0, cfg.note_duration_range.1);
        let start = rng.gen_range(0.0..track_end);

        let mut end = start + duration;
        if cfg.restrict_to_instrument_time {
            end = end.min(track_end);
        }
        Note::new(pitch, velocity, start, end.max(start + MIN_NOTE_LENGTH))
    }

    fn apply_impl(&self, doc: &mut MusicDocument, rng: &mut dyn RngCore) -> Result<usize> {
        let cfg = &self.config;
        let mut added = 0;

        for idx in selected_tracks(doc, &cfg.gate, false, rng) {
            let track_end = doc.tracks[idx].end_time();
            if track_end <= 0.0 {
                debug!(track = idx, "NoteAdd has no time span on an empty track, skipping");
                continue;
            }

            for _ in 0..cfg.max_notes {
                if !cfg.gate.selects_note(rng) {
                    continue;
                }
                let note = self.random_note(rng, track_end);
                doc.tracks[idx].add_note(note);
                added += 1;
            }
        }
        Ok(added)
    }
}

impl_transform_boilerplate!(NoteAdd, "NoteAdd");
