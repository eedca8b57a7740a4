//! Random transposition of note pitches

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use super::{Gate, check_range, impl_transform_boilerplate, selected_tracks};
use crate::document::MusicDocument;
use crate::error::{OgreError, Result};
use crate::note::MIDI_MAX;

const NAME: &str = "PitchShift";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PitchShiftConfig {
    /// Lowest semitone offset (inclusive, may be negative)
    pub min_shift: i8,
    /// Highest semitone offset (inclusive)
    pub max_shift: i8,
    pub gate: Gate,
}

impl Default for PitchShiftConfig {
    fn default() -> Self {
        Self {
            min_shift: -2,
            max_shift: 2,
            gate: Gate::default(),
        }
    }
}

/// Transposes notes on non-drum tracks by a uniform semitone offset,
/// clamping to the MIDI range instead of dropping notes.
#[derive(Debug, Clone)]
pub struct PitchShift {
    config: PitchShiftConfig,
}

impl PitchShift {
    pub fn new(config: PitchShiftConfig) -> Result<Self> {
        config.gate.validate(NAME)?;
        check_range(NAME, "shift", (config.min_shift, config.max_shift))?;
        let limit = MIDI_MAX as i16;
        if (config.min_shift as i16).abs() > limit || (config.max_shift as i16).abs() > limit {
            return Err(OgreError::config(NAME, "notes cannot be shifted by more than 127 semitones"));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PitchShiftConfig {
        &self.config
    }

    fn apply_impl(&self, doc: &mut MusicDocument, rng: &mut dyn RngCore) -> Result<usize> {
        let PitchShiftConfig { min_shift, max_shift, gate } = self.config;
        let mut shifted = 0;

        for idx in selected_tracks(doc, &gate, false, rng) {
            for note in &mut doc.tracks[idx].notes {
                if !gate.selects_note(rng) {
                    continue;
                }
                let offset = rng.gen_range(min_shift as i16..=max_shift as i16);
                note.pitch = (note.pitch as i16 + offset).clamp(0, MIDI_MAX as i16) as u8;
                shifted += 1;
            }
        }
        Ok(shifted)
    }
}

impl_transform_boilerplate!(PitchShift, "PitchShift");
