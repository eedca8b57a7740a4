//! Random onset jitter with duration preserved

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{Gate, MIN_NOTE_LENGTH, impl_transform_boilerplate, selected_tracks, uniform};
use crate::document::MusicDocument;
use crate::error::{OgreError, Result};

const NAME: &str = "OnsetTimeShift";

/// Which way onsets may move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftMode {
    /// Only earlier
    Left,
    /// Only later
    Right,
    #[default]
    Both,
}

impl ShiftMode {
    /// Delta range for a given maximum shift
    fn range(self, max_shift: f64) -> (f64, f64) {
        match self {
            Self::Left => (-max_shift, 0.0),
            Self::Right => (0.0, max_shift),
            Self::Both => (-max_shift, max_shift),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OnsetTimeShiftConfig {
    /// Largest shift in seconds
    pub max_shift: f64,
    pub mode: ShiftMode,
    /// Keep shifted notes inside `[0, track end]`
    pub restrict_to_instrument_time: bool,
    pub include_drums: bool,
    pub gate: Gate,
}

impl Default for OnsetTimeShiftConfig {
    fn default() -> Self {
        Self {
            max_shift: 0.05,
            mode: ShiftMode::Both,
            restrict_to_instrument_time: false,
            include_drums: false,
            gate: Gate::default(),
        }
    }
}

/// Moves each selected note by a uniform delta. Notes are neither reordered
/// nor de-overlapped.
#[derive(Debug, Clone)]
pub struct OnsetTimeShift {
    config: OnsetTimeShiftConfig,
}

impl OnsetTimeShift {
    pub fn new(config: OnsetTimeShiftConfig) -> Result<Self> {
        config.gate.validate(NAME)?;
        if !(config.max_shift.is_finite() && config.max_shift >= 0.0) {
            return Err(OgreError::config(
                NAME,
                format!("max_shift must be non-negative, got {}", config.max_shift),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &OnsetTimeShiftConfig {
        &self.config
    }

    fn apply_impl(&self, doc: &mut MusicDocument, rng: &mut dyn RngCore) -> Result<usize> {
        let cfg = &self.config;
        let (low, high) = cfg.mode.range(cfg.max_shift);
        let mut shifted = 0;

        for idx in selected_tracks(doc, &cfg.gate, cfg.include_drums, rng) {
            let track = &mut doc.tracks[idx];
            let track_end = track.end_time();

            for note in &mut track.notes {
                if !cfg.gate.selects_note(rng) {
                    continue;
                }
                let delta = uniform(rng, low, high);
                let mut start = note.start + delta;
                if cfg.restrict_to_instrument_time {
                    start = start.min(track_end - note.duration());
                }
                let start = start.max(0.0);

                // Move the end by the effective delta so clamping keeps the duration
                let moved = start - note.start;
                note.start = start;
                note.end = (note.end + moved).max(start + MIN_NOTE_LENGTH);
                shifted += 1;
            }
        }
        Ok(shifted)
    }
}

impl_transform_boilerplate!(OnsetTimeShift, "OnsetTimeShift");
