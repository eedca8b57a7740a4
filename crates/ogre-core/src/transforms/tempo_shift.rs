//! Random tempo change, optionally re-timing notes to follow it

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Gate, MIN_NOTE_LENGTH, check_range, impl_transform_boilerplate, uniform};
use crate::document::MusicDocument;
use crate::error::{OgreError, Result};
use crate::tempo::{TempoChange, TempoMap};

const NAME: &str = "TempoShift";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TempoShiftConfig {
    /// Lowest drawn tempo in BPM
    pub min_tempo: f64,
    /// Highest drawn tempo in BPM
    pub max_tempo: f64,
    /// Rescale note times so they stay on the same beats
    pub respect_tempo_shift: bool,
    /// Replace every tempo change with the single drawn tempo
    pub collapse_tempo_changes: bool,
    /// Only `p` applies: tempo is document level
    pub gate: Gate,
}

impl Default for TempoShiftConfig {
    fn default() -> Self {
        Self {
            min_tempo: 60.0,
            max_tempo: 180.0,
            respect_tempo_shift: true,
            collapse_tempo_changes: false,
            gate: Gate::default(),
        }
    }
}

/// Draws a new initial tempo and scales the rest of the tempo map with it.
#[derive(Debug, Clone)]
pub struct TempoShift {
    config: TempoShiftConfig,
}

impl TempoShift {
    pub fn new(config: TempoShiftConfig) -> Result<Self> {
        config.gate.validate(NAME)?;
        for (name, value) in [("min_tempo", config.min_tempo), ("max_tempo", config.max_tempo)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(OgreError::config(NAME, format!("{name} must be positive, got {value}")));
            }
        }
        check_range(NAME, "tempo", (config.min_tempo, config.max_tempo))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TempoShiftConfig {
        &self.config
    }

    fn apply_impl(&self, doc: &mut MusicDocument, rng: &mut dyn RngCore) -> Result<usize> {
        let cfg = &self.config;
        if !rng.gen_bool(cfg.gate.p) {
            debug!("TempoShift skipped by gate");
            return Ok(0);
        }

        let old_map = doc.tempo_map.clone();
        let new_bpm = uniform(rng, cfg.min_tempo, cfg.max_tempo);
        let new_map = self.shifted_map(&old_map, new_bpm)?;
        debug!(old_bpm = old_map.initial_bpm(), new_bpm, changes = new_map.len(), "Shifted tempo");

        if !cfg.respect_tempo_shift {
            doc.tempo_map = new_map;
            return Ok(0);
        }

        let retime = |t: f64| new_map.time_at_beats(old_map.beats_at(t)).max(0.0);
        let mut moved = 0;
        for track in &mut doc.tracks {
            for note in &mut track.notes {
                note.start = retime(note.start);
                note.end = retime(note.end).max(note.start + MIN_NOTE_LENGTH);
                moved += 1;
            }
            for cc in &mut track.control_changes {
                cc.time = retime(cc.time);
            }
        }
        doc.tempo_map = new_map;
        Ok(moved)
    }

    fn shifted_map(&self, old_map: &TempoMap, new_bpm: f64) -> Result<TempoMap> {
        let cfg = &self.config;
        if cfg.collapse_tempo_changes {
            return Ok(TempoMap::new(new_bpm));
        }

        let ratio = new_bpm / old_map.initial_bpm();
        let bpms: Vec<f64> = old_map
            .changes()
            .iter()
            .enumerate()
            .map(|(i, c)| match i {
                0 => new_bpm,
                _ => (c.bpm * ratio).clamp(cfg.min_tempo, cfg.max_tempo),
            })
            .collect();

        if !cfg.respect_tempo_shift {
            let changes = old_map
                .changes()
                .iter()
                .zip(&bpms)
                .map(|(c, &bpm)| TempoChange::new(c.time, bpm))
                .collect();
            return TempoMap::from_changes(changes);
        }

        // Keep each change point on its original beat under the new tempi
        let mut changes: Vec<TempoChange> = Vec::with_capacity(bpms.len());
        let mut prev_beats = 0.0;
        for (c, &bpm) in old_map.changes().iter().zip(&bpms) {
            let beats = old_map.beats_at(c.time);
            let time = match changes.last() {
                Some(prev) => prev.time + (beats - prev_beats) * 60.0 / prev.bpm,
                None => 0.0,
            };
            changes.push(TempoChange::new(time, bpm));
            prev_beats = beats;
        }
        TempoMap::from_changes(changes)
    }
}

impl_transform_boilerplate!(TempoShift, "TempoShift");
