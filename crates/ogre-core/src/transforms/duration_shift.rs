//! Random scaling of note durations

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{Gate, MIN_NOTE_LENGTH, check_range, impl_transform_boilerplate, selected_tracks, uniform};
use crate::document::MusicDocument;
use crate::error::{OgreError, Result};

const NAME: &str = "DurationShift";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DurationShiftConfig {
    /// Smallest duration multiplier
    pub min_duration: f64,
    /// Largest duration multiplier
    pub max_duration: f64,
    /// Never extend a note past the track's last original note end
    pub restrict_to_instrument_time: bool,
    /// Shortest resulting note, in seconds
    pub min_note_length: f64,
    pub include_drums: bool,
    pub gate: Gate,
}

impl Default for DurationShiftConfig {
    fn default() -> Self {
        Self {
            min_duration: 0.5,
            max_duration: 1.5,
            restrict_to_instrument_time: false,
            min_note_length: MIN_NOTE_LENGTH,
            include_drums: false,
            gate: Gate::default(),
        }
    }
}

/// Scales each selected note's duration by a uniform ratio, keeping its onset.
#[derive(Debug, Clone)]
pub struct DurationShift {
    config: DurationShiftConfig,
}

impl DurationShift {
    pub fn new(config: DurationShiftConfig) -> Result<Self> {
        config.gate.validate(NAME)?;
        for (name, value) in [("min_duration", config.min_duration), ("max_duration", config.max_duration)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(OgreError::config(NAME, format!("{name} must be a non-negative ratio, got {value}")));
            }
        }
        check_range(NAME, "duration", (config.min_duration, config.max_duration))?;
        if !(config.min_note_length.is_finite() && config.min_note_length > 0.0) {
            return Err(OgreError::config(
                NAME,
                format!("min_note_length must be positive, got {}", config.min_note_length),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &DurationShiftConfig {
        &self.config
    }

    fn apply_impl(&self, doc: &mut MusicDocument, rng: &mut dyn RngCore) -> Result<usize> {
        let cfg = &self.config;
        let mut shifted = 0;

        for idx in selected_tracks(doc, &cfg.gate, cfg.include_drums, rng) {
            let track = &mut doc.tracks[idx];
            let track_end = track.end_time();

            for note in &mut track.notes {
                if !cfg.gate.selects_note(rng) {
                    continue;
                }
                let ratio = uniform(rng, cfg.min_duration, cfg.max_duration);
                let mut end = note.end + note.duration() * (ratio - 1.0);
                if cfg.restrict_to_instrument_time {
                    end = end.min(track_end);
                }
                note.end = end.max(note.start + cfg.min_note_length);
                shifted += 1;
            }
        }
        Ok(shifted)
    }
}

impl_transform_boilerplate!(DurationShift, "DurationShift");

#[cfg(test)]
mod tests {
    use super::super::Transform;
    use super::super::test_support::*;
    use super::*;

    fn ratios(min_duration: f64, max_duration: f64) -> DurationShiftConfig {
        DurationShiftConfig {
            min_duration,
            max_duration,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(DurationShift::new(ratios(-0.5, 1.0)).is_err());
        assert!(DurationShift::new(ratios(1.5, 1.0)).is_err());
        assert!(DurationShift::new(DurationShiftConfig {
            min_note_length: 0.0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_unit_ratio_is_noop() {
        let original = piano_doc(6);
        let doc = DurationShift::new(ratios(1.0, 1.0))
            .unwrap()
            .apply(original.clone(), &mut rng(11))
            .unwrap();
        assert_eq!(doc, original);
    }

    #[test]
    fn test_onsets_preserved_and_ratio_bounded() {
        let original = piano_doc(10);
        let doc = DurationShift::new(ratios(0.5, 2.0))
            .unwrap()
            .apply(original.clone(), &mut rng(5))
            .unwrap();
        for (before, after) in original.tracks[0].notes.iter().zip(&doc.tracks[0].notes) {
            assert_eq!(before.start, after.start);
            let ratio = after.duration() / before.duration();
            assert!((0.5 - 1e-9..=2.0 + 1e-9).contains(&ratio));
        }
    }

    #[test]
    fn test_restrict_to_instrument_time() {
        let original = piano_doc(4);
        let track_end = original.tracks[0].end_time();
        let doc = DurationShift::new(DurationShiftConfig {
            restrict_to_instrument_time: true,
            ..ratios(3.0, 3.0)
        })
        .unwrap()
        .apply(original, &mut rng(2))
        .unwrap();
        assert!(doc.tracks[0].notes.iter().all(|n| n.end <= track_end));
        assert_eq!(doc.tracks[0].notes[0].end, 3.0);
    }

    #[test]
    fn test_zero_ratio_keeps_minimum_length() {
        let doc = DurationShift::new(DurationShiftConfig {
            min_note_length: 0.01,
            ..ratios(0.0, 0.0)
        })
        .unwrap()
        .apply(piano_doc(3), &mut rng(4))
        .unwrap();
        for note in &doc.tracks[0].notes {
            assert!(note.is_valid());
            assert!((note.duration() - 0.01).abs() < 1e-12);
        }
    }

    #[test]
    fn test_drums_only_with_flag() {
        let original = with_drums(piano_doc(1));
        let skip = DurationShift::new(ratios(2.0, 2.0)).unwrap();
        assert_eq!(skip.apply(original.clone(), &mut rng(1)).unwrap().tracks[1], original.tracks[1]);

        let include = DurationShift::new(DurationShiftConfig {
            include_drums: true,
            ..ratios(2.0, 2.0)
        })
        .unwrap();
        let doc = include.apply(original, &mut rng(1)).unwrap();
        assert_eq!(doc.tracks[1].notes[0].end, 0.5);
    }
}
