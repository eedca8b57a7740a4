//! Stochastic augmentations over a [`MusicDocument`]

mod duration_shift;
mod note_add;
mod note_delete;
mod onset_time_shift;
mod pitch_shift;
mod tempo_shift;

pub use duration_shift::{DurationShift, DurationShiftConfig};
pub use note_add::{NoteAdd, NoteAddConfig};
pub use note_delete::{NoteDelete, NoteDeleteConfig};
pub use onset_time_shift::{OnsetTimeShift, OnsetTimeShiftConfig, ShiftMode};
pub use pitch_shift::{PitchShift, PitchShiftConfig};
pub use tempo_shift::{TempoShift, TempoShiftConfig};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::MusicDocument;
use crate::error::{OgreError, Result};

/// Shortest note any transform will leave behind, in seconds
pub const MIN_NOTE_LENGTH: f64 = 1e-6;

/// Trait for document augmentations.
///
/// `apply` consumes the document and returns the authoritative result. Clone
/// the input first if the original is still needed.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, doc: MusicDocument, rng: &mut dyn RngCore) -> Result<MusicDocument>;
}

/// Two-stage track gate plus the note-level probability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Gate {
    /// Per-track coin flip, in (0, 1]
    pub p: f64,
    /// Second per-track coin flip, in (0, 1]
    pub p_instrument: f64,
    /// Per-note (or per-insertion) probability, in [0, 1]
    pub p_note: f64,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            p: 1.0,
            p_instrument: 1.0,
            p_note: 1.0,
        }
    }
}

impl Gate {
    pub fn new(p: f64, p_instrument: f64, p_note: f64) -> Self {
        Self { p, p_instrument, p_note }
    }

    pub fn with_p_note(self, p_note: f64) -> Self {
        Self { p_note, ..self }
    }

    pub fn validate(&self, transform: &'static str) -> Result<()> {
        if !(self.p > 0.0 && self.p <= 1.0) {
            return Err(OgreError::config(transform, format!("p must be in (0, 1], got {}", self.p)));
        }
        if !(self.p_instrument > 0.0 && self.p_instrument <= 1.0) {
            return Err(OgreError::config(
                transform,
                format!("p_instrument must be in (0, 1], got {}", self.p_instrument),
            ));
        }
        if !(0.0..=1.0).contains(&self.p_note) {
            return Err(OgreError::config(
                transform,
                format!("p_note must be in [0, 1], got {}", self.p_note),
            ));
        }
        Ok(())
    }

    /// Two independent draws: the track flip, then the instrument flip
    pub fn selects_track(&self, rng: &mut dyn RngCore) -> bool {
        let track = rng.gen_bool(self.p);
        let instrument = rng.gen_bool(self.p_instrument);
        track && instrument
    }

    pub fn selects_note(&self, rng: &mut dyn RngCore) -> bool {
        rng.gen_bool(self.p_note)
    }
}

/// Indices of tracks that pass the drum filter and the gate
pub(crate) fn selected_tracks(
    doc: &MusicDocument,
    gate: &Gate,
    include_drums: bool,
    rng: &mut dyn RngCore,
) -> Vec<usize> {
    if !include_drums && !doc.tracks.is_empty() && doc.tracks.iter().all(|t| t.is_drum) {
        warn!("Document only contains drum tracks");
        return Vec::new();
    }

    let candidates: Vec<usize> = doc
        .tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| include_drums || !t.is_drum)
        .map(|(idx, _)| idx)
        .collect();

    candidates
        .into_iter()
        .filter(|_| gate.selects_track(rng))
        .collect()
}

/// Uniform draw from `[low, high]`; degenerate ranges yield `low`
pub(crate) fn uniform(rng: &mut dyn RngCore, low: f64, high: f64) -> f64 {
    if low >= high {
        return low;
    }
    rng.gen_range(low..=high)
}

pub(crate) fn check_range<T: PartialOrd + std::fmt::Display>(
    transform: &'static str,
    name: &str,
    (min, max): (T, T),
) -> Result<()> {
    if min > max {
        return Err(OgreError::config(transform, format!("{name}: min {min} > max {max}")));
    }
    Ok(())
}

/// Implements [`Transform`] for structs with an `apply_impl(&self, &mut MusicDocument, rng) -> Result<usize>`
/// method returning the number of notes touched.
/// Usage: `impl_transform_boilerplate!(StructName, "Display Name");`
macro_rules! impl_transform_boilerplate {
    ($ty:ty, $name:expr) => {
        impl super::Transform for $ty {
            fn name(&self) -> &str { $name }

            fn apply(
                &self,
                mut doc: crate::document::MusicDocument,
                rng: &mut dyn rand::RngCore,
            ) -> crate::error::Result<crate::document::MusicDocument> {
                doc.validate()?;
                let touched = self.apply_impl(&mut doc, rng)?;
                tracing::debug!(transform = $name, touched, notes = doc.note_count(), "Applied transform");
                Ok(doc)
            }
        }
    };
}

pub(crate) use impl_transform_boilerplate;

#[cfg(test)]
pub(crate) mod test_support {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::document::MusicDocument;
    use crate::note::Note;
    use crate::track::Track;

    pub fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    /// One piano track of `num_notes` back-to-back one-second notes from pitch 60 upwards
    pub fn piano_doc(num_notes: usize) -> MusicDocument {
        let notes = (0..num_notes)
            .map(|i| Note::new(60 + i as u8, 80, i as f64, i as f64 + 1.0))
            .collect();
        MusicDocument::default().with_track(Track::new(0, false, "piano").with_notes(notes))
    }

    pub fn with_drums(doc: MusicDocument) -> MusicDocument {
        doc.with_track(Track::new(0, true, "drums").with_notes(vec![
            Note::new(36, 100, 0.0, 0.25),
            Note::new(38, 100, 0.5, 0.75),
        ]))
    }
}
