//! Random note thinning with a retention floor

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{Gate, impl_transform_boilerplate, selected_tracks};
use crate::document::MusicDocument;
use crate::error::Result;

const NAME: &str = "NoteDelete";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoteDeleteConfig {
    /// Notes a non-empty track always keeps (0 disables the floor)
    pub min_notes: usize,
    /// Never delete the note that ends last, so the track length is unchanged
    pub preserve_last_note: bool,
    pub include_drums: bool,
    /// `gate.p_note` is the per-note deletion probability
    pub gate: Gate,
}

impl Default for NoteDeleteConfig {
    fn default() -> Self {
        Self {
            min_notes: 1,
            preserve_last_note: false,
            include_drums: false,
            gate: Gate::default().with_p_note(0.2),
        }
    }
}

/// Removes each note independently. When too few survive, the earliest
/// deleted notes are restored in their original order.
#[derive(Debug, Clone)]
pub struct NoteDelete {
    config: NoteDeleteConfig,
}

impl NoteDelete {
    pub fn new(config: NoteDeleteConfig) -> Result<Self> {
        config.gate.validate(NAME)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NoteDeleteConfig {
        &self.config
    }

    fn apply_impl(&self, doc: &mut MusicDocument, rng: &mut dyn RngCore) -> Result<usize> {
        let cfg = &self.config;
        let mut deleted = 0;

        for idx in selected_tracks(doc, &cfg.gate, cfg.include_drums, rng) {
            let track = &mut doc.tracks[idx];
            if track.notes.is_empty() {
                continue;
            }

            let protected = cfg
                .preserve_last_note
                .then(|| {
                    track
                        .notes
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.end.total_cmp(&b.1.end))
                        .map(|(i, _)| i)
                })
                .flatten();

            let mut keep: Vec<bool> = (0..track.notes.len())
                .map(|i| Some(i) == protected || !cfg.gate.selects_note(rng))
                .collect();

            let floor = cfg.min_notes.min(keep.len());
            let mut kept = keep.iter().filter(|k| **k).count();
            for flag in keep.iter_mut().filter(|k| !**k) {
                if kept >= floor {
                    break;
                }
                *flag = true;
                kept += 1;
            }

            deleted += keep.len() - kept;
            let mut flags = keep.into_iter();
            track.notes.retain(|_| flags.next().unwrap_or(true));
        }
        Ok(deleted)
    }
}

impl_transform_boilerplate!(NoteDelete, "NoteDelete");
