//! ogre-core: Song model and randomized augmentations for symbolic music

pub mod compose;
pub mod config;
mod document;
mod error;
mod note;
mod tempo;
mod track;
pub mod transforms;

pub use compose::Compose;
pub use config::{AugmentationConfig, PipelineConfig};
pub use document::{DEFAULT_TICKS_PER_BEAT, MusicDocument};
pub use error::{OgreError, Result};
pub use note::{ControlChange, MIDI_MAX, Note, SUSTAIN_PEDAL};
pub use tempo::{DEFAULT_BPM, TempoChange, TempoMap};
pub use track::Track;
pub use transforms::{Gate, ShiftMode, Transform};
pub use transforms::{DurationShift, NoteAdd, NoteDelete, OnsetTimeShift, PitchShift, TempoShift};
pub use transforms::{
    DurationShiftConfig, NoteAddConfig, NoteDeleteConfig, OnsetTimeShiftConfig, PitchShiftConfig,
    TempoShiftConfig,
};
