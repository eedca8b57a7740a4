//! ogre-convert: MIDI file I/O and piano roll rendering for ogre documents

mod conversion;
mod error;
mod generic_midi;
mod high_level_midi;
pub mod midi_file;
pub mod piano_roll;

pub use conversion::Conversion;
pub use error::{ConvertError, Result};
pub use generic_midi::ConvertToGenericMidi;
pub use high_level_midi::ConvertToHighLevelMidi;
pub use midi_file::{EventKind, MidiEvent, MidiFile, MidiTrack};
pub use piano_roll::{Device, PianoRoll, Tensor, ToPianoRollArray, ToPianoRollTensor};
