//! Error types for ogre-convert

use ogre_core::OgreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{0} does not support this input")]
    Unsupported(&'static str),
    #[error("MIDI parse error: {0}")]
    Parse(#[from] midly::Error),
    #[error("Only metrical (ticks per beat) MIDI timing is supported")]
    UnsupportedTiming,
    #[error("MIDI write error: {0}")]
    Midi(String),
    #[error(transparent)]
    Core(#[from] OgreError),
    #[error("Invalid conversion config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
