//! Serializable pipeline configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compose::Compose;
use crate::error::Result;
use crate::transforms::{
    DurationShift, DurationShiftConfig, NoteAdd, NoteAddConfig, NoteDelete, NoteDeleteConfig,
    OnsetTimeShift, OnsetTimeShiftConfig, PitchShift, PitchShiftConfig, TempoShift,
    TempoShiftConfig, Transform,
};

/// Enum wrapper for every augmentation's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AugmentationConfig {
    PitchShift(PitchShiftConfig),
    TempoShift(TempoShiftConfig),
    DurationShift(DurationShiftConfig),
    OnsetTimeShift(OnsetTimeShiftConfig),
    NoteAdd(NoteAddConfig),
    NoteDelete(NoteDeleteConfig),
}

impl AugmentationConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::PitchShift(_) => "PitchShift",
            Self::TempoShift(_) => "TempoShift",
            Self::DurationShift(_) => "DurationShift",
            Self::OnsetTimeShift(_) => "OnsetTimeShift",
            Self::NoteAdd(_) => "NoteAdd",
            Self::NoteDelete(_) => "NoteDelete",
        }
    }

    /// Validate and construct the transform
    pub fn build(&self) -> Result<Box<dyn Transform>> {
        let transform: Box<dyn Transform> = match *self {
            Self::PitchShift(cfg) => Box::new(PitchShift::new(cfg)?),
            Self::TempoShift(cfg) => Box::new(TempoShift::new(cfg)?),
            Self::DurationShift(cfg) => Box::new(DurationShift::new(cfg)?),
            Self::OnsetTimeShift(cfg) => Box::new(OnsetTimeShift::new(cfg)?),
            Self::NoteAdd(cfg) => Box::new(NoteAdd::new(cfg)?),
            Self::NoteDelete(cfg) => Box::new(NoteDelete::new(cfg)?),
        };
        Ok(transform)
    }
}

/// A full augmentation pipeline, as loaded from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub transforms: Vec<AugmentationConfig>,
    /// Fixed seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build every transform eagerly, failing on the first invalid one
    pub fn build(&self) -> Result<Compose> {
        let transforms = self
            .transforms
            .iter()
            .map(AugmentationConfig::build)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = transforms.len(), "Built pipeline from config");
        Compose::new(transforms)
    }
}
