//! Tempo map and time/beat conversion

use serde::{Deserialize, Serialize};

use crate::error::{OgreError, Result};

/// Tempo assumed when a source carries no tempo information
pub const DEFAULT_BPM: f64 = 120.0;

/// A tempo change point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    /// Time in seconds
    pub time: f64,
    /// Tempo in BPM
    pub bpm: f64,
}

impl TempoChange {
    pub fn new(time: f64, bpm: f64) -> Self {
        Self { time, bpm }
    }
}

/// Time-ordered tempo changes; always starts at time 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoMap {
    changes: Vec<TempoChange>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl TempoMap {
    pub fn new(bpm: f64) -> Self {
        Self {
            changes: vec![TempoChange::new(0.0, bpm)],
        }
    }

    /// Build from change points, rejecting empty, unordered or non-positive maps
    pub fn from_changes(changes: Vec<TempoChange>) -> Result<Self> {
        let map = Self { changes };
        map.validate()?;
        Ok(map)
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Append a change point after the last one
    pub fn push(&mut self, time: f64, bpm: f64) -> Result<()> {
        check_bpm(bpm)?;
        if let Some(last) = self.changes.last() {
            if !(time > last.time) {
                return Err(OgreError::InvalidDocument(format!(
                    "tempo change at {time}s is not after {}s",
                    last.time
                )));
            }
        }
        self.changes.push(TempoChange::new(time, bpm));
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.changes.first() else {
            return Err(OgreError::InvalidDocument("tempo map is empty".into()));
        };
        if first.time != 0.0 {
            return Err(OgreError::InvalidDocument(format!(
                "first tempo change must be at 0s, got {}s",
                first.time
            )));
        }
        for pair in self.changes.windows(2) {
            if !(pair[1].time > pair[0].time) {
                return Err(OgreError::InvalidDocument(format!(
                    "tempo changes out of order at {}s",
                    pair[1].time
                )));
            }
        }
        self.changes.iter().try_for_each(|c| check_bpm(c.bpm))
    }

    pub fn initial_bpm(&self) -> f64 {
        self.changes.first().map_or(DEFAULT_BPM, |c| c.bpm)
    }

    /// Tempo in effect at `time`
    pub fn bpm_at(&self, time: f64) -> f64 {
        self.changes
            .iter()
            .take_while(|c| c.time <= time)
            .last()
            .map_or(self.initial_bpm(), |c| c.bpm)
    }

    /// Beats elapsed from 0 to `time`
    pub fn beats_at(&self, time: f64) -> f64 {
        let mut beats = 0.0;
        for (i, change) in self.changes.iter().enumerate() {
            let segment_end = self.changes.get(i + 1).map_or(f64::INFINITY, |c| c.time);
            if time <= segment_end {
                return beats + (time - change.time) * change.bpm / 60.0;
            }
            beats += (segment_end - change.time) * change.bpm / 60.0;
        }
        beats
    }

    /// Inverse of [`beats_at`](Self::beats_at)
    pub fn time_at_beats(&self, beats: f64) -> f64 {
        let mut elapsed = 0.0;
        for (i, change) in self.changes.iter().enumerate() {
            let segment_beats = self
                .changes
                .get(i + 1)
                .map_or(f64::INFINITY, |c| (c.time - change.time) * change.bpm / 60.0);
            if beats <= elapsed + segment_beats {
                return change.time + (beats - elapsed) * 60.0 / change.bpm;
            }
            elapsed += segment_beats;
        }
        // Unreachable for a non-empty map: the last segment is unbounded
        beats * 60.0 / self.initial_bpm()
    }
}

fn check_bpm(bpm: f64) -> Result<()> {
    if bpm.is_finite() && bpm > 0.0 {
        return Ok(());
    }
    Err(OgreError::InvalidDocument(format!("tempo must be positive, got {bpm}")))
}
