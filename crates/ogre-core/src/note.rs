//! Note and controller events

use serde::{Deserialize, Serialize};

/// Highest valid MIDI pitch / velocity / controller value
pub const MIDI_MAX: u8 = 127;

/// Controller number of the sustain pedal
pub const SUSTAIN_PEDAL: u8 = 64;

/// A single timed note event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI note number (0-127, 60 = middle C)
    pub pitch: u8,
    /// Velocity (0-127)
    pub velocity: u8,
    /// Onset in seconds
    pub start: f64,
    /// Offset in seconds
    pub end: f64,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, start: f64, end: f64) -> Self {
        Self {
            pitch,
            velocity,
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Range, finiteness and ordering checks every transform must preserve
    pub fn is_valid(&self) -> bool {
        self.pitch <= MIDI_MAX
            && self.velocity <= MIDI_MAX
            && self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.end > self.start
    }
}

/// A controller change (e.g. sustain pedal) at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlChange {
    pub number: u8,
    pub value: u8,
    /// Time in seconds
    pub time: f64,
}

impl ControlChange {
    pub fn new(number: u8, value: u8, time: f64) -> Self {
        Self { number, value, time }
    }
}
