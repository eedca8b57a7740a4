//! Piano roll rendering of a [`MusicDocument`]

use std::fmt;
use std::str::FromStr;

use ogre_core::{MIDI_MAX, MusicDocument, SUSTAIN_PEDAL, Track};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conversion::Conversion;
use crate::error::{ConvertError, Result};

/// Pitch rows in every roll
pub const PITCHES: usize = MIDI_MAX as usize + 1;

/// Grid positions this close to a column boundary count as on it
const GRID_TOLERANCE: f64 = 1e-9;

/// Velocity grid with one row per MIDI pitch and one column per time step,
/// stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct PianoRoll {
    time_step: f64,
    cols: usize,
    data: Vec<u8>,
}

impl PianoRoll {
    fn zeros(cols: usize, time_step: f64) -> Self {
        Self {
            time_step,
            cols,
            data: vec![0; PITCHES * cols],
        }
    }

    pub fn rows(&self) -> usize {
        PITCHES
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Cell value, 0 outside the grid
    pub fn get(&self, pitch: u8, col: usize) -> u8 {
        self.row(pitch).get(col).copied().unwrap_or(0)
    }

    /// One pitch row; empty for pitches above 127
    pub fn row(&self, pitch: u8) -> &[u8] {
        if pitch > MIDI_MAX {
            return &[];
        }
        let start = usize::from(pitch) * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn active_cells(&self) -> usize {
        self.data.iter().filter(|v| **v > 0).count()
    }

    fn row_mut(&mut self, pitch: u8) -> &mut [u8] {
        let start = usize::from(pitch.min(MIDI_MAX)) * self.cols;
        &mut self.data[start..start + self.cols]
    }

    /// Cell-wise maximum with another roll of the same shape
    fn merge_max(&mut self, other: &PianoRoll) {
        for (cell, value) in self.data.iter_mut().zip(&other.data) {
            *cell = (*cell).max(*value);
        }
    }
}

/// Renders notes into a [`PianoRoll`].
///
/// A note fills columns `floor(start / step) .. ceil(end / step)` with its
/// velocity; overlapping notes keep the loudest. While the sustain pedal is
/// held the last value of each row is carried forward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToPianoRollArray {
    /// Column width in seconds
    pub time_step: f64,
    /// Pedal values at or above this count as held; `None` ignores the pedal
    pub pedal_threshold: Option<u8>,
    /// Map every active cell to 1
    pub binarize: bool,
    pub include_drums: bool,
}

impl Default for ToPianoRollArray {
    fn default() -> Self {
        Self {
            time_step: 0.01,
            pedal_threshold: Some(64),
            binarize: false,
            include_drums: false,
        }
    }
}

impl ToPianoRollArray {
    pub fn validate(&self) -> Result<()> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(ConvertError::InvalidConfig(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if self.pedal_threshold.is_some_and(|t| t > MIDI_MAX) {
            return Err(ConvertError::InvalidConfig("pedal_threshold must be below 128".into()));
        }
        Ok(())
    }

    /// Position in columns, snapped onto a boundary when within rounding error of it
    fn column(&self, seconds: f64) -> f64 {
        let position = seconds / self.time_step;
        let nearest = position.round();
        match (position - nearest).abs() < GRID_TOLERANCE {
            true => nearest,
            false => position,
        }
    }

    fn render_track(&self, track: &Track, cols: usize) -> PianoRoll {
        let mut roll = PianoRoll::zeros(cols, self.time_step);
        for note in &track.notes {
            let first = self.column(note.start).floor() as usize;
            let last = (self.column(note.end).ceil() as usize).min(cols);
            let row = roll.row_mut(note.pitch);
            for cell in row.iter_mut().take(last).skip(first) {
                *cell = (*cell).max(note.velocity);
            }
        }

        if let Some(threshold) = self.pedal_threshold {
            for (on, off) in pedal_intervals(track, threshold) {
                let first = self.column(on).floor() as usize;
                let last = off.map_or(cols, |t| (self.column(t).ceil() as usize).min(cols));
                if last <= first + 1 {
                    continue;
                }
                for pitch in 0..=MIDI_MAX {
                    let row = roll.row_mut(pitch);
                    for col in first + 1..last {
                        row[col] = row[col].max(row[col - 1]);
                    }
                }
            }
        }
        roll
    }

    fn render(&self, doc: &MusicDocument) -> Result<PianoRoll> {
        self.validate()?;
        doc.validate()?;

        let cols = self.column(doc.end_time()).ceil() as usize;
        let mut roll = PianoRoll::zeros(cols, self.time_step);
        for track in doc.tracks.iter().filter(|t| self.include_drums || !t.is_drum) {
            roll.merge_max(&self.render_track(track, cols));
        }
        if self.binarize {
            roll.data.iter_mut().filter(|v| **v > 0).for_each(|v| *v = 1);
        }

        debug!(cols, active = roll.active_cells(), time_step = self.time_step, "Rendered piano roll");
        Ok(roll)
    }
}

/// Held-pedal spans as (press, release) times; `None` means held to the end
fn pedal_intervals(track: &Track, threshold: u8) -> Vec<(f64, Option<f64>)> {
    let mut pedal: Vec<_> = track
        .control_changes
        .iter()
        .filter(|cc| cc.number == SUSTAIN_PEDAL)
        .collect();
    pedal.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut intervals = Vec::new();
    let mut pressed: Option<f64> = None;
    for cc in pedal {
        match (pressed, cc.value >= threshold) {
            (None, true) => pressed = Some(cc.time),
            (Some(on), false) => {
                intervals.push((on, Some(cc.time)));
                pressed = None;
            }
            _ => {}
        }
    }
    if let Some(on) = pressed {
        intervals.push((on, None));
    }
    intervals
}

impl<'a> Conversion<&'a MusicDocument> for ToPianoRollArray {
    type Output = PianoRoll;

    fn name(&self) -> &'static str {
        "ToPianoRollArray"
    }

    fn apply(&self, doc: &'a MusicDocument) -> Result<PianoRoll> {
        self.render(doc)
    }
}

/// Target device tag carried by a [`Tensor`]; serialized as `"cpu"` or `"cuda:N"`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl FromStr for Device {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| ConvertError::InvalidConfig(format!("unknown device: {s}"))),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = ConvertError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

/// Dense row-major `f32` tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: [usize; 2],
    data: Vec<f32>,
    device: Device,
}

impl Tensor {
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.shape[0] || col >= self.shape[1] {
            return None;
        }
        self.data.get(row * self.shape[1] + col).copied()
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// [`ToPianoRollArray`] with the result as a `[128, cols]` tensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToPianoRollTensor {
    pub roll: ToPianoRollArray,
    pub device: Device,
}

impl<'a> Conversion<&'a MusicDocument> for ToPianoRollTensor {
    type Output = Tensor;

    fn name(&self) -> &'static str {
        "ToPianoRollTensor"
    }

    fn apply(&self, doc: &'a MusicDocument) -> Result<Tensor> {
        let roll = self.roll.render(doc)?;
        Ok(Tensor {
            shape: [roll.rows(), roll.cols()],
            data: roll.data.iter().map(|v| f32::from(*v)).collect(),
            device: self.device,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogre_core::{ControlChange, Note};

    fn single(notes: Vec<Note>) -> MusicDocument {
        MusicDocument::default().with_track(Track::new(0, false, "piano").with_notes(notes))
    }

    fn step(time_step: f64) -> ToPianoRollArray {
        ToPianoRollArray {
            time_step,
            ..Default::default()
        }
    }

    #[test]
    fn test_one_note_two_cells() {
        let roll = step(0.5).apply(&single(vec![Note::new(60, 100, 0.0, 1.0)])).unwrap();
        assert_eq!((roll.rows(), roll.cols()), (128, 2));
        assert_eq!(roll.row(60), &[100, 100]);
        assert_eq!(roll.active_cells(), 2);
    }

    #[test]
    fn test_decimal_grid_boundaries() {
        let grid = ToPianoRollArray {
            pedal_threshold: None,
            ..step(0.1)
        };
        let roll = grid.apply(&single(vec![Note::new(60, 100, 0.3, 0.5)])).unwrap();
        assert_eq!(roll.cols(), 5);
        assert_eq!(roll.row(60), &[0, 0, 0, 100, 100]);

        let roll = ToPianoRollArray::default()
            .apply(&single(vec![Note::new(62, 70, 0.29, 0.58)]))
            .unwrap();
        assert_eq!(roll.cols(), 58);
        assert_eq!(roll.active_cells(), 29);
        assert_eq!(roll.get(62, 28), 0);
        assert_eq!(roll.get(62, 29), 70);
        assert_eq!(roll.get(62, 57), 70);
    }

    #[test]
    fn test_pedal_span_on_decimal_grid() {
        // 0.3 / 0.1 lands just below 3; the note is released before the pedal goes down
        let mut doc = single(vec![Note::new(60, 80, 0.2, 0.3), Note::new(72, 40, 0.9, 1.0)]);
        doc.tracks[0].add_control_change(ControlChange::new(SUSTAIN_PEDAL, 127, 0.3));
        doc.tracks[0].add_control_change(ControlChange::new(SUSTAIN_PEDAL, 0, 0.6));
        let roll = step(0.1).apply(&doc).unwrap();
        assert_eq!(roll.row(60), &[0, 0, 80, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_out_of_range_pitch_reads_empty() {
        let roll = step(0.5).apply(&single(vec![Note::new(127, 90, 0.0, 1.0)])).unwrap();
        assert_eq!(roll.row(127), &[90, 90]);
        assert!(roll.row(200).is_empty());
        assert_eq!(roll.get(200, 0), 0);
        assert_eq!(roll.get(128, 1), 0);
    }

    #[test]
    fn test_partial_cells_and_overlap_max() {
        let doc = single(vec![Note::new(60, 50, 0.25, 0.75), Note::new(60, 90, 0.5, 1.5)]);
        let roll = step(0.5).apply(&doc).unwrap();
        assert_eq!(roll.row(60), &[50, 90, 90]);
        assert_eq!(roll.get(61, 0), 0);
        assert_eq!(roll.get(60, 99), 0);
    }

    #[test]
    fn test_binarize() {
        let roll = ToPianoRollArray {
            binarize: true,
            ..step(0.5)
        }
        .apply(&single(vec![Note::new(64, 33, 0.0, 0.5)]))
        .unwrap();
        assert_eq!(roll.row(64), &[1]);
    }

    #[test]
    fn test_sustain_pedal_extends_notes() {
        let mut doc = single(vec![Note::new(60, 80, 0.0, 0.5), Note::new(72, 40, 1.5, 2.0)]);
        doc.tracks[0].add_control_change(ControlChange::new(SUSTAIN_PEDAL, 127, 0.0));
        doc.tracks[0].add_control_change(ControlChange::new(SUSTAIN_PEDAL, 0, 1.0));

        let roll = step(0.5).apply(&doc).unwrap();
        assert_eq!(roll.row(60), &[80, 80, 0, 0]);

        let ignored = ToPianoRollArray {
            pedal_threshold: None,
            ..step(0.5)
        }
        .apply(&doc)
        .unwrap();
        assert_eq!(ignored.row(60), &[80, 0, 0, 0]);
    }

    #[test]
    fn test_pedal_below_threshold_ignored() {
        let mut doc = single(vec![Note::new(60, 80, 0.0, 0.5), Note::new(62, 80, 1.5, 2.0)]);
        doc.tracks[0].add_control_change(ControlChange::new(SUSTAIN_PEDAL, 30, 0.0));
        let roll = step(0.5).apply(&doc).unwrap();
        assert_eq!(roll.row(60), &[80, 0, 0, 0]);
    }

    #[test]
    fn test_drums_excluded_by_default() {
        let doc = single(vec![Note::new(60, 80, 0.0, 0.5)])
            .with_track(Track::new(0, true, "drums").with_notes(vec![Note::new(36, 100, 0.0, 0.5)]));
        assert_eq!(step(0.5).apply(&doc).unwrap().row(36), &[0]);
        let with_drums = ToPianoRollArray {
            include_drums: true,
            ..step(0.5)
        };
        assert_eq!(with_drums.apply(&doc).unwrap().row(36), &[100]);
    }

    #[test]
    fn test_invalid_step_rejected() {
        assert!(matches!(
            step(0.0).apply(&MusicDocument::default()),
            Err(ConvertError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_document() {
        let roll = step(0.1).apply(&MusicDocument::default()).unwrap();
        assert_eq!(roll.cols(), 0);
    }

    #[test]
    fn test_tensor_shape_and_device() {
        let convert = ToPianoRollTensor {
            roll: step(0.5),
            device: "cuda:1".parse().unwrap(),
        };
        let tensor = convert.apply(&single(vec![Note::new(60, 100, 0.0, 1.0)])).unwrap();
        assert_eq!(tensor.shape(), [128, 2]);
        assert_eq!(tensor.device(), Device::Cuda(1));
        assert_eq!(tensor.get(60, 1), Some(100.0));
        assert_eq!(tensor.get(128, 0), None);
        assert_eq!(tensor.data().iter().filter(|v| **v > 0.0).count(), 2);
    }

    #[test]
    fn test_tensor_config_from_json() {
        let convert: ToPianoRollTensor =
            serde_json::from_str(r#"{"roll": {"time_step": 0.5, "binarize": true}, "device": "cuda:2"}"#).unwrap();
        assert_eq!(convert.device, Device::Cuda(2));
        assert_eq!(convert.roll.time_step, 0.5);
        assert!(convert.roll.binarize);
        assert_eq!(serde_json::to_string(&Device::Cpu).unwrap(), r#""cpu""#);

        let defaults: ToPianoRollTensor = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, ToPianoRollTensor::default());
        assert!(serde_json::from_str::<ToPianoRollTensor>(r#"{"device": "tpu"}"#).is_err());
        assert!(serde_json::from_str::<ToPianoRollTensor>(r#"{"dtype": "f16"}"#).is_err());
    }

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!(Device::Cuda(3).to_string(), "cuda:3");
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }
}
