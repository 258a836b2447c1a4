// Dense pianoroll tensors.
//
// A pianoroll is a 3-D binary tensor indexed by (timestep, pitch,
// instrument). Storage is a flat `Vec<f32>` in [time][instrument][pitch]
// order, pitch contiguous, so the pitch distribution for one
// (timestep, instrument) cell is a plain slice. `Prediction` shares the
// same layout for the model's per-cell probability output.
//
// Scores hold only 0.0 and 1.0. Arithmetic helpers (`merge_clipped`,
// `zero_under`) mirror the elementwise operations the generation scheduler
// performs; `is_binary` backs the scheduler's union invariant check.
//
// The pianoroll is the source of truth throughout generation. MIDI is
// derived from it, never the other way around.

use serde::{Deserialize, Serialize};

/// Dimensions of a pianoroll: (timesteps, pitches, instruments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub timesteps: usize,
    pub pitches: usize,
    pub instruments: usize,
}

impl Shape {
    pub fn new(timesteps: usize, pitches: usize, instruments: usize) -> Self {
        Shape {
            timesteps,
            pitches,
            instruments,
        }
    }

    /// Total number of cells.
    pub fn volume(self) -> usize {
        self.timesteps * self.pitches * self.instruments
    }

    /// Number of cells in one instrument slab (time × pitch).
    pub fn slab(self) -> usize {
        self.timesteps * self.pitches
    }

    /// Flat index for (timestep, pitch, instrument).
    #[inline]
    pub fn index(self, t: usize, p: usize, i: usize) -> usize {
        debug_assert!(t < self.timesteps && p < self.pitches && i < self.instruments);
        (t * self.instruments + i) * self.pitches + p
    }
}

/// Dense binary pianoroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pianoroll {
    shape: Shape,
    data: Vec<f32>,
}

impl Pianoroll {
    /// Create an all-zero (silent) pianoroll.
    pub fn zeros(shape: Shape) -> Self {
        Pianoroll {
            shape,
            data: vec![0.0; shape.volume()],
        }
    }

    /// Build from flat data in [time][instrument][pitch] order.
    /// Panics if the length does not match the shape.
    pub fn from_flat(shape: Shape, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), shape.volume(), "flat data length mismatch");
        Pianoroll { shape, data }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn get(&self, t: usize, p: usize, i: usize) -> f32 {
        self.data[self.shape.index(t, p, i)]
    }

    #[inline]
    pub fn set(&mut self, t: usize, p: usize, i: usize, value: f32) {
        let idx = self.shape.index(t, p, i);
        self.data[idx] = value;
    }

    /// Sum over all cells. For a binary roll this is the active cell count.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// True when every cell is exactly 0.0 or 1.0.
    pub fn is_binary(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0 || v == 1.0)
    }

    /// Merge another roll in: `self = clip(self + other, 0, 1)`.
    pub fn merge_clipped(&mut self, other: &Pianoroll) {
        assert_eq!(self.shape, other.shape, "shape mismatch in merge");
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = (*a + b).clamp(0.0, 1.0);
        }
    }

    /// Force all cells under the mask to zero.
    pub fn zero_under(&mut self, mask: &crate::mask::Mask) {
        assert_eq!(self.shape, mask.shape(), "shape mismatch in zero_under");
        for (v, &m) in self.data.iter_mut().zip(mask.data().iter()) {
            if m > 0.0 {
                *v = 0.0;
            }
        }
    }

    /// The active pitch for (timestep, instrument), if any. When more than
    /// one pitch is on (mid-generation overlap), the lowest is returned.
    pub fn pitch_at(&self, t: usize, i: usize) -> Option<usize> {
        self.row(t, i).iter().position(|&v| v > 0.0)
    }

    /// The pitch row for one (timestep, instrument) cell, contiguous.
    #[inline]
    pub fn row(&self, t: usize, i: usize) -> &[f32] {
        let start = self.shape.index(t, 0, i);
        &self.data[start..start + self.shape.pitches]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Per-cell pitch distributions produced by a predictor: same indexing as
/// a pianoroll, but cells hold probabilities rather than 0/1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    shape: Shape,
    data: Vec<f32>,
}

impl Prediction {
    /// Build from flat data in [time][instrument][pitch] order.
    pub fn from_flat(shape: Shape, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), shape.volume(), "flat data length mismatch");
        Prediction { shape, data }
    }

    /// A uniform distribution over pitches at every cell.
    pub fn uniform(shape: Shape) -> Self {
        let p = 1.0 / shape.pitches as f32;
        Prediction {
            shape,
            data: vec![p; shape.volume()],
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn get(&self, t: usize, p: usize, i: usize) -> f32 {
        self.data[self.shape.index(t, p, i)]
    }

    /// The pitch distribution for one (timestep, instrument) cell.
    #[inline]
    pub fn distribution(&self, t: usize, i: usize) -> &[f32] {
        let start = self.shape.index(t, 0, i);
        &self.data[start..start + self.shape.pitches]
    }

    /// Overwrite the distribution for one (timestep, instrument) cell.
    pub fn set_distribution(&mut self, t: usize, i: usize, probs: &[f32]) {
        assert_eq!(probs.len(), self.shape.pitches, "distribution length mismatch");
        let start = self.shape.index(t, 0, i);
        self.data[start..start + self.shape.pitches].copy_from_slice(probs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_and_set() {
        let shape = Shape::new(4, 12, 3);
        let mut roll = Pianoroll::zeros(shape);
        assert_eq!(roll.sum(), 0.0);

        roll.set(2, 7, 1, 1.0);
        assert_eq!(roll.get(2, 7, 1), 1.0);
        assert_eq!(roll.sum(), 1.0);
        assert!(roll.is_binary());
    }

    #[test]
    fn test_merge_clipped_stays_binary() {
        let shape = Shape::new(2, 4, 2);
        let mut a = Pianoroll::zeros(shape);
        let mut b = Pianoroll::zeros(shape);
        a.set(0, 1, 0, 1.0);
        b.set(0, 1, 0, 1.0); // overlapping write clips to 1
        b.set(1, 2, 1, 1.0);

        a.merge_clipped(&b);
        assert_eq!(a.get(0, 1, 0), 1.0);
        assert_eq!(a.get(1, 2, 1), 1.0);
        assert!(a.is_binary());
        assert_eq!(a.sum(), 2.0);
    }

    #[test]
    fn test_row_is_contiguous_pitch_axis() {
        let shape = Shape::new(3, 5, 2);
        let mut roll = Pianoroll::zeros(shape);
        roll.set(1, 0, 1, 1.0);
        roll.set(1, 4, 1, 1.0);

        let row = roll.row(1, 1);
        assert_eq!(row.len(), 5);
        assert_eq!(row[0], 1.0);
        assert_eq!(row[4], 1.0);
        assert_eq!(row[2], 0.0);
    }

    #[test]
    fn test_pitch_at_lowest_wins() {
        let shape = Shape::new(1, 6, 1);
        let mut roll = Pianoroll::zeros(shape);
        assert_eq!(roll.pitch_at(0, 0), None);
        roll.set(0, 4, 0, 1.0);
        roll.set(0, 2, 0, 1.0);
        assert_eq!(roll.pitch_at(0, 0), Some(2));
    }

    #[test]
    fn test_prediction_distribution_access() {
        let shape = Shape::new(2, 4, 2);
        let mut pred = Prediction::uniform(shape);
        let row = pred.distribution(0, 0);
        let total: f32 = row.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);

        pred.set_distribution(1, 1, &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(pred.distribution(1, 1), &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(pred.get(1, 2, 1), 1.0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let shape = Shape::new(2, 3, 2);
        let mut roll = Pianoroll::zeros(shape);
        roll.set(1, 1, 1, 1.0);

        let json = serde_json::to_string(&roll).unwrap();
        let restored: Pianoroll = serde_json::from_str(&json).unwrap();
        assert_eq!(roll, restored);
    }
}
