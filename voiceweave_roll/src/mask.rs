// Masking policies over pianoroll tensors.
//
// A mask is a tensor shaped like a pianoroll whose cells are 1 where the
// score is designated for (re)generation and 0 where it is known context.
// The builders here are the policy library: whole-instrument slabs,
// random time×pitch patches, contiguous pitch bands, and contiguous time
// windows, plus unions of several of those.
//
// `apply_mask_and_stack` assembles the input a predictor consumes: the
// score with masked cells forced to zero, concatenated with the mask
// itself as a second channel group. Some models are trained with the mask
// channel marking known context instead of cells-to-predict;
// `MaskChannelPolicy` selects the convention without touching the mask
// the caller holds.
//
// Builders never mutate their inputs and draw all randomness from the
// caller's `&mut impl Rng`.

use crate::roll::{Pianoroll, Shape};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Binary regeneration mask; 1 = cell to (re)generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    shape: Shape,
    data: Vec<f32>,
}

impl Mask {
    /// Create an all-zero mask (nothing designated).
    pub fn zeros(shape: Shape) -> Self {
        Mask {
            shape,
            data: vec![0.0; shape.volume()],
        }
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
        debug_assert!(value == 0.0 || value == 1.0, "masks are strictly binary");
        let idx = self.shape.index(t, p, i);
        self.data[idx] = value;
    }

    /// Number of masked cells.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn is_binary(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0 || v == 1.0)
    }

    /// Union with another mask (logical OR, in place).
    pub fn union(&mut self, other: &Mask) {
        assert_eq!(self.shape, other.shape, "shape mismatch in union");
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            if b > 0.0 {
                *a = 1.0;
            }
        }
    }

    /// Clear the full pitch column at (timestep, instrument). The scheduler
    /// calls this after committing a pitch so the cell is not revisited
    /// within the current occurrence.
    pub fn clear_cell_column(&mut self, t: usize, i: usize) {
        for p in 0..self.shape.pitches {
            let idx = self.shape.index(t, p, i);
            self.data[idx] = 0.0;
        }
    }

    /// Indices of instruments with at least one masked cell.
    pub fn touched_instruments(&self) -> Vec<usize> {
        let mut touched = Vec::new();
        for i in 0..self.shape.instruments {
            'scan: for t in 0..self.shape.timesteps {
                for p in 0..self.shape.pitches {
                    if self.get(t, p, i) > 0.0 {
                        touched.push(i);
                        break 'scan;
                    }
                }
            }
        }
        touched
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Mask out every cell of one instrument.
pub fn instrument_mask(shape: Shape, instrument: usize) -> Mask {
    assert!(instrument < shape.instruments, "instrument out of range");
    let mut mask = Mask::zeros(shape);
    for t in 0..shape.timesteps {
        for p in 0..shape.pitches {
            mask.set(t, p, instrument, 1.0);
        }
    }
    mask
}

/// Mask out one uniformly chosen instrument.
pub fn random_instrument_mask(shape: Shape, rng: &mut impl Rng) -> Mask {
    let instrument = rng.random_range(0..shape.instruments);
    instrument_mask(shape, instrument)
}

/// Mask out one axis-aligned time×pitch patch of side `2 * border` on a
/// random instrument. Patches starting near an edge are clipped.
pub fn random_patch_mask(shape: Shape, border: usize, rng: &mut impl Rng) -> Mask {
    let mut mask = Mask::zeros(shape);
    add_random_patch(&mut mask, border, rng);
    mask
}

/// Union random patches until at least `target_fraction` of the score
/// volume is masked.
pub fn multiple_random_patch_mask(
    shape: Shape,
    border: usize,
    target_fraction: f64,
    rng: &mut impl Rng,
) -> Mask {
    let target = (shape.volume() as f64 * target_fraction).min(shape.volume() as f64);
    let mut mask = Mask::zeros(shape);
    while (mask.sum() as f64) < target {
        add_random_patch(&mut mask, border, rng);
    }
    mask
}

fn add_random_patch(mask: &mut Mask, border: usize, rng: &mut impl Rng) {
    let shape = mask.shape();
    let instrument = rng.random_range(0..shape.instruments);
    let t0 = rng.random_range(0..shape.timesteps);
    let p0 = rng.random_range(0..shape.pitches);
    let t1 = (t0 + 2 * border).min(shape.timesteps);
    let p1 = (p0 + 2 * border).min(shape.pitches);
    for t in t0..t1 {
        for p in p0..p1 {
            mask.set(t, p, instrument, 1.0);
        }
    }
}

/// Mask a contiguous pitch band of width `2 * border` across the full time
/// axis, on one random instrument.
pub fn random_pitch_range_mask(shape: Shape, border: usize, rng: &mut impl Rng) -> Mask {
    let width = 2 * border;
    assert!(width <= shape.pitches, "pitch band wider than pitch axis");
    let instrument = rng.random_range(0..shape.instruments);
    let p0 = rng.random_range(0..=shape.pitches - width);

    let mut mask = Mask::zeros(shape);
    for t in 0..shape.timesteps {
        for p in p0..p0 + width {
            mask.set(t, p, instrument, 1.0);
        }
    }
    mask
}

/// Mask a contiguous time window of width `2 * border` across the full
/// pitch axis, on one random instrument.
pub fn random_time_range_mask(shape: Shape, border: usize, rng: &mut impl Rng) -> Mask {
    let width = 2 * border;
    assert!(width <= shape.timesteps, "time window wider than time axis");
    let instrument = rng.random_range(0..shape.instruments);
    let t0 = rng.random_range(0..=shape.timesteps - width);

    let mut mask = Mask::zeros(shape);
    for t in t0..t0 + width {
        for p in 0..shape.pitches {
            mask.set(t, p, instrument, 1.0);
        }
    }
    mask
}

/// Union `count` random time windows, each on an independently chosen
/// instrument. With `count = 1` this is a single time-range mask.
pub fn multiple_random_instrument_time_mask(
    shape: Shape,
    border: usize,
    count: usize,
    rng: &mut impl Rng,
) -> Mask {
    let mut mask = Mask::zeros(shape);
    for _ in 0..count {
        mask.union(&random_time_range_mask(shape, border, rng));
    }
    mask
}

/// Convention for the mask channel group of a stacked input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaskChannelPolicy {
    /// 1 marks cells to predict (the mask as built).
    #[default]
    MarkMasked,
    /// 1 marks known context (the mask bit-inverted).
    MarkKnown,
}

/// A predictor input: the masked score channel group concatenated with the
/// mask channel group, logical shape (time, pitch, instrument * 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackedInput {
    shape: Shape,
    /// Score group: the roll with masked cells forced to zero.
    score: Vec<f32>,
    /// Mask group, post `MaskChannelPolicy`.
    mask: Vec<f32>,
}

impl StackedInput {
    /// Shape of one channel group (the underlying pianoroll shape).
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn score_at(&self, t: usize, p: usize, i: usize) -> f32 {
        self.score[self.shape.index(t, p, i)]
    }

    #[inline]
    pub fn mask_at(&self, t: usize, p: usize, i: usize) -> f32 {
        self.mask[self.shape.index(t, p, i)]
    }

    /// The score group's pitch row for one (timestep, instrument) cell.
    pub fn score_row(&self, t: usize, i: usize) -> &[f32] {
        let start = self.shape.index(t, 0, i);
        &self.score[start..start + self.shape.pitches]
    }
}

/// Zero the score under the mask and stack both as channel groups.
/// The input roll is never mutated; the returned mask group equals the
/// given mask after applying `policy`.
pub fn apply_mask_and_stack(
    roll: &Pianoroll,
    mask: &Mask,
    policy: MaskChannelPolicy,
) -> StackedInput {
    let shape = roll.shape();
    assert_eq!(shape, mask.shape(), "roll/mask shape mismatch");

    let mut score = roll.data().to_vec();
    for (s, &m) in score.iter_mut().zip(mask.data().iter()) {
        if m > 0.0 {
            *s = 0.0;
        }
    }

    let mask_channel = match policy {
        MaskChannelPolicy::MarkMasked => mask.data().to_vec(),
        MaskChannelPolicy::MarkKnown => mask.data().iter().map(|&m| 1.0 - m).collect(),
    };

    StackedInput {
        shape,
        score,
        mask: mask_channel,
    }
}
