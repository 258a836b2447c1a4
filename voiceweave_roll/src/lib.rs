// voiceweave_roll: pianoroll tensor and masking policy library.
//
// This crate holds the data model shared by the whole project: the dense
// binary pianoroll tensor over (time, pitch, instrument), the same-shaped
// regeneration mask, and the policies for building masks and assembling
// masked model inputs. It knows nothing about predictive models, sampling,
// or file formats beyond serde derives; that all lives in `voiceweave_gen`.
//
// Module overview:
// - `roll.rs`: Shape, Pianoroll, Prediction. Dense tensors with pitch
//   contiguous so per-cell distributions are slices.
// - `mask.rs`: Mask + the mask builders (instrument, patch, pitch-range,
//   time-range policies) and `apply_mask_and_stack`.
//
// **Critical constraint: determinism.** Every randomized builder takes an
// explicit `&mut impl Rng`. There is no ambient randomness anywhere in this
// crate; a run is reproducible from a single seed as long as callers draw
// from one generator in a fixed order.

pub mod mask;
pub mod roll;

pub use mask::{Mask, MaskChannelPolicy, StackedInput, apply_mask_and_stack};
pub use roll::{Pianoroll, Prediction, Shape};
