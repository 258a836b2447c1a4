// Run configuration for the generation scheduler.
//
// All parameters for a generation run live in `GenerationConfig`, an
// immutable value constructed up front and passed into the scheduler.
// There is no process-wide configuration state; two runs with different
// configs can coexist in one process.
//
// `validate()` catches configuration errors before any predictor call:
// empty regeneration sets, orderings that don't cover the regeneration
// set, conflicting priming options, degenerate temperatures. Unknown
// timestep-order names are rejected at parse time by the `FromStr` impl.
//
// Named preset constructors (`from_scratch()`, `regenerate_piece()`,
// `sequential_sweep()`) produce the common run shapes by tuning the same
// parameter set.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use voiceweave_roll::MaskChannelPolicy;

/// Configuration errors, raised before any predictor call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown timestep order '{0}' (expected 'sequential' or 'random')")]
    UnknownTimestepOrder(String),

    #[error("no instruments to regenerate")]
    EmptyRegenerationSet,

    #[error("instrument ordering {ordering:?} does not cover the regeneration set {set:?}")]
    OrderingMismatch {
        ordering: Vec<usize>,
        set: Vec<usize>,
    },

    #[error("priming options conflict with starting from an empty score")]
    ConflictingPriming,

    #[error("rewrite_iterations must be at least 1")]
    ZeroRewriteIterations,

    #[error("temperature must be finite and non-negative, got {0}")]
    BadTemperature(f32),

    #[error("num_samples must be at least 1")]
    ZeroSamples,
}

/// Timestep visitation order within one instrument occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestepOrder {
    /// Visit timesteps left to right.
    Sequential,
    /// A fresh random permutation of all timesteps per occurrence.
    #[default]
    Random,
}

impl FromStr for TimestepOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(TimestepOrder::Sequential),
            "random" => Ok(TimestepOrder::Random),
            other => Err(ConfigError::UnknownTimestepOrder(other.to_string())),
        }
    }
}

/// Closed set of generation strategies. Dispatch is an explicit `match` in
/// the scheduler, never a name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStrategy {
    /// Rewrite the piece voice by voice: blank one instrument, fill it back
    /// in cell by cell, move to the next.
    #[default]
    VoiceByVoice,
}

/// Priming: seed the target slot from a stored piece instead of the
/// validation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimeOptions {
    /// Path to a JSON-serialized pianoroll.
    pub path: PathBuf,
    /// Which of the prime's voices are usable as context.
    pub voices: Vec<usize>,
    /// Fraction of the requested duration the prime occupies, from the top.
    pub duration_ratio: f64,
}

/// Immutable parameters for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub strategy: GenerationStrategy,
    /// Instrument indices to regenerate.
    pub instruments_to_regenerate: Vec<usize>,
    /// Explicit base visitation order. `None` draws a random permutation of
    /// the regeneration set once per run.
    pub instrument_ordering: Option<Vec<usize>>,
    pub timestep_order: TimestepOrder,
    /// Pitch-selection sharpness: 0 = argmax, higher = more uniform.
    pub temperature: f32,
    /// Number of rewrite passes over the regeneration set.
    pub rewrite_iterations: usize,
    /// Start from an all-zero score instead of the seed target.
    pub start_with_empty: bool,
    /// Which batch slot is the piece being generated.
    pub target_index: usize,
    /// Pieces to generate from one acquired seed batch.
    pub num_samples: usize,
    /// Crop length for seed pieces, in timesteps.
    pub requested_timesteps: usize,
    /// Mask-channel convention the predictor was trained with.
    pub mask_channel_policy: MaskChannelPolicy,
    pub prime: Option<PrimeOptions>,
}

impl GenerationConfig {
    /// Check for configuration errors. Called by the scheduler before any
    /// predictor work; callers fix and retry, the scheduler never does.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments_to_regenerate.is_empty() {
            return Err(ConfigError::EmptyRegenerationSet);
        }
        if let Some(ordering) = &self.instrument_ordering {
            let mut a = ordering.clone();
            let mut b = self.instruments_to_regenerate.clone();
            a.sort_unstable();
            b.sort_unstable();
            if a != b {
                return Err(ConfigError::OrderingMismatch {
                    ordering: ordering.clone(),
                    set: self.instruments_to_regenerate.clone(),
                });
            }
        }
        if self.start_with_empty && self.prime.is_some() {
            return Err(ConfigError::ConflictingPriming);
        }
        if self.rewrite_iterations == 0 {
            return Err(ConfigError::ZeroRewriteIterations);
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ConfigError::BadTemperature(self.temperature));
        }
        if self.num_samples == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        Ok(())
    }

    /// Generate a piece from silence: all four voices, several rewrite
    /// passes, stochastic pitch selection.
    pub fn from_scratch() -> Self {
        GenerationConfig {
            strategy: GenerationStrategy::VoiceByVoice,
            instruments_to_regenerate: vec![0, 1, 2, 3],
            instrument_ordering: None,
            timestep_order: TimestepOrder::Random,
            temperature: 1.0,
            rewrite_iterations: 5,
            start_with_empty: true,
            target_index: 0,
            num_samples: 3,
            requested_timesteps: 32,
            mask_channel_policy: MaskChannelPolicy::MarkMasked,
            prime: None,
        }
    }

    /// Rewrite an existing piece voice by voice, keeping it as the initial
    /// context.
    pub fn regenerate_piece() -> Self {
        GenerationConfig {
            strategy: GenerationStrategy::VoiceByVoice,
            instruments_to_regenerate: vec![0, 1, 2, 3],
            instrument_ordering: None,
            timestep_order: TimestepOrder::Random,
            temperature: 1.0,
            rewrite_iterations: 10,
            start_with_empty: false,
            target_index: 0,
            num_samples: 1,
            requested_timesteps: 16,
            mask_channel_policy: MaskChannelPolicy::MarkMasked,
            prime: None,
        }
    }

    /// One deterministic left-to-right pass: sequential timesteps, argmax
    /// pitch selection, a single rewrite iteration.
    pub fn sequential_sweep() -> Self {
        GenerationConfig {
            strategy: GenerationStrategy::VoiceByVoice,
            instruments_to_regenerate: vec![0, 1, 2, 3],
            instrument_ordering: Some(vec![0, 1, 2, 3]),
            timestep_order: TimestepOrder::Sequential,
            temperature: 0.0,
            rewrite_iterations: 1,
            start_with_empty: true,
            target_index: 0,
            num_samples: 1,
            requested_timesteps: 32,
            mask_channel_policy: MaskChannelPolicy::MarkMasked,
            prime: None,
        }
    }
}
