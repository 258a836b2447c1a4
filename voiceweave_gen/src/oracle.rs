// The predictor boundary.
//
// The scheduler only ever talks to a `PredictionOracle`: hand in a batch
// of stacked inputs, get back one per-cell pitch distribution tensor per
// batch slot. A trained model lives behind this trait in its own process
// or crate; nothing here knows about checkpoints or network weights.
//
// `IntervalModelOracle` is the shipped implementation: an interval
// weight-table model that scores each candidate pitch by its melodic
// interval from the nearest sounding neighbors in the same voice and its
// vertical interval against the other voices. Tables are loadable from
// JSON (exported by corpus analysis) with built-in defaults that favor
// stepwise motion and consonance. It is deliberately small; its job is to
// give the generation loop a real conditional distribution to drive, and
// to stand in for a heavyweight model in tests and the CLI.
//
// `UniformOracle` ignores its input entirely. Useful as a baseline and in
// tests that need fully predictable distributions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use voiceweave_roll::{Prediction, Shape, StackedInput};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("batch shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("model evaluation failed: {0}")]
    Evaluation(String),
}

/// The trained predictor, seen from the scheduler's side.
///
/// Implementations must return exactly one `Prediction` per input, shaped
/// like the input's pianoroll, with the pitch axis summing to 1 per
/// (timestep, instrument) cell.
pub trait PredictionOracle {
    fn predict(&mut self, batch: &[StackedInput]) -> Result<Vec<Prediction>, OracleError>;
}

/// Interval weight table: interval in semitone steps -> unnormalized weight.
type WeightTable = BTreeMap<i16, f64>;

/// Weight for an interval, with a small floor so unseen intervals stay
/// possible but rare.
fn table_weight(table: &WeightTable, interval: i16) -> f64 {
    const FLOOR: f64 = 0.01;
    table.get(&interval).copied().unwrap_or(FLOOR)
}

/// Melodic and harmonic interval tables for `IntervalModelOracle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalTables {
    /// Weight of moving by an interval within one voice.
    pub melodic: WeightTable,
    /// Weight of sounding an interval against another voice.
    pub harmonic: WeightTable,
}

impl IntervalTables {
    /// Load tables from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let tables: IntervalTables = serde_json::from_str(&data)?;
        Ok(tables)
    }

    /// Built-in defaults: stepwise motion dominates melodically, thirds
    /// next; vertically, consonances outweigh dissonances.
    pub fn default_tables() -> Self {
        let mut melodic = WeightTable::new();
        melodic.insert(0, 5.0);
        for step in [1i16, 2] {
            melodic.insert(step, 15.0);
            melodic.insert(-step, 15.0);
        }
        for third in [3i16, 4] {
            melodic.insert(third, 5.0);
            melodic.insert(-third, 5.0);
        }
        melodic.insert(5, 3.0);
        melodic.insert(-5, 3.0);
        melodic.insert(7, 2.0);
        melodic.insert(-7, 2.0);
        melodic.insert(12, 1.0);
        melodic.insert(-12, 1.0);

        let mut harmonic = WeightTable::new();
        for interval in -24i16..=24 {
            let ic = interval.unsigned_abs() % 12;
            let weight = match ic {
                0 => 8.0,       // unison/octave
                3 | 4 => 10.0,  // thirds
                5 => 6.0,       // perfect 4th
                7 => 12.0,      // perfect 5th
                8 | 9 => 8.0,   // sixths
                _ => 1.0,       // dissonances
            };
            harmonic.insert(interval, weight);
        }

        IntervalTables { melodic, harmonic }
    }
}

/// Interval-table predictor: per-cell pitch distributions conditioned on
/// the masked score context.
#[derive(Debug, Clone)]
pub struct IntervalModelOracle {
    tables: IntervalTables,
}

impl IntervalModelOracle {
    pub fn new(tables: IntervalTables) -> Self {
        IntervalModelOracle { tables }
    }

    pub fn with_defaults() -> Self {
        IntervalModelOracle::new(IntervalTables::default_tables())
    }

    /// The nearest sounding pitch for `instrument` strictly before `t`.
    fn pitch_before(input: &StackedInput, t: usize, instrument: usize) -> Option<usize> {
        (0..t)
            .rev()
            .find_map(|tb| row_pitch(input, tb, instrument))
    }

    /// The nearest sounding pitch for `instrument` strictly after `t`.
    fn pitch_after(input: &StackedInput, t: usize, instrument: usize) -> Option<usize> {
        (t + 1..input.shape().timesteps).find_map(|ta| row_pitch(input, ta, instrument))
    }

    /// Score every candidate pitch for one (timestep, instrument) cell.
    fn cell_distribution(&self, input: &StackedInput, t: usize, instrument: usize) -> Vec<f32> {
        let shape = input.shape();
        let prev = Self::pitch_before(input, t, instrument);
        let next = Self::pitch_after(input, t, instrument);

        let vertical: Vec<usize> = (0..shape.instruments)
            .filter(|&j| j != instrument)
            .filter_map(|j| row_pitch(input, t, j))
            .collect();

        if prev.is_none() && next.is_none() && vertical.is_empty() {
            // No context at all: the model has nothing to condition on.
            return vec![1.0 / shape.pitches as f32; shape.pitches];
        }

        let mut weights = vec![0.0f64; shape.pitches];
        for (p, w) in weights.iter_mut().enumerate() {
            let mut weight = 1.0;
            if let Some(prev) = prev {
                weight *= table_weight(&self.tables.melodic, p as i16 - prev as i16);
            }
            if let Some(next) = next {
                weight *= table_weight(&self.tables.melodic, next as i16 - p as i16);
            }
            for &q in &vertical {
                weight *= table_weight(&self.tables.harmonic, p as i16 - q as i16);
            }
            *w = weight;
        }

        let total: f64 = weights.iter().sum();
        weights.iter().map(|&w| (w / total) as f32).collect()
    }
}

/// The sounding pitch in the score channel at (t, instrument), lowest wins.
fn row_pitch(input: &StackedInput, t: usize, instrument: usize) -> Option<usize> {
    input
        .score_row(t, instrument)
        .iter()
        .position(|&v| v > 0.0)
}

impl PredictionOracle for IntervalModelOracle {
    fn predict(&mut self, batch: &[StackedInput]) -> Result<Vec<Prediction>, OracleError> {
        let mut predictions = Vec::with_capacity(batch.len());
        for input in batch {
            let shape = input.shape();
            let mut prediction = Prediction::uniform(shape);
            for t in 0..shape.timesteps {
                for i in 0..shape.instruments {
                    let row = self.cell_distribution(input, t, i);
                    prediction.set_distribution(t, i, &row);
                }
            }
            predictions.push(prediction);
        }
        Ok(predictions)
    }
}

/// Uniform distribution at every cell, regardless of input.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformOracle;

impl PredictionOracle for UniformOracle {
    fn predict(&mut self, batch: &[StackedInput]) -> Result<Vec<Prediction>, OracleError> {
        Ok(batch
            .iter()
            .map(|input| Prediction::uniform(input.shape()))
            .collect())
    }
}

/// Check that a prediction's pitch axis is normalized everywhere.
/// Intended for oracle implementations' own tests.
pub fn assert_normalized(prediction: &Prediction) {
    let shape: Shape = prediction.shape();
    for t in 0..shape.timesteps {
        for i in 0..shape.instruments {
            let total: f32 = prediction.distribution(t, i).iter().sum();
            assert!(
                (total - 1.0).abs() < 1e-4,
                "distribution at (t={t}, i={i}) sums to {total}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voiceweave_roll::{MaskChannelPolicy, Pianoroll, apply_mask_and_stack, mask};

    fn stacked_with_context(shape: Shape) -> StackedInput {
        let mut roll = Pianoroll::zeros(shape);
        // A short soprano line and one alto note to condition on.
        roll.set(0, 6, 0, 1.0);
        roll.set(1, 7, 0, 1.0);
        roll.set(1, 3, 1, 1.0);
        let mask = mask::instrument_mask(shape, 2);
        apply_mask_and_stack(&roll, &mask, MaskChannelPolicy::MarkMasked)
    }

    #[test]
    fn test_predictions_are_normalized() {
        let shape = Shape::new(4, 12, 3);
        let mut oracle = IntervalModelOracle::with_defaults();
        let preds = oracle.predict(&[stacked_with_context(shape)]).unwrap();
        assert_eq!(preds.len(), 1);
        assert_normalized(&preds[0]);
    }

    #[test]
    fn test_stepwise_motion_preferred() {
        let shape = Shape::new(4, 12, 1);
        let mut roll = Pianoroll::zeros(shape);
        roll.set(0, 5, 0, 1.0);
        let mask = mask::instrument_mask(shape, 0);
        // Keep timestep 0 as context by not masking it: build a time-range
        // mask over the tail instead.
        let mut tail_mask = mask;
        tail_mask.clear_cell_column(0, 0);

        let stacked = apply_mask_and_stack(&roll, &tail_mask, MaskChannelPolicy::MarkMasked);
        let mut oracle = IntervalModelOracle::with_defaults();
        let preds = oracle.predict(&[stacked]).unwrap();

        let row = preds[0].distribution(1, 0);
        // A step from pitch 5 should outweigh a tritone leap.
        assert!(row[6] > row[11]);
        assert!(row[4] > row[11]);
    }

    #[test]
    fn test_no_context_is_uniform() {
        let shape = Shape::new(3, 8, 2);
        let roll = Pianoroll::zeros(shape);
        let m = mask::instrument_mask(shape, 0);
        let stacked = apply_mask_and_stack(&roll, &m, MaskChannelPolicy::MarkMasked);

        let mut oracle = IntervalModelOracle::with_defaults();
        let preds = oracle.predict(&[stacked]).unwrap();
        let row = preds[0].distribution(1, 0);
        let expected = 1.0 / shape.pitches as f32;
        assert!(row.iter().all(|&p| (p - expected).abs() < 1e-6));
    }

    #[test]
    fn test_uniform_oracle_batch() {
        let shape = Shape::new(2, 12, 3);
        let mut oracle = UniformOracle;
        let input = stacked_with_context(shape);
        let preds = oracle.predict(&[input.clone(), input]).unwrap();
        assert_eq!(preds.len(), 2);
        assert_normalized(&preds[0]);
        assert_eq!(preds[0].distribution(0, 0)[0], 1.0 / shape.pitches as f32);
    }

    #[test]
    fn test_tables_json_roundtrip() {
        let tables = IntervalTables::default_tables();
        let json = serde_json::to_string(&tables).unwrap();
        let restored: IntervalTables = serde_json::from_str(&json).unwrap();
        assert_eq!(tables.melodic, restored.melodic);
        assert_eq!(tables.harmonic, restored.harmonic);
    }
}
