// Seed pieces and batch acquisition.
//
// The scheduler conditions on a batch of seed pianorolls: one designated
// target slot (the piece being rewritten, or silence when generating from
// scratch) plus companion slots whose only job is to keep the predictor's
// batch statistics realistic. This module owns acquiring that batch from
// a library of stored pieces.
//
// Libraries serialize as a single JSON file. Pieces have varying lengths;
// acquisition crops a random window of the requested length from each
// chosen piece. A piece shorter than the request is an error, and
// `random_batch_with_retry` redraws a bounded number of times before
// giving up with a terminal error instead of silently degrading.
//
// `synthetic()` builds a small random-walk library for runs without any
// corpus on disk.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use voiceweave_roll::{Pianoroll, Shape};

/// Bounded attempt budget for seed acquisition.
pub const SEED_ACQUISITION_ATTEMPTS: usize = 30;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed library is empty")]
    Empty,

    #[error("piece '{name}' is {len} timesteps, shorter than the requested {requested}")]
    PieceTooShort {
        name: String,
        len: usize,
        requested: usize,
    },

    #[error("no seed piece of at least {requested} timesteps found in {attempts} attempts")]
    AttemptsExhausted { attempts: usize, requested: usize },

    #[error("prime shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("seed I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("seed deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// The batch handed to the scheduler. `rolls[target_index]` is the piece
/// being generated; every other slot is companion context.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedBatch {
    pub rolls: Vec<Pianoroll>,
    pub target_index: usize,
}

impl SeedBatch {
    /// Common shape of all batch slots.
    pub fn shape(&self) -> Shape {
        assert!(!self.rolls.is_empty(), "seed batch must not be empty");
        let shape = self.rolls[0].shape();
        debug_assert!(
            self.rolls.iter().all(|r| r.shape() == shape),
            "seed batch slots must share one shape"
        );
        shape
    }

    pub fn target(&self) -> &Pianoroll {
        &self.rolls[self.target_index]
    }
}

/// A named stored piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPiece {
    pub name: String,
    pub roll: Pianoroll,
}

/// A collection of seed pieces sharing one pitch/instrument layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedLibrary {
    pub pitches: usize,
    pub instruments: usize,
    pieces: Vec<SeedPiece>,
}

impl SeedLibrary {
    pub fn new(pitches: usize, instruments: usize, pieces: Vec<SeedPiece>) -> Self {
        SeedLibrary {
            pitches,
            instruments,
            pieces,
        }
    }

    /// Load a library from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write the library as JSON.
    pub fn save(&self, path: &Path) -> Result<(), SeedError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    /// A random-walk library: each voice wanders stepwise through the
    /// pitch range, one pitch per timestep. Stands in for a real corpus.
    pub fn synthetic(
        count: usize,
        timesteps: usize,
        pitches: usize,
        instruments: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let shape = Shape::new(timesteps, pitches, instruments);
        let pieces = (0..count)
            .map(|n| {
                let mut roll = Pianoroll::zeros(shape);
                for i in 0..instruments {
                    let mut pitch = rng.random_range(0..pitches);
                    for t in 0..timesteps {
                        roll.set(t, pitch, i, 1.0);
                        let step = rng.random_range(0..5);
                        pitch = match step {
                            0 => pitch.saturating_sub(2),
                            1 => pitch.saturating_sub(1),
                            2 => pitch,
                            3 => (pitch + 1).min(pitches - 1),
                            _ => (pitch + 2).min(pitches - 1),
                        };
                    }
                }
                SeedPiece {
                    name: format!("synthetic-{n}"),
                    roll,
                }
            })
            .collect();
        SeedLibrary::new(pitches, instruments, pieces)
    }

    pub fn pieces(&self) -> &[SeedPiece] {
        &self.pieces
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Crop a random window of `requested` timesteps from a piece.
    fn crop_random(
        &self,
        piece: &SeedPiece,
        requested: usize,
        rng: &mut impl Rng,
    ) -> Result<Pianoroll, SeedError> {
        let shape = piece.roll.shape();
        if shape.timesteps < requested {
            return Err(SeedError::PieceTooShort {
                name: piece.name.clone(),
                len: shape.timesteps,
                requested,
            });
        }
        let start = rng.random_range(0..=shape.timesteps - requested);
        let cropped_shape = Shape::new(requested, shape.pitches, shape.instruments);
        let mut cropped = Pianoroll::zeros(cropped_shape);
        for t in 0..requested {
            for p in 0..shape.pitches {
                for i in 0..shape.instruments {
                    cropped.set(t, p, i, piece.roll.get(start + t, p, i));
                }
            }
        }
        Ok(cropped)
    }

    /// Draw a batch of random pieces, cropped to `requested` timesteps.
    /// Returns the batch and the target piece's name.
    pub fn random_batch(
        &self,
        batch_size: usize,
        requested: usize,
        target_index: usize,
        rng: &mut impl Rng,
    ) -> Result<(SeedBatch, String), SeedError> {
        if self.pieces.is_empty() {
            return Err(SeedError::Empty);
        }
        assert!(target_index < batch_size, "target index outside the batch");

        let mut rolls = Vec::with_capacity(batch_size);
        let mut target_name = String::new();
        for slot in 0..batch_size {
            let piece = &self.pieces[rng.random_range(0..self.pieces.len())];
            rolls.push(self.crop_random(piece, requested, rng)?);
            if slot == target_index {
                target_name = piece.name.clone();
            }
        }
        Ok((
            SeedBatch {
                rolls,
                target_index,
            },
            target_name,
        ))
    }

    /// `random_batch`, redrawn up to `attempts` times when a chosen piece
    /// is shorter than the request. Exhausting the budget is terminal.
    pub fn random_batch_with_retry(
        &self,
        batch_size: usize,
        requested: usize,
        target_index: usize,
        attempts: usize,
        rng: &mut impl Rng,
    ) -> Result<(SeedBatch, String), SeedError> {
        for _ in 0..attempts {
            match self.random_batch(batch_size, requested, target_index, rng) {
                Ok(result) => return Ok(result),
                Err(SeedError::PieceTooShort { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(SeedError::AttemptsExhausted {
            attempts,
            requested,
        })
    }

    /// A batch whose target slot is silence; companions come from the
    /// library. Used when generating from scratch.
    pub fn batch_with_empty_target(
        &self,
        batch_size: usize,
        requested: usize,
        target_index: usize,
        attempts: usize,
        rng: &mut impl Rng,
    ) -> Result<SeedBatch, SeedError> {
        let (mut batch, _) =
            self.random_batch_with_retry(batch_size, requested, target_index, attempts, rng)?;
        batch.rolls[batch.target_index] =
            Pianoroll::zeros(Shape::new(requested, self.pitches, self.instruments));
        Ok(batch)
    }

    /// A batch whose target slot holds a prime: the prime's usable voices
    /// over the leading `duration_ratio` of the window, silence elsewhere.
    pub fn batch_with_prime(
        &self,
        prime: &Pianoroll,
        voices: &[usize],
        duration_ratio: f64,
        batch_size: usize,
        requested: usize,
        target_index: usize,
        attempts: usize,
        rng: &mut impl Rng,
    ) -> Result<SeedBatch, SeedError> {
        let prime_shape = prime.shape();
        if prime_shape.pitches != self.pitches || prime_shape.instruments != self.instruments {
            return Err(SeedError::ShapeMismatch(format!(
                "prime is {}x{} (pitch x instrument), library is {}x{}",
                prime_shape.pitches, prime_shape.instruments, self.pitches, self.instruments
            )));
        }

        let (mut batch, _) =
            self.random_batch_with_retry(batch_size, requested, target_index, attempts, rng)?;

        let mut target = Pianoroll::zeros(Shape::new(requested, self.pitches, self.instruments));
        let prime_span = ((requested as f64 * duration_ratio) as usize)
            .min(requested)
            .min(prime_shape.timesteps);
        for t in 0..prime_span {
            for &voice in voices {
                for p in 0..self.pitches {
                    target.set(t, p, voice, prime.get(t, p, voice));
                }
            }
        }
        batch.rolls[batch.target_index] = target;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn library(piece_lengths: &[usize]) -> SeedLibrary {
        let mut rng = StdRng::seed_from_u64(1);
        let pieces = piece_lengths
            .iter()
            .enumerate()
            .map(|(n, &len)| {
                let lib = SeedLibrary::synthetic(1, len, 12, 4, &mut rng);
                SeedPiece {
                    name: format!("piece-{n}"),
                    roll: lib.pieces()[0].roll.clone(),
                }
            })
            .collect();
        SeedLibrary::new(12, 4, pieces)
    }

    #[test]
    fn test_random_batch_crops_to_request() {
        let lib = library(&[32, 40, 64]);
        let mut rng = StdRng::seed_from_u64(2);
        let (batch, name) = lib.random_batch(4, 16, 0, &mut rng).unwrap();

        assert_eq!(batch.rolls.len(), 4);
        assert_eq!(batch.shape(), Shape::new(16, 12, 4));
        assert!(name.starts_with("piece-"));
        // Synthetic pieces are legal: one pitch per cell survives cropping.
        assert_eq!(batch.target().sum() as usize, 16 * 4);
    }

    #[test]
    fn test_short_piece_is_an_error() {
        let lib = library(&[8]);
        let mut rng = StdRng::seed_from_u64(3);
        let err = lib.random_batch(2, 16, 0, &mut rng);
        assert!(matches!(err, Err(SeedError::PieceTooShort { .. })));
    }

    #[test]
    fn test_retry_finds_a_long_piece() {
        // One long piece among short ones: retries should eventually land
        // an all-long draw.
        let lib = library(&[64]);
        let short_heavy = {
            let mut pieces = lib.pieces().to_vec();
            pieces.push(library(&[4]).pieces()[0].clone());
            SeedLibrary::new(12, 4, pieces)
        };
        let mut rng = StdRng::seed_from_u64(4);
        let result = short_heavy.random_batch_with_retry(2, 32, 0, SEED_ACQUISITION_ATTEMPTS, &mut rng);
        assert!(result.is_ok());
    }

    #[test]
    fn test_retry_exhaustion_is_terminal() {
        let lib = library(&[8, 8]);
        let mut rng = StdRng::seed_from_u64(5);
        let err = lib.random_batch_with_retry(2, 16, 0, 5, &mut rng);
        assert!(matches!(
            err,
            Err(SeedError::AttemptsExhausted {
                attempts: 5,
                requested: 16
            })
        ));
    }

    #[test]
    fn test_empty_target_batch() {
        let lib = library(&[32, 32]);
        let mut rng = StdRng::seed_from_u64(6);
        let batch = lib
            .batch_with_empty_target(3, 16, 1, SEED_ACQUISITION_ATTEMPTS, &mut rng)
            .unwrap();
        assert_eq!(batch.target_index, 1);
        assert_eq!(batch.target().sum(), 0.0);
        assert!(batch.rolls[0].sum() > 0.0);
    }

    #[test]
    fn test_prime_batch_restricts_voices_and_span() {
        let lib = library(&[32, 32]);
        let mut rng = StdRng::seed_from_u64(7);
        let prime = lib.pieces()[0].roll.clone();

        let batch = lib
            .batch_with_prime(
                &prime,
                &[0],
                0.5,
                2,
                16,
                0,
                SEED_ACQUISITION_ATTEMPTS,
                &mut rng,
            )
            .unwrap();

        let target = batch.target();
        // Voice 0 carries the prime over the first half.
        let first_half: f32 = (0..8)
            .map(|t| target.row(t, 0).iter().sum::<f32>())
            .sum();
        assert_eq!(first_half as usize, 8);
        // Nothing outside the primed span or voice set.
        for t in 8..16 {
            assert_eq!(target.pitch_at(t, 0), None);
        }
        for t in 0..16 {
            for i in 1..4 {
                assert_eq!(target.pitch_at(t, i), None);
            }
        }
    }

    #[test]
    fn test_library_file_roundtrip() {
        let lib = library(&[16]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeds.json");
        lib.save(&path).unwrap();

        let restored = SeedLibrary::load(&path).unwrap();
        assert_eq!(restored.pitches, 12);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.pieces()[0].roll, lib.pieces()[0].roll);
    }
}
