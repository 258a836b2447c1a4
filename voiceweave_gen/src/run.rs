// Run orchestration: from a config to files on disk.
//
// A "run" acquires one seed batch, generates `num_samples` pieces from it,
// and writes everything under a per-run directory:
//
//   <out_dir>/<run_id>/config.json        the exact config used
//   <out_dir>/<run_id>/original.mid       the seed target (non-empty runs)
//   <out_dir>/<run_id>/generated-<n>.mid  each generated piece
//   <out_dir>/<run_id>/trace-<n>.json     each piece's decision trace
//
// Seed acquisition picks the priming mode from the config: silence for
// from-scratch runs, a stored prime piece when configured, otherwise a
// random library piece (with the bounded retry for short pieces).
//
// When the config supplies an explicit instrument ordering, the outcome's
// canonical ordering string is cross-checked against the request; a
// mismatch means the scheduler lost the ordering and is a bug, not an
// input problem.

use crate::config::{ConfigError, GenerationConfig};
use crate::generate::{GenerateError, generate, ordering_string};
use crate::midi::{MidiSettings, write_midi};
use crate::oracle::PredictionOracle;
use crate::seed::{SEED_ACQUISITION_ATTEMPTS, SeedBatch, SeedError, SeedLibrary};
use crate::trace::TraceError;
use rand::Rng;
use std::path::{Path, PathBuf};
use thiserror::Error;
use voiceweave_roll::Pianoroll;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("run I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("run serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MIDI output failed: {0}")]
    Midi(String),
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    /// Name of the seed piece in the target slot ("empty" for scratch runs).
    pub target_name: String,
    /// Paths of the generated MIDI files, one per sample.
    pub generated: Vec<PathBuf>,
    /// Canonical instrument ordering of each sample.
    pub orderings: Vec<String>,
}

/// Acquire the seed batch for a config's priming mode.
pub fn acquire_batch(
    config: &GenerationConfig,
    library: &SeedLibrary,
    batch_size: usize,
    rng: &mut impl Rng,
) -> Result<(SeedBatch, String), RunError> {
    if config.start_with_empty {
        let batch = library.batch_with_empty_target(
            batch_size,
            config.requested_timesteps,
            config.target_index,
            SEED_ACQUISITION_ATTEMPTS,
            rng,
        )?;
        return Ok((batch, "empty".to_string()));
    }

    if let Some(prime) = &config.prime {
        let data = std::fs::read_to_string(&prime.path)?;
        let roll: Pianoroll = serde_json::from_str(&data)?;
        let batch = library.batch_with_prime(
            &roll,
            &prime.voices,
            prime.duration_ratio,
            batch_size,
            config.requested_timesteps,
            config.target_index,
            SEED_ACQUISITION_ATTEMPTS,
            rng,
        )?;
        let name = prime
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "prime".to_string());
        return Ok((batch, name));
    }

    let (batch, name) = library.random_batch_with_retry(
        batch_size,
        config.requested_timesteps,
        config.target_index,
        SEED_ACQUISITION_ATTEMPTS,
        rng,
    )?;
    Ok((batch, name))
}

/// Execute a full run and write its outputs under `out_dir/run_id`.
pub fn run_generation(
    config: &GenerationConfig,
    library: &SeedLibrary,
    oracle: &mut impl PredictionOracle,
    out_dir: &Path,
    run_id: &str,
    batch_size: usize,
    midi_settings: &MidiSettings,
    rng: &mut impl Rng,
) -> Result<RunSummary, RunError> {
    config.validate()?;

    let run_dir = out_dir.join(run_id);
    std::fs::create_dir_all(&run_dir)?;
    std::fs::write(
        run_dir.join("config.json"),
        serde_json::to_string_pretty(config)?,
    )?;

    let (batch, target_name) = acquire_batch(config, library, batch_size, rng)?;

    let mut generated_paths = Vec::with_capacity(config.num_samples);
    let mut orderings = Vec::with_capacity(config.num_samples);

    for sample in 0..config.num_samples {
        let outcome = generate(&batch, config, oracle, rng)?;

        if let Some(requested) = &config.instrument_ordering {
            assert_eq!(
                ordering_string(requested),
                outcome.instrument_ordering,
                "scheduler lost the requested instrument ordering"
            );
        }

        if sample == 0 && !config.start_with_empty {
            write_midi(&outcome.original, &run_dir.join("original.mid"), midi_settings)
                .map_err(|e| RunError::Midi(e.to_string()))?;
        }

        let midi_path = run_dir.join(format!("generated-{sample}.mid"));
        write_midi(&outcome.generated, &midi_path, midi_settings)
            .map_err(|e| RunError::Midi(e.to_string()))?;
        outcome.trace.save(&run_dir.join(format!("trace-{sample}.json")))?;

        generated_paths.push(midi_path);
        orderings.push(outcome.instrument_ordering);
    }

    Ok(RunSummary {
        run_dir,
        target_name,
        generated: generated_paths,
        orderings,
    })
}
