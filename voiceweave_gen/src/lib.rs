// voiceweave_gen: iterative voice infilling for multi-instrument scores.
//
// Given a trained predictor that maps a masked pianoroll to per-cell pitch
// distributions, this crate rewrites a piece voice by voice: blank one
// instrument, refill it one cell at a time (each decision conditioned on
// everything committed so far), repeat for several rewrite passes. The
// result is a complete piece plus a full decision trace.
//
// Module overview:
// - `config.rs`:   GenerationConfig + validation, strategy/order enums,
//                  named presets.
// - `sample.rs`:   temperature-based pitch selection from a distribution.
// - `trace.rs`:    append-only record of every committed decision.
// - `oracle.rs`:   the PredictionOracle boundary + the interval-table
//                  reference model and a uniform baseline.
// - `generate.rs`: the scheduler (the heart of the crate).
// - `seed.rs`:     seed piece library and batch acquisition with bounded
//                  retry.
// - `midi.rs`:     pianoroll to Standard MIDI File.
// - `run.rs`:      config -> seed batch -> N samples -> files on disk.
//
// The companion crate `voiceweave_roll` holds the pianoroll tensor and the
// masking policy library.
//
// **Critical constraint: determinism.** A run draws every random decision
// from one caller-seeded generator in a fixed order (instrument ordering,
// timestep permutations, companion masks, pitch sampling). The same seed,
// config, and oracle reproduce a piece bit for bit.

pub mod config;
pub mod generate;
pub mod midi;
pub mod oracle;
pub mod run;
pub mod sample;
pub mod seed;
pub mod trace;
