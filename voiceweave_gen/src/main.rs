// voiceweave CLI entry point.
//
// Generates pieces by iterative voice infilling and writes MIDI + decision
// traces to a per-run directory.
//
// Usage:
//   cargo run -p voiceweave_gen --bin generate -- [--out DIR] [--preset NAME]
//     [--seed N] [--timesteps N] [--temperature T] [--rewrite-iterations N]
//     [--timestep-order sequential|random] [--samples N] [--batch-size N]
//     [--pitches N] [--instruments N] [--library FILE] [--tables FILE]
//     [--run-id NAME]
//
// Presets: from-scratch, regenerate, sweep

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::str::FromStr;
use voiceweave_gen::config::{GenerationConfig, TimestepOrder};
use voiceweave_gen::midi::MidiSettings;
use voiceweave_gen::oracle::{IntervalModelOracle, IntervalTables};
use voiceweave_gen::run::run_generation;
use voiceweave_gen::seed::SeedLibrary;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let out_dir: PathBuf = parse_flag(&args, "--out").unwrap_or_else(|| PathBuf::from("generated"));
    let preset: String = parse_flag(&args, "--preset").unwrap_or_else(|| "from-scratch".to_string());
    let seed: Option<u64> = parse_flag(&args, "--seed");
    let batch_size: usize = parse_flag(&args, "--batch-size").unwrap_or(4);
    let pitches: usize = parse_flag(&args, "--pitches").unwrap_or(46);
    let instruments: usize = parse_flag(&args, "--instruments").unwrap_or(4);
    let library_path: Option<PathBuf> = parse_flag(&args, "--library");
    let tables_path: Option<PathBuf> = parse_flag(&args, "--tables");

    let mut config = match preset.as_str() {
        "from-scratch" => GenerationConfig::from_scratch(),
        "regenerate" => GenerationConfig::regenerate_piece(),
        "sweep" => GenerationConfig::sequential_sweep(),
        other => {
            eprintln!("Unknown preset '{other}'. Using from-scratch.");
            GenerationConfig::from_scratch()
        }
    };

    if let Some(timesteps) = parse_flag(&args, "--timesteps") {
        config.requested_timesteps = timesteps;
    }
    if let Some(temperature) = parse_flag(&args, "--temperature") {
        config.temperature = temperature;
    }
    if let Some(iterations) = parse_flag(&args, "--rewrite-iterations") {
        config.rewrite_iterations = iterations;
    }
    if let Some(samples) = parse_flag(&args, "--samples") {
        config.num_samples = samples;
    }
    if let Some(order) = parse_flag::<String>(&args, "--timestep-order") {
        match TimestepOrder::from_str(&order) {
            Ok(parsed) => config.timestep_order = parsed,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
    config.instruments_to_regenerate = (0..instruments).collect();
    if config.instrument_ordering.is_some() {
        config.instrument_ordering = Some((0..instruments).collect());
    }

    println!("=== voiceweave ===");
    println!("Preset: {preset}");
    println!("Output: {}", out_dir.display());
    println!(
        "Shape: {} timesteps x {} pitches x {} instruments",
        config.requested_timesteps, pitches, instruments
    );
    println!("Temperature: {}", config.temperature);
    println!("Rewrite iterations: {}", config.rewrite_iterations);
    println!("Samples: {}", config.num_samples);
    if let Some(s) = seed {
        println!("Seed: {s}");
    }
    println!();

    let mut rng = if let Some(s) = seed {
        StdRng::seed_from_u64(s)
    } else {
        StdRng::from_os_rng()
    };

    println!("[1/4] Loading seed library...");
    let library = match &library_path {
        Some(path) => match SeedLibrary::load(path) {
            Ok(lib) => {
                println!("  Loaded {} pieces from {}.", lib.len(), path.display());
                lib
            }
            Err(e) => {
                eprintln!("  Failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => {
            println!("  No library given, using a synthetic random-walk corpus.");
            SeedLibrary::synthetic(8, 64, pitches, instruments, &mut rng)
        }
    };

    println!("[2/4] Loading predictor tables...");
    let mut oracle = match &tables_path {
        Some(path) => match IntervalTables::load(path) {
            Ok(tables) => {
                println!("  Loaded interval tables from {}.", path.display());
                IntervalModelOracle::new(tables)
            }
            Err(e) => {
                eprintln!("  Failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => {
            println!("  Using built-in default tables.");
            IntervalModelOracle::with_defaults()
        }
    };

    let run_id: String = parse_flag(&args, "--run-id").unwrap_or_else(|| {
        // Without an explicit id, derive one from the RNG so seeded runs
        // name their outputs reproducibly.
        format!("{preset}-{:08x}", rng.random::<u32>())
    });

    println!("[3/4] Generating {} sample(s) as run '{run_id}'...", config.num_samples);
    let summary = match run_generation(
        &config,
        &library,
        &mut oracle,
        &out_dir,
        &run_id,
        batch_size,
        &MidiSettings::default(),
        &mut rng,
    ) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("  Generation failed: {e}");
            std::process::exit(1);
        }
    };

    println!("  Seed piece: {}", summary.target_name);
    for (path, ordering) in summary.generated.iter().zip(summary.orderings.iter()) {
        println!("  {} (ordering {})", path.display(), ordering);
    }

    println!("[4/4] Done. Outputs in {}.", summary.run_dir.display());
    println!();
    println!(
        "Play with: timidity {} (or any MIDI player)",
        summary.generated[0].display()
    );
}

fn parse_flag<T: FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
