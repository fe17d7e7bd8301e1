//! visqol - objective audio quality from the command line
//!
//! Usage:
//!   visqol --reference_file ref.wav --degraded_file deg.wav
//!   visqol --reference_file ref.wav --degraded_file deg.wav --use_speech_mode
//!   visqol --batch_input_csv pairs.csv --results_csv results.csv

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use vq_engine::{
    AudioInput, BatchEntry, BatchSummary, EngineConfig, Mode, Visqol, load_batch_csv, load_file,
    validate_inputs, write_results_csv, write_results_json,
};

#[derive(Parser)]
#[command(
    name = "visqol",
    version,
    about = "Objective MOS-LQO from a reference and a degraded recording"
)]
struct Cli {
    /// Reference audio file
    #[arg(long = "reference_file", requires = "degraded_file")]
    reference_file: Option<PathBuf>,

    /// Degraded audio file
    #[arg(long = "degraded_file", requires = "reference_file")]
    degraded_file: Option<PathBuf>,

    /// CSV with `reference` and `degraded` columns
    #[arg(long = "batch_input_csv", conflicts_with_all = ["reference_file", "degraded_file"])]
    batch_input_csv: Option<PathBuf>,

    /// Write results as CSV
    #[arg(long = "results_csv")]
    results_csv: Option<PathBuf>,

    /// Write full results (per-band similarities included) as JSON
    #[arg(long = "output_debug")]
    output_debug: Option<PathBuf>,

    /// Measure in speech mode (16 kHz, voice activity detection)
    #[arg(long = "use_speech_mode")]
    use_speech_mode: bool,

    /// Directory holding audio.json / speech.json quality models
    #[arg(long = "model_dir")]
    model_dir: Option<PathBuf>,

    /// Worker threads for batch mode (0 = one per core)
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Detailed output and debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let mode = if cli.use_speech_mode {
        Mode::Speech
    } else {
        Mode::Audio
    };
    let mut config = EngineConfig::default()
        .with_mode(mode)
        .with_max_concurrency(cli.jobs);
    if let Some(dir) = &cli.model_dir {
        config = config.with_model_dir(dir);
    }

    let engine = Visqol::with_config(config).context("Failed to initialise the engine")?;
    if let Some(notice) = engine.backend_notice() {
        log::warn!("{}", notice);
    }

    match (&cli.batch_input_csv, &cli.reference_file, &cli.degraded_file) {
        (Some(csv), _, _) => run_batch(cli, &engine, csv),
        (None, Some(reference), Some(degraded)) => run_single(cli, &engine, reference, degraded),
        _ => bail!("Provide --reference_file and --degraded_file, or --batch_input_csv"),
    }
}

fn run_single(cli: &Cli, engine: &Visqol, reference: &Path, degraded: &Path) -> Result<ExitCode> {
    let outcome = engine.measure(reference, degraded);
    let entry = BatchEntry {
        reference: reference.display().to_string(),
        degraded: degraded.display().to_string(),
        outcome,
    };
    write_outputs(cli, std::slice::from_ref(&entry))?;

    let result = match &entry.outcome {
        Ok(result) => result,
        Err(e) => bail!("{} vs {}: {}", entry.reference, entry.degraded, e),
    };

    if cli.verbose {
        println!("Reference: {}", entry.reference);
        print_stats(reference);
        println!("Degraded:  {}", entry.degraded);
        print_stats(degraded);
        println!("Mode:      {}", result.mode());
        println!("Backend:   {}", result.backend());
        println!("MOS-LQO:   {:.6}", result.moslqo());
        println!("VNSIM:     {:.6}", result.vnsim());
        println!();
        println!("{:>12}  {:>8}", "Band (Hz)", "FVNSIM");
        for (freq, sim) in result.bands() {
            println!("{:>12.1}  {:>8.4}", freq, sim);
        }
    } else {
        println!("{:.6}", result.moslqo());
    }

    Ok(ExitCode::SUCCESS)
}

fn run_batch(cli: &Cli, engine: &Visqol, csv: &Path) -> Result<ExitCode> {
    let pairs = load_batch_csv(csv)
        .with_context(|| format!("Failed to read batch file {}", csv.display()))?;
    if pairs.is_empty() {
        bail!("{} lists no file pairs", csv.display());
    }

    let failures = validate_inputs(pairs.iter().flat_map(|p| [&p.reference, &p.degraded]));
    for (path, e) in &failures {
        log::warn!("{}: {}", path.display(), e);
    }
    if !failures.is_empty() {
        log::warn!(
            "{} input file(s) failed validation; their pairs will be reported as failures",
            failures.len()
        );
    }

    println!("Processing {} file pairs...", pairs.len());
    let inputs: Vec<(AudioInput, AudioInput)> = pairs.iter().map(|p| p.inputs()).collect();
    let entries = engine.measure_batch(inputs, None)?;
    write_outputs(cli, &entries)?;

    if cli.verbose {
        println!();
        println!("Results:");
        println!("{}", "-".repeat(80));
    }
    for entry in &entries {
        match &entry.outcome {
            Ok(result) => {
                if cli.verbose {
                    println!("{} -> {}: {:.6}", entry.reference, entry.degraded, result.moslqo());
                }
            }
            Err(e) => eprintln!("{} -> {}: FAILED ({})", entry.reference, entry.degraded, e),
        }
    }

    let summary = BatchSummary::from_entries(&entries);
    if let (Some(mean), Some(min), Some(max)) =
        (summary.mean_moslqo, summary.min_moslqo, summary.max_moslqo)
    {
        println!("Mean MOS-LQO: {:.6}", mean);
        println!("Min MOS-LQO: {:.6}", min);
        println!("Max MOS-LQO: {:.6}", max);
    }
    println!(
        "{} of {} pairs measured",
        summary.successes(),
        summary.count
    );

    Ok(if summary.failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_stats(path: &Path) {
    match load_file(path) {
        Ok(buffer) => println!("           {}", buffer.stats()),
        Err(e) => log::debug!("No statistics for {}: {}", path.display(), e),
    }
}

fn write_outputs(cli: &Cli, entries: &[BatchEntry]) -> Result<()> {
    if let Some(path) = &cli.results_csv {
        write_results_csv(path, entries)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Results saved to: {}", path.display());
    }
    if let Some(path) = &cli.output_debug {
        write_results_json(path, entries)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Debug output saved to: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flag_names() {
        let cli = Cli::try_parse_from([
            "visqol",
            "--reference_file",
            "ref.wav",
            "--degraded_file",
            "deg.wav",
            "--use_speech_mode",
            "--results_csv",
            "out.csv",
        ])
        .unwrap();
        assert_eq!(cli.reference_file, Some(PathBuf::from("ref.wav")));
        assert!(cli.use_speech_mode);
        assert_eq!(cli.jobs, 0);
    }

    #[test]
    fn test_batch_conflicts_with_single() {
        let parsed = Cli::try_parse_from([
            "visqol",
            "--batch_input_csv",
            "pairs.csv",
            "--reference_file",
            "ref.wav",
            "--degraded_file",
            "deg.wav",
        ]);
        assert!(parsed.is_err());
    }
}
