use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use faultline::calibrate::{CalibrationGate, JsonCalibrationStore};
use faultline::config::Config;
use faultline::diag::{Diagnostic, EvidenceTier, Severity};
use faultline::driver::{emit_and_profile, DriverOptions};
use faultline::engine::{filter_diagnostics, run_rules, sort_diagnostics};
use faultline::interact::{detect_interactions, HypothesisCatalog, InteractionMatrix};
use faultline::output::{format_cli, format_json, ExecutionMetadata};
use faultline::refine::DiagnosticRefiner;
use faultline::tu::TranslationUnit;

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Cli,
    Json,
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    Severity::parse(s).ok_or_else(|| format!("unknown severity '{s}'"))
}

fn parse_tier(s: &str) -> Result<EvidenceTier, String> {
    EvidenceTier::parse(s).ok_or_else(|| format!("unknown evidence tier '{s}'"))
}

#[derive(Parser, Debug)]
#[command(
    name = "faultline",
    version,
    about = "Static analyzer for tail-latency hazards in compiled translation units \
             (x86-64, TSO, 64-byte cache lines)"
)]
struct Cli {
    /// Translation-unit trees emitted by the producer (.json)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Passthrough compile arguments for IR emission (after `--`)
    #[arg(last = true)]
    compile_args: Vec<String>,

    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum severity to report
    #[arg(long, value_parser = parse_severity)]
    min_severity: Option<Severity>,

    /// Minimum evidence tier to report
    #[arg(long, value_parser = parse_tier, default_value = "speculative")]
    min_evidence: EvidenceTier,

    /// Skip IR emission and refinement (AST-only mode)
    #[arg(long)]
    no_ir: bool,

    /// Optimization level for IR emission; O0 preserves structural truth
    #[arg(long, default_value = "O0")]
    ir_opt: String,

    /// Calibration feedback store for false-positive suppression
    #[arg(long)]
    calibration_store: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Cli)]
    format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Phase logging on stderr
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Configuration ──
    let mut config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::default(),
    };
    if let Some(min) = cli.min_severity {
        config.min_severity = min;
    }
    if matches!(cli.format, OutputFormat::Json) {
        config.json_output = true;
    }
    if let Some(path) = &cli.output {
        config.output_file = path.display().to_string();
    }

    // ── Inputs ──
    let mut units = Vec::new();
    for path in &cli.inputs {
        match TranslationUnit::load(path) {
            Ok(tu) => units.push(tu),
            Err(e) => {
                eprintln!("faultline: error: {e}");
                return ExitCode::from(2);
            }
        }
    }

    // ── Rule sweep ──
    let mut per_unit: Vec<(String, Vec<Diagnostic>)> = Vec::new();
    for tu in &units {
        per_unit.push((tu.source_path.clone(), run_rules(tu, &config)));
    }

    // ── Interaction candidates over the preliminary set ──
    let catalog = HypothesisCatalog::new();
    let matrix = InteractionMatrix::new(&catalog);
    let preliminary: Vec<Diagnostic> = per_unit
        .iter()
        .flat_map(|(_, diags)| diags.iter().cloned())
        .collect();
    let interactions = detect_interactions(&preliminary, &matrix);
    if !interactions.is_empty() {
        info!(
            "{} compound-hazard interaction candidate(s) across {} scope(s)",
            interactions.len(),
            interactions
                .iter()
                .map(|c| c.scope.as_str())
                .collect::<std::collections::BTreeSet<_>>()
                .len()
        );
    }

    // ── IR refinement ──
    if !cli.no_ir {
        let options = DriverOptions {
            opt_level: cli.ir_opt.clone(),
            ..DriverOptions::default()
        };
        let outcome = emit_and_profile(&units, &cli.compile_args, &options);
        let refiner = DiagnosticRefiner::new(&outcome.profiles, &config);
        for (source_path, diags) in per_unit.iter_mut() {
            if outcome.failed_units.contains(source_path) {
                for d in diags.iter_mut() {
                    d.escalations
                        .push("IR unavailable: AST-layer confidence retained".to_string());
                }
                continue;
            }
            refiner.refine(diags);
        }
    }

    let mut diagnostics: Vec<Diagnostic> =
        per_unit.into_iter().flat_map(|(_, d)| d).collect();

    // ── Calibration gate ──
    if let Some(store_path) = &cli.calibration_store {
        let store = JsonCalibrationStore::load(store_path);
        CalibrationGate::new(&store).apply(&mut diagnostics);
    }

    // ── Filter, sort, emit ──
    let mut diagnostics = filter_diagnostics(diagnostics, &config, cli.min_evidence);
    sort_diagnostics(&mut diagnostics);

    let meta = ExecutionMetadata::new(
        !cli.no_ir,
        cli.ir_opt.clone(),
        cli.inputs
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    );
    let rendered = if config.json_output {
        format_json(&diagnostics, &meta)
    } else {
        format_cli(&diagnostics, &meta)
    };

    if config.output_file.is_empty() {
        print!("{rendered}");
    } else if let Err(e) = std::fs::write(&config.output_file, &rendered) {
        warn!("cannot write output file '{}': {}", config.output_file, e);
        eprintln!("faultline: error: cannot write '{}': {e}", config.output_file);
        return ExitCode::from(2);
    }

    if diagnostics.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
