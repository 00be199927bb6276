mod cli;

use std::fs;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, TargetSelector};
use retaintrace_core::report::OutputFormatter;
use retaintrace_core::{AnalysisConfig, ObjectId};

fn init_logging(verbosity: &clap_verbosity_flag::Verbosity) {
    let level = verbosity.tracing_level_filter();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Parses a raw object id, accepting both `0x...` hex and plain
/// decimal (the reverse index's own cache format writes decimal, but
/// the heap-dump tools people pipe `--leak-ids` files from tend to
/// print `0x...`).
fn parse_object_id(raw: &str) -> anyhow::Result<ObjectId> {
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => raw.parse::<u64>()?,
    };
    Ok(ObjectId::new(value))
}

fn collect_targets(cli: &Cli, oracle: &dyn retaintrace_core::GraphOracle) -> anyhow::Result<Vec<ObjectId>> {
    let mut targets = Vec::new();

    if let Some(ids_file) = &cli.leak_ids {
        let text = fs::read_to_string(ids_file).with_context(|| format!("reading {}", ids_file.display()))?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            targets.push(parse_object_id(line)?);
        }
    }

    if !cli.leak.is_empty() {
        let selectors: Vec<TargetSelector> = cli.leak.iter().map(|s| TargetSelector::parse(s)).collect();
        for id in oracle.iter_instances() {
            let Some(kind) = oracle.node_kind(id) else { continue };
            let Some(class_name) = kind.class_name() else { continue };
            if selectors.iter().any(|sel| sel.matches(class_name)) {
                targets.push(id);
            }
        }
    }

    Ok(targets)
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.verbosity);

    if !cli.snapshot.exists() {
        eprintln!("error: snapshot file not found: {}", cli.snapshot.display());
        process::exit(1);
    }

    if cli.leak.is_empty() && cli.leak_ids.is_none() {
        eprintln!("error: at least one of --leak or --leak-ids is required");
        process::exit(1);
    }

    let oracle = retaintrace_hprof::load(&cli.snapshot)?;

    let targets = collect_targets(&cli, &oracle)?;
    if targets.is_empty() {
        eprintln!("error: no live objects matched the given --leak/--leak-ids selectors");
        process::exit(1);
    }
    info!(target_count = targets.len(), "resolved leak targets");

    let cache_path = cli.cache_dir.as_ref().map(|dir| dir.join(cli.snapshot.file_name().unwrap_or_default())).unwrap_or_else(|| cli.snapshot.clone());

    let (index, strong_roots) = retaintrace_core::build_or_load_index(&cache_path, &oracle, !cli.no_cache)?;

    let config = AnalysisConfig::default();
    let result = retaintrace_core::run_analysis(&index, &strong_roots, &oracle, &targets, config);

    let report = retaintrace_core::report::TextReport::new("retaintrace", env!("CARGO_PKG_VERSION"));
    print!("{}", report.format(oracle.meta(), &result.groups, &result.dependents));

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}
