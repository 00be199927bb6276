use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::Verbosity;

/// Find the retention paths from GC roots down to a set of leaked
/// objects in a JVM heap snapshot.
#[derive(Parser)]
#[command(name = "retaintrace", version)]
pub struct Cli {
    /// Path to a `.hprof` heap dump
    pub snapshot: PathBuf,

    /// A leaked class name to search for (repeatable). Accepts a `*`
    /// suffix wildcard, e.g. `com.example.*`
    #[arg(long = "leak")]
    pub leak: Vec<String>,

    /// A file of newline-delimited raw object ids to use as targets,
    /// instead of (or in addition to) `--leak`
    #[arg(long = "leak-ids")]
    pub leak_ids: Option<PathBuf>,

    /// Rebuild the reverse index even if a matching cache file exists
    #[arg(long)]
    pub no_cache: bool,

    /// Where to read/write the `.ri` cache file (default: alongside
    /// the snapshot)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

/// A single `--leak` selector: an exact class name, or a `*`-suffixed
/// prefix.
pub enum TargetSelector {
    Exact(String),
    Prefix(String),
}

impl TargetSelector {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix('*') {
            Some(prefix) => TargetSelector::Prefix(prefix.to_string()),
            None => TargetSelector::Exact(raw.to_string()),
        }
    }

    pub fn matches(&self, class_name: &str) -> bool {
        match self {
            TargetSelector::Exact(name) => class_name == name,
            TargetSelector::Prefix(prefix) => class_name.starts_with(prefix.as_str()),
        }
    }
}
