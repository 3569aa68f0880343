use crate::composite::CompositeMap;
use crate::config::load_config;
use crate::encoding::Document;
use crate::layout_dump::write_layout_dump;
use crate::pipeline::{AcceptAll, BlockOutcome, BlockReport, ConfirmationGate, process_document};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sfc-arrange",
    version,
    about = "Re-layout and rename SFC algorithms in DeltaV .fhx exports"
)]
pub struct Args {
    /// Input export (.fhx, UTF-16LE)
    pub input: PathBuf,

    /// Output file. Defaults to <input stem>_SFCsArranged.fhx next to the input.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON file (layout constants, naming, index action, skip list)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Composite map JSON resolving embedded blocks to their owners
    #[arg(short = 'm', long = "composite-map")]
    pub composite_map: Option<PathBuf>,

    /// Process every block without asking
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Write the final branch maps of processed blocks as JSON
    #[arg(long = "dump-layout")]
    pub dump_layout: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Interactive gate: `yes` or `y` accepts, anything else declines.
pub struct StdinGate<R> {
    input: R,
}

impl StdinGate<io::StdinLock<'static>> {
    pub fn new() -> Self {
        Self {
            input: io::stdin().lock(),
        }
    }
}

impl Default for StdinGate<io::StdinLock<'static>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BufRead> StdinGate<R> {
    pub fn from_reader(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead> ConfirmationGate for StdinGate<R> {
    fn confirm(&mut self, label: &str) -> bool {
        eprint!("Arrange SFC for {label}? [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if self.input.read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(args.config.as_deref()).context("loading config")?;
    let composites =
        CompositeMap::load(args.composite_map.as_deref()).context("loading composite map")?;
    let mut doc = Document::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let mut gate: Box<dyn ConfirmationGate> = if args.yes {
        Box::new(AcceptAll)
    } else {
        Box::new(StdinGate::new())
    };
    let reports = process_document(&mut doc, &config, &composites, gate.as_mut())?;
    summarize(&reports);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));
    doc.write(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(path = %output.display(), "output written");

    if let Some(path) = args.dump_layout.as_deref() {
        write_layout_dump(path, &reports)?;
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "sfc_arrange=debug"
    } else {
        "sfc_arrange=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn summarize(reports: &[BlockReport]) {
    let mut processed = 0;
    let mut declined = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for report in reports {
        match &report.outcome {
            BlockOutcome::Processed { .. } => processed += 1,
            BlockOutcome::Declined => declined += 1,
            BlockOutcome::Skipped(reason) => {
                tracing::debug!(block = %report.name, %reason, "skipped");
                skipped += 1;
            }
            BlockOutcome::Failed(err) => {
                tracing::error!(block = %report.name, error = %err, "failed");
                failed += 1;
            }
        }
    }
    tracing::info!(processed, declined, skipped, failed, "run complete");
}

/// `<stem>_SFCsArranged.fhx` beside the input.
pub fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("export");
    input.with_file_name(format!("{stem}_SFCsArranged.fhx"))
}
