//! # Relink CLI - Hardlink-based deduplication
//!
//! Command-line front end for the relink engine.
//!
//! ## Usage
//! ```bash
//! # Deduplicate a directory tree
//! relink ./photos
//!
//! # See what would happen first
//! relink ./photos --dry-run
//!
//! # Exclude patterns, machine-readable report
//! relink ./photos -e '*.part' -e 'cache/**' --json
//! ```
//!
//! Exits non-zero on an unrecoverable setup error (missing target, target
//! not a directory, another run holding the lock, index persist failure)
//! and zero on a completed run, even if individual files were skipped with
//! warnings.

use anyhow::Context;
use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use relink::{DedupReport, DeduperBuilder, ProgressInfo};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Collapse duplicate files into hardlinks of a single inode
#[derive(Parser)]
#[command(name = "relink")]
#[command(version)]
#[command(about = "Collapse duplicate files into hardlinks of a single inode")]
struct Cli {
    /// Directory tree to deduplicate
    directory: PathBuf,

    /// Report what would be linked without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Glob pattern to exclude from the scan (repeatable)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Number of fingerprinting workers (defaults to CPU count)
    #[arg(long)]
    workers: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("relink=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relink=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut builder = DeduperBuilder::new()
        .dry_run(cli.dry_run)
        .exclude_patterns(cli.exclude);
    if let Some(workers) = cli.workers {
        builder = builder.workers(workers);
    }

    // Progress bar on stderr for interactive runs; silent when the report
    // goes to a machine
    let bar = if cli.json {
        None
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let cb_bar = bar.clone();
        builder = builder.progress(Arc::new(move |info: ProgressInfo| {
            if let Some(total) = info.total {
                cb_bar.set_length(total as u64);
            }
            cb_bar.set_position(info.processed as u64);
            if let Some(current) = info.current {
                cb_bar.set_message(format!("{} {}", info.operation, current));
            }
        }));
        Some(bar)
    };

    let mut deduper = builder
        .build(&cli.directory)
        .with_context(|| format!("cannot deduplicate {:?}", cli.directory))?;
    let report = deduper.run()?;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &DedupReport) {
    if report.dry_run {
        println!("{}", "Dry run - nothing was modified".yellow().bold());
    }
    if report.index_rebuilt {
        println!("{}", "Index was corrupt and has been rebuilt".yellow());
    }

    println!(
        "{} {} files scanned, {} fingerprinted, {} reused from index",
        "Scan: ".bold(),
        report.files_scanned,
        report.fingerprints_computed,
        report.cache_hits
    );
    println!(
        "{} {} duplicate groups, {} files linked, {} reclaimed in {}",
        "Dedup:".bold(),
        report.duplicate_groups,
        report.files_linked,
        format_bytes(report.bytes_reclaimed),
        format_duration(Duration::from_millis(report.duration_ms))
    );

    if report.has_skips() {
        println!(
            "{}",
            format!("Skipped {} file(s):", report.skipped.len()).yellow()
        );
        for skip in &report.skipped {
            println!("  {}: {}", skip.path.display(), skip.reason);
        }
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
