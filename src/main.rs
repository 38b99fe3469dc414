//! snapwatch - watch-invalidated file system snapshots
//!
//! Development driver: snapshots one or more roots, then runs watch cycles
//! and reports what each one invalidated.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use snapwatch::observability::{init_tracing, TracingConfig};
use snapwatch::snapshot::CaseSensitivity;
use snapwatch::watcher::DrainOutcome;
use snapwatch::{Config, WatchingFileSystem};

/// snapwatch - watch-invalidated file system snapshots
#[derive(Parser, Debug)]
#[command(name = "snapwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directories to snapshot and keep watched
    #[arg(short, long = "root", required = true)]
    roots: Vec<PathBuf>,

    /// Number of watch cycles to run
    #[arg(short, long, default_value = "1")]
    cycles: u32,

    /// Idle time between start and stop of each cycle, in milliseconds
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,

    /// Path comparison mode (sensitive, insensitive); defaults to the platform's
    #[arg(long, env = "SNAPWATCH_CASE_SENSITIVITY")]
    case_sensitivity: Option<CaseSensitivity>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SNAPWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "SNAPWATCH_LOG_JSON")]
    log_json: bool,

    /// Print each cycle's outcome as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct CycleReport {
    cycle: u32,
    registered: usize,
    skipped_stale: usize,
    registration_error: Option<String>,
    #[serde(flatten)]
    drain: DrainOutcome,
    nodes: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    config.log_level = cli.log_level;
    config.log_json = cli.log_json;
    if let Some(case_sensitivity) = cli.case_sensitivity {
        config.case_sensitivity = case_sensitivity;
    }
    config.validate()?;

    init_tracing(&TracingConfig::from(&config))?;

    tracing::info!(
        "snapwatch v{} starting, {} root(s)",
        env!("CARGO_PKG_VERSION"),
        cli.roots.len()
    );
    tracing::debug!(?config, "Configuration loaded");

    let roots = cli
        .roots
        .iter()
        .map(|root| {
            root.canonicalize()
                .with_context(|| format!("cannot resolve root {}", root.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut vfs = WatchingFileSystem::for_platform(&config)?;
    snapshot_roots(&vfs, &roots)?;

    for cycle in 1..=cli.cycles {
        let (registered, skipped_stale, registration_error) = match vfs.start_watching() {
            Ok(outcome) => (outcome.registered, outcome.skipped_stale, None),
            Err(e) => (vfs.watched_directory_count(), 0, Some(e.to_string())),
        };

        std::thread::sleep(Duration::from_millis(cli.interval_ms));

        let drain = vfs.stop_watching();
        snapshot_roots(&vfs, &roots)?;

        let report = CycleReport {
            cycle,
            registered,
            skipped_stale,
            registration_error,
            drain,
            nodes: vfs.store().node_count(),
        };
        print_report(&report, cli.json)?;
    }

    tracing::debug!(stats = ?vfs.stats(), "Watch statistics");
    vfs.close().context("failed to close watch service")?;
    Ok(())
}

fn snapshot_roots(vfs: &WatchingFileSystem, roots: &[PathBuf]) -> anyhow::Result<()> {
    for root in roots {
        vfs.snapshot_tree(root)
            .with_context(|| format!("failed to snapshot {}", root.display()))?;
    }
    Ok(())
}

fn print_report(report: &CycleReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    println!(
        "cycle {}: watched {} dir(s), skipped {} stale, invalidated {} path(s) from {} handle(s){}{}; {} node(s) cached",
        report.cycle,
        report.registered,
        report.skipped_stale,
        report.drain.paths_invalidated,
        report.drain.handles_drained,
        if report.drain.overflowed { ", overflow" } else { "" },
        if report.drain.invalidated_all {
            ", cache dropped"
        } else {
            ""
        },
        report.nodes,
    );
    if let Some(error) = &report.registration_error {
        println!("  registration failed: {error}");
    }
    Ok(())
}
