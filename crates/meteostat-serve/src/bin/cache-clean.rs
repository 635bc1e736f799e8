//! Weather data cache cleanup utility.
//!
//! Deletes cached hourly, daily, monthly and normals data files that are
//! older than 30 days. Intended to run from a scheduler (cron, Kubernetes
//! CronJob), one instance per cache directory.
//!
//! # Usage
//!
//! ```bash
//! # Dry run (show what would be removed, don't delete)
//! cache-clean --dry-run
//!
//! # Clean a specific directory
//! METEOSTAT_CACHE_DIR=/data/meteostat cache-clean
//! ```
//!
//! Exits non-zero if any granularity could not be cleaned; the others are
//! still processed.

use anyhow::Result;
use clap::Parser;
use meteostat_serve::janitor::{CacheJanitor, Granularity, DEFAULT_CACHE_DIR, RETENTION};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Weather data cache cleanup utility.
#[derive(Parser, Debug)]
#[command(name = "cache-clean")]
#[command(about = "Remove cached weather data older than 30 days")]
#[command(version)]
struct Args {
    /// Cache directory (created if missing)
    #[arg(long, env = "METEOSTAT_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Dry run - show what would be removed without deleting
    #[arg(long)]
    dry_run: bool,

    /// Verbose output - list each removed file
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    println!("Cache Cleanup");
    println!("=============");
    println!("Cache directory: {}", args.cache_dir.display());
    println!("Max age: {} days", RETENTION.as_secs() / 86_400);
    println!("Dry run: {}", args.dry_run);
    println!();

    let janitor = CacheJanitor::new(&args.cache_dir)?.dry_run(args.dry_run);
    let report = janitor.purge(&Granularity::ALL, RETENTION);

    println!("Summary");
    println!("-------");
    for (granularity, paths) in &report.removed {
        println!("{:<10} {} files", granularity, paths.len());
        if args.verbose {
            for path in paths {
                println!("  - {}", path.display());
            }
        }
    }
    for (granularity, err) in &report.failures {
        println!("{:<10} FAILED: {}", granularity, err);
    }
    println!();

    if args.dry_run {
        println!("Dry run - no files removed.");
    } else {
        println!("Removed {} files.", report.removed_count());
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} granularities failed",
            report.failures.len(),
            Granularity::ALL.len()
        );
    }

    Ok(())
}
