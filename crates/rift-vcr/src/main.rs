//! Rift VCR cassette inspection tool
//!
//! Usage:
//!   rift-vcr list <cassette-dir>
//!   rift-vcr verify <cassette-dir>

use anyhow::Context;
use clap::{Parser, Subcommand};
use rift_vcr::cassette::{load_bucket, Cassette};
use std::path::PathBuf;
use tracing::{error, info};

/// Rift VCR - inspect recorded cassettes
#[derive(Parser, Debug)]
#[command(name = "rift-vcr")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List buckets with their hash and outcome counts
    List {
        /// Cassette directory (one namespace)
        path: PathBuf,
    },
    /// Load every bucket and report corrupt or unsupported ones
    Verify {
        /// Cassette directory (one namespace)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::List { path } => list(path).await,
        Command::Verify { path } => {
            let failures = verify(path).await?;
            if failures > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn list(root: PathBuf) -> anyhow::Result<()> {
    let cassette = Cassette::new(&root);
    let paths = cassette
        .bucket_paths()
        .await
        .with_context(|| format!("Failed to read cassette {}", root.display()))?;

    for path in &paths {
        let bucket = load_bucket(path).await?;
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        println!(
            "{name}\t{} hashes\t{} outcomes",
            bucket.outcomes.len(),
            bucket.outcome_count()
        );
    }
    info!("{} buckets in {}", paths.len(), root.display());
    Ok(())
}

async fn verify(root: PathBuf) -> anyhow::Result<usize> {
    let report = Cassette::new(&root)
        .verify()
        .await
        .with_context(|| format!("Failed to read cassette {}", root.display()))?;

    for (_, e) in &report.failures {
        error!("{}", e);
    }
    if report.is_valid() {
        info!("All {} buckets in {} are valid", report.buckets, root.display());
    } else {
        error!(
            "{} of {} buckets failed verification",
            report.failures.len(),
            report.buckets
        );
    }
    Ok(report.failures.len())
}
