// 🗺️ commune-atlas - batch refresh of the commune records from official tables

use anyhow::Result;
use clap::{Parser, Subcommand};
use commune_atlas::{Pipeline, PipelineConfig, RunSummary};
use std::path::PathBuf;
use tracing::{debug, info};

/// Extract, resolve and merge Luxembourg commune statistics
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Repository root; relative paths resolve against it
    #[arg(short, long, default_value = ".")]
    base: PathBuf,

    /// JSON pipeline config (defaults to the data/ layout under --base)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite file recording every committed run
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Load, extract and match everything but write nothing
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Population, area, density and foreign share
    Demographics,
    /// Apartment prices per m²
    Prices,
    /// Regenerate the template data file
    Display,
    /// Demographics, prices, then display
    All,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            debug!("Using config file {}", path.display());
            PipelineConfig::from_file(path, &args.base)?
        }
        None => PipelineConfig::with_base(&args.base),
    };
    if let Some(ledger) = &args.ledger {
        config = config.with_ledger(ledger);
    }

    let pipeline = Pipeline::new(config)?;
    if args.dry_run {
        info!("dry run: nothing will be written");
    }

    match args.command {
        Command::Demographics => print_summary(&pipeline.run_demographics(args.dry_run)?),
        Command::Prices => print_summary(&pipeline.run_prices(args.dry_run)?),
        Command::Display => {
            let count = pipeline.generate_display(args.dry_run)?;
            println!("🖼️  {} communes in display data", count);
        }
        Command::All => {
            for summary in pipeline.run_all(args.dry_run)? {
                print_summary(&summary);
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 {}", summary.command);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for (layer, count) in &summary.layer_counts {
        println!("  {:<14} {:>4} communes", layer, count);
    }
    for stats in &summary.matches {
        if !stats.unmatched.is_empty() {
            println!("  ⚠️  {} unmatched for {}: {}", stats.unmatched_count(), stats.layer, stats.unmatched.join(", "));
        }
        if !stats.collisions.is_empty() {
            println!("  ⚠️  {} names merged into an existing commune for {}", stats.collisions.len(), stats.layer);
        }
    }

    match &summary.commit {
        Some(commit) => println!(
            "✓ {} created, {} updated, {} unchanged",
            commit.created, commit.updated, commit.unchanged
        ),
        None => println!("✓ dry run, nothing written"),
    }
}
