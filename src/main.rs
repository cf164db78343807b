use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use sequel_rs::cli::Args;
use sequel_rs::pipeline::{self, RunConfig};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RunConfig::from(&args);
    let stats = pipeline::run(&config)?;
    pipeline::report(&stats.counts);
    tracing::info!(
        read_groups = stats.read_groups,
        observations = stats.observations,
        unique_pairs = stats.counts.unique_pair,
        unaligned = stats.counts.unaligned,
        output = %config.bam_path().display(),
        "sequel-rs: processing complete"
    );
    Ok(())
}
