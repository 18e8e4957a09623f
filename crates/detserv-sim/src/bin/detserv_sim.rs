//! detserv-sim
//!
//! Plays a TOML scenario against the admission controller and prints the
//! outcome of every event and the final queue bounds.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use detserv_sim::Scenario;

#[derive(Parser, Debug)]
#[command(name = "detserv-sim", about = "Per-flow admission control scenario runner")]
struct Cli {
    /// Scenario file (TOML).
    scenario: PathBuf,

    /// Only print the summary line.
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(scenario = %cli.scenario.display(), "detserv-sim starting");

    let scenario = Scenario::load(&cli.scenario)?;
    let report = detserv_sim::run(&scenario)?;

    if cli.quiet {
        println!("{}", report.summary());
    } else {
        println!("{report}");
    }
    Ok(())
}
