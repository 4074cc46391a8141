mod commands;
mod script;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Patient flow queue tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the "who is next" order for entries listed in a YAML file
    Order {
        /// YAML file with an `entries` list
        file: PathBuf,
    },
    /// Run a scripted sequence of arrivals and actions against an in-memory tenant
    Replay {
        /// YAML file with `start`, `patients` and `steps`
        file: PathBuf,
    },
    /// Print a tenant's persisted queue
    Snapshot {
        /// Data directory the server was started with (`FLOW_DATA_DIR`)
        data_dir: PathBuf,
        /// Canonical tenant id
        tenant: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flow_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Order { file } => commands::order(&script::load(&file)?)?,
        Commands::Replay { file } => commands::replay(&script::load(&file)?)?,
        Commands::Snapshot { data_dir, tenant } => commands::snapshot(&data_dir, &tenant)?,
    };
    print!("{output}");

    Ok(())
}
