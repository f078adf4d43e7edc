//! Stratus CLI - spawn, destroy and connect to remote compute clusters.

mod commands;

use clap::{Parser, Subcommand};

use commands::ClusterArgs;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Manage remote compute clusters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the cluster, or reconcile it with its config
    Spawn {
        #[command(flatten)]
        cluster: ClusterArgs,
    },

    /// Tear down every node of the cluster
    Destroy {
        #[command(flatten)]
        cluster: ClusterArgs,
    },

    /// Make sure the cluster is up and print how to reach it
    Connect {
        #[command(flatten)]
        cluster: ClusterArgs,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), anyhow::Error> = match cli.command {
        Commands::Spawn { cluster } => commands::spawn::run(&cluster).await.map_err(Into::into),
        Commands::Destroy { cluster } => commands::destroy::run(&cluster).await.map_err(Into::into),
        Commands::Connect { cluster } => commands::connect::run(&cluster).await.map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
