use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "drops-cli")]
#[command(about = "Sync Twitch drop campaigns into Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch campaigns and benefits and reconcile them into the database.
    Sync {
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Create missing tables and columns, then exit.
    Migrate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Loaded before the subscriber so RUST_LOG can come from .env.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match (&dotenv, dotenv_problem(&dotenv)) {
        (_, Some(err)) => tracing::warn!("ignoring .env: {err}"),
        (Ok(path), None) => tracing::debug!(path = %path.display(), "loaded .env"),
        (Err(_), None) => tracing::debug!("no .env file found"),
    }

    let cli = Cli::parse();
    let outcome = run(cli.command.unwrap_or(Commands::Sync { json: false })).await;
    if let Err(err) = &outcome {
        tracing::error!("{err:#}");
    }
    outcome
}

/// A missing `.env` is fine; anything else is worth a warning.
fn dotenv_problem(result: &Result<PathBuf, dotenvy::Error>) -> Option<&dotenvy::Error> {
    match result {
        Err(err) if !err.not_found() => Some(err),
        _ => None,
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Sync { json } => {
            let summary = drops_sync::run_sync_once_from_env().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "sync complete: run_id={} campaigns={} new={} status_changes={} \
                     benefits={} prerequisites={} skipped={}",
                    summary.run_id,
                    summary.campaigns_seen,
                    summary.new_campaigns,
                    summary.status_changes,
                    summary.benefits_inserted,
                    summary.prerequisites_inserted,
                    summary.campaigns_skipped
                        + summary.benefits_skipped
                        + summary.prerequisites_skipped
                );
            }
        }
        Commands::Migrate => {
            drops_sync::ensure_schema_from_env().await?;
            tracing::info!("schema is up to date");
        }
    }

    Ok(())
}
