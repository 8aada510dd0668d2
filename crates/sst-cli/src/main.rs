use anyhow::Result;
use clap::{Parser, Subcommand};
use sst_store::OpportunityStore;

#[derive(Debug, Parser)]
#[command(name = "sst-cli")]
#[command(about = "SST command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the opportunity API server.
    Serve,
    /// Print aggregate stats for the configured store as JSON.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            sst_web::serve_from_env().await?;
        }
        Commands::Stats => {
            let state = sst_web::AppState::from_env().await;
            let records = state.store.fetch_all().await?;
            let report = sst_engine::compute_stats(&records, state.clock.as_ref());
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
