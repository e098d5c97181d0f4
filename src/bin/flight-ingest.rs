//! flight-ingest - poll OpenSky live state vectors into Postgres.

use clap::{Parser, Subcommand};
use flightsync::{Config, FlightData, FlightRow, Ingester, PgFlightStore, StatesClient};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "flight-ingest")]
#[command(author, version, about = "Poll OpenSky live flight states into Postgres", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform opensky/settings.conf)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll forever (until Ctrl+C / SIGTERM)
    Run {
        /// Seconds between poll cycles
        #[arg(short, long, default_value_t = 120)]
        interval: u64,

        /// Create the flights table before polling
        #[arg(long)]
        create_table: bool,
    },

    /// Run a single fetch/insert cycle
    Once {
        /// Create the flights table first
        #[arg(long)]
        create_table: bool,
    },

    /// Create the flights table if it does not exist
    Schema,

    /// Fetch one snapshot and write it to a file (CSV or Parquet by extension)
    Snapshot {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn shutdown_on_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(err) => {
                    error!("Failed to register SIGTERM handler: {}", err);
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, stopping..."),
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C), stopping..."),
            }
        }

        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received SIGINT (Ctrl+C), stopping..."),
                Err(err) => {
                    error!("Failed to listen for SIGINT signal: {}", err);
                    return;
                }
            }
        }

        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    flightsync::init_logging("info");
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    if !config.has_credentials() {
        warn!("No OpenSky credentials configured, using anonymous access");
    }

    match cli.command {
        Commands::Run { interval, create_table } => {
            let states = StatesClient::new(&config)?;
            let store = PgFlightStore::connect(&config.database).await?;
            if create_table {
                store.ensure_schema().await?;
            }

            let cancel = CancellationToken::new();
            shutdown_on_signal(cancel.clone());

            let mut ingester = Ingester::new(states, store).with_interval(Duration::from_secs(interval));
            let outcome = ingester.run(cancel).await;
            ingester.into_sink().close().await;
            outcome?;
        }

        Commands::Once { create_table } => {
            let states = StatesClient::new(&config)?;
            let store = PgFlightStore::connect(&config.database).await?;
            if create_table {
                store.ensure_schema().await?;
            }

            let mut ingester = Ingester::new(states, store);
            let outcome = ingester.run_once(&CancellationToken::new()).await;
            ingester.into_sink().close().await;
            let summary = outcome?;
            println!(
                "Fetched {} states: {} inserted, {} duplicates, {} failed",
                summary.fetched, summary.inserted, summary.duplicates, summary.failed
            );
        }

        Commands::Schema => {
            let store = PgFlightStore::connect(&config.database).await?;
            let outcome = store.ensure_schema().await;
            store.close().await;
            outcome?;
        }

        Commands::Snapshot { output } => {
            let states = StatesClient::new(&config)?.fetch().await?;

            let mut rows = Vec::with_capacity(states.len());
            for state in &states {
                match FlightRow::from_state(state) {
                    Ok(row) => rows.push(row),
                    Err(e) => warn!(error = %e, "Skipping state vector"),
                }
            }

            if rows.is_empty() {
                println!("No data received.");
                return Ok(());
            }

            let data = FlightData::from_rows(&rows)?;
            match output.extension().and_then(|e| e.to_str()).unwrap_or("csv") {
                "parquet" => data.to_parquet(&output)?,
                _ => data.to_csv(&output)?,
            }
            println!("Saved {} rows to {}", data.len(), output.display());
        }
    }

    Ok(())
}
