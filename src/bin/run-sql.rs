//! run-sql - execute a SQL file against Snowflake with key-pair auth.

use clap::Parser;
use flightsync::{run_sql_file, FlightSyncError, WarehouseConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "run-sql")]
#[command(author, version, about = "Run a SQL file against Snowflake using SNOWSQL_* credentials", long_about = None)]
struct Cli {
    /// Path to the SQL file
    sql_file: PathBuf,
}

fn report(err: &FlightSyncError, path: &Path) {
    match err {
        FlightSyncError::Config(_) | FlightSyncError::Key(_) => error!("Configuration Error: {}", err),
        FlightSyncError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!("Error: SQL file not found at {}", path.display())
        }
        FlightSyncError::Warehouse { .. } => error!("Snowflake Programming Error: {}", err),
        FlightSyncError::Statement { source, .. } if matches!(**source, FlightSyncError::Warehouse { .. }) => {
            error!("Snowflake Programming Error: {}", err)
        }
        _ => error!("An unexpected error occurred: {}", err),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    flightsync::init_logging("info");

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    // Validate configuration before any connection is attempted
    let config = match WarehouseConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            report(&e, &cli.sql_file);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    match run_sql_file(config, &cli.sql_file).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e, &cli.sql_file);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
