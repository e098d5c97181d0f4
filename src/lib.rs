//! # flightsync
//!
//! Two small data-loading tools sharing one crate:
//!
//! - **Flight ingester** (`flight-ingest`): polls the OpenSky Network live
//!   state vector API and writes each observation into a Postgres
//!   `flights` table keyed on `(icao24, last_contact)`. Duplicates are
//!   skipped.
//! - **SQL runner** (`run-sql`): authenticates to Snowflake with a key
//!   pair and runs the statements of a SQL file one by one, stopping at
//!   the first failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flightsync::{Config, Ingester, PgFlightStore, StatesClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads ~/.config/opensky/settings.conf plus OPENSKY_* / FLIGHTS_DB_* overrides
//!     let config = Config::load()?;
//!
//!     let states = StatesClient::new(&config)?;
//!     let store = PgFlightStore::connect(&config.database).await?;
//!     store.ensure_schema().await?;
//!
//!     let mut ingester = Ingester::new(states, store);
//!     let summary = ingester.run_once(&CancellationToken::new()).await?;
//!     println!("Inserted {} rows", summary.inserted);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The ingester reads a platform-specific config file:
//! - Linux: `~/.config/opensky/settings.conf`
//! - macOS: `~/Library/Application Support/opensky/settings.conf`
//! - Windows: `%LOCALAPPDATA%\opensky\settings.conf`
//!
//! ```ini
//! [default]
//! username = your_username
//! password = your_password
//!
//! [database]
//! host = localhost
//! port = 5432
//! dbname = flights
//! user = flights_wrapper
//! password = flights_wrapper
//! ```
//!
//! The SQL runner reads `SNOWSQL_ACCOUNT`, `SNOWSQL_DATABASE`,
//! `SNOWSQL_PRIVATE_KEY`, `SNOWSQL_ROLE`, `SNOWSQL_SCHEMA`, `SNOWSQL_USER`
//! and `SNOWSQL_WAREHOUSE` from the environment.

pub mod config;
pub mod ingest;
pub mod query;
pub mod script;
pub mod states;
pub mod store;
pub mod types;
pub mod warehouse;

// Re-export main types for convenience
pub use config::{Config, DatabaseConfig, WarehouseConfig, WAREHOUSE_ENV_VARS};
pub use ingest::{upsert, CycleSummary, Ingester, DEFAULT_POLL_INTERVAL};
pub use query::{build_create_table, build_insert, FLIGHTS_TABLE};
pub use script::{execute_script, run_sql_file, split_statements, statement_preview};
pub use states::StatesClient;
pub use store::{FlightSink, PgFlightStore};
pub use types::{FlightData, FlightRow, FlightSyncError, RawState, Result, FLIGHT_COLUMNS};
pub use warehouse::{KeyPair, StatementResult, Warehouse};

/// Install the `tracing` subscriber used by the binaries.
///
/// `RUST_LOG` takes precedence; otherwise `default_directive` applies.
pub fn init_logging(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
