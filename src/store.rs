//! Postgres persistence for flight rows.

use crate::config::DatabaseConfig;
use crate::query::{build_create_table, build_insert};
use crate::types::{FlightRow, Result};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, Statement};
use tracing::{error, info};

/// Destination for mapped flight rows.
#[async_trait]
pub trait FlightSink: Send {
    /// Insert one row, skipping it if its primary key already exists.
    ///
    /// Returns the number of rows written (0 for a duplicate).
    async fn insert_flight(&mut self, row: &FlightRow) -> Result<u64>;
}

/// A single Postgres connection writing to the `flights` table.
pub struct PgFlightStore {
    client: Client,
    driver: JoinHandle<()>,
    insert: Option<Statement>,
}

impl PgFlightStore {
    /// Connect using the configured host, port, database and user.
    pub async fn connect(database: &DatabaseConfig) -> Result<Self> {
        info!(
            host = %database.host,
            port = database.port,
            dbname = %database.dbname,
            user = %database.user,
            "Connecting to Postgres"
        );
        Self::connect_with(&database.pg_config()).await
    }

    /// Connect with explicit `tokio_postgres` settings.
    pub async fn connect_with(config: &tokio_postgres::Config) -> Result<Self> {
        let (client, connection) = config.connect(NoTls).await?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Postgres connection error");
            }
        });

        Ok(Self {
            client,
            driver,
            insert: None,
        })
    }

    /// Create the `flights` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.client.batch_execute(&build_create_table()).await?;
        info!("Table flights ready");
        Ok(())
    }

    /// Close the connection and wait for the driver task to finish.
    pub async fn close(self) {
        drop(self.client);
        let _ = self.driver.await;
    }

    async fn insert_statement(&mut self) -> Result<Statement> {
        if let Some(stmt) = &self.insert {
            return Ok(stmt.clone());
        }
        let stmt = self.client.prepare(&build_insert()).await?;
        self.insert = Some(stmt.clone());
        Ok(stmt)
    }
}

#[async_trait]
impl FlightSink for PgFlightStore {
    async fn insert_flight(&mut self, row: &FlightRow) -> Result<u64> {
        let stmt = self.insert_statement().await?;
        let written = self
            .client
            .execute(
                &stmt,
                &[
                    &row.icao24,
                    &row.callsign,
                    &row.origin_country,
                    &row.time_position,
                    &row.last_contact,
                    &row.longitude,
                    &row.latitude,
                    &row.baro_altitude,
                    &row.on_ground,
                    &row.velocity,
                    &row.heading,
                    &row.vertical_rate,
                ],
            )
            .await?;
        Ok(written)
    }
}
