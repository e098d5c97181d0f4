//! The polling loop: fetch state vectors, map them, write them.

use crate::states::StatesClient;
use crate::store::FlightSink;
use crate::types::{FlightRow, Result};

use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Delay between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);

/// Outcome counts for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Map one raw state vector and insert it.
pub async fn upsert<S: FlightSink + ?Sized>(sink: &mut S, state: &[Value]) -> Result<u64> {
    let row = FlightRow::from_state(state)?;
    sink.insert_flight(&row).await
}

/// Periodic fetch-and-store task.
pub struct Ingester<S> {
    states: StatesClient,
    sink: S,
    interval: Duration,
}

impl<S: FlightSink> Ingester<S> {
    pub fn new(states: StatesClient, sink: S) -> Self {
        Self {
            states,
            sink,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the delay between cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run one fetch/upsert cycle.
    ///
    /// Per-record failures are logged and counted, never returned. Fetch
    /// errors other than a non-success status propagate.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> Result<CycleSummary> {
        info!("Fetching real-time flight data...");
        let states = self.states.fetch().await?;

        let mut summary = CycleSummary {
            fetched: states.len(),
            ..Default::default()
        };

        if states.is_empty() {
            info!("No data received.");
            return Ok(summary);
        }

        for state in &states {
            if cancel.is_cancelled() {
                info!("Stop requested, abandoning remaining records");
                break;
            }
            match upsert(&mut self.sink, state).await {
                Ok(0) => summary.duplicates += 1,
                Ok(_) => summary.inserted += 1,
                Err(e) => {
                    summary.failed += 1;
                    let icao24 = state.first().and_then(Value::as_str).unwrap_or("?");
                    warn!(icao24, error = %e, "Insert failed");
                }
            }
        }

        info!(
            fetched = summary.fetched,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "Cycle complete"
        );
        Ok(summary)
    }

    /// Poll until `cancel` fires, sleeping the configured interval between cycles.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!(interval_secs = self.interval.as_secs(), "Starting flight ingester");

        while !cancel.is_cancelled() {
            self.run_once(&cancel).await?;

            info!("Sleeping");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Flight ingester stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        rows: Vec<FlightRow>,
    }

    #[async_trait]
    impl FlightSink for RecordingSink {
        async fn insert_flight(&mut self, row: &FlightRow) -> Result<u64> {
            self.rows.push(row.clone());
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_upsert_maps_before_insert() {
        let mut sink = RecordingSink::default();
        let state = json!([
            "abc123", "  ABC123  ", "Ireland", 0, 1735725600,
            null, null, null, true, 0.0, null, null
        ]);

        let written = upsert(&mut sink, state.as_array().unwrap()).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(sink.rows.len(), 1);
        assert_eq!(sink.rows[0].callsign.as_deref(), Some("ABC123"));
        assert_eq!(sink.rows[0].time_position, None);
        assert_eq!(sink.rows[0].on_ground, Some(true));
    }

    #[tokio::test]
    async fn test_upsert_malformed_never_reaches_sink() {
        let mut sink = RecordingSink::default();
        let state = json!(["abc123"]);

        assert!(upsert(&mut sink, state.as_array().unwrap()).await.is_err());
        assert!(sink.rows.is_empty());
    }
}
