//! Core types: the crate error, flight rows and their DataFrame export.

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Error types for ingester and SQL runner operations.
#[derive(Error, Debug)]
pub enum FlightSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Private key error: {0}")]
    Key(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Malformed state vector: {0}")]
    MalformedState(String),

    #[error("Snowflake programming error {code} ({sql_state}): {message}")]
    Warehouse {
        code: String,
        sql_state: String,
        message: String,
    },

    #[error("Statement failed: {preview}...: {source}")]
    Statement {
        preview: String,
        #[source]
        source: Box<FlightSyncError>,
    },

    #[error("Query execution failed: {0}")]
    Query(String),

    #[error("Data conversion error: {0}")]
    DataConversion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlightSyncError {
    /// Process exit code for this error.
    ///
    /// Every failure class (configuration, missing file, warehouse error,
    /// anything unexpected) maps to 1; success is 0.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// True for errors raised before any network or database work.
    pub fn is_config(&self) -> bool {
        matches!(self, FlightSyncError::Config(_) | FlightSyncError::Key(_))
    }
}

/// Result type alias for flightsync operations.
pub type Result<T> = std::result::Result<T, FlightSyncError>;

/// Columns of the `flights` table, in state-vector position order.
pub const FLIGHT_COLUMNS: &[&str] = &[
    "icao24",
    "callsign",
    "origin_country",
    "time_position",
    "last_contact",
    "longitude",
    "latitude",
    "baro_altitude",
    "on_ground",
    "velocity",
    "heading",
    "vertical_rate",
];

/// One raw state vector as returned by `/api/states/all`.
pub type RawState = Vec<Value>;

/// Body of a `/api/states/all` response.
///
/// `states` must be present; it is `null` when no aircraft matched.
#[derive(Debug, Deserialize)]
pub struct StatesResponse {
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(deserialize_with = "required_nullable")]
    pub states: Option<Vec<RawState>>,
}

fn required_nullable<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<RawState>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::deserialize(deserializer)
}

/// A state vector mapped onto the `flights` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightRow {
    pub icao24: Option<String>,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub time_position: Option<NaiveDateTime>,
    pub last_contact: Option<NaiveDateTime>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub on_ground: Option<bool>,
    pub velocity: Option<f64>,
    pub heading: Option<f64>,
    pub vertical_rate: Option<f64>,
}

impl FlightRow {
    /// Map a raw state vector (positions 0-11) onto named columns.
    ///
    /// Trailing fields (sensors, geo altitude, squawk, ...) are ignored.
    pub fn from_state(state: &[Value]) -> Result<Self> {
        if state.len() < FLIGHT_COLUMNS.len() {
            return Err(FlightSyncError::MalformedState(format!(
                "expected at least {} fields, got {}",
                FLIGHT_COLUMNS.len(),
                state.len()
            )));
        }

        Ok(Self {
            icao24: opt_string(state, 0)?,
            callsign: opt_string(state, 1)?
                .filter(|s| !s.is_empty())
                .map(|s| s.trim().to_string()),
            origin_country: opt_string(state, 2)?,
            time_position: opt_timestamp(state, 3)?,
            last_contact: opt_timestamp(state, 4)?,
            longitude: opt_f64(state, 5)?,
            latitude: opt_f64(state, 6)?,
            baro_altitude: opt_f64(state, 7)?,
            on_ground: opt_bool(state, 8)?,
            velocity: opt_f64(state, 9)?,
            heading: opt_f64(state, 10)?,
            vertical_rate: opt_f64(state, 11)?,
        })
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        format!(
            "{}/{}",
            self.icao24.as_deref().unwrap_or("?"),
            self.last_contact
                .map(|t| t.and_utc().timestamp().to_string())
                .unwrap_or_else(|| "-".to_string())
        )
    }
}

fn field_error(idx: usize, expected: &str, value: &Value) -> FlightSyncError {
    FlightSyncError::MalformedState(format!(
        "{} (position {idx}): expected {expected}, got {value}",
        FLIGHT_COLUMNS[idx]
    ))
}

fn opt_string(state: &[Value], idx: usize) -> Result<Option<String>> {
    match &state[idx] {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(field_error(idx, "string", other)),
    }
}

fn opt_f64(state: &[Value], idx: usize) -> Result<Option<f64>> {
    match &state[idx] {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        other => Err(field_error(idx, "number", other)),
    }
}

fn opt_bool(state: &[Value], idx: usize) -> Result<Option<bool>> {
    match &state[idx] {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(field_error(idx, "boolean", other)),
    }
}

/// Epoch seconds to a naive UTC timestamp; null and zero map to `None`.
fn opt_timestamp(state: &[Value], idx: usize) -> Result<Option<NaiveDateTime>> {
    let value = &state[idx];
    let (secs, nanos) = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                (secs, 0)
            } else if let Some(f) = n.as_f64() {
                (f.trunc() as i64, (f.fract() * 1e9) as u32)
            } else {
                return Err(field_error(idx, "epoch seconds", value));
            }
        }
        other => return Err(field_error(idx, "epoch seconds", other)),
    };

    if secs == 0 && nanos == 0 {
        return Ok(None);
    }

    DateTime::from_timestamp(secs, nanos)
        .map(|dt| Some(dt.naive_utc()))
        .ok_or_else(|| field_error(idx, "timestamp in range", value))
}

/// Wrapper around a Polars DataFrame of flight rows.
#[derive(Debug, Clone)]
pub struct FlightData {
    df: DataFrame,
}

impl FlightData {
    /// Build a DataFrame with one column per `flights` column.
    ///
    /// Timestamps are stored as epoch seconds.
    pub fn from_rows(rows: &[FlightRow]) -> Result<Self> {
        fn epoch(t: &Option<NaiveDateTime>) -> Option<i64> {
            t.map(|t| t.and_utc().timestamp())
        }

        let columns = vec![
            Column::new("icao24".into(), rows.iter().map(|r| r.icao24.clone()).collect::<Vec<_>>()),
            Column::new("callsign".into(), rows.iter().map(|r| r.callsign.clone()).collect::<Vec<_>>()),
            Column::new(
                "origin_country".into(),
                rows.iter().map(|r| r.origin_country.clone()).collect::<Vec<_>>(),
            ),
            Column::new("time_position".into(), rows.iter().map(|r| epoch(&r.time_position)).collect::<Vec<_>>()),
            Column::new("last_contact".into(), rows.iter().map(|r| epoch(&r.last_contact)).collect::<Vec<_>>()),
            Column::new("longitude".into(), rows.iter().map(|r| r.longitude).collect::<Vec<_>>()),
            Column::new("latitude".into(), rows.iter().map(|r| r.latitude).collect::<Vec<_>>()),
            Column::new("baro_altitude".into(), rows.iter().map(|r| r.baro_altitude).collect::<Vec<_>>()),
            Column::new("on_ground".into(), rows.iter().map(|r| r.on_ground).collect::<Vec<_>>()),
            Column::new("velocity".into(), rows.iter().map(|r| r.velocity).collect::<Vec<_>>()),
            Column::new("heading".into(), rows.iter().map(|r| r.heading).collect::<Vec<_>>()),
            Column::new("vertical_rate".into(), rows.iter().map(|r| r.vertical_rate).collect::<Vec<_>>()),
        ];

        let df = DataFrame::new(columns).map_err(|e| FlightSyncError::DataConversion(e.to_string()))?;
        Ok(Self { df })
    }

    /// Get the underlying DataFrame.
    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Get the number of rows.
    pub fn len(&self) -> usize {
        self.df.height()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    /// Get column names.
    pub fn columns(&self) -> Vec<String> {
        self.df.get_column_names().iter().map(|s| s.to_string()).collect()
    }

    /// Export to CSV file.
    pub fn to_csv(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        CsvWriter::new(&mut file)
            .finish(&mut self.df.clone())
            .map_err(|e| FlightSyncError::DataConversion(e.to_string()))?;
        Ok(())
    }

    /// Export to Parquet file.
    pub fn to_parquet(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        ParquetWriter::new(&mut file)
            .finish(&mut self.df.clone())
            .map_err(|e| FlightSyncError::DataConversion(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> RawState {
        json!([
            "3c6444", "DLH9LF  ", "Germany", 1735725600, 1735725601,
            8.5432, 50.0333, 10668.0, false, 231.4, 87.2, -0.33,
            null, 10972.8, "1000", false, 0
        ])
        .as_array()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_maps_positions_to_columns() {
        let row = FlightRow::from_state(&sample_state()).unwrap();

        assert_eq!(row.icao24.as_deref(), Some("3c6444"));
        assert_eq!(row.callsign.as_deref(), Some("DLH9LF"));
        assert_eq!(row.origin_country.as_deref(), Some("Germany"));
        assert_eq!(row.time_position.unwrap().and_utc().timestamp(), 1735725600);
        assert_eq!(row.last_contact.unwrap().and_utc().timestamp(), 1735725601);
        assert_eq!(row.longitude, Some(8.5432));
        assert_eq!(row.latitude, Some(50.0333));
        assert_eq!(row.baro_altitude, Some(10668.0));
        assert_eq!(row.on_ground, Some(false));
        assert_eq!(row.velocity, Some(231.4));
        assert_eq!(row.heading, Some(87.2));
        assert_eq!(row.vertical_rate, Some(-0.33));
    }

    #[test]
    fn test_callsign_trimmed() {
        let mut state = sample_state();
        state[1] = json!("  ABC123  ");
        let row = FlightRow::from_state(&state).unwrap();
        assert_eq!(row.callsign.as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_empty_callsign_is_null() {
        let mut state = sample_state();
        state[1] = json!("");
        assert_eq!(FlightRow::from_state(&state).unwrap().callsign, None);

        state[1] = Value::Null;
        assert_eq!(FlightRow::from_state(&state).unwrap().callsign, None);
    }

    #[test]
    fn test_falsy_epochs_are_null() {
        let mut state = sample_state();
        state[3] = Value::Null;
        state[4] = json!(0);
        let row = FlightRow::from_state(&state).unwrap();
        assert_eq!(row.time_position, None);
        assert_eq!(row.last_contact, None);
    }

    #[test]
    fn test_fractional_epoch() {
        let mut state = sample_state();
        state[3] = json!(1735725600.5);
        let row = FlightRow::from_state(&state).unwrap();
        let ts = row.time_position.unwrap().and_utc();
        assert_eq!(ts.timestamp(), 1735725600);
        assert_eq!(ts.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_short_state_rejected() {
        let state = json!(["3c6444", "DLH9LF", "Germany"]).as_array().cloned().unwrap();
        let err = FlightRow::from_state(&state).unwrap_err();
        assert!(matches!(err, FlightSyncError::MalformedState(_)));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut state = sample_state();
        state[5] = json!("east");
        let err = FlightRow::from_state(&state).unwrap_err();
        assert!(err.to_string().contains("longitude"));
    }

    #[test]
    fn test_states_response_null_and_missing() {
        let resp: StatesResponse = serde_json::from_str(r#"{"time": 1, "states": null}"#).unwrap();
        assert!(resp.states.is_none());

        let missing = serde_json::from_str::<StatesResponse>(r#"{"time": 1}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_flight_data_columns() {
        let row = FlightRow::from_state(&sample_state()).unwrap();
        let data = FlightData::from_rows(&[row.clone(), row]).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.columns(), FLIGHT_COLUMNS.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(FlightSyncError::Config("missing".into()).exit_code(), 1);
        assert!(FlightSyncError::Key("bad".into()).is_config());
        assert!(!FlightSyncError::Query("x".into()).is_config());
    }
}
