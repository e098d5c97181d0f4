//! SQL text for the `flights` table.
//!
//! Timestamps are stored as `TIMESTAMP` (UTC, no zone); the primary key
//! `(icao24, last_contact)` makes inserts idempotent.

use crate::types::FLIGHT_COLUMNS;

/// Destination table name.
pub const FLIGHTS_TABLE: &str = "flights";

/// Column SQL types, aligned with `FLIGHT_COLUMNS`.
const COLUMN_TYPES: &[&str] = &[
    "VARCHAR(50)",
    "VARCHAR(50)",
    "VARCHAR(100)",
    "TIMESTAMP",
    "TIMESTAMP",
    "FLOAT",
    "FLOAT",
    "FLOAT",
    "BOOLEAN",
    "FLOAT",
    "FLOAT",
    "FLOAT",
];

/// Primary key columns.
const PRIMARY_KEY: &[&str] = &["icao24", "last_contact"];

/// Build the idempotent `CREATE TABLE IF NOT EXISTS` statement.
pub fn build_create_table() -> String {
    let columns = FLIGHT_COLUMNS
        .iter()
        .zip(COLUMN_TYPES)
        .map(|(name, ty)| format!("    {name} {ty}"))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "CREATE TABLE IF NOT EXISTS {FLIGHTS_TABLE} (\n{columns},\n    PRIMARY KEY ({})\n)",
        PRIMARY_KEY.join(", ")
    )
}

/// Build the insert statement with `$1..$12` placeholders.
///
/// Conflicts on the primary key are skipped, never overwritten.
pub fn build_insert() -> String {
    let columns = FLIGHT_COLUMNS.join(", ");
    let placeholders = (1..=FLIGHT_COLUMNS.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {FLIGHTS_TABLE} ({columns})\nVALUES ({placeholders})\nON CONFLICT ({}) DO NOTHING",
        PRIMARY_KEY.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table() {
        let sql = build_create_table();

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS flights ("));
        assert!(sql.contains("icao24 VARCHAR(50)"));
        assert!(sql.contains("origin_country VARCHAR(100)"));
        assert!(sql.contains("last_contact TIMESTAMP"));
        assert!(sql.contains("on_ground BOOLEAN"));
        assert!(sql.contains("vertical_rate FLOAT"));
        assert!(sql.contains("PRIMARY KEY (icao24, last_contact)"));
    }

    #[test]
    fn test_column_types_aligned() {
        assert_eq!(COLUMN_TYPES.len(), FLIGHT_COLUMNS.len());
    }

    #[test]
    fn test_insert() {
        let sql = build_insert();

        assert!(sql.contains("INSERT INTO flights (icao24, callsign, origin_country, time_position"));
        assert!(sql.contains("$12)"));
        assert!(!sql.contains("$13"));
        assert!(sql.ends_with("ON CONFLICT (icao24, last_contact) DO NOTHING"));
    }
}
