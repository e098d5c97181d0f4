//! Configuration for both programs.
//!
//! The ingester reads `~/.config/opensky/settings.conf` (Linux/macOS) or
//! `%LOCALAPPDATA%\opensky\settings.conf` (Windows), then applies
//! environment overrides. The SQL runner is configured from the
//! environment only.

use crate::types::{FlightSyncError, Result};
use configparser::ini::Ini;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Default OpenSky live-state endpoint.
pub const DEFAULT_API_URL: &str = "https://opensky-network.org/api/states/all";

/// Ingester configuration: OpenSky credentials and the target database.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenSky username
    pub username: Option<String>,
    /// OpenSky password
    pub password: Option<String>,
    /// State vector endpoint
    pub api_url: String,
    /// Destination database
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            api_url: DEFAULT_API_URL.to_string(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Postgres connection settings.
#[derive(Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "flights".to_string(),
            user: "flights_wrapper".to_string(),
            password: "flights_wrapper".to_string(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"********")
            .finish()
    }
}

impl DatabaseConfig {
    /// Connection settings for `tokio_postgres`.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password)
            .application_name("flight-ingest");
        pg
    }
}

impl Config {
    /// Load configuration from the default config file (if present) and
    /// the process environment.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let lookup = |key: &str| std::env::var(key).ok();
        if path.exists() {
            Self::load_from_path_with(&path, lookup)
        } else {
            Self::default().with_overrides(lookup)
        }
    }

    /// Load configuration from a specific path, then apply environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        Self::load_from_path_with(path, |key| std::env::var(key).ok())
    }

    /// Load configuration from `path` using `lookup` for overrides.
    pub fn load_from_path_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !path.exists() {
            return Err(FlightSyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let mut ini = Ini::new();
        ini.load(path).map_err(FlightSyncError::Config)?;

        let defaults = DatabaseConfig::default();
        let port = match ini.get("database", "port").filter(|s| !s.is_empty()) {
            Some(raw) => parse_port(&raw)?,
            None => defaults.port,
        };

        let config = Config {
            username: ini.get("default", "username").filter(|s| !s.is_empty()),
            password: ini.get("default", "password").filter(|s| !s.is_empty()),
            api_url: ini
                .get("default", "api_url")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            database: DatabaseConfig {
                host: ini.get("database", "host").filter(|s| !s.is_empty()).unwrap_or(defaults.host),
                port,
                dbname: ini.get("database", "dbname").filter(|s| !s.is_empty()).unwrap_or(defaults.dbname),
                user: ini.get("database", "user").filter(|s| !s.is_empty()).unwrap_or(defaults.user),
                password: ini
                    .get("database", "password")
                    .filter(|s| !s.is_empty())
                    .unwrap_or(defaults.password),
            },
        };

        config.with_overrides(lookup)
    }

    /// Apply `OPENSKY_*` and `FLIGHTS_DB_*` overrides.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|s| !s.is_empty());

        if let Some(v) = get("OPENSKY_USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = get("OPENSKY_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = get("OPENSKY_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = get("FLIGHTS_DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = get("FLIGHTS_DB_PORT") {
            self.database.port = parse_port(&v)?;
        }
        if let Some(v) = get("FLIGHTS_DB_NAME") {
            self.database.dbname = v;
        }
        if let Some(v) = get("FLIGHTS_DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = get("FLIGHTS_DB_PASSWORD") {
            self.database.password = v;
        }

        Ok(self)
    }

    /// Get the platform-specific config directory for OpenSky.
    pub fn config_dir() -> Result<PathBuf> {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            dirs::config_dir()
                .map(|p| p.join("opensky"))
                .ok_or_else(|| FlightSyncError::Config("Could not determine config directory".into()))
        }

        #[cfg(target_os = "windows")]
        {
            dirs::data_local_dir()
                .map(|p| p.join("opensky"))
                .ok_or_else(|| FlightSyncError::Config("Could not determine config directory".into()))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            dirs::home_dir()
                .map(|p| p.join(".opensky"))
                .ok_or_else(|| FlightSyncError::Config("Could not determine home directory".into()))
        }
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.conf"))
    }

    /// Check if credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse()
        .map_err(|e| FlightSyncError::Config(format!("Invalid database port '{raw}': {e}")))
}

/// Environment variables the SQL runner requires, in reporting order.
pub const WAREHOUSE_ENV_VARS: [&str; 7] = [
    "SNOWSQL_ACCOUNT",
    "SNOWSQL_DATABASE",
    "SNOWSQL_PRIVATE_KEY",
    "SNOWSQL_ROLE",
    "SNOWSQL_SCHEMA",
    "SNOWSQL_USER",
    "SNOWSQL_WAREHOUSE",
];

/// SQL runner configuration: Snowflake account, session target and key.
#[derive(Clone)]
pub struct WarehouseConfig {
    pub account: String,
    pub database: String,
    pub private_key_pem: String,
    pub role: String,
    pub schema: String,
    pub user: String,
    pub warehouse: String,
    /// Overrides the `https://<account>.snowflakecomputing.com` endpoint.
    pub url: Option<Url>,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account", &self.account)
            .field("database", &self.database)
            .field("private_key_pem", &"<redacted>")
            .field("role", &self.role)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("warehouse", &self.warehouse)
            .field("url", &self.url)
            .finish()
    }
}

impl WarehouseConfig {
    /// Read the seven `SNOWSQL_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Every missing or empty variable
    /// is reported in one error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let values: Vec<Option<String>> = WAREHOUSE_ENV_VARS
            .iter()
            .map(|key| lookup(*key).filter(|v| !v.trim().is_empty()))
            .collect();

        let missing: Vec<&str> = WAREHOUSE_ENV_VARS
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();

        if !missing.is_empty() {
            return Err(FlightSyncError::Config(format!(
                "One or more Snowflake environment variables are not set: {}",
                missing.join(", ")
            )));
        }

        let url = match lookup("SNOWSQL_URL").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(
                Url::parse(raw.trim())
                    .map_err(|e| FlightSyncError::Config(format!("Invalid SNOWSQL_URL '{raw}': {e}")))?,
            ),
            None => None,
        };

        let mut values = values.into_iter().flatten();
        let mut next = || values.next().unwrap_or_default();

        Ok(Self {
            account: next(),
            database: next(),
            private_key_pem: next(),
            role: next(),
            schema: next(),
            user: next(),
            warehouse: next(),
            url,
        })
    }

    /// Base URL of the account's SQL API.
    pub fn base_url(&self) -> Result<Url> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let raw = format!("https://{}.snowflakecomputing.com", self.account.trim().to_lowercase());
        Url::parse(&raw).map_err(|e| FlightSyncError::Config(format!("Invalid account '{}': {e}", self.account)))
    }
}

/// Default config file content template.
pub const DEFAULT_CONFIG: &str = r#"[default]
username =
password =

[database]
host = localhost
port = 5432
dbname = flights
user = flights_wrapper
password = flights_wrapper
"#;
