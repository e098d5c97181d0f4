//! Snowflake SQL API client with key-pair (JWT) authentication.

use crate::config::WarehouseConfig;
use crate::types::{FlightSyncError, Result};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Statement submission path of the SQL API.
const STATEMENTS_PATH: &str = "/api/v2/statements";

/// Lifetime of a minted key-pair JWT (the API accepts at most one hour).
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Delay between status polls for statements still running.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// An RSA private key and the public key fingerprint Snowflake registers.
pub struct KeyPair {
    encoding_key: EncodingKey,
    fingerprint: String,
}

impl KeyPair {
    /// Parse an unencrypted PEM private key (PKCS#8 or PKCS#1).
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| FlightSyncError::Key(format!("Could not parse PEM private key: {e}")))?;

        let public_der = private
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| FlightSyncError::Key(format!("Could not encode public key: {e}")))?;
        let fingerprint = format!("SHA256:{}", STANDARD.encode(Sha256::digest(public_der.as_bytes())));

        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| FlightSyncError::Key(format!("Could not load signing key: {e}")))?;

        Ok(Self {
            encoding_key,
            fingerprint,
        })
    }

    /// `SHA256:<base64>` fingerprint of the public key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Key-pair JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
struct TokenInfo {
    access_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// Account identifier as it must appear in JWT claims.
///
/// Uppercased; region and cloud suffixes of an account locator are dropped.
pub fn jwt_account(account: &str) -> String {
    let account = account.trim();
    let account = if account.contains(".global") {
        account.split('-').next().unwrap_or(account)
    } else {
        account.split('.').next().unwrap_or(account)
    };
    account.to_uppercase()
}

/// Statement submission body.
#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    database: &'a str,
    schema: &'a str,
    warehouse: &'a str,
    role: &'a str,
}

/// SQL API response body, shared by success, pending and failure replies.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    code: Option<String>,
    message: Option<String>,
    sql_state: Option<String>,
    statement_handle: Option<String>,
    statement_status_url: Option<String>,
    result_set_meta_data: Option<ResultSetMetaData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    num_rows: Option<u64>,
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, Serialize)]
pub struct StatementResult {
    pub statement_handle: Option<String>,
    pub message: Option<String>,
    pub num_rows: Option<u64>,
}

/// A connection to one Snowflake account, bound to a database, schema,
/// warehouse and role.
pub struct Warehouse {
    client: Client,
    config: WarehouseConfig,
    key: KeyPair,
    base_url: Url,
    token: Option<TokenInfo>,
}

impl Warehouse {
    /// Load the private key and open a connection to the account.
    pub async fn connect(config: WarehouseConfig) -> Result<Self> {
        let key = KeyPair::from_pem(&config.private_key_pem)?;
        let base_url = config.base_url()?;

        info!(
            account = %config.account,
            user = %config.user,
            "Connecting to Snowflake account: {} as user: {}...",
            config.account,
            config.user
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("flightsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut warehouse = Self {
            client,
            config,
            key,
            base_url,
            token: None,
        };
        warehouse.get_token()?;

        info!(fingerprint = %warehouse.key.fingerprint(), "Successfully connected to Snowflake.");
        Ok(warehouse)
    }

    /// Get or refresh the key-pair JWT.
    fn get_token(&mut self) -> Result<String> {
        if let Some(ref token) = self.token {
            let now = chrono::Utc::now();
            // Reuse while more than a minute of validity remains
            if token.expires_at > now + chrono::Duration::minutes(1) {
                return Ok(token.access_token.clone());
            }
        }

        let qualified = format!("{}.{}", jwt_account(&self.config.account), self.config.user.to_uppercase());
        let now = chrono::Utc::now();
        let expires_at = now + chrono::Duration::seconds(TOKEN_LIFETIME_SECS);

        let claims = Claims {
            iss: format!("{}.{}", qualified, self.key.fingerprint()),
            sub: qualified,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let access_token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key.encoding_key)
            .map_err(|e| FlightSyncError::Auth(format!("Could not sign JWT: {e}")))?;

        debug!(iss = %claims.iss, "Minted key-pair JWT");
        self.token = Some(TokenInfo {
            access_token: access_token.clone(),
            expires_at,
        });

        Ok(access_token)
    }

    /// Execute one SQL statement and wait for it to finish.
    pub async fn execute(&mut self, sql: &str) -> Result<StatementResult> {
        let token = self.get_token()?;
        let url = self.endpoint(STATEMENTS_PATH)?;

        let body = StatementRequest {
            statement: sql,
            database: &self.config.database,
            schema: &self.config.schema,
            warehouse: &self.config.warehouse,
            role: &self.config.role,
        };

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT")
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let mut status_response = Self::read_response(response).await?;

        // 202: still running, poll the status URL until it completes
        while let Some(status_url) = status_response.pending_url.take() {
            tokio::time::sleep(POLL_INTERVAL).await;

            let token = self.get_token()?;
            let url = self.endpoint(&status_url)?;
            debug!(url = %url, "Polling statement status");

            let response = self
                .client
                .get(url)
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT")
                .header(ACCEPT, "application/json")
                .send()
                .await?;

            status_response = Self::read_response(response).await?;
        }

        Ok(status_response.result)
    }

    /// Release the connection.
    pub fn close(self) {
        info!(account = %self.config.account, "Snowflake connection closed.");
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| FlightSyncError::Config(format!("Invalid SQL API path '{path}': {e}")))
    }

    async fn read_response(response: Response) -> Result<Polled> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::ACCEPTED => {
                let body: StatementResponse = response.json().await?;
                let pending_url = if status == StatusCode::ACCEPTED {
                    Some(body.statement_status_url.clone().ok_or_else(|| {
                        FlightSyncError::Query("Statement accepted without a status URL".into())
                    })?)
                } else {
                    None
                };

                Ok(Polled {
                    pending_url,
                    result: StatementResult {
                        statement_handle: body.statement_handle,
                        message: body.message,
                        num_rows: body.result_set_meta_data.and_then(|m| m.num_rows),
                    },
                })
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body: StatementResponse = response.json().await?;
                Err(FlightSyncError::Warehouse {
                    code: body.code.unwrap_or_default(),
                    sql_state: body.sql_state.unwrap_or_default(),
                    message: body.message.unwrap_or_else(|| "statement failed".to_string()),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let text = response.text().await.unwrap_or_default();
                Err(FlightSyncError::Auth(format!(
                    "Snowflake rejected the key-pair JWT ({status}): {text}"
                )))
            }
            _ => {
                response.error_for_status_ref()?;
                Err(FlightSyncError::Query(format!("Unexpected SQL API status: {status}")))
            }
        }
    }
}

struct Polled {
    pending_url: Option<String>,
    result: StatementResult,
}
