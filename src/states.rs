//! HTTP client for the OpenSky live state vector endpoint.

use crate::config::Config;
use crate::types::{RawState, Result, StatesResponse};

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Client for `GET /api/states/all`.
pub struct StatesClient {
    client: Client,
    url: String,
    credentials: Option<(String, String)>,
}

impl StatesClient {
    /// Create a client for the endpoint and credentials in `config`.
    ///
    /// Without a username and password the API is queried anonymously.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("flightsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let credentials = match (&config.username, &config.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            url: config.api_url.clone(),
            credentials,
        })
    }

    /// Fetch the current snapshot of state vectors.
    ///
    /// A non-success status is logged and yields an empty list. A body
    /// without a `states` key is an error; `"states": null` is empty.
    pub async fn fetch(&self) -> Result<Vec<RawState>> {
        let mut request = self.client.get(&self.url);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            warn!(status = status.as_u16(), url = %self.url, "Error fetching flight data");
            return Ok(Vec::new());
        }

        let body: StatesResponse = response.json().await?;
        let states = body.states.unwrap_or_default();
        debug!(count = states.len(), time = ?body.time, "Fetched state vectors");

        Ok(states)
    }
}
