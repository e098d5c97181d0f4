//! Poll-cycle tests against a local stand-in for the OpenSky API.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use flightsync::{Config, FlightRow, FlightSink, FlightSyncError, Ingester, Result, StatesClient};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sink that records rows and skips repeated (icao24, last_contact) keys.
#[derive(Clone, Default)]
struct MemorySink {
    attempts: Arc<Mutex<Vec<FlightRow>>>,
    keys: Arc<Mutex<HashSet<(Option<String>, Option<i64>)>>>,
}

#[async_trait]
impl FlightSink for MemorySink {
    async fn insert_flight(&mut self, row: &FlightRow) -> Result<u64> {
        self.attempts.lock().unwrap().push(row.clone());
        let key = (row.icao24.clone(), row.last_contact.map(|t| t.and_utc().timestamp()));
        Ok(u64::from(self.keys.lock().unwrap().insert(key)))
    }
}

#[derive(Clone, Default)]
struct Hits {
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/api/states/all")
}

fn states_body() -> Value {
    json!({
        "time": 1735725660,
        "states": [
            ["3c6444", "DLH9LF  ", "Germany", 1735725600, 1735725601, 8.54, 50.03, 10668.0, false, 231.4, 87.2, -0.33, null, 10972.8, "1000", false, 0],
            ["abc123", "  ABC123  ", "Ireland", null, 1735725590, null, null, null, true, 0.0, null, null, null, null, null, false, 0],
            ["4b1805", "SWR12"]
        ]
    })
}

async fn states_server(status: StatusCode, body: Value) -> (String, Hits) {
    let hits = Hits::default();
    let router = Router::new()
        .route(
            "/api/states/all",
            get(move |State(hits): State<Hits>, headers: HeaderMap| {
                let body = body.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    hits.auth.lock().unwrap().push(auth);
                    (status, Json(body))
                }
            }),
        )
        .with_state(hits.clone());
    (serve(router).await, hits)
}

fn config(api_url: String) -> Config {
    Config {
        username: Some("pilot".to_string()),
        password: Some("secret".to_string()),
        api_url,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_non_success_status_yields_no_inserts() {
    let (url, hits) = states_server(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"})).await;
    let sink = MemorySink::default();

    let client = StatesClient::new(&config(url)).unwrap();
    assert!(client.fetch().await.unwrap().is_empty());

    let mut ingester = Ingester::new(client, sink.clone());
    let summary = ingester.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.fetched, 0);
    assert!(sink.attempts.lock().unwrap().is_empty());
    assert_eq!(hits.auth.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cycle_maps_and_inserts_each_state() {
    let (url, _) = states_server(StatusCode::OK, states_body()).await;
    let sink = MemorySink::default();

    let mut ingester = Ingester::new(StatesClient::new(&config(url)).unwrap(), sink.clone());
    let summary = ingester.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.failed, 1);

    let attempts = sink.attempts.lock().unwrap();
    assert!(attempts.len() <= 3);
    assert_eq!(attempts[0].icao24.as_deref(), Some("3c6444"));
    assert_eq!(attempts[0].callsign.as_deref(), Some("DLH9LF"));
    assert_eq!(attempts[0].time_position.unwrap().and_utc().timestamp(), 1735725600);
    assert_eq!(attempts[1].callsign.as_deref(), Some("ABC123"));
    assert_eq!(attempts[1].time_position, None);
    assert_eq!(attempts[1].on_ground, Some(true));
}

#[tokio::test]
async fn test_repeated_cycle_counts_duplicates() {
    let (url, _) = states_server(StatusCode::OK, states_body()).await;
    let sink = MemorySink::default();
    let cancel = CancellationToken::new();

    let mut ingester = Ingester::new(StatesClient::new(&config(url)).unwrap(), sink.clone());
    ingester.run_once(&cancel).await.unwrap();
    let second = ingester.run_once(&cancel).await.unwrap();

    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(sink.keys.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_basic_auth_sent() {
    let (url, hits) = states_server(StatusCode::OK, json!({"time": 1, "states": null})).await;

    let states = StatesClient::new(&config(url)).unwrap().fetch().await.unwrap();
    assert!(states.is_empty());

    let expected = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode("pilot:secret")
    );
    assert_eq!(hits.auth.lock().unwrap()[0].as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_anonymous_without_credentials() {
    let (url, hits) = states_server(StatusCode::OK, json!({"time": 1, "states": []})).await;
    let cfg = Config {
        api_url: url,
        ..Default::default()
    };

    StatesClient::new(&cfg).unwrap().fetch().await.unwrap();
    assert_eq!(hits.auth.lock().unwrap()[0], None);
}

#[tokio::test]
async fn test_missing_states_field_is_error() {
    let (url, _) = states_server(StatusCode::OK, json!({"time": 1})).await;

    let err = StatesClient::new(&config(url)).unwrap().fetch().await.unwrap_err();
    assert!(matches!(err, FlightSyncError::Http(_)));
}

#[tokio::test]
async fn test_run_polls_until_cancelled() {
    let (url, hits) = states_server(StatusCode::OK, states_body()).await;
    let sink = MemorySink::default();
    let cancel = CancellationToken::new();

    let mut ingester = Ingester::new(StatesClient::new(&config(url)).unwrap(), sink.clone())
        .with_interval(Duration::from_millis(20));
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { ingester.run(cancel).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while hits.auth.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(outcome.is_ok());
    assert_eq!(sink.keys.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start_does_not_fetch() {
    let (url, hits) = states_server(StatusCode::OK, states_body()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut ingester = Ingester::new(StatesClient::new(&config(url)).unwrap(), MemorySink::default());
    ingester.run(cancel).await.unwrap();

    assert!(hits.auth.lock().unwrap().is_empty());
}
