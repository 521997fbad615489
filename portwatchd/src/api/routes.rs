use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use shared::protocol::API_PREFIX;
use shared::types::{RegistryView, ServiceRecord};
use crate::controller::{default_interval, interval_from_secs, interval_from_str, Controller, StartOutcome, StopOutcome};
use crate::import;
use crate::probe::Prober;
use crate::registry::store::RegistryError;

pub struct AppState<P: Prober> {
    pub controller: Arc<Controller<P>>,
    pub hash_rx: watch::Receiver<String>,
}

impl<P: Prober> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            hash_rx: self.hash_rx.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct ServiceRow {
    #[serde(flatten)]
    pub record: ServiceRecord,
    /// Three decimals, or "N/A" before the first check
    pub latency: String,
}

impl From<&ServiceRecord> for ServiceRow {
    fn from(record: &ServiceRecord) -> Self {
        Self {
            latency: record.latency_display(),
            record: record.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub services: Vec<ServiceRow>,
    pub unavailable_count: Option<usize>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub running: bool,
    pub interval_secs: Option<f64>,
}

impl SnapshotResponse {
    fn new(view: &RegistryView, interval: Option<Duration>) -> Self {
        Self {
            services: view.services.iter().map(ServiceRow::from).collect(),
            unavailable_count: view.unavailable_count,
            last_cycle_at: view.last_cycle_at,
            running: interval.is_some(),
            interval_secs: interval.map(|i| i.as_secs_f64()),
        }
    }
}

/// Interval as sent by clients: a number or the raw text of an input field
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IntervalInput {
    Seconds(f64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub interval: Option<IntervalInput>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub state: &'static str,
    pub interval_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub state: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub imported: usize,
    pub skipped: usize,
}

pub fn router<P: Prober>(state: AppState<P>) -> Router {
    Router::new()
        .route(&format!("{}/snapshot", API_PREFIX), get(get_snapshot::<P>))
        .route(&format!("{}/snapshot/hash", API_PREFIX), get(get_hash::<P>))
        .route(&format!("{}/start", API_PREFIX), post(start::<P>))
        .route(&format!("{}/stop", API_PREFIX), post(stop::<P>))
        .route(&format!("{}/services", API_PREFIX), put(import_services::<P>))
        .with_state(state)
}

async fn get_snapshot<P: Prober>(State(state): State<AppState<P>>) -> Json<SnapshotResponse> {
    let view = state.controller.current_snapshot();
    Json(SnapshotResponse::new(&view, state.controller.running_interval()))
}

async fn get_hash<P: Prober>(State(state): State<AppState<P>>) -> String {
    state.hash_rx.borrow().clone()
}

async fn start<P: Prober>(
    State(state): State<AppState<P>>,
    Json(request): Json<StartRequest>,
) -> Json<StartResponse> {
    let interval = match request.interval {
        Some(IntervalInput::Seconds(secs)) => interval_from_secs(secs),
        Some(IntervalInput::Text(raw)) => interval_from_str(&raw),
        None => default_interval(),
    };

    let response = match state.controller.start(interval).await {
        StartOutcome::Started { interval } => StartResponse {
            state: "started",
            interval_secs: interval.as_secs_f64(),
        },
        StartOutcome::AlreadyRunning { interval } => StartResponse {
            state: "already_running",
            interval_secs: interval.as_secs_f64(),
        },
    };
    Json(response)
}

async fn stop<P: Prober>(State(state): State<AppState<P>>) -> Json<StopResponse> {
    let outcome = match state.controller.stop().await {
        StopOutcome::Stopped => "stopped",
        StopOutcome::NotRunning => "not_running",
    };
    Json(StopResponse { state: outcome })
}

async fn import_services<P: Prober>(
    State(state): State<AppState<P>>,
    body: String,
) -> Result<Json<ImportResponse>, (StatusCode, String)> {
    let parsed = import::from_str(&body).map_err(|e| {
        tracing::warn!("Rejected service list: {:#}", e);
        (StatusCode::BAD_REQUEST, format!("{:#}", e))
    })?;

    let skipped = parsed.skipped;
    let imported = state.controller.import(parsed.records).await.map_err(|e| {
        match e.downcast_ref::<RegistryError>() {
            Some(RegistryError::CycleInFlight) => (StatusCode::CONFLICT, e.to_string()),
            _ => {
                tracing::error!("Failed to import services: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "import failed".to_string())
            }
        }
    })?;

    tracing::info!("Imported {} services, {} rows skipped", imported, skipped);
    Ok(Json(ImportResponse { imported, skipped }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;
    use crate::controller::LoopSettings;
    use crate::probe::testing::ScriptedProber;
    use crate::registry_manager::{spawn_empty, RegistryHandle};
    use tokio::time::Instant;

    fn app() -> (Router, RegistryHandle) {
        app_with(ScriptedProber::new().up("10.0.0.1", 80, 0.01))
    }

    fn app_with(prober: ScriptedProber) -> (Router, RegistryHandle) {
        let (registry, view_rx, hash_rx) = spawn_empty();
        let prober = Arc::new(prober);
        let settings = LoopSettings {
            probe_timeout: Duration::from_secs(5),
            pause_slice: Duration::from_millis(500),
        };
        let state = AppState {
            controller: Arc::new(Controller::new(registry.clone(), view_rx, prober, settings)),
            hash_rx,
        };
        (router(state), registry)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_then_snapshot() {
        let (app, _registry) = app();

        let (status, body) = call(
            &app,
            Method::PUT,
            "/v1/services",
            "10.0.0.1,80,web\n10.0.0.3,22\n10.0.0.2,9999,db\n",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["imported"], 2);
        assert_eq!(body["skipped"], 1);

        let (status, body) = call(&app, Method::GET, "/v1/snapshot", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);
        assert_eq!(body["unavailable_count"], Value::Null);
        assert_eq!(body["services"][0]["label"], "web");
        assert_eq!(body["services"][0]["status"], "unknown");
        assert_eq!(body["services"][0]["last_latency_secs"], Value::Null);
        assert_eq!(body["services"][0]["latency"], "N/A");
        assert_eq!(body["services"][1]["label"], "db");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_cycle() {
        let (app, _registry) = app();
        call(&app, Method::PUT, "/v1/services", "10.0.0.1,80,web\n10.0.0.2,9999,db\n").await;

        let (status, body) = call(&app, Method::POST, "/v1/start", r#"{"interval": "abc"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "started");
        assert_eq!(body["interval_secs"], 5.0);

        let (_, body) = call(&app, Method::POST, "/v1/start", r#"{"interval": 1}"#).await;
        assert_eq!(body["state"], "already_running");
        assert_eq!(body["interval_secs"], 5.0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let (_, body) = call(&app, Method::GET, "/v1/snapshot", "").await;
        assert_eq!(body["running"], true);
        assert_eq!(body["unavailable_count"], 1);
        assert_eq!(body["services"][0]["label"], "db");
        assert_eq!(body["services"][0]["status"], "unavailable");
        assert_eq!(body["services"][1]["label"], "web");
        assert_eq!(body["services"][0]["latency"], "5.000");
        assert_eq!(body["services"][1]["last_latency_secs"], 0.01);
        assert_eq!(body["services"][1]["latency"], "0.010");

        let (_, body) = call(&app, Method::POST, "/v1/stop", "").await;
        assert_eq!(body["state"], "stopped");
        let (_, body) = call(&app, Method::POST, "/v1/stop", "").await;
        assert_eq!(body["state"], "not_running");
    }

    #[tokio::test]
    async fn test_start_without_interval_uses_default() {
        let (app, _registry) = app();
        let (_, body) = call(&app, Method::POST, "/v1/start", "{}").await;
        assert_eq!(body["interval_secs"], 5.0);
        call(&app, Method::POST, "/v1/stop", "").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_answers_while_stop_waits() {
        let (app, _registry) = app_with(ScriptedProber::new().up("10.0.0.1", 80, 3.0).sleeping());
        call(&app, Method::PUT, "/v1/services", "10.0.0.1,80,web\n").await;
        call(&app, Method::POST, "/v1/start", r#"{"interval": 5}"#).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stopping = tokio::spawn({
            let app = app.clone();
            async move { call(&app, Method::POST, "/v1/stop", "").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!stopping.is_finished());

        let requested = Instant::now();
        let (status, body) = call(&app, Method::GET, "/v1/snapshot", "").await;
        assert_eq!(requested.elapsed(), Duration::ZERO);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);
        assert_eq!(body["services"][0]["latency"], "N/A");

        let (_, body) = stopping.await.unwrap();
        assert_eq!(body["state"], "stopped");
    }

    #[tokio::test]
    async fn test_import_conflicts_with_cycle() {
        let (app, registry) = app();
        registry.begin_cycle().await.unwrap();

        let (status, _) = call(&app, Method::PUT, "/v1/services", "10.0.0.1,80,web\n").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_hash_endpoint() {
        let (app, _registry) = app();
        let (status, before) = call(&app, Method::GET, "/v1/snapshot/hash", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(before.as_str().unwrap().len(), 64);

        call(&app, Method::PUT, "/v1/services", "10.0.0.1,80,web\n").await;
        let (_, after) = call(&app, Method::GET, "/v1/snapshot/hash", "").await;
        assert_ne!(before, after);
    }
}
