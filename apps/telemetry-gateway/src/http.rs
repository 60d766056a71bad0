use crate::controllers::LoadReport;
use crate::latest::{LatestValue, LatestValues};
use crate::node::NodeSummary;
use crate::scheduler::{SchedulerStatus, SensorScheduler};
use crate::storage::{StorageController, StorageStatus};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub device_id: String,
    pub storage: Arc<StorageController>,
    pub scheduler: SensorScheduler,
    pub latest: Arc<LatestValues>,
    pub load_report: Arc<Mutex<Option<LoadReport>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub device_id: String,
    pub version: &'static str,
    pub scheduler: SchedulerStatus,
    pub storage: StorageStatus,
    pub controllers: Option<LoadReport>,
}

async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let controllers = state
        .load_report
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    Json(StatusResponse {
        device_id: state.device_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
        scheduler: state.scheduler.status(),
        storage: state.storage.status(),
        controllers,
    })
}

async fn nodes_handler(State(state): State<AppState>) -> Json<Vec<NodeSummary>> {
    Json(state.scheduler.node_summaries())
}

async fn latest_handler(State(state): State<AppState>) -> Json<BTreeMap<String, LatestValue>> {
    Json(state.latest.snapshot())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/v1/status", get(status_handler))
        .route("/v1/nodes", get(nodes_handler))
        .route("/v1/latest", get(latest_handler))
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind status endpoint on {bind}"))?;
    tracing::info!(addr = %bind, "status endpoint listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("status endpoint failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TelemetryValue;
    use crate::scheduler::{SchedulerConfig, TelemetrySink, TelemetrySnapshot};

    #[tokio::test]
    async fn status_and_latest_reflect_pipeline_state() {
        let storage = Arc::new(StorageController::new(4));
        let latest = Arc::new(LatestValues::new());
        let snapshot =
            TelemetrySnapshot::from([("Pump1.Run".to_string(), TelemetryValue::Number(1.0))]);
        storage.publish(&snapshot);
        latest.publish(&snapshot);
        let state = AppState {
            device_id: "gw-1".to_string(),
            storage,
            scheduler: SensorScheduler::new(SchedulerConfig::default()),
            latest,
            load_report: Arc::new(Mutex::new(None)),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let client = reqwest::Client::new();
        let status: serde_json::Value = client
            .get(format!("http://{addr}/v1/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["device_id"], "gw-1");
        assert_eq!(status["storage"]["queued_batches"], 1);
        assert_eq!(status["scheduler"]["node_count"], 0);

        let latest: serde_json::Value = client
            .get(format!("http://{addr}/v1/latest"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(latest["Pump1.Run"]["value"], 1.0);
    }
}
