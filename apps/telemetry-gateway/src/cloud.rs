mod log_layer;
mod transport;

pub use log_layer::{forward_logs, CloudLogLayer};
pub use transport::{build_transport, DisabledTransport, HttpTransport, MqttTransport};

use crate::node::{NodeSummary, TelemetryValue};
use crate::storage::{RecordBatch, StorageController};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventId {
    DeviceStarted,
    SensorConfig,
    DeviceData,
}

impl EventId {
    pub fn code(self) -> u16 {
        match self {
            EventId::DeviceStarted => 101,
            EventId::SensorConfig => 102,
            EventId::DeviceData => 201,
        }
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudEvent {
    pub event_id: EventId,
    pub description: String,
    pub measurements: BTreeMap<String, TelemetryValue>,
    pub timestamp: DateTime<Utc>,
}

impl CloudEvent {
    pub fn device_data(batch: &RecordBatch) -> Self {
        Self {
            event_id: EventId::DeviceData,
            description: "Device telemetry".to_string(),
            measurements: batch.values.clone(),
            timestamp: batch.batch_time,
        }
    }

    pub fn device_started(device_id: &str, hardware: &str) -> Self {
        let measurements = BTreeMap::from([
            ("DeviceId".to_string(), TelemetryValue::from(device_id)),
            (
                "GatewayVersion".to_string(),
                TelemetryValue::from(env!("CARGO_PKG_VERSION")),
            ),
            ("Hardware".to_string(), TelemetryValue::from(hardware)),
        ]);
        Self {
            event_id: EventId::DeviceStarted,
            description: "Device started".to_string(),
            measurements,
            timestamp: Utc::now(),
        }
    }

    pub fn sensor_configuration(nodes: &[NodeSummary]) -> Self {
        let measurements = nodes
            .iter()
            .map(|node| {
                (
                    node.name.clone(),
                    TelemetryValue::Text(format!("{} seconds", node.period_seconds)),
                )
            })
            .collect();
        Self {
            event_id: EventId::SensorConfig,
            description: "Sensor configuration".to_string(),
            measurements,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudLog {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("cloud forwarding is disabled")]
    Disabled,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cloud endpoint returned status {0}")]
    Status(u16),
    #[error("mqtt publish failed: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait CloudTransport: Send + Sync {
    fn name(&self) -> &'static str;

    fn send_event<'a>(&'a self, event: &'a CloudEvent) -> BoxFuture<'a, Result<(), CloudError>>;

    fn send_log<'a>(&'a self, log: &'a CloudLog) -> BoxFuture<'a, Result<(), CloudError>>;
}

fn log_send_failure(transport: &dyn CloudTransport, what: &str, err: &CloudError) {
    if matches!(err, CloudError::Disabled) {
        tracing::debug!(transport = transport.name(), what, "cloud disabled; nothing sent");
    } else {
        tracing::warn!(transport = transport.name(), what, error = %err, "cloud send failed");
    }
}

/// Sends queued batches oldest first. A batch leaves storage only after its send succeeds;
/// the first failure ends the drain until storage signals another batch.
#[derive(Clone)]
pub struct CloudForwarder {
    storage: Arc<StorageController>,
    transport: Arc<dyn CloudTransport>,
}

impl CloudForwarder {
    pub fn new(storage: Arc<StorageController>, transport: Arc<dyn CloudTransport>) -> Self {
        Self { storage, transport }
    }

    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let forwarder = self.clone();
        let batch_added = self.storage.batch_added();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = batch_added.notified() => {
                        forwarder.drain_once().await;
                    }
                }
            }
            tracing::debug!("cloud forwarder stopped");
        })
    }

    /// Returns the number of batches delivered.
    pub async fn drain_once(&self) -> usize {
        let mut sent = 0;
        while let Some(batch) = self.storage.peek_oldest() {
            let event = CloudEvent::device_data(&batch);
            match self.transport.send_event(&event).await {
                Ok(()) => {
                    if !self.storage.remove_sent(batch.sequence) {
                        tracing::debug!(
                            sequence = batch.sequence,
                            "sent batch was already evicted"
                        );
                    }
                    sent += 1;
                }
                Err(err) => {
                    log_send_failure(self.transport.as_ref(), "telemetry batch", &err);
                    break;
                }
            }
        }
        if sent > 0 {
            tracing::debug!(sent, queued = self.storage.queued(), "forwarded telemetry batches");
        }
        sent
    }

    pub fn report_device_startup(&self, device_id: &str, hardware: &str) -> JoinHandle<()> {
        self.send_detached(CloudEvent::device_started(device_id, hardware), "device startup")
    }

    pub fn report_sensor_configuration(&self, nodes: &[NodeSummary]) -> JoinHandle<()> {
        self.send_detached(CloudEvent::sensor_configuration(nodes), "sensor configuration")
    }

    fn send_detached(&self, event: CloudEvent, what: &'static str) -> JoinHandle<()> {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(err) = transport.send_event(&event).await {
                log_send_failure(transport.as_ref(), what, &err);
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records what it is asked to send; fails every send while `failing` is set.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub failing: AtomicBool,
        pub attempts: AtomicUsize,
        pub events: Mutex<Vec<CloudEvent>>,
        pub logs: Mutex<Vec<CloudLog>>,
    }

    impl CloudTransport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn send_event<'a>(
            &'a self,
            event: &'a CloudEvent,
        ) -> BoxFuture<'a, Result<(), CloudError>> {
            async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                if self.failing.load(Ordering::SeqCst) {
                    return Err(CloudError::Status(503));
                }
                self.events.lock().unwrap().push(event.clone());
                Ok(())
            }
            .boxed()
        }

        fn send_log<'a>(&'a self, log: &'a CloudLog) -> BoxFuture<'a, Result<(), CloudError>> {
            async move {
                self.logs.lock().unwrap().push(log.clone());
                Ok(())
            }
            .boxed()
        }
    }
}
