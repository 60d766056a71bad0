use super::{CloudLog, CloudTransport};
use chrono::Utc;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

const FORWARDED_PREFIX: &str = "telemetry_gateway";
// send failures are logged from here; forwarding them would feed back into the channel
const EXCLUDED_PREFIX: &str = "telemetry_gateway::cloud";

/// Captures gateway warnings and errors for the cloud log stream. Events are queued on an
/// unbounded channel and shipped by [`forward_logs`] so the emitting task never waits on I/O.
pub struct CloudLogLayer {
    tx: mpsc::UnboundedSender<CloudLog>,
}

impl CloudLogLayer {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CloudLog>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl<S: Subscriber> Layer<S> for CloudLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if level > Level::WARN {
            return;
        }
        let target = metadata.target();
        if !target.starts_with(FORWARDED_PREFIX) || target.starts_with(EXCLUDED_PREFIX) {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        // a closed receiver just means forwarding has stopped
        let _ = self.tx.send(CloudLog {
            timestamp: Utc::now(),
            message: visitor.finish(),
            severity: level.as_str().to_string(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Ships captured log lines until every [`CloudLogLayer`] sender is gone.
pub async fn forward_logs(
    mut rx: mpsc::UnboundedReceiver<CloudLog>,
    transport: Arc<dyn CloudTransport>,
) {
    while let Some(log) = rx.recv().await {
        if let Err(err) = transport.send_log(&log).await {
            tracing::debug!(error = %err, "dropped cloud log line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::testing::RecordingTransport;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn forwards_only_gateway_warnings_and_errors() {
        let (layer, mut rx) = CloudLogLayer::channel();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(
                target: "telemetry_gateway::scheduler",
                node = "Tank.Level",
                "read failed"
            );
            tracing::error!(target: "telemetry_gateway::controllers", "section failed");
            tracing::info!(target: "telemetry_gateway::scheduler", "routine");
            tracing::warn!(target: "telemetry_gateway::cloud", "send failed");
            tracing::warn!(target: "hyper::client", "connection reset");
        });

        let first = rx.try_recv().unwrap();
        assert_eq!(first.severity, "WARN");
        assert_eq!(first.message, "read failed node=Tank.Level");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.severity, "ERROR");
        assert_eq!(second.message, "section failed");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forward_logs_ships_captured_lines() {
        let (layer, rx) = CloudLogLayer::channel();
        let transport = Arc::new(RecordingTransport::default());
        let forwarding = tokio::spawn(forward_logs(rx, transport.clone()));
        tracing::subscriber::with_default(tracing_subscriber::registry().with(layer), || {
            tracing::error!(target: "telemetry_gateway::storage", "ring buffer overrun");
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while transport.logs.lock().unwrap().is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        forwarding.abort();
        let logs = transport.logs.lock().unwrap();
        assert_eq!(logs[0].message, "ring buffer overrun");
        assert_eq!(logs[0].severity, "ERROR");
    }
}
