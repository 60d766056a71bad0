use super::{CloudError, CloudEvent, CloudLog, CloudTransport};
use crate::config::{CloudMode, Config, MqttSettings};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub fn build_transport(
    config: &Config,
    cancel: CancellationToken,
) -> Result<Arc<dyn CloudTransport>> {
    let transport: Arc<dyn CloudTransport> = match config.cloud_mode {
        CloudMode::Disabled => Arc::new(DisabledTransport),
        CloudMode::Http => {
            let url = config
                .cloud_url
                .as_deref()
                .context("GATEWAY_CLOUD_URL is required for http cloud mode")?;
            Arc::new(HttpTransport::new(url, config.cloud_token.clone())?)
        }
        CloudMode::Mqtt => {
            let settings = config
                .mqtt
                .as_ref()
                .context("MQTT settings are required for mqtt cloud mode")?;
            Arc::new(MqttTransport::connect(settings, &config.device_id, cancel))
        }
    };
    tracing::info!(transport = transport.name(), "cloud transport ready");
    Ok(transport)
}

/// Fails every send, so batches stay queued and age out through the ring buffer.
pub struct DisabledTransport;

impl CloudTransport for DisabledTransport {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn send_event<'a>(&'a self, _event: &'a CloudEvent) -> BoxFuture<'a, Result<(), CloudError>> {
        async { Err(CloudError::Disabled) }.boxed()
    }

    fn send_log<'a>(&'a self, _log: &'a CloudLog) -> BoxFuture<'a, Result<(), CloudError>> {
        async { Err(CloudError::Disabled) }.boxed()
    }
}

/// POSTs JSON to `<base>/events` and `<base>/logs`.
pub struct HttpTransport {
    http: reqwest::Client,
    events_url: Url,
    logs_url: Url,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let events_url = Url::parse(&format!("{base}/events"))
            .with_context(|| format!("invalid cloud url '{base_url}'"))?;
        let logs_url = Url::parse(&format!("{base}/logs"))
            .with_context(|| format!("invalid cloud url '{base_url}'"))?;
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            events_url,
            logs_url,
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    async fn post<T: Serialize>(&self, url: &Url, body: &T) -> Result<(), CloudError> {
        let mut request = self.http.post(url.clone()).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CloudError::Status(status.as_u16()));
        }
        Ok(())
    }
}

impl CloudTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn send_event<'a>(&'a self, event: &'a CloudEvent) -> BoxFuture<'a, Result<(), CloudError>> {
        self.post(&self.events_url, event).boxed()
    }

    fn send_log<'a>(&'a self, log: &'a CloudLog) -> BoxFuture<'a, Result<(), CloudError>> {
        self.post(&self.logs_url, log).boxed()
    }
}

/// Publishes JSON to `<prefix>/<device>/events` and `<prefix>/<device>/logs`.
pub struct MqttTransport {
    client: AsyncClient,
    events_topic: String,
    logs_topic: String,
}

impl MqttTransport {
    /// Creates the client and spawns its event loop; the connection is made in the background
    /// and re-established after failures until `cancel` fires.
    pub fn connect(settings: &MqttSettings, device_id: &str, cancel: CancellationToken) -> Self {
        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.host.clone(),
            settings.port,
        );
        options.set_keep_alive(Duration::from_secs(15));
        if let Some(username) = &settings.username {
            let password = settings.password.clone().unwrap_or_default();
            options.set_credentials(username.clone(), password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    polled = eventloop.poll() => {
                        if let Err(err) = polled {
                            tracing::debug!(error = %err, "mqtt connection error; retrying");
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        });

        let prefix = settings.topic_prefix.trim_end_matches('/');
        Self {
            client,
            events_topic: format!("{prefix}/{device_id}/events"),
            logs_topic: format!("{prefix}/{device_id}/logs"),
        }
    }

    fn publish<T: Serialize>(&self, topic: &str, body: &T) -> Result<(), CloudError> {
        let payload = serde_json::to_vec(body)?;
        // never wait on a full request queue; the batch stays stored and is retried later
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

impl CloudTransport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn send_event<'a>(&'a self, event: &'a CloudEvent) -> BoxFuture<'a, Result<(), CloudError>> {
        let result = self.publish(&self.events_topic, event);
        async move { result }.boxed()
    }

    fn send_log<'a>(&'a self, log: &'a CloudLog) -> BoxFuture<'a, Result<(), CloudError>> {
        let result = self.publish(&self.logs_topic, log);
        async move { result }.boxed()
    }
}
