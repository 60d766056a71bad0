use anyhow::Result;
use std::sync::{Arc, Mutex};
use telemetry_gateway::cloud::{self, CloudForwarder, CloudLogLayer};
use telemetry_gateway::config::{Config, HardwareVariant};
use telemetry_gateway::controllers::ControllerRegistry;
use telemetry_gateway::hardware::{GatewayHardware, ModbusGatewayHardware, SimulatedHardware};
use telemetry_gateway::http::{self, AppState};
use telemetry_gateway::latest::LatestValues;
use telemetry_gateway::scheduler::SensorScheduler;
use telemetry_gateway::sensor_config::SensorConfigDocument;
use telemetry_gateway::storage::StorageController;
use tokio_util::sync::CancellationToken;

fn init_tracing(cloud_layer: Option<CloudLogLayer>) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,telemetry_gateway=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(cloud_layer)
        .try_init()?;
    Ok(())
}

fn build_hardware(config: &Config) -> Result<Arc<dyn GatewayHardware>> {
    let hardware: Arc<dyn GatewayHardware> = match config.hardware {
        HardwareVariant::Simulated => Arc::new(SimulatedHardware),
        HardwareVariant::Modbus => {
            let endpoint = config
                .modbus_endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("modbus hardware requires a Modbus endpoint"))?;
            Arc::new(ModbusGatewayHardware::new(
                endpoint,
                config.modbus_timeout,
                config.gpio_root.clone(),
                config.digital_input_gpios.clone(),
            ))
        }
    };
    Ok(hardware)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env()?;

    let (cloud_layer, cloud_logs) = if config.cloud_logs {
        let (layer, rx) = CloudLogLayer::channel();
        (Some(layer), Some(rx))
    } else {
        (None, None)
    };
    init_tracing(cloud_layer)?;

    let cancel = CancellationToken::new();
    let transport = cloud::build_transport(&config, cancel.clone())?;
    if let Some(rx) = cloud_logs {
        tokio::spawn(cloud::forward_logs(rx, transport.clone()));
    }

    let hardware = build_hardware(&config)?;
    tracing::info!(
        device_id = %config.device_id,
        hardware = hardware.name(),
        version = env!("CARGO_PKG_VERSION"),
        "telemetry gateway starting"
    );

    let storage = Arc::new(StorageController::new(config.record_capacity));
    let latest = Arc::new(LatestValues::new());
    let scheduler = SensorScheduler::new(config.scheduler_config());
    scheduler.add_sink(storage.clone());
    scheduler.add_sink(latest.clone());

    let forwarder = CloudForwarder::new(storage.clone(), transport);
    let forwarder_handle = forwarder.start(cancel.clone());
    forwarder.report_device_startup(&config.device_id, config.hardware.as_str());

    let document = SensorConfigDocument::load(&config.sensor_config_path);
    let registry = ControllerRegistry::new();
    registry.register_platform(hardware.as_ref());
    let load = registry.load_all(&document, hardware.clone(), scheduler.clone());

    let load_report = Arc::new(Mutex::new(None));
    let (loaded_tx, loaded_rx) = tokio::sync::oneshot::channel();
    {
        let load_report = load_report.clone();
        let scheduler = scheduler.clone();
        let forwarder = forwarder.clone();
        tokio::spawn(async move {
            let report = load.wait().await;
            *load_report
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report);
            forwarder.report_sensor_configuration(&scheduler.node_summaries());
            let _ = loaded_tx.send(());
        });
    }
    if tokio::time::timeout(config.controller_load_timeout, loaded_rx)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.controller_load_timeout.as_secs(),
            "controllers still configuring; starting read loop anyway"
        );
    }

    let scheduler_handle = scheduler.start(cancel.clone());

    let http_handle = config.http_bind.clone().map(|bind| {
        let state = AppState {
            device_id: config.device_id.clone(),
            storage: storage.clone(),
            scheduler: scheduler.clone(),
            latest: latest.clone(),
            load_report: load_report.clone(),
        };
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = http::serve(&bind, state, cancel).await {
                tracing::error!(error = %err, "status endpoint exited");
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    cancel.cancel();

    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    let _ = forwarder_handle.await;
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }
    tracing::info!(queued = storage.queued(), "telemetry gateway stopped");
    Ok(())
}
