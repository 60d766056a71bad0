pub mod digital_inputs;
pub mod frequency_inputs;
pub mod keller;
pub mod modbus_devices;
pub mod spm1x;
pub mod t322i;

use crate::hardware::{GatewayHardware, HardwareError};
use crate::node::{NodeError, SensingNode};
use crate::scheduler::SensorScheduler;
use crate::sensor_config::SensorConfigDocument;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_SENSE_INTERVAL_SECONDS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigureError {
    #[error("invalid configuration: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error("unsupported driver '{0}'")]
    UnsupportedDriver(String),
    #[error(transparent)]
    Node(#[from] NodeError),
}

pub trait SensingNodeController: Send + Sync {
    fn name(&self) -> &'static str;

    /// Builds the nodes described by `config_json`. Problems with individual devices or
    /// channels are logged and skipped; only a section that cannot be used at all is an error.
    fn configure(
        &self,
        config_json: String,
        hardware: Arc<dyn GatewayHardware>,
    ) -> BoxFuture<'static, Result<Vec<SensingNode>, ConfigureError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    DigitalInputs,
    ModbusDevices,
    FrequencyInputs,
    T322i,
    Keller,
    Spm1x,
}

impl ControllerKind {
    pub fn build(self) -> Arc<dyn SensingNodeController> {
        match self {
            ControllerKind::DigitalInputs => Arc::new(digital_inputs::DigitalInputsController),
            ControllerKind::ModbusDevices => Arc::new(modbus_devices::ModbusDevicesController),
            ControllerKind::FrequencyInputs => {
                Arc::new(frequency_inputs::FrequencyInputsController)
            }
            ControllerKind::T322i => Arc::new(t322i::T322iController::default()),
            ControllerKind::Keller => Arc::new(keller::KellerController),
            ControllerKind::Spm1x => Arc::new(spm1x::Spm1xController),
        }
    }
}

/// Per-section outcome of loading the registered controllers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub nodes_by_section: BTreeMap<String, usize>,
    pub failed_sections: Vec<String>,
}

impl LoadReport {
    pub fn total_nodes(&self) -> usize {
        self.nodes_by_section.values().sum()
    }
}

/// Completion of [`ControllerRegistry::load_all`]. Dropping it does not stop the loaders.
pub struct LoadHandle {
    watcher: Option<JoinHandle<LoadReport>>,
}

impl LoadHandle {
    pub async fn wait(self) -> LoadReport {
        let Some(watcher) = self.watcher else {
            return LoadReport::default();
        };
        match watcher.await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "controller load watcher failed");
                LoadReport::default()
            }
        }
    }
}

type Registration = (String, Arc<dyn SensingNodeController>);

#[derive(Default)]
pub struct ControllerRegistry {
    entries: Mutex<Vec<Registration>>,
    loaded: AtomicBool,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `controller` for `section`. A section that already has a controller keeps it.
    pub fn register(&self, section: &str, controller: Arc<dyn SensingNodeController>) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.iter().any(|(existing, _)| existing == section) {
            tracing::warn!(
                section,
                controller = controller.name(),
                "controller already registered for section"
            );
            return false;
        }
        entries.push((section.to_string(), controller));
        true
    }

    /// Registers the controllers the platform declares for itself.
    pub fn register_platform(&self, hardware: &dyn GatewayHardware) {
        for descriptor in hardware.controllers() {
            self.register(&descriptor.section, descriptor.kind.build());
        }
    }

    pub fn sections(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(section, _)| section.clone())
            .collect()
    }

    /// Configures every registered controller that has a section in `document`, each on its own
    /// task, adding nodes to `scheduler` as each finishes. Runs once per registry; the scheduler
    /// is marked loaded after every controller has been attempted.
    pub fn load_all(
        &self,
        document: &SensorConfigDocument,
        hardware: Arc<dyn GatewayHardware>,
        scheduler: SensorScheduler,
    ) -> LoadHandle {
        if self.loaded.swap(true, Ordering::SeqCst) {
            tracing::warn!("controllers already loaded; ignoring repeated load");
            return LoadHandle { watcher: None };
        }

        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut tasks = Vec::new();
        for (section, controller) in entries {
            let Some(config_json) = document.section(&section) else {
                tracing::debug!(section = %section, "no configuration section; controller skipped");
                continue;
            };
            let hardware = hardware.clone();
            let scheduler = scheduler.clone();
            let task_section = section.clone();
            let task = tokio::spawn(async move {
                tracing::info!(
                    section = %task_section,
                    controller = controller.name(),
                    "configuring controller"
                );
                match controller.configure(config_json, hardware).await {
                    Ok(nodes) => {
                        let count = nodes.len();
                        scheduler.add_nodes(nodes);
                        tracing::info!(
                            section = %task_section,
                            nodes = count,
                            "controller configured"
                        );
                        Some(count)
                    }
                    Err(err) => {
                        tracing::error!(
                            section = %task_section,
                            error = %err,
                            "controller configuration failed"
                        );
                        None
                    }
                }
            });
            tasks.push((section, task));
        }

        let watcher = tokio::spawn(async move {
            let mut report = LoadReport::default();
            for (section, task) in tasks {
                match task.await {
                    Ok(Some(count)) => {
                        report.nodes_by_section.insert(section, count);
                    }
                    Ok(None) => report.failed_sections.push(section),
                    Err(err) => {
                        tracing::error!(
                            section = %section,
                            error = %err,
                            "controller task aborted"
                        );
                        report.failed_sections.push(section);
                    }
                }
            }
            scheduler.mark_controllers_loaded();
            tracing::info!(
                nodes = report.total_nodes(),
                failed = report.failed_sections.len(),
                "all controllers attempted"
            );
            report
        });

        LoadHandle {
            watcher: Some(watcher),
        }
    }
}

pub(crate) fn default_sense_interval() -> i64 {
    DEFAULT_SENSE_INTERVAL_SECONDS
}

pub(crate) fn sense_interval(seconds: i64) -> Duration {
    Duration::from_secs(seconds.max(0) as u64)
}

pub(crate) fn parse_section<T: DeserializeOwned>(config_json: &str) -> Result<T, ConfigureError> {
    Ok(serde_json::from_str(config_json)?)
}

/// Keeps a successfully built node; logs and drops one that failed validation.
pub(crate) fn keep_node(nodes: &mut Vec<SensingNode>, node: Result<SensingNode, NodeError>) {
    match node {
        Ok(node) => nodes.push(node),
        Err(err) => tracing::warn!(error = %err, "sensing node rejected"),
    }
}
