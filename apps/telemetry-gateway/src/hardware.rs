mod gpio;
mod modbus;
mod simulated;

pub use gpio::SysfsDigitalInput;
pub use modbus::LazyModbusBus;
pub use simulated::{SimulatedDigitalInput, SimulatedHardware};

use crate::config::ModbusEndpoint;
use crate::controllers::ControllerKind;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Holding-register access on the shared field bus. Implementations serialize transactions.
pub trait ModbusBus: Send + Sync {
    /// Reads `count` registers starting at the zero-based `address` of device `unit`.
    fn read_holding_registers(
        &self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> BoxFuture<'_, io::Result<Vec<u16>>>;
}

pub type SharedModbusBus = Arc<dyn ModbusBus>;

pub trait DigitalInput: Send + Sync {
    fn read(&self) -> BoxFuture<'_, io::Result<bool>>;
}

/// A controller to auto-register and the configuration section it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerDescriptor {
    pub kind: ControllerKind,
    pub section: String,
}

impl ControllerDescriptor {
    pub fn new(kind: ControllerKind, section: impl Into<String>) -> Self {
        Self {
            kind,
            section: section.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    #[error("{0} has no modbus bus")]
    NoModbusBus(&'static str),
    #[error("digital input channel {0} is not mapped")]
    UnknownChannel(u8),
}

pub trait GatewayHardware: Send + Sync {
    fn name(&self) -> &'static str;

    fn modbus_bus(&self) -> Result<SharedModbusBus, HardwareError>;

    fn digital_input(&self, channel: u8) -> Result<Arc<dyn DigitalInput>, HardwareError>;

    /// Controllers this platform ships with, paired with their configuration sections.
    fn controllers(&self) -> Vec<ControllerDescriptor> {
        standard_controllers()
    }
}

pub(crate) fn standard_controllers() -> Vec<ControllerDescriptor> {
    vec![
        ControllerDescriptor::new(ControllerKind::DigitalInputs, "DigitalInputs"),
        ControllerDescriptor::new(ControllerKind::ModbusDevices, "ModbusDevices"),
        ControllerDescriptor::new(ControllerKind::FrequencyInputs, "FrequencyInputs"),
        ControllerDescriptor::new(ControllerKind::T322i, "T322iInputs"),
        ControllerDescriptor::new(ControllerKind::Keller, "Keller"),
        ControllerDescriptor::new(ControllerKind::Spm1x, "SPM1x"),
    ]
}

/// Field gateway with an RS-485 bus behind a Modbus bridge and GPIO digital inputs.
pub struct ModbusGatewayHardware {
    bus: SharedModbusBus,
    gpio_root: PathBuf,
    digital_inputs: BTreeMap<u8, u32>,
}

impl ModbusGatewayHardware {
    pub fn new(
        endpoint: ModbusEndpoint,
        timeout: Duration,
        gpio_root: PathBuf,
        digital_inputs: BTreeMap<u8, u32>,
    ) -> Self {
        Self {
            bus: Arc::new(LazyModbusBus::new(endpoint, timeout)),
            gpio_root,
            digital_inputs,
        }
    }
}

impl GatewayHardware for ModbusGatewayHardware {
    fn name(&self) -> &'static str {
        "modbus-gateway"
    }

    fn modbus_bus(&self) -> Result<SharedModbusBus, HardwareError> {
        Ok(self.bus.clone())
    }

    fn digital_input(&self, channel: u8) -> Result<Arc<dyn DigitalInput>, HardwareError> {
        let gpio = self
            .digital_inputs
            .get(&channel)
            .copied()
            .ok_or(HardwareError::UnknownChannel(channel))?;
        Ok(Arc::new(SysfsDigitalInput::new(&self.gpio_root, gpio)))
    }
}
