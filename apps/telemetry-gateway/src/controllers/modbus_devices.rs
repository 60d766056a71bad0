use super::{
    default_sense_interval, parse_section, sense_interval, ConfigureError, SensingNodeController,
};
use crate::drivers::spm1x::Spm1x;
use crate::drivers::xdrive::CerusXDrive;
use crate::drivers::DeviceLink;
use crate::hardware::{GatewayHardware, HardwareError, SharedModbusBus};
use crate::node::{read_fn, SensingNode, SensorReading};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModbusDeviceConfig {
    driver: String,
    address: u8,
    name: String,
    #[serde(default = "default_sense_interval")]
    sense_interval_seconds: i64,
    #[serde(default)]
    is_simulated: bool,
}

/// Composite Modbus devices: one node per device, yielding every value the device reports in
/// one poll under `<Name>.<Value>` keys.
pub struct ModbusDevicesController;

impl SensingNodeController for ModbusDevicesController {
    fn name(&self) -> &'static str {
        "modbus-devices"
    }

    fn configure(
        &self,
        config_json: String,
        hardware: Arc<dyn GatewayHardware>,
    ) -> BoxFuture<'static, Result<Vec<SensingNode>, ConfigureError>> {
        async move {
            let devices: Vec<ModbusDeviceConfig> = parse_section(&config_json)?;
            let mut shared_bus: Option<Result<SharedModbusBus, HardwareError>> = None;
            let mut nodes = Vec::with_capacity(devices.len());

            for device in devices {
                let link = if device.is_simulated {
                    DeviceLink::Simulated
                } else {
                    match shared_bus.get_or_insert_with(|| hardware.modbus_bus()) {
                        Ok(bus) => DeviceLink::modbus(bus.clone(), device.address),
                        Err(err) => {
                            tracing::error!(
                                device = %device.name,
                                error = %err,
                                "modbus device skipped"
                            );
                            continue;
                        }
                    }
                };
                match build_device_node(&device, link) {
                    Ok(node) => nodes.push(node),
                    Err(err) => {
                        tracing::error!(
                            device = %device.name,
                            error = %err,
                            "modbus device skipped"
                        );
                    }
                }
            }
            Ok(nodes)
        }
        .boxed()
    }
}

fn build_device_node(
    device: &ModbusDeviceConfig,
    link: DeviceLink,
) -> Result<SensingNode, ConfigureError> {
    let period = sense_interval(device.sense_interval_seconds);
    let name = device.name.clone();
    match device.driver.trim().to_ascii_lowercase().as_str() {
        "spm1x" => {
            let meter = Arc::new(Spm1x::new(link));
            let reader = meter.clone();
            SensingNode::new(
                device.name.clone(),
                meter,
                read_fn(move || {
                    let meter = reader.clone();
                    let name = name.clone();
                    async move {
                        let current = meter.read_current().await?;
                        let voltage = meter.read_voltage().await?;
                        Ok(Some(SensorReading::composite([
                            (format!("{name}.Current"), SensorReading::Quantity(current)),
                            (format!("{name}.Voltage"), SensorReading::Quantity(voltage)),
                        ])))
                    }
                }),
                period,
            )
            .map_err(ConfigureError::from)
        }
        "cerusxdrive" => {
            let drive = Arc::new(CerusXDrive::new(link));
            let reader = drive.clone();
            SensingNode::new(
                device.name.clone(),
                drive,
                read_fn(move || {
                    let drive = reader.clone();
                    let name = name.clone();
                    async move {
                        let status = drive.read_status().await?;
                        let fields = [
                            ("OutputCurrent", status.output_current),
                            ("AmbientTemp", status.ambient_temperature),
                            ("DCBusVoltage", status.dc_bus_voltage),
                            ("OutputFrequency", status.output_frequency),
                            ("OutputVoltage", status.output_voltage),
                        ];
                        Ok(Some(SensorReading::composite(fields.map(|(field, quantity)| {
                            (format!("{name}.{field}"), SensorReading::Quantity(quantity))
                        }))))
                    }
                }),
                period,
            )
            .map_err(ConfigureError::from)
        }
        other => Err(ConfigureError::UnsupportedDriver(other.to_string())),
    }
}
