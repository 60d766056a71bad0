use super::{
    default_sense_interval, keep_node, parse_section, sense_interval, ConfigureError,
    SensingNodeController,
};
use crate::current_loop::{self, ChannelInputType, LoopRange, LoopTransform};
use crate::drivers::t322i::{ChannelError, CurrentInput, T322i};
use crate::drivers::DeviceLink;
use crate::hardware::GatewayHardware;
use crate::node::{read_fn, ReadError, SensingNode, SensorReading};
use crate::units::Dimension;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct T322iConfig {
    #[serde(default)]
    modbus_address: u8,
    #[serde(default)]
    is_simulated: bool,
    #[serde(default)]
    channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChannelConfig {
    channel_number: u8,
    channel_type: ChannelInputType,
    #[serde(default = "default_scale")]
    scale: f64,
    #[serde(default)]
    offset: f64,
    #[serde(default)]
    unit_type: Option<String>,
    name: String,
    #[serde(default = "default_sense_interval")]
    sense_interval_seconds: i64,
}

/// A current channel ready to be opened.
struct PendingChannel {
    config: ChannelConfig,
    range: LoopRange,
}

pub struct T322iController {
    retry_delay: Duration,
}

impl Default for T322iController {
    fn default() -> Self {
        Self::with_retry_delay(Duration::from_secs(1))
    }
}

impl T322iController {
    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self { retry_delay }
    }
}

impl SensingNodeController for T322iController {
    fn name(&self) -> &'static str {
        "t322i"
    }

    fn configure(
        &self,
        config_json: String,
        hardware: Arc<dyn GatewayHardware>,
    ) -> BoxFuture<'static, Result<Vec<SensingNode>, ConfigureError>> {
        let retry_delay = self.retry_delay;
        async move {
            let config: T322iConfig = parse_section(&config_json)?;
            let link = if config.is_simulated {
                DeviceLink::Simulated
            } else {
                DeviceLink::modbus(hardware.modbus_bus()?, config.modbus_address)
            };
            let module = Arc::new(T322i::new(link));

            match module.read_serial_number().await {
                Ok(serial) => tracing::info!(
                    address = config.modbus_address,
                    serial = %serial,
                    "T3-22i module responding"
                ),
                Err(err) => tracing::error!(
                    address = config.modbus_address,
                    error = %err,
                    "failed to read T3-22i serial number; check the module's communication settings"
                ),
            }

            let mut pending = Vec::new();
            for channel in config.channels {
                match channel.channel_type.loop_range() {
                    Some(range) => pending.push(PendingChannel {
                        config: channel,
                        range,
                    }),
                    None => tracing::warn!(
                        channel = channel.channel_number,
                        name = %channel.name,
                        channel_type = ?channel.channel_type,
                        "T3-22i channel type is not supported; skipped"
                    ),
                }
            }

            let mut nodes = Vec::new();
            loop {
                let mut still_pending = Vec::new();
                for channel in pending {
                    match module.open_current_input(channel.config.channel_number).await {
                        Ok(input) => keep_node(&mut nodes, channel_node(&module, input, &channel)),
                        Err(ChannelError::NoSuchChannel(number)) => tracing::error!(
                            channel = number,
                            name = %channel.config.name,
                            "T3-22i has no such channel; skipped"
                        ),
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                name = %channel.config.name,
                                "T3-22i channel not ready"
                            );
                            still_pending.push(channel);
                        }
                    }
                }
                if still_pending.is_empty() {
                    break;
                }
                pending = still_pending;
                tokio::time::sleep(retry_delay).await;
            }
            Ok(nodes)
        }
        .boxed()
    }
}

fn channel_node(
    module: &Arc<T322i>,
    input: CurrentInput,
    channel: &PendingChannel,
) -> Result<SensingNode, crate::node::NodeError> {
    let config = &channel.config;
    let dimension = match config.unit_type.as_deref() {
        Some(unit_type) => match unit_type.parse::<Dimension>() {
            Ok(dimension) => Some(dimension),
            Err(err) => {
                tracing::warn!(
                    name = %config.name,
                    error = %err,
                    "reporting channel as a plain scalar"
                );
                None
            }
        },
        None => None,
    };
    let transform = LoopTransform {
        scale: config.scale,
        offset: config.offset,
        target: dimension.unwrap_or(Dimension::Scalar),
    };
    let range = channel.range;
    let read = read_fn(move || {
        let input = input.clone();
        async move {
            let current = input.read().await?;
            let quantity =
                current_loop::convert(current, range, &transform).map_err(ReadError::from)?;
            Ok(Some(SensorReading::Quantity(quantity)))
        }
    });
    let period = sense_interval(config.sense_interval_seconds);
    match dimension {
        Some(dimension) => {
            SensingNode::unitized(config.name.clone(), dimension, module.clone(), read, period)
        }
        None => SensingNode::new(config.name.clone(), module.clone(), read, period),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::registers::testing::{BusHardware, FakeBus};
    use crate::hardware::SimulatedHardware;
    use crate::node::NodeKind;

    /// Channel `n` float register, zero-based.
    fn channel_address(channel: u16) -> u16 {
        100 + 2 * (channel - 1)
    }

    #[tokio::test]
    async fn builds_current_channels_and_skips_others() {
        let json = r#"{
            "ModbusAddress": 3,
            "IsSimulated": true,
            "Channels": [
                { "ChannelNumber": 1, "ChannelType": "Current_4_20", "Scale": 0.625, "Offset": -2.5,
                  "UnitType": "Pressure", "Name": "Tank.Pressure", "SenseIntervalSeconds": 10 },
                { "ChannelNumber": 2, "ChannelType": "Current_0_20", "UnitType": "Furlongs", "Name": "Tank.Raw" },
                { "ChannelNumber": 3, "ChannelType": "Voltage_0_10", "Name": "Tank.Volts" },
                { "ChannelNumber": 4, "ChannelType": "DiscreteInput", "Name": "Tank.Switch" },
                { "ChannelNumber": 40, "ChannelType": "Current_4_20", "Name": "Tank.Missing" }
            ]
        }"#;
        let nodes = T322iController::default()
            .configure(json.to_string(), Arc::new(SimulatedHardware))
            .await
            .unwrap();
        let names: Vec<&str> = nodes.iter().map(|node| node.name()).collect();
        assert_eq!(names, vec!["Tank.Pressure", "Tank.Raw"]);
        assert_eq!(nodes[0].kind(), NodeKind::Unitized(Dimension::Pressure));
        assert_eq!(nodes[0].period_seconds(), 10);
        assert_eq!(nodes[1].kind(), NodeKind::Plain);
        assert_eq!(nodes[1].period_seconds(), 60);
    }

    #[tokio::test]
    async fn converts_loop_current_through_transform() {
        let bus = Arc::new(FakeBus::default());
        bus.set(3, 0, &[0, 1]);
        bus.set_f32(3, channel_address(1), 12.0);
        let json = r#"{
            "ModbusAddress": 3,
            "Channels": [
                { "ChannelNumber": 1, "ChannelType": "Current_4_20", "Scale": 0.625, "Offset": -2.5,
                  "UnitType": "Pressure", "Name": "Tank.Pressure" }
            ]
        }"#;
        let nodes = T322iController::default()
            .configure(json.to_string(), Arc::new(BusHardware(bus.clone())))
            .await
            .unwrap();
        let reading = nodes[0].read_canonical().await.unwrap().unwrap();
        assert_eq!(reading.dimension, Dimension::Pressure);
        assert!((reading.value - 5.0).abs() < 1e-9);

        bus.set_f32(3, channel_address(1), 2.0);
        assert!(matches!(
            nodes[0].read_canonical().await,
            Err(ReadError::Conversion(current_loop::ConversionError::Undercurrent(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_channels_until_they_answer() {
        let bus = Arc::new(FakeBus::default());
        bus.set_f32(5, channel_address(1), 8.0);
        let json = r#"{
            "ModbusAddress": 5,
            "Channels": [
                { "ChannelNumber": 1, "ChannelType": "Current_4_20", "Name": "A" },
                { "ChannelNumber": 2, "ChannelType": "Current_4_20", "Name": "B" }
            ]
        }"#;
        let controller = T322iController::with_retry_delay(Duration::from_secs(1));
        let task = tokio::spawn(
            controller.configure(json.to_string(), Arc::new(BusHardware(bus.clone()))),
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!task.is_finished());

        bus.set_f32(5, channel_address(2), 9.0);
        let nodes = task.await.unwrap().unwrap();
        let names: Vec<&str> = nodes.iter().map(|node| node.name()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn missing_bus_fails_section() {
        let json = r#"{ "ModbusAddress": 5, "Channels": [] }"#;
        let result = T322iController::default()
            .configure(json.to_string(), Arc::new(SimulatedHardware))
            .await;
        assert!(matches!(result, Err(ConfigureError::Hardware(_))));
    }
}
