use super::{
    default_sense_interval, keep_node, parse_section, sense_interval, ConfigureError,
    SensingNodeController,
};
use crate::drivers::keller::KellerTransducer;
use crate::drivers::DeviceLink;
use crate::hardware::GatewayHardware;
use crate::node::{read_fn, SensingNode, SensorReading};
use crate::units::Dimension;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KellerConfig {
    #[serde(default)]
    modbus_address: u8,
    #[serde(default)]
    is_simulated: bool,
    name: String,
    #[serde(default = "default_sense_interval")]
    sense_interval_seconds: i64,
}

pub struct KellerController;

impl SensingNodeController for KellerController {
    fn name(&self) -> &'static str {
        "keller"
    }

    fn configure(
        &self,
        config_json: String,
        hardware: Arc<dyn GatewayHardware>,
    ) -> BoxFuture<'static, Result<Vec<SensingNode>, ConfigureError>> {
        async move {
            let config: KellerConfig = parse_section(&config_json)?;
            let link = if config.is_simulated {
                DeviceLink::Simulated
            } else {
                DeviceLink::modbus(hardware.modbus_bus()?, config.modbus_address)
            };
            let transducer = Arc::new(KellerTransducer::new(link));
            let period = sense_interval(config.sense_interval_seconds);

            let mut nodes = Vec::with_capacity(2);
            let reader = transducer.clone();
            keep_node(
                &mut nodes,
                SensingNode::unitized(
                    format!("{}.PressureChannel1", config.name),
                    Dimension::Pressure,
                    transducer.clone(),
                    read_fn(move || {
                        let reader = reader.clone();
                        async move {
                            Ok(Some(SensorReading::Quantity(reader.read_pressure().await?)))
                        }
                    }),
                    period,
                ),
            );
            let reader = transducer.clone();
            keep_node(
                &mut nodes,
                SensingNode::unitized(
                    format!("{}.TemperatureChannel1", config.name),
                    Dimension::Temperature,
                    transducer,
                    read_fn(move || {
                        let reader = reader.clone();
                        async move {
                            Ok(Some(SensorReading::Quantity(reader.read_temperature().await?)))
                        }
                    }),
                    period,
                ),
            );
            Ok(nodes)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedHardware;

    #[tokio::test]
    async fn builds_pressure_and_temperature_nodes_sharing_one_transducer() {
        let json = r#"{ "ModbusAddress": 1, "IsSimulated": true, "Name": "Well" }"#;
        let nodes = KellerController
            .configure(json.to_string(), Arc::new(SimulatedHardware))
            .await
            .unwrap();
        let names: Vec<&str> = nodes.iter().map(|node| node.name()).collect();
        assert_eq!(names, vec!["Well.PressureChannel1", "Well.TemperatureChannel1"]);
        assert!(nodes.iter().all(|node| node.period_seconds() == 60));
        assert!(Arc::ptr_eq(nodes[0].sensor(), nodes[1].sensor()));

        let pressure = nodes[0].read_canonical().await.unwrap().unwrap();
        assert_eq!(pressure.dimension, Dimension::Pressure);
    }

    #[tokio::test]
    async fn real_transducer_without_bus_fails_section() {
        let json = r#"{ "ModbusAddress": 1, "Name": "Well" }"#;
        let result = KellerController
            .configure(json.to_string(), Arc::new(SimulatedHardware))
            .await;
        assert!(matches!(result, Err(ConfigureError::Hardware(_))));
    }
}
