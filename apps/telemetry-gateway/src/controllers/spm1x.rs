use super::{
    default_sense_interval, keep_node, parse_section, sense_interval, ConfigureError,
    SensingNodeController,
};
use crate::drivers::spm1x::Spm1x;
use crate::drivers::DeviceLink;
use crate::hardware::GatewayHardware;
use crate::node::{read_fn, ReadResult, SensingNode, SensorReading};
use crate::units::{Dimension, Quantity};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Spm1xConfig {
    #[serde(default)]
    modbus_address: u8,
    #[serde(default)]
    is_simulated: bool,
    name: String,
    #[serde(default = "default_sense_interval")]
    sense_interval_seconds: i64,
}

/// A meter that misses a poll is routine on a busy bus; report no data rather than an error.
fn quiet_on_timeout(result: Result<Quantity, crate::node::ReadError>) -> ReadResult {
    match result {
        Ok(quantity) => Ok(Some(SensorReading::Quantity(quantity))),
        Err(err) if err.is_timeout() => Ok(None),
        Err(err) => Err(err),
    }
}

pub struct Spm1xController;

impl SensingNodeController for Spm1xController {
    fn name(&self) -> &'static str {
        "spm1x"
    }

    fn configure(
        &self,
        config_json: String,
        hardware: Arc<dyn GatewayHardware>,
    ) -> BoxFuture<'static, Result<Vec<SensingNode>, ConfigureError>> {
        async move {
            let config: Spm1xConfig = parse_section(&config_json)?;
            let link = if config.is_simulated {
                DeviceLink::Simulated
            } else {
                DeviceLink::modbus(hardware.modbus_bus()?, config.modbus_address)
            };
            let meter = Arc::new(Spm1x::new(link));
            let period = sense_interval(config.sense_interval_seconds);

            let mut nodes = Vec::with_capacity(2);
            let reader = meter.clone();
            keep_node(
                &mut nodes,
                SensingNode::unitized(
                    format!("{}.Current", config.name),
                    Dimension::Current,
                    meter.clone(),
                    read_fn(move || {
                        let reader = reader.clone();
                        async move { quiet_on_timeout(reader.read_current().await) }
                    }),
                    period,
                ),
            );
            let reader = meter.clone();
            keep_node(
                &mut nodes,
                SensingNode::unitized(
                    format!("{}.Voltage", config.name),
                    Dimension::Voltage,
                    meter,
                    read_fn(move || {
                        let reader = reader.clone();
                        async move { quiet_on_timeout(reader.read_voltage().await) }
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
    use crate::drivers::registers::testing::{BusHardware, FakeBus};

    #[tokio::test]
    async fn timeouts_read_as_no_data() {
        let bus = Arc::new(FakeBus::default());
        bus.set_f32(2, crate::drivers::spm1x::CURRENT.address(), 3.0);
        let json = r#"{ "ModbusAddress": 2, "Name": "Panel", "SenseIntervalSeconds": 15 }"#;
        let nodes = Spm1xController
            .configure(json.to_string(), Arc::new(BusHardware(bus.clone())))
            .await
            .unwrap();
        assert_eq!(nodes[0].name(), "Panel.Current");
        assert_eq!(nodes[0].period_seconds(), 15);

        bus.fail_next(1);
        assert!(nodes[0].read_canonical().await.unwrap().is_none());
        assert_eq!(nodes[0].read_canonical().await.unwrap().unwrap().value, 3.0);

        // unmapped register is a device fault, not a timeout
        assert!(nodes[1].read_canonical().await.is_err());
    }
}
