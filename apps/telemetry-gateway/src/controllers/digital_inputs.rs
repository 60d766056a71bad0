use super::{
    default_sense_interval, keep_node, parse_section, sense_interval, ConfigureError,
    SensingNodeController,
};
use crate::hardware::{DigitalInput, GatewayHardware, SimulatedDigitalInput};
use crate::node::{read_fn, ReadError, SensingNode, Sensor};
use crate::units::{Dimension, Quantity};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DigitalInputConfig {
    name: String,
    channel_number: u8,
    #[serde(default)]
    is_simulated: bool,
    #[serde(default = "default_sense_interval")]
    sense_interval_seconds: i64,
}

/// One digital input channel; reads as 1.0 (high) or 0.0 (low).
pub struct DigitalInputSensor {
    channel: u8,
    input: Arc<dyn DigitalInput>,
}

impl DigitalInputSensor {
    pub fn new(channel: u8, input: Arc<dyn DigitalInput>) -> Self {
        Self { channel, input }
    }

    pub fn simulated(channel: u8) -> Self {
        Self::new(channel, Arc::new(SimulatedDigitalInput::randomized()))
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub async fn read_state(&self) -> Result<Quantity, ReadError> {
        let high = self.input.read().await?;
        Ok(Quantity::Scalar(if high { 1.0 } else { 0.0 }))
    }
}

impl Sensor for DigitalInputSensor {
    fn kind(&self) -> &'static str {
        "digital-input"
    }
}

pub struct DigitalInputsController;

impl SensingNodeController for DigitalInputsController {
    fn name(&self) -> &'static str {
        "digital-inputs"
    }

    fn configure(
        &self,
        config_json: String,
        hardware: Arc<dyn GatewayHardware>,
    ) -> BoxFuture<'static, Result<Vec<SensingNode>, ConfigureError>> {
        async move {
            let inputs: Vec<DigitalInputConfig> = parse_section(&config_json)?;
            let mut nodes = Vec::with_capacity(inputs.len());
            for config in inputs {
                let sensor = if config.is_simulated {
                    Arc::new(DigitalInputSensor::simulated(config.channel_number))
                } else {
                    match hardware.digital_input(config.channel_number) {
                        Ok(input) => {
                            Arc::new(DigitalInputSensor::new(config.channel_number, input))
                        }
                        Err(err) => {
                            tracing::error!(
                                input = %config.name,
                                error = %err,
                                "digital input unavailable; skipped"
                            );
                            continue;
                        }
                    }
                };
                let reader = sensor.clone();
                keep_node(
                    &mut nodes,
                    SensingNode::unitized(
                        config.name,
                        Dimension::Scalar,
                        sensor,
                        read_fn(move || {
                            let reader = reader.clone();
                            async move { Ok(Some(reader.read_state().await?.into())) }
                        }),
                        sense_interval(config.sense_interval_seconds),
                    ),
                );
            }
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
    async fn builds_scalar_nodes_for_each_input() {
        let json = r#"[
            { "Name": "Pump1.Run", "ChannelNumber": 1, "IsSimulated": true, "SenseIntervalSeconds": 1 },
            { "Name": "Gate.Open", "ChannelNumber": 2, "IsSimulated": true },
            { "Name": "Bad.Period", "ChannelNumber": 3, "IsSimulated": true, "SenseIntervalSeconds": 0 }
        ]"#;
        let nodes = DigitalInputsController
            .configure(json.to_string(), Arc::new(SimulatedHardware))
            .await
            .unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].period_seconds(), 1);
        assert_eq!(nodes[1].period_seconds(), 60);

        let first = nodes[0].read_canonical().await.unwrap().unwrap().value;
        let second = nodes[0].read_canonical().await.unwrap().unwrap().value;
        assert!(first == 0.0 || first == 1.0);
        assert_eq!(first + second, 1.0);
    }

    #[tokio::test]
    async fn rejects_malformed_section() {
        let result = DigitalInputsController
            .configure("{\"Name\": 1}".to_string(), Arc::new(SimulatedHardware))
            .await;
        assert!(matches!(result, Err(ConfigureError::InvalidJson(_))));
    }
}
