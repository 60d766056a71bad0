use super::{
    default_sense_interval, keep_node, parse_section, sense_interval, ConfigureError,
    SensingNodeController,
};
use crate::drivers::flow::SimulatedFlowMeter;
use crate::hardware::GatewayHardware;
use crate::node::{read_fn, SensingNode, SensorReading};
use crate::units::Dimension;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::sync::Arc;

fn default_k_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FrequencyInputConfig {
    name: String,
    channel_number: u8,
    #[serde(default)]
    is_simulated: bool,
    #[serde(default = "default_sense_interval")]
    sense_interval_seconds: i64,
    #[serde(default = "default_k_factor")]
    k_factor: f64,
}

/// Pulse-counting flow inputs. No platform exposes a frequency counter yet, so only
/// simulated inputs produce nodes.
pub struct FrequencyInputsController;

impl SensingNodeController for FrequencyInputsController {
    fn name(&self) -> &'static str {
        "frequency-inputs"
    }

    fn configure(
        &self,
        config_json: String,
        _hardware: Arc<dyn GatewayHardware>,
    ) -> BoxFuture<'static, Result<Vec<SensingNode>, ConfigureError>> {
        async move {
            let inputs: Vec<FrequencyInputConfig> = parse_section(&config_json)?;
            let mut nodes = Vec::new();
            for config in inputs {
                if !config.is_simulated {
                    tracing::warn!(
                        input = %config.name,
                        channel = config.channel_number,
                        "frequency inputs are only available simulated; skipped"
                    );
                    continue;
                }
                if !(config.k_factor.is_finite() && config.k_factor > 0.0) {
                    tracing::warn!(
                        input = %config.name,
                        k_factor = config.k_factor,
                        "k-factor must be positive; skipped"
                    );
                    continue;
                }
                let meter = Arc::new(SimulatedFlowMeter::new(config.k_factor));
                let reader = meter.clone();
                keep_node(
                    &mut nodes,
                    SensingNode::unitized(
                        config.name,
                        Dimension::VolumetricFlow,
                        meter,
                        read_fn(move || {
                            let flow = reader.read_flow();
                            async move { Ok(Some(SensorReading::Quantity(flow))) }
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
