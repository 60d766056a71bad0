use super::jitter;
use crate::node::Sensor;
use crate::units::{Quantity, VolumetricFlowUnit};

/// Pulse-output flow meter with a simulated pulse train.
pub struct SimulatedFlowMeter {
    /// Pulses per litre.
    k_factor: f64,
}

impl SimulatedFlowMeter {
    pub fn new(k_factor: f64) -> Self {
        Self { k_factor }
    }

    pub fn pulse_frequency(&self) -> f64 {
        jitter(15.0, 2.0).max(0.0)
    }

    pub fn flow_from_frequency(&self, hertz: f64) -> Quantity {
        Quantity::VolumetricFlow(hertz * 60.0 / self.k_factor, VolumetricFlowUnit::LitersPerMinute)
    }

    pub fn read_flow(&self) -> Quantity {
        self.flow_from_frequency(self.pulse_frequency())
    }
}

impl Sensor for SimulatedFlowMeter {
    fn kind(&self) -> &'static str {
        "flow-meter"
    }
}
