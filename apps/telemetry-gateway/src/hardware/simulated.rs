use super::{DigitalInput, GatewayHardware, HardwareError, SharedModbusBus};
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bench hardware with no field bus. Digital inputs toggle on every read.
#[derive(Debug, Default)]
pub struct SimulatedHardware;

impl GatewayHardware for SimulatedHardware {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn modbus_bus(&self) -> Result<SharedModbusBus, HardwareError> {
        Err(HardwareError::NoModbusBus(self.name()))
    }

    fn digital_input(&self, _channel: u8) -> Result<Arc<dyn DigitalInput>, HardwareError> {
        Ok(Arc::new(SimulatedDigitalInput::randomized()))
    }
}

pub struct SimulatedDigitalInput {
    state: AtomicBool,
}

impl SimulatedDigitalInput {
    pub fn new(initial: bool) -> Self {
        Self {
            state: AtomicBool::new(initial),
        }
    }

    pub fn randomized() -> Self {
        Self::new(rand::thread_rng().gen_bool(0.5))
    }
}

impl DigitalInput for SimulatedDigitalInput {
    fn read(&self) -> BoxFuture<'_, io::Result<bool>> {
        let previous = self.state.fetch_xor(true, Ordering::SeqCst);
        async move { Ok(!previous) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_input_toggles() {
        let input = SimulatedDigitalInput::new(false);
        assert!(input.read().await.unwrap());
        assert!(!input.read().await.unwrap());
        assert!(input.read().await.unwrap());
    }

    #[test]
    fn simulated_hardware_has_no_bus() {
        assert_eq!(
            SimulatedHardware.modbus_bus().err(),
            Some(HardwareError::NoModbusBus("simulated"))
        );
    }
}
