pub mod flow;
pub mod keller;
pub mod registers;
pub mod spm1x;
pub mod t322i;
pub mod xdrive;

use crate::hardware::SharedModbusBus;
use crate::node::ReadError;
use crate::units::Quantity;
use registers::RegisterPoint;

/// Where a driver's readings come from.
#[derive(Clone)]
pub enum DeviceLink {
    Simulated,
    Modbus { bus: SharedModbusBus, unit: u8 },
}

impl DeviceLink {
    pub fn modbus(bus: SharedModbusBus, unit: u8) -> Self {
        DeviceLink::Modbus { bus, unit }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, DeviceLink::Simulated)
    }

    /// Reads `point` from the device, or returns `simulate()` in the point's unit when the link
    /// is simulated.
    pub async fn read_point<F>(
        &self,
        point: &RegisterPoint,
        simulate: F,
    ) -> Result<Quantity, ReadError>
    where
        F: FnOnce() -> f64,
    {
        let value = match self {
            DeviceLink::Simulated => simulate(),
            DeviceLink::Modbus { bus, unit } => {
                registers::read_point(bus.as_ref(), *unit, point).await?
            }
        };
        Ok(point.unit.quantity(value))
    }
}

/// Uniform jitter around `center`.
pub(crate) fn jitter(center: f64, spread: f64) -> f64 {
    use rand::Rng;
    center + rand::thread_rng().gen_range(-spread..=spread)
}
