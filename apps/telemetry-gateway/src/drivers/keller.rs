use super::registers::{DataType, RegisterPoint};
use super::{jitter, DeviceLink};
use crate::node::{ReadError, Sensor};
use crate::units::{NativeUnit, PressureUnit, Quantity, TemperatureUnit};

pub const PRESSURE_P1: RegisterPoint = RegisterPoint {
    metric: "pressure_p1",
    register: 3,
    data_type: DataType::F32Be,
    scale: 1.0,
    unit: NativeUnit::Pressure(PressureUnit::Bar),
};

pub const TEMPERATURE_TOB1: RegisterPoint = RegisterPoint {
    metric: "temperature_tob1",
    register: 9,
    data_type: DataType::F32Be,
    scale: 1.0,
    unit: NativeUnit::Temperature(TemperatureUnit::Celsius),
};

pub struct KellerTransducer {
    link: DeviceLink,
}

impl KellerTransducer {
    pub fn new(link: DeviceLink) -> Self {
        Self { link }
    }

    pub async fn read_pressure(&self) -> Result<Quantity, ReadError> {
        self.link
            .read_point(&PRESSURE_P1, || jitter(1.8, 0.05))
            .await
    }

    pub async fn read_temperature(&self) -> Result<Quantity, ReadError> {
        self.link
            .read_point(&TEMPERATURE_TOB1, || jitter(12.0, 0.5))
            .await
    }
}

impl Sensor for KellerTransducer {
    fn kind(&self) -> &'static str {
        "keller"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::registers::testing::FakeBus;
    use std::sync::Arc;

    #[tokio::test]
    async fn bus_failure_surfaces_as_read_error() {
        let bus = Arc::new(FakeBus::default());
        bus.fail_next(1);
        let transducer = KellerTransducer::new(DeviceLink::modbus(bus.clone(), 1));
        let err = transducer.read_pressure().await.unwrap_err();
        assert!(err.is_timeout());

        bus.set_f32(1, PRESSURE_P1.address(), 2.5);
        assert_eq!(transducer.read_pressure().await.unwrap(), Quantity::bar(2.5));
    }
}
