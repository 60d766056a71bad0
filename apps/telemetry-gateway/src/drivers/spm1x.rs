use super::registers::{DataType, RegisterPoint};
use super::{jitter, DeviceLink};
use crate::node::{ReadError, Sensor};
use crate::units::{CurrentUnit, NativeUnit, Quantity, VoltageUnit};

pub const VOLTAGE: RegisterPoint = RegisterPoint {
    metric: "voltage",
    register: 1,
    data_type: DataType::F32Be,
    scale: 1.0,
    unit: NativeUnit::Voltage(VoltageUnit::Volts),
};

pub const CURRENT: RegisterPoint = RegisterPoint {
    metric: "current",
    register: 7,
    data_type: DataType::F32Be,
    scale: 1.0,
    unit: NativeUnit::Current(CurrentUnit::Amps),
};

pub struct Spm1x {
    link: DeviceLink,
}

impl Spm1x {
    pub fn new(link: DeviceLink) -> Self {
        Self { link }
    }

    pub async fn read_current(&self) -> Result<Quantity, ReadError> {
        self.link.read_point(&CURRENT, || jitter(5.2, 0.4)).await
    }

    pub async fn read_voltage(&self) -> Result<Quantity, ReadError> {
        self.link.read_point(&VOLTAGE, || jitter(120.0, 1.5)).await
    }
}

impl Sensor for Spm1x {
    fn kind(&self) -> &'static str {
        "spm1x"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::registers::testing::FakeBus;
    use crate::units::Dimension;
    use std::sync::Arc;

    #[tokio::test]
    async fn reads_float_registers() {
        let bus = Arc::new(FakeBus::default());
        bus.set_f32(4, VOLTAGE.address(), 231.5);
        bus.set_f32(4, CURRENT.address(), 2.25);
        let meter = Spm1x::new(DeviceLink::modbus(bus, 4));

        let voltage = meter.read_voltage().await.unwrap();
        assert_eq!(voltage.dimension(), Dimension::Voltage);
        assert_eq!(voltage.magnitude(), 231.5);
        assert_eq!(meter.read_current().await.unwrap().magnitude(), 2.25);
    }

    #[tokio::test]
    async fn simulated_meter_reports_plausible_values() {
        let meter = Spm1x::new(DeviceLink::Simulated);
        let voltage = meter.read_voltage().await.unwrap().to_canonical();
        assert!((118.0..=122.0).contains(&voltage));
    }
}
