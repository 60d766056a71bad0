use super::registers::{DataType, RegisterPoint};
use super::{jitter, DeviceLink};
use crate::node::{ReadError, Sensor};
use crate::units::{
    CurrentUnit, FrequencyUnit, NativeUnit, Quantity, TemperatureUnit, VoltageUnit,
};

pub const OUTPUT_FREQUENCY: RegisterPoint = RegisterPoint {
    metric: "output_frequency",
    register: 0x2104,
    data_type: DataType::U16,
    scale: 0.01,
    unit: NativeUnit::Frequency(FrequencyUnit::Hertz),
};

pub const OUTPUT_CURRENT: RegisterPoint = RegisterPoint {
    metric: "output_current",
    register: 0x2105,
    data_type: DataType::U16,
    scale: 0.1,
    unit: NativeUnit::Current(CurrentUnit::Amps),
};

pub const DC_BUS_VOLTAGE: RegisterPoint = RegisterPoint {
    metric: "dc_bus_voltage",
    register: 0x2106,
    data_type: DataType::U16,
    scale: 0.1,
    unit: NativeUnit::Voltage(VoltageUnit::Volts),
};

pub const OUTPUT_VOLTAGE: RegisterPoint = RegisterPoint {
    metric: "output_voltage",
    register: 0x2107,
    data_type: DataType::U16,
    scale: 0.1,
    unit: NativeUnit::Voltage(VoltageUnit::Volts),
};

pub const AMBIENT_TEMPERATURE: RegisterPoint = RegisterPoint {
    metric: "ambient_temperature",
    register: 0x210D,
    data_type: DataType::I16,
    scale: 0.1,
    unit: NativeUnit::Temperature(TemperatureUnit::Celsius),
};

/// Values the drive reports in one poll, in the order they are read.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveStatus {
    pub output_current: Quantity,
    pub ambient_temperature: Quantity,
    pub dc_bus_voltage: Quantity,
    pub output_frequency: Quantity,
    pub output_voltage: Quantity,
}

pub struct CerusXDrive {
    link: DeviceLink,
}

impl CerusXDrive {
    pub fn new(link: DeviceLink) -> Self {
        Self { link }
    }

    pub async fn read_status(&self) -> Result<DriveStatus, ReadError> {
        Ok(DriveStatus {
            output_current: self
                .link
                .read_point(&OUTPUT_CURRENT, || jitter(11.0, 0.6))
                .await?,
            ambient_temperature: self
                .link
                .read_point(&AMBIENT_TEMPERATURE, || jitter(31.0, 1.0))
                .await?,
            dc_bus_voltage: self
                .link
                .read_point(&DC_BUS_VOLTAGE, || jitter(325.0, 3.0))
                .await?,
            output_frequency: self
                .link
                .read_point(&OUTPUT_FREQUENCY, || jitter(58.0, 1.5))
                .await?,
            output_voltage: self
                .link
                .read_point(&OUTPUT_VOLTAGE, || jitter(228.0, 2.0))
                .await?,
        })
    }
}

impl Sensor for CerusXDrive {
    fn kind(&self) -> &'static str {
        "cerusxdrive"
    }
}
