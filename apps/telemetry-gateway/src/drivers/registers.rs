use crate::hardware::ModbusBus;
use crate::units::NativeUnit;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U16,
    I16,
    U32,
    I32,
    /// IEEE-754 single, high word first.
    F32Be,
}

impl DataType {
    pub fn register_count(self) -> u16 {
        match self {
            DataType::U16 | DataType::I16 => 1,
            DataType::U32 | DataType::I32 | DataType::F32Be => 2,
        }
    }

    pub fn decode(self, words: &[u16]) -> Option<f64> {
        match self {
            DataType::U16 => words.first().map(|raw| *raw as f64),
            DataType::I16 => words
                .first()
                .map(|raw| i16::from_be_bytes(raw.to_be_bytes()) as f64),
            DataType::U32 | DataType::I32 | DataType::F32Be => {
                let (hi, lo) = (*words.first()?, *words.get(1)?);
                let combined = ((hi as u32) << 16) | (lo as u32);
                Some(match self {
                    DataType::U32 => combined as f64,
                    DataType::I32 => i32::from_be_bytes(combined.to_be_bytes()) as f64,
                    _ => f32::from_bits(combined) as f64,
                })
            }
        }
    }
}

/// One entry in a driver's register map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterPoint {
    pub metric: &'static str,
    /// One-based register number as printed in device manuals.
    pub register: u16,
    pub data_type: DataType,
    pub scale: f64,
    pub unit: NativeUnit,
}

impl RegisterPoint {
    pub fn address(&self) -> u16 {
        self.register.saturating_sub(1)
    }
}

/// Reads and decodes one point, applying its scale.
pub async fn read_point(bus: &dyn ModbusBus, unit: u8, point: &RegisterPoint) -> io::Result<f64> {
    let count = point.data_type.register_count();
    let words = bus
        .read_holding_registers(unit, point.address(), count)
        .await?;
    let raw = point.data_type.decode(&words).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "unit {unit} returned {} registers for {} (expected {count})",
                words.len(),
                point.metric
            ),
        )
    })?;
    Ok(raw * point.scale)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBus;
    use super::*;
    use crate::units::{NativeUnit, VoltageUnit};

    #[test]
    fn decodes_each_data_type() {
        assert_eq!(DataType::U16.decode(&[0xFFFF]), Some(65535.0));
        assert_eq!(DataType::I16.decode(&[0xFFFE]), Some(-2.0));
        assert_eq!(DataType::U32.decode(&[0x0001, 0x0000]), Some(65536.0));
        assert_eq!(DataType::I32.decode(&[0xFFFF, 0xFFFF]), Some(-1.0));
        let bits = 1.5f32.to_bits();
        assert_eq!(
            DataType::F32Be.decode(&[(bits >> 16) as u16, bits as u16]),
            Some(1.5)
        );
        assert_eq!(DataType::U32.decode(&[1]), None);
    }

    #[tokio::test]
    async fn read_point_scales_and_uses_zero_based_address() {
        let bus = FakeBus::default();
        bus.set(3, 9, &[1234]);
        let point = RegisterPoint {
            metric: "voltage",
            register: 10,
            data_type: DataType::U16,
            scale: 0.1,
            unit: NativeUnit::Voltage(VoltageUnit::Volts),
        };
        let value = read_point(&bus, 3, &point).await.unwrap();
        assert!((value - 123.4).abs() < 1e-9);
        assert_eq!(bus.reads.lock().unwrap()[0], (3, 9, 1));
    }
}
