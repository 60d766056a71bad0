use crate::units::{Dimension, Quantity};
use serde::{Deserialize, Serialize};

pub const UNDERCURRENT_LIMIT_MA: f64 = 3.9;
pub const OVERCURRENT_LIMIT_MA: f64 = 20.1;

/// Channel configuration names as they appear in the field documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelInputType {
    #[serde(rename = "Current_4_20")]
    Current4To20,
    #[serde(rename = "Current_0_20")]
    Current0To20,
    #[serde(rename = "Voltage_0_10")]
    Voltage0To10,
    Count,
    DiscreteInput,
}

impl ChannelInputType {
    pub fn loop_range(self) -> Option<LoopRange> {
        match self {
            ChannelInputType::Current4To20 => Some(LoopRange::FourToTwenty),
            ChannelInputType::Current0To20 => Some(LoopRange::ZeroToTwenty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRange {
    FourToTwenty,
    ZeroToTwenty,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTransform {
    pub scale: f64,
    pub offset: f64,
    pub target: Dimension,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("undercurrent condition ({0:.3} mA); check the sensor and wiring")]
    Undercurrent(f64),
    #[error("overcurrent condition ({0:.3} mA); check the sensor and wiring")]
    Overcurrent(f64),
    #[error("loop current is not a finite number")]
    NotFinite,
}

/// Converts a measured loop current into the channel's target quantity as
/// `mA * scale + offset`, in the canonical unit of the target dimension.
///
/// A 4-20 mA loop reading below [`UNDERCURRENT_LIMIT_MA`] means a broken loop; any reading above
/// [`OVERCURRENT_LIMIT_MA`] is out of range for both loop types.
pub fn convert(
    current: Quantity,
    range: LoopRange,
    transform: &LoopTransform,
) -> Result<Quantity, ConversionError> {
    let milliamps = current.to_canonical() * 1000.0;
    if !milliamps.is_finite() {
        return Err(ConversionError::NotFinite);
    }
    if range == LoopRange::FourToTwenty && milliamps < UNDERCURRENT_LIMIT_MA {
        return Err(ConversionError::Undercurrent(milliamps));
    }
    if milliamps > OVERCURRENT_LIMIT_MA {
        return Err(ConversionError::Overcurrent(milliamps));
    }
    let value = milliamps * transform.scale + transform.offset;
    Ok(Quantity::from_canonical(transform.target, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature_transform() -> LoopTransform {
        // 4 mA -> 0 °C, 20 mA -> 100 °C
        LoopTransform {
            scale: 6.25,
            offset: -25.0,
            target: Dimension::Temperature,
        }
    }

    #[test]
    fn scales_milliamps_into_target_dimension() {
        let transform = temperature_transform();
        let low = convert(Quantity::milliamps(4.0), LoopRange::FourToTwenty, &transform).unwrap();
        let high = convert(Quantity::milliamps(20.0), LoopRange::FourToTwenty, &transform).unwrap();
        assert_eq!(low.dimension(), Dimension::Temperature);
        assert!((low.to_canonical() - 0.0).abs() < 1e-9);
        assert!((high.to_canonical() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn accepts_current_in_any_sub_unit() {
        let transform = LoopTransform {
            scale: 1.0,
            offset: 0.0,
            target: Dimension::Pressure,
        };
        let reading = convert(Quantity::amps(0.012), LoopRange::FourToTwenty, &transform).unwrap();
        assert_eq!(reading.dimension(), Dimension::Pressure);
        assert!((reading.to_canonical() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn four_to_twenty_rejects_broken_loop() {
        let err = convert(
            Quantity::milliamps(1.0),
            LoopRange::FourToTwenty,
            &temperature_transform(),
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::Undercurrent(_)));
    }

    #[test]
    fn zero_to_twenty_allows_low_current() {
        let reading =
            convert(Quantity::milliamps(0.0), LoopRange::ZeroToTwenty, &temperature_transform());
        assert!(reading.is_ok());
    }

    #[test]
    fn overcurrent_rejected_for_both_ranges() {
        for range in [LoopRange::FourToTwenty, LoopRange::ZeroToTwenty] {
            let err =
                convert(Quantity::milliamps(22.0), range, &temperature_transform()).unwrap_err();
            assert!(matches!(err, ConversionError::Overcurrent(_)));
        }
    }

    #[test]
    fn channel_types_parse_from_config_names() {
        let parsed: ChannelInputType = serde_json::from_str("\"Current_4_20\"").unwrap();
        assert_eq!(parsed.loop_range(), Some(LoopRange::FourToTwenty));
        let parsed: ChannelInputType = serde_json::from_str("\"Voltage_0_10\"").unwrap();
        assert_eq!(parsed.loop_range(), None);
    }
}
