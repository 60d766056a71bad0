//! Physical quantities reported by field sensors and their canonical form.
//!
//! Every dimension has exactly one canonical sub-unit. Stored and forwarded telemetry is always
//! the canonical magnitude; the unit a device natively reported is kept alongside it for
//! diagnostics only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Temperature,
    Voltage,
    Current,
    Frequency,
    Pressure,
    Scalar,
    Conductivity,
    ConcentrationInWater,
    Length,
    Turbidity,
    PotentialHydrogen,
    VolumetricFlow,
    Power,
}

impl Dimension {
    pub const ALL: [Dimension; 13] = [
        Dimension::Temperature,
        Dimension::Voltage,
        Dimension::Current,
        Dimension::Frequency,
        Dimension::Pressure,
        Dimension::Scalar,
        Dimension::Conductivity,
        Dimension::ConcentrationInWater,
        Dimension::Length,
        Dimension::Turbidity,
        Dimension::PotentialHydrogen,
        Dimension::VolumetricFlow,
        Dimension::Power,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Temperature => "Temperature",
            Dimension::Voltage => "Voltage",
            Dimension::Current => "Current",
            Dimension::Frequency => "Frequency",
            Dimension::Pressure => "Pressure",
            Dimension::Scalar => "Scalar",
            Dimension::Conductivity => "Conductivity",
            Dimension::ConcentrationInWater => "ConcentrationInWater",
            Dimension::Length => "Length",
            Dimension::Turbidity => "Turbidity",
            Dimension::PotentialHydrogen => "PotentialHydrogen",
            Dimension::VolumetricFlow => "VolumetricFlow",
            Dimension::Power => "Power",
        }
    }

    pub fn canonical_unit(self) -> NativeUnit {
        match self {
            Dimension::Temperature => NativeUnit::Temperature(TemperatureUnit::CANONICAL),
            Dimension::Voltage => NativeUnit::Voltage(VoltageUnit::CANONICAL),
            Dimension::Current => NativeUnit::Current(CurrentUnit::CANONICAL),
            Dimension::Frequency => NativeUnit::Frequency(FrequencyUnit::CANONICAL),
            Dimension::Pressure => NativeUnit::Pressure(PressureUnit::CANONICAL),
            Dimension::Scalar => NativeUnit::Scalar,
            Dimension::Conductivity => NativeUnit::Conductivity(ConductivityUnit::CANONICAL),
            Dimension::ConcentrationInWater => {
                NativeUnit::ConcentrationInWater(ConcentrationUnit::CANONICAL)
            }
            Dimension::Length => NativeUnit::Length(LengthUnit::CANONICAL),
            Dimension::Turbidity => NativeUnit::Turbidity(TurbidityUnit::CANONICAL),
            Dimension::PotentialHydrogen => NativeUnit::PotentialHydrogen,
            Dimension::VolumetricFlow => NativeUnit::VolumetricFlow(VolumetricFlowUnit::CANONICAL),
            Dimension::Power => NativeUnit::Power(PowerUnit::CANONICAL),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown unit type '{0}'")]
pub struct UnknownDimension(pub String);

impl FromStr for Dimension {
    type Err = UnknownDimension;

    /// Accepts the dimension names used in channel configuration, case-insensitively, plus the
    /// short `ph` alias.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("ph") {
            return Ok(Dimension::PotentialHydrogen);
        }
        Dimension::ALL
            .into_iter()
            .find(|dimension| dimension.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownDimension(trimmed.to_string()))
    }
}

// Each sub-unit converts to the canonical unit as `value * factor + offset`.
macro_rules! linear_units {
    (
        $(#[$meta:meta])*
        $name:ident, canonical = $canonical:ident {
            $($variant:ident => ($symbol:expr, $factor:expr, $offset:expr)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const CANONICAL: Self = Self::$canonical;

            pub fn symbol(self) -> &'static str {
                match self {
                    $(Self::$variant => $symbol),+
                }
            }

            pub fn to_canonical(self, value: f64) -> f64 {
                match self {
                    $(Self::$variant => value * $factor + $offset),+
                }
            }

            pub fn from_canonical(self, value: f64) -> f64 {
                match self {
                    $(Self::$variant => (value - $offset) / $factor),+
                }
            }
        }
    };
}

linear_units! {
    /// Canonical: degrees Celsius.
    TemperatureUnit, canonical = Celsius {
        Celsius => ("°C", 1.0, 0.0),
        Fahrenheit => ("°F", 5.0 / 9.0, -160.0 / 9.0),
        Kelvin => ("K", 1.0, -273.15),
    }
}

linear_units! {
    VoltageUnit, canonical = Volts {
        Volts => ("V", 1.0, 0.0),
        Millivolts => ("mV", 1e-3, 0.0),
        Kilovolts => ("kV", 1e3, 0.0),
    }
}

linear_units! {
    CurrentUnit, canonical = Amps {
        Amps => ("A", 1.0, 0.0),
        Milliamps => ("mA", 1e-3, 0.0),
        Microamps => ("µA", 1e-6, 0.0),
    }
}

linear_units! {
    FrequencyUnit, canonical = Hertz {
        Hertz => ("Hz", 1.0, 0.0),
        Kilohertz => ("kHz", 1e3, 0.0),
        Megahertz => ("MHz", 1e6, 0.0),
    }
}

linear_units! {
    /// Canonical: bar.
    PressureUnit, canonical = Bar {
        Bar => ("bar", 1.0, 0.0),
        Millibar => ("mbar", 1e-3, 0.0),
        Pascal => ("Pa", 1e-5, 0.0),
        Kilopascal => ("kPa", 1e-2, 0.0),
        Psi => ("psi", 0.068_947_572_9, 0.0),
        Atmosphere => ("atm", 1.013_25, 0.0),
    }
}

linear_units! {
    /// Canonical: microsiemens per centimetre.
    ConductivityUnit, canonical = MicrosiemensPerCentimeter {
        MicrosiemensPerCentimeter => ("µS/cm", 1.0, 0.0),
        MillisiemensPerCentimeter => ("mS/cm", 1e3, 0.0),
        SiemensPerMeter => ("S/m", 1e4, 0.0),
    }
}

linear_units! {
    /// Canonical: milligrams per litre (1 ppm in water).
    ConcentrationUnit, canonical = MilligramsPerLiter {
        MilligramsPerLiter => ("mg/L", 1.0, 0.0),
        PartsPerMillion => ("ppm", 1.0, 0.0),
        MicrogramsPerLiter => ("µg/L", 1e-3, 0.0),
        PartsPerBillion => ("ppb", 1e-3, 0.0),
        GramsPerLiter => ("g/L", 1e3, 0.0),
    }
}

linear_units! {
    LengthUnit, canonical = Meters {
        Meters => ("m", 1.0, 0.0),
        Centimeters => ("cm", 1e-2, 0.0),
        Millimeters => ("mm", 1e-3, 0.0),
        Feet => ("ft", 0.3048, 0.0),
        Inches => ("in", 0.0254, 0.0),
    }
}

linear_units! {
    TurbidityUnit, canonical = Ntu {
        Ntu => ("NTU", 1.0, 0.0),
        Fnu => ("FNU", 1.0, 0.0),
    }
}

linear_units! {
    /// Canonical: litres per minute.
    VolumetricFlowUnit, canonical = LitersPerMinute {
        LitersPerMinute => ("L/min", 1.0, 0.0),
        LitersPerSecond => ("L/s", 60.0, 0.0),
        CubicMetersPerHour => ("m³/h", 1000.0 / 60.0, 0.0),
        GallonsPerMinute => ("gal/min", 3.785_411_784, 0.0),
    }
}

linear_units! {
    PowerUnit, canonical = Watts {
        Watts => ("W", 1.0, 0.0),
        Milliwatts => ("mW", 1e-3, 0.0),
        Kilowatts => ("kW", 1e3, 0.0),
    }
}

/// The concrete sub-unit a device reported a reading in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeUnit {
    Temperature(TemperatureUnit),
    Voltage(VoltageUnit),
    Current(CurrentUnit),
    Frequency(FrequencyUnit),
    Pressure(PressureUnit),
    Scalar,
    Conductivity(ConductivityUnit),
    ConcentrationInWater(ConcentrationUnit),
    Length(LengthUnit),
    Turbidity(TurbidityUnit),
    PotentialHydrogen,
    VolumetricFlow(VolumetricFlowUnit),
    Power(PowerUnit),
}

impl NativeUnit {
    pub fn dimension(self) -> Dimension {
        match self {
            NativeUnit::Temperature(_) => Dimension::Temperature,
            NativeUnit::Voltage(_) => Dimension::Voltage,
            NativeUnit::Current(_) => Dimension::Current,
            NativeUnit::Frequency(_) => Dimension::Frequency,
            NativeUnit::Pressure(_) => Dimension::Pressure,
            NativeUnit::Scalar => Dimension::Scalar,
            NativeUnit::Conductivity(_) => Dimension::Conductivity,
            NativeUnit::ConcentrationInWater(_) => Dimension::ConcentrationInWater,
            NativeUnit::Length(_) => Dimension::Length,
            NativeUnit::Turbidity(_) => Dimension::Turbidity,
            NativeUnit::PotentialHydrogen => Dimension::PotentialHydrogen,
            NativeUnit::VolumetricFlow(_) => Dimension::VolumetricFlow,
            NativeUnit::Power(_) => Dimension::Power,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            NativeUnit::Temperature(unit) => unit.symbol(),
            NativeUnit::Voltage(unit) => unit.symbol(),
            NativeUnit::Current(unit) => unit.symbol(),
            NativeUnit::Frequency(unit) => unit.symbol(),
            NativeUnit::Pressure(unit) => unit.symbol(),
            NativeUnit::Scalar => "",
            NativeUnit::Conductivity(unit) => unit.symbol(),
            NativeUnit::ConcentrationInWater(unit) => unit.symbol(),
            NativeUnit::Length(unit) => unit.symbol(),
            NativeUnit::Turbidity(unit) => unit.symbol(),
            NativeUnit::PotentialHydrogen => "pH",
            NativeUnit::VolumetricFlow(unit) => unit.symbol(),
            NativeUnit::Power(unit) => unit.symbol(),
        }
    }

    pub fn to_canonical(self, value: f64) -> f64 {
        match self {
            NativeUnit::Temperature(unit) => unit.to_canonical(value),
            NativeUnit::Voltage(unit) => unit.to_canonical(value),
            NativeUnit::Current(unit) => unit.to_canonical(value),
            NativeUnit::Frequency(unit) => unit.to_canonical(value),
            NativeUnit::Pressure(unit) => unit.to_canonical(value),
            NativeUnit::Scalar | NativeUnit::PotentialHydrogen => value,
            NativeUnit::Conductivity(unit) => unit.to_canonical(value),
            NativeUnit::ConcentrationInWater(unit) => unit.to_canonical(value),
            NativeUnit::Length(unit) => unit.to_canonical(value),
            NativeUnit::Turbidity(unit) => unit.to_canonical(value),
            NativeUnit::VolumetricFlow(unit) => unit.to_canonical(value),
            NativeUnit::Power(unit) => unit.to_canonical(value),
        }
    }

    /// A quantity of `value` expressed in this unit.
    pub fn quantity(self, value: f64) -> Quantity {
        match self {
            NativeUnit::Temperature(unit) => Quantity::Temperature(value, unit),
            NativeUnit::Voltage(unit) => Quantity::Voltage(value, unit),
            NativeUnit::Current(unit) => Quantity::Current(value, unit),
            NativeUnit::Frequency(unit) => Quantity::Frequency(value, unit),
            NativeUnit::Pressure(unit) => Quantity::Pressure(value, unit),
            NativeUnit::Scalar => Quantity::Scalar(value),
            NativeUnit::Conductivity(unit) => Quantity::Conductivity(value, unit),
            NativeUnit::ConcentrationInWater(unit) => Quantity::ConcentrationInWater(value, unit),
            NativeUnit::Length(unit) => Quantity::Length(value, unit),
            NativeUnit::Turbidity(unit) => Quantity::Turbidity(value, unit),
            NativeUnit::PotentialHydrogen => Quantity::PotentialHydrogen(value),
            NativeUnit::VolumetricFlow(unit) => Quantity::VolumetricFlow(value, unit),
            NativeUnit::Power(unit) => Quantity::Power(value, unit),
        }
    }
}

impl fmt::Display for NativeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeUnit::Scalar => f.write_str("scalar"),
            other => f.write_str(other.symbol()),
        }
    }
}

/// A physical reading as a device reported it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Temperature(f64, TemperatureUnit),
    Voltage(f64, VoltageUnit),
    Current(f64, CurrentUnit),
    Frequency(f64, FrequencyUnit),
    Pressure(f64, PressureUnit),
    Scalar(f64),
    Conductivity(f64, ConductivityUnit),
    ConcentrationInWater(f64, ConcentrationUnit),
    Length(f64, LengthUnit),
    Turbidity(f64, TurbidityUnit),
    PotentialHydrogen(f64),
    VolumetricFlow(f64, VolumetricFlowUnit),
    Power(f64, PowerUnit),
}

impl Quantity {
    pub fn celsius(value: f64) -> Self {
        Quantity::Temperature(value, TemperatureUnit::Celsius)
    }

    pub fn volts(value: f64) -> Self {
        Quantity::Voltage(value, VoltageUnit::Volts)
    }

    pub fn amps(value: f64) -> Self {
        Quantity::Current(value, CurrentUnit::Amps)
    }

    pub fn milliamps(value: f64) -> Self {
        Quantity::Current(value, CurrentUnit::Milliamps)
    }

    pub fn hertz(value: f64) -> Self {
        Quantity::Frequency(value, FrequencyUnit::Hertz)
    }

    pub fn bar(value: f64) -> Self {
        Quantity::Pressure(value, PressureUnit::Bar)
    }

    /// Builds a quantity whose magnitude is already expressed in the canonical unit of
    /// `dimension`.
    pub fn from_canonical(dimension: Dimension, value: f64) -> Self {
        dimension.canonical_unit().quantity(value)
    }

    pub fn magnitude(&self) -> f64 {
        match *self {
            Quantity::Temperature(value, _)
            | Quantity::Voltage(value, _)
            | Quantity::Current(value, _)
            | Quantity::Frequency(value, _)
            | Quantity::Pressure(value, _)
            | Quantity::Scalar(value)
            | Quantity::Conductivity(value, _)
            | Quantity::ConcentrationInWater(value, _)
            | Quantity::Length(value, _)
            | Quantity::Turbidity(value, _)
            | Quantity::PotentialHydrogen(value)
            | Quantity::VolumetricFlow(value, _)
            | Quantity::Power(value, _) => value,
        }
    }

    pub fn native_unit(&self) -> NativeUnit {
        match *self {
            Quantity::Temperature(_, unit) => NativeUnit::Temperature(unit),
            Quantity::Voltage(_, unit) => NativeUnit::Voltage(unit),
            Quantity::Current(_, unit) => NativeUnit::Current(unit),
            Quantity::Frequency(_, unit) => NativeUnit::Frequency(unit),
            Quantity::Pressure(_, unit) => NativeUnit::Pressure(unit),
            Quantity::Scalar(_) => NativeUnit::Scalar,
            Quantity::Conductivity(_, unit) => NativeUnit::Conductivity(unit),
            Quantity::ConcentrationInWater(_, unit) => NativeUnit::ConcentrationInWater(unit),
            Quantity::Length(_, unit) => NativeUnit::Length(unit),
            Quantity::Turbidity(_, unit) => NativeUnit::Turbidity(unit),
            Quantity::PotentialHydrogen(_) => NativeUnit::PotentialHydrogen,
            Quantity::VolumetricFlow(_, unit) => NativeUnit::VolumetricFlow(unit),
            Quantity::Power(_, unit) => NativeUnit::Power(unit),
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.native_unit().dimension()
    }

    /// Magnitude expressed in the canonical unit of this quantity's dimension.
    pub fn to_canonical(&self) -> f64 {
        self.native_unit().to_canonical(self.magnitude())
    }

    pub fn canonical(&self) -> CanonicalReading {
        CanonicalReading {
            dimension: self.dimension(),
            value: self.to_canonical(),
            native_unit: self.native_unit(),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.native_unit() {
            NativeUnit::Scalar => write!(f, "{}", self.magnitude()),
            NativeUnit::PotentialHydrogen => write!(f, "pH {}", self.magnitude()),
            unit => write!(f, "{} {}", self.magnitude(), unit.symbol()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CanonicalReading {
    pub dimension: Dimension,
    pub value: f64,
    pub native_unit: NativeUnit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn temperatures_convert_to_celsius() {
        let boiling = Quantity::Temperature(212.0, TemperatureUnit::Fahrenheit);
        let freezing = Quantity::Temperature(32.0, TemperatureUnit::Fahrenheit);
        assert!(close(boiling.to_canonical(), 100.0));
        assert!(close(freezing.to_canonical(), 0.0));
        assert!(close(Quantity::Temperature(273.15, TemperatureUnit::Kelvin).to_canonical(), 0.0));
        assert!(close(Quantity::celsius(21.5).to_canonical(), 21.5));
    }

    #[test]
    fn canonical_reading_keeps_native_unit() {
        let reading = Quantity::Current(1500.0, CurrentUnit::Milliamps).canonical();
        assert_eq!(reading.dimension, Dimension::Current);
        assert!(close(reading.value, 1.5));
        assert_eq!(reading.native_unit, NativeUnit::Current(CurrentUnit::Milliamps));
    }

    #[test]
    fn canonicalization_is_deterministic() {
        let samples = [
            Quantity::Temperature(98.6, TemperatureUnit::Fahrenheit),
            Quantity::Pressure(14.7, PressureUnit::Psi),
            Quantity::VolumetricFlow(3.0, VolumetricFlowUnit::GallonsPerMinute),
            Quantity::Conductivity(1.2, ConductivityUnit::MillisiemensPerCentimeter),
        ];
        for sample in samples {
            let first = sample.to_canonical();
            for _ in 0..100 {
                assert_eq!(sample.to_canonical().to_bits(), first.to_bits());
            }
            let rebuilt = Quantity::from_canonical(sample.dimension(), first);
            assert_eq!(rebuilt.to_canonical().to_bits(), first.to_bits());
        }
    }

    #[test]
    fn unit_round_trips_through_canonical() {
        let unit = TemperatureUnit::Fahrenheit;
        let canonical = unit.to_canonical(-40.0);
        assert!(close(canonical, -40.0));
        assert!(close(unit.from_canonical(canonical), -40.0));
        assert!(close(PressureUnit::Kilopascal.from_canonical(1.0), 100.0));
    }

    #[test]
    fn dimension_parses_config_names() {
        assert_eq!("temperature".parse::<Dimension>(), Ok(Dimension::Temperature));
        assert_eq!("Pressure".parse::<Dimension>(), Ok(Dimension::Pressure));
        assert_eq!("pH".parse::<Dimension>(), Ok(Dimension::PotentialHydrogen));
        assert!("furlongs".parse::<Dimension>().is_err());
    }

    #[test]
    fn every_dimension_has_matching_canonical_unit() {
        for dimension in Dimension::ALL {
            assert_eq!(dimension.canonical_unit().dimension(), dimension);
            assert_eq!(Quantity::from_canonical(dimension, 2.0).dimension(), dimension);
        }
    }
}
