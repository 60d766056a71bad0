use crate::current_loop::ConversionError;
use crate::ids::stable_hex_id;
use crate::units::{CanonicalReading, Dimension, NativeUnit, Quantity};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Device object a node reads from. Several nodes may share one sensor when they expose
/// different facets of the same physical device.
pub trait Sensor: Send + Sync {
    fn kind(&self) -> &'static str;
}

pub type SensorHandle = Arc<dyn Sensor>;

/// Value carried in snapshots, batches and cloud events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl TelemetryValue {
    /// Value equality used for change detection. Unlike `==`, NaN is equal to NaN so a stuck
    /// NaN reading is not re-sent every tick.
    pub fn same_as(&self, other: &TelemetryValue) -> bool {
        match (self, other) {
            (TelemetryValue::Number(a), TelemetryValue::Number(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (a, b) => a == b,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Number(value) => Some(*value),
            TelemetryValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            TelemetryValue::Text(_) => None,
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::Bool(value) => write!(f, "{value}"),
            TelemetryValue::Number(value) => write!(f, "{value}"),
            TelemetryValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<f64> for TelemetryValue {
    fn from(value: f64) -> Self {
        TelemetryValue::Number(value)
    }
}

impl From<bool> for TelemetryValue {
    fn from(value: bool) -> Self {
        TelemetryValue::Bool(value)
    }
}

impl From<&str> for TelemetryValue {
    fn from(value: &str) -> Self {
        TelemetryValue::Text(value.to_string())
    }
}

/// Result shape of one node read.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    Quantity(Quantity),
    /// Passed through to the snapshot verbatim.
    Value(TelemetryValue),
    /// Named sub-readings from one device transaction, in device order.
    Composite(Vec<(String, SensorReading)>),
}

impl SensorReading {
    pub fn composite<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, SensorReading)>,
        K: Into<String>,
    {
        SensorReading::Composite(
            entries
                .into_iter()
                .map(|(key, reading)| (key.into(), reading))
                .collect(),
        )
    }
}

impl From<Quantity> for SensorReading {
    fn from(value: Quantity) -> Self {
        SensorReading::Quantity(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    #[error("bus error: {0}")]
    Bus(#[from] std::io::Error),
    #[error("device error: {0}")]
    Device(String),
    #[error("reading is not a physical quantity")]
    NotAQuantity,
    #[error("expected a {expected} reading, got {actual}")]
    DimensionMismatch {
        expected: Dimension,
        actual: Dimension,
    },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl ReadError {
    /// Timeouts are routine on a shared RS-485 bus and are logged below warning level.
    pub fn is_timeout(&self) -> bool {
        match self {
            ReadError::Timeout(_) => true,
            ReadError::Bus(err) => err.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("sensing node name must not be empty")]
    EmptyName,
    #[error("sensing node '{name}' must have a period of at least one second")]
    NonPositivePeriod { name: String },
}

pub type ReadResult = Result<Option<SensorReading>, ReadError>;
pub type ReadFuture = BoxFuture<'static, ReadResult>;
pub type ReadFn = Arc<dyn Fn() -> ReadFuture + Send + Sync>;

/// Wraps an async closure as a node read function.
pub fn read_fn<F, Fut>(read: F) -> ReadFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ReadResult> + Send + 'static,
{
    Arc::new(move || read().boxed())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Plain,
    Unitized(Dimension),
}

pub struct SensingNode {
    name: String,
    id: String,
    sensor: SensorHandle,
    read: ReadFn,
    period_seconds: u64,
    kind: NodeKind,
    canonical_unit: OnceLock<NativeUnit>,
}

impl SensingNode {
    /// A node whose read may return any reading shape.
    pub fn new(
        name: impl Into<String>,
        sensor: SensorHandle,
        read: ReadFn,
        period: Duration,
    ) -> Result<Self, NodeError> {
        Self::build(name.into(), sensor, read, period, NodeKind::Plain)
    }

    /// A node that must yield a [`Quantity`] of `dimension` on every successful read.
    pub fn unitized(
        name: impl Into<String>,
        dimension: Dimension,
        sensor: SensorHandle,
        read: ReadFn,
        period: Duration,
    ) -> Result<Self, NodeError> {
        Self::build(name.into(), sensor, read, period, NodeKind::Unitized(dimension))
    }

    fn build(
        name: String,
        sensor: SensorHandle,
        read: ReadFn,
        period: Duration,
        kind: NodeKind,
    ) -> Result<Self, NodeError> {
        if name.trim().is_empty() {
            return Err(NodeError::EmptyName);
        }
        // sub-second periods truncate to zero and are rejected with it
        let period_seconds = period.as_secs();
        if period_seconds == 0 {
            return Err(NodeError::NonPositivePeriod { name });
        }
        let id = stable_hex_id(sensor.kind(), &name);
        Ok(Self {
            name,
            id,
            sensor,
            read,
            period_seconds,
            kind,
            canonical_unit: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sensor(&self) -> &SensorHandle {
        &self.sensor
    }

    pub fn period_seconds(&self) -> u64 {
        self.period_seconds
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn read(&self) -> ReadFuture {
        (self.read)()
    }

    /// Reads the node and canonicalizes a single quantity. The native unit of the first
    /// successful read is cached and never changes afterwards.
    pub async fn read_canonical(&self) -> Result<Option<CanonicalReading>, ReadError> {
        let Some(reading) = self.read().await? else {
            return Ok(None);
        };
        let SensorReading::Quantity(quantity) = reading else {
            return Err(ReadError::NotAQuantity);
        };
        if let NodeKind::Unitized(expected) = self.kind {
            let actual = quantity.dimension();
            if actual != expected {
                return Err(ReadError::DimensionMismatch { expected, actual });
            }
        }
        let canonical = quantity.canonical();
        self.canonical_unit.get_or_init(|| canonical.native_unit);
        Ok(Some(canonical))
    }

    pub fn canonical_unit(&self) -> Option<NativeUnit> {
        self.canonical_unit.get().copied()
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            name: self.name.clone(),
            id: self.id.clone(),
            sensor: self.sensor.kind(),
            period_seconds: self.period_seconds,
            dimension: match self.kind {
                NodeKind::Plain => None,
                NodeKind::Unitized(dimension) => Some(dimension),
            },
            native_unit: self.canonical_unit().map(|unit| unit.to_string()),
        }
    }
}

impl fmt::Debug for SensingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensingNode")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("sensor", &self.sensor.kind())
            .field("period_seconds", &self.period_seconds)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub id: String,
    pub sensor: &'static str,
    pub period_seconds: u64,
    pub dimension: Option<Dimension>,
    pub native_unit: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::TemperatureUnit;

    struct Probe;

    impl Sensor for Probe {
        fn kind(&self) -> &'static str {
            "probe"
        }
    }

    fn fixed(reading: SensorReading) -> ReadFn {
        read_fn(move || {
            let reading = reading.clone();
            async move { Ok(Some(reading)) }
        })
    }

    #[test]
    fn rejects_zero_and_sub_second_periods() {
        for period in [Duration::ZERO, Duration::from_millis(900)] {
            let err = SensingNode::new(
                "Tank.Level",
                Arc::new(Probe),
                fixed(Quantity::Scalar(1.0).into()),
                period,
            )
            .unwrap_err();
            assert_eq!(
                err,
                NodeError::NonPositivePeriod {
                    name: "Tank.Level".to_string()
                }
            );
        }
    }

    #[test]
    fn truncates_period_to_whole_seconds() {
        let node = SensingNode::new(
            "Tank.Level",
            Arc::new(Probe),
            fixed(Quantity::Scalar(1.0).into()),
            Duration::from_millis(2_700),
        )
        .unwrap();
        assert_eq!(node.period_seconds(), 2);
    }

    #[test]
    fn rejects_blank_name() {
        let err = SensingNode::new(
            "  ",
            Arc::new(Probe),
            fixed(Quantity::Scalar(1.0).into()),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert_eq!(err, NodeError::EmptyName);
    }

    #[test]
    fn id_is_stable_for_sensor_kind_and_name() {
        let make = || {
            SensingNode::new(
                "Pump1.Run",
                Arc::new(Probe),
                fixed(Quantity::Scalar(1.0).into()),
                Duration::from_secs(5),
            )
            .unwrap()
        };
        assert_eq!(make().id(), make().id());
        assert_eq!(make().id(), stable_hex_id("probe", "Pump1.Run"));
    }

    #[tokio::test]
    async fn read_canonical_caches_native_unit() {
        let node = SensingNode::unitized(
            "Boiler.Temp",
            Dimension::Temperature,
            Arc::new(Probe),
            fixed(Quantity::Temperature(212.0, TemperatureUnit::Fahrenheit).into()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(node.canonical_unit(), None);
        let reading = node.read_canonical().await.unwrap().unwrap();
        assert!((reading.value - 100.0).abs() < 1e-9);
        assert_eq!(
            node.canonical_unit(),
            Some(NativeUnit::Temperature(TemperatureUnit::Fahrenheit))
        );
    }

    #[tokio::test]
    async fn read_canonical_rejects_wrong_dimension() {
        let node = SensingNode::unitized(
            "Boiler.Temp",
            Dimension::Temperature,
            Arc::new(Probe),
            fixed(Quantity::volts(3.3).into()),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = node.read_canonical().await.unwrap_err();
        assert!(matches!(
            err,
            ReadError::DimensionMismatch {
                expected: Dimension::Temperature,
                actual: Dimension::Voltage
            }
        ));
        assert_eq!(node.canonical_unit(), None);
    }

    #[test]
    fn nan_values_compare_equal_for_change_detection() {
        assert!(TelemetryValue::Number(f64::NAN).same_as(&TelemetryValue::Number(f64::NAN)));
        assert!(!TelemetryValue::Number(1.0).same_as(&TelemetryValue::Number(1.5)));
        assert!(!TelemetryValue::Number(1.0).same_as(&TelemetryValue::Bool(true)));
    }
}
