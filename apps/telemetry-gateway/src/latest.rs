use crate::node::TelemetryValue;
use crate::scheduler::{TelemetrySink, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestValue {
    pub value: TelemetryValue,
    pub read_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct LatestValues {
    values: Mutex<BTreeMap<String, LatestValue>>,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<LatestValue> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, LatestValue> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TelemetrySink for LatestValues {
    fn publish(&self, snapshot: &TelemetrySnapshot) {
        let read_at = Utc::now();
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, value) in snapshot {
            values.insert(
                key.clone(),
                LatestValue {
                    value: value.clone(),
                    read_at,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_unchanged_keys_and_overwrites_updated_ones() {
        let latest = LatestValues::new();
        latest.publish(&TelemetrySnapshot::from([
            ("A".to_string(), TelemetryValue::Number(1.0)),
            ("B".to_string(), TelemetryValue::Bool(false)),
        ]));
        latest.publish(&TelemetrySnapshot::from([(
            "A".to_string(),
            TelemetryValue::Number(2.0),
        )]));

        assert_eq!(latest.get("A").unwrap().value, TelemetryValue::Number(2.0));
        assert_eq!(latest.get("B").unwrap().value, TelemetryValue::Bool(false));
        assert_eq!(latest.snapshot().len(), 2);
    }
}
