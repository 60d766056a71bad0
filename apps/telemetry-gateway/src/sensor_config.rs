use anyhow::{bail, Context, Result};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;

pub const DEFAULT_SENSOR_CONFIG_FILE: &str = "sensor-config.json";

#[derive(Debug, Clone, Default)]
pub struct SensorConfigDocument {
    sections: Map<String, JsonValue>,
}

impl SensorConfigDocument {
    /// Loads the document at `path`. A missing or malformed file is logged and yields an empty
    /// document so the gateway still starts.
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(document) => {
                tracing::info!(
                    path = %path.display(),
                    sections = ?document.section_names().collect::<Vec<_>>(),
                    "sensor configuration loaded"
                );
                document
            }
            Err(err) => {
                tracing::error!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "unable to load sensor configuration; no sensors will be configured"
                );
                Self::default()
            }
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: JsonValue =
            serde_json::from_str(raw).context("sensor configuration is not valid JSON")?;
        let JsonValue::Object(sections) = value else {
            bail!("sensor configuration must be a JSON object");
        };
        Ok(Self { sections })
    }

    /// Raw JSON text of the named section, for its controller to deserialize.
    pub fn section(&self, name: &str) -> Option<String> {
        self.sections.get(name).map(JsonValue::to_string)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "DigitalInputs": [
            { "Name": "Pump1.Run", "ChannelNumber": 1, "IsSimulated": true, "SenseIntervalSeconds": 1 }
        ],
        "Keller": { "ModbusAddress": 1, "IsSimulated": true, "Name": "Well" }
    }"#;

    #[test]
    fn sections_are_returned_as_raw_json() {
        let document = SensorConfigDocument::parse(SAMPLE).unwrap();
        let keller: JsonValue = serde_json::from_str(&document.section("Keller").unwrap()).unwrap();
        assert_eq!(keller["Name"], "Well");
        assert!(document.section("DigitalInputs").unwrap().starts_with('['));
        assert_eq!(document.section("ModbusDevices"), None);
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(SensorConfigDocument::parse("[1, 2]").is_err());
        assert!(SensorConfigDocument::parse("{ nope").is_err());
    }

    #[test]
    fn load_reads_file_and_tolerates_missing_or_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SENSOR_CONFIG_FILE);

        assert!(SensorConfigDocument::load(&path).is_empty());

        std::fs::write(&path, "not json").unwrap();
        assert!(SensorConfigDocument::load(&path).is_empty());

        std::fs::write(&path, SAMPLE).unwrap();
        let document = SensorConfigDocument::load(&path);
        let names: Vec<&str> = document.section_names().collect();
        assert!(names.contains(&"DigitalInputs"));
        assert!(names.contains(&"Keller"));
    }
}
