use crate::scheduler::SchedulerConfig;
use crate::sensor_config::DEFAULT_SENSOR_CONFIG_FILE;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareVariant {
    Simulated,
    Modbus,
}

impl HardwareVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            HardwareVariant::Simulated => "simulated",
            HardwareVariant::Modbus => "modbus",
        }
    }
}

impl FromStr for HardwareVariant {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(HardwareVariant::Simulated),
            "modbus" => Ok(HardwareVariant::Modbus),
            other => bail!("unknown hardware variant '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudMode {
    Disabled,
    Http,
    Mqtt,
}

impl FromStr for CloudMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(CloudMode::Disabled),
            "http" | "https" => Ok(CloudMode::Http),
            "mqtt" => Ok(CloudMode::Mqtt),
            other => bail!("unknown cloud mode '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusFraming {
    /// RTU frames tunnelled through a serial-to-TCP bridge.
    RtuOverTcp,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusEndpoint {
    pub framing: ModbusFraming,
    pub host: String,
    pub port: u16,
}

impl ModbusEndpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim()).context("invalid GATEWAY_MODBUS_URL")?;
        let framing = match url.scheme() {
            "rtu-tcp" => ModbusFraming::RtuOverTcp,
            "tcp" | "modbus-tcp" => ModbusFraming::Tcp,
            other => bail!("unsupported modbus scheme '{other}'"),
        };
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("GATEWAY_MODBUS_URL missing host"))?
            .to_string();
        let port = url.port().unwrap_or(502);
        Ok(Self {
            framing,
            host,
            port,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub client_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub device_id: String,
    pub sensor_config_path: PathBuf,

    pub hardware: HardwareVariant,
    pub modbus_endpoint: Option<ModbusEndpoint>,
    pub modbus_timeout: Duration,
    pub digital_input_gpios: BTreeMap<u8, u32>,
    pub gpio_root: PathBuf,

    pub read_timeout: Duration,
    pub record_capacity: usize,
    pub controller_load_timeout: Duration,

    pub cloud_mode: CloudMode,
    pub cloud_url: Option<String>,
    pub cloud_token: Option<String>,
    pub mqtt: Option<MqttSettings>,
    pub cloud_logs: bool,

    pub http_bind: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let device_id = vars.string("GATEWAY_DEVICE_ID", "telemetry-gateway");
        let sensor_config_path =
            PathBuf::from(vars.string("GATEWAY_SENSOR_CONFIG_PATH", DEFAULT_SENSOR_CONFIG_FILE));

        let hardware = vars
            .string("GATEWAY_HARDWARE", "simulated")
            .parse::<HardwareVariant>()
            .context("invalid GATEWAY_HARDWARE")?;
        let modbus_endpoint = vars
            .optional("GATEWAY_MODBUS_URL")
            .map(|raw| ModbusEndpoint::parse(&raw))
            .transpose()?;
        if hardware == HardwareVariant::Modbus && modbus_endpoint.is_none() {
            bail!("GATEWAY_HARDWARE=modbus requires GATEWAY_MODBUS_URL");
        }
        let modbus_timeout = Duration::from_millis(vars.u64("GATEWAY_MODBUS_TIMEOUT_MS", 1000)?);
        let digital_input_gpios = match vars.optional("GATEWAY_DIGITAL_INPUT_GPIOS") {
            Some(raw) => parse_gpio_map(&raw).context("invalid GATEWAY_DIGITAL_INPUT_GPIOS")?,
            None => BTreeMap::new(),
        };
        let gpio_root = PathBuf::from(vars.string("GATEWAY_GPIO_ROOT", "/sys/class/gpio"));

        let read_timeout = Duration::from_millis(vars.u64("GATEWAY_READ_TIMEOUT_MS", 5000)?.max(1));
        let record_capacity = vars.u64("GATEWAY_RECORD_CAPACITY", 50)?.max(1) as usize;
        let controller_load_timeout =
            Duration::from_secs(vars.u64("GATEWAY_CONTROLLER_LOAD_TIMEOUT_SECONDS", 30)?);

        let cloud_mode = vars
            .string("GATEWAY_CLOUD_MODE", "disabled")
            .parse::<CloudMode>()
            .context("invalid GATEWAY_CLOUD_MODE")?;
        let cloud_url = vars.optional("GATEWAY_CLOUD_URL");
        if cloud_mode == CloudMode::Http && cloud_url.is_none() {
            bail!("GATEWAY_CLOUD_MODE=http requires GATEWAY_CLOUD_URL");
        }
        let cloud_token = vars.optional("GATEWAY_CLOUD_TOKEN");

        let mqtt = if cloud_mode == CloudMode::Mqtt {
            let mqtt_url = vars.string("GATEWAY_MQTT_URL", "mqtt://127.0.0.1:1883");
            let url = Url::parse(&mqtt_url).context("invalid GATEWAY_MQTT_URL")?;
            let host = url
                .host_str()
                .ok_or_else(|| anyhow!("GATEWAY_MQTT_URL missing host"))?
                .to_string();
            Some(MqttSettings {
                host,
                port: url.port().unwrap_or(1883),
                username: vars.optional("GATEWAY_MQTT_USERNAME"),
                password: vars.optional("GATEWAY_MQTT_PASSWORD"),
                topic_prefix: vars.string("GATEWAY_MQTT_TOPIC_PREFIX", "gateway"),
                client_id: vars.string(
                    "GATEWAY_MQTT_CLIENT_ID",
                    &format!("telemetry-gateway-{device_id}"),
                ),
            })
        } else {
            None
        };
        let cloud_logs = vars.bool("GATEWAY_CLOUD_LOGS", false)?;

        let http_bind = vars.optional("GATEWAY_HTTP_BIND");

        Ok(Self {
            device_id,
            sensor_config_path,
            hardware,
            modbus_endpoint,
            modbus_timeout,
            digital_input_gpios,
            gpio_root,
            read_timeout,
            record_capacity,
            controller_load_timeout,
            cloud_mode,
            cloud_url,
            cloud_token,
            mqtt,
            cloud_logs,
            http_bind,
        })
    }

    /// Node periods are whole seconds counted in ticks, so the tick stays at one second.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(1),
            read_timeout: self.read_timeout,
        }
    }
}

/// Parses `channel:gpio` pairs separated by commas, e.g. `1:17,2:27`.
fn parse_gpio_map(raw: &str) -> Result<BTreeMap<u8, u32>> {
    let mut map = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (channel, gpio) = pair
            .split_once(':')
            .ok_or_else(|| anyhow!("expected channel:gpio, got '{pair}'"))?;
        let channel = channel
            .trim()
            .parse::<u8>()
            .with_context(|| format!("invalid channel in '{pair}'"))?;
        let gpio = gpio
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid gpio in '{pair}'"))?;
        map.insert(channel, gpio);
    }
    Ok(map)
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.optional(key) {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("invalid {key}")),
            None => Ok(default),
        }
    }

    fn bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.optional(key) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(anyhow!("invalid {key}: expected a boolean")),
            },
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_run_simulated_without_cloud() {
        let config = config(&[]).unwrap();
        assert_eq!(config.hardware, HardwareVariant::Simulated);
        assert_eq!(config.cloud_mode, CloudMode::Disabled);
        assert_eq!(config.sensor_config_path, PathBuf::from("sensor-config.json"));
        assert_eq!(config.scheduler_config().tick_interval, Duration::from_secs(1));
        assert_eq!(config.scheduler_config().read_timeout, Duration::from_secs(5));
        assert_eq!(config.record_capacity, 50);
        assert_eq!(config.controller_load_timeout, Duration::from_secs(30));
        assert!(config.http_bind.is_none());
        assert!(!config.cloud_logs);
    }

    #[test]
    fn modbus_hardware_needs_endpoint() {
        assert!(config(&[("GATEWAY_HARDWARE", "modbus")]).is_err());

        let config = config(&[
            ("GATEWAY_HARDWARE", "modbus"),
            ("GATEWAY_MODBUS_URL", "rtu-tcp://10.0.0.5:4196"),
            ("GATEWAY_DIGITAL_INPUT_GPIOS", "1:17, 2:27"),
        ])
        .unwrap();
        let endpoint = config.modbus_endpoint.unwrap();
        assert_eq!(endpoint.framing, ModbusFraming::RtuOverTcp);
        assert_eq!(endpoint.address(), "10.0.0.5:4196");
        assert_eq!(config.digital_input_gpios.get(&2), Some(&27));
    }

    #[test]
    fn mqtt_mode_reads_broker_settings() {
        let config = config(&[
            ("GATEWAY_CLOUD_MODE", "mqtt"),
            ("GATEWAY_DEVICE_ID", "well-7"),
            ("GATEWAY_MQTT_URL", "mqtt://broker.local:1884"),
            ("GATEWAY_CLOUD_LOGS", "true"),
        ])
        .unwrap();
        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.host, "broker.local");
        assert_eq!(mqtt.port, 1884);
        assert_eq!(mqtt.client_id, "telemetry-gateway-well-7");
        assert!(config.cloud_logs);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(config(&[("GATEWAY_READ_TIMEOUT_MS", "soon")]).is_err());
        assert!(config(&[("GATEWAY_CLOUD_MODE", "http")]).is_err());
        assert!(config(&[("GATEWAY_DIGITAL_INPUT_GPIOS", "1-17")]).is_err());
        assert!(config(&[("GATEWAY_MODBUS_URL", "serial:///dev/ttyS0")]).is_err());
    }

    #[test]
    fn tick_interval_cannot_be_overridden() {
        let config = config(&[
            ("GATEWAY_TICK_INTERVAL_MS", "250"),
            ("GATEWAY_READ_TIMEOUT_MS", "750"),
        ])
        .unwrap();
        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.tick_interval, Duration::from_secs(1));
        assert_eq!(scheduler.read_timeout, Duration::from_millis(750));
    }
}
