//! Configuration module

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub netatmo: NetatmoConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetatmoConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl NetatmoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_auth_retry_secs")]
    pub auth_retry_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            auth_retry_secs: default_auth_retry_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub verify_cert: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            url: None,
            verify_cert: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.netatmo.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_interval_secs() -> u64 {
    60
}

fn default_auth_retry_secs() -> u64 {
    30
}

fn default_topic() -> String {
    "idiamant".to_string()
}

fn default_true() -> bool {
    true
}

fn default_state_path() -> String {
    "state.json".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("IDIAMANT").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.netatmo.client_id.is_empty() || self.netatmo.client_secret.is_empty() {
            anyhow::bail!("netatmo.client_id and netatmo.client_secret must be set");
        }
        url::Url::parse(&self.netatmo.base_url)
            .map_err(|e| anyhow::anyhow!("invalid netatmo.base_url: {}", e))?;
        if self.polling.interval_secs == 0 {
            anyhow::bail!("polling.interval_secs must be at least 1");
        }
        if self.mqtt.topic.is_empty() || self.mqtt.topic.contains(|c| c == '#' || c == '+') {
            anyhow::bail!("mqtt.topic must be a plain, non-empty topic prefix");
        }
        Ok(())
    }
}
