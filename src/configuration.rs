use config::{Config, ConfigError, Environment as ConfigEnvironment, File};
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(serde::Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub transcripts: TranscriptSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(
        default = "default_port",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub port: u16,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Connection details for the hosted agent platform.
#[derive(serde::Deserialize, Clone, Default)]
pub struct AgentSettings {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub agent_id: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct TranscriptSettings {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(
        default = "default_idle_timeout",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub idle_timeout_secs: u64,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub poll_interval_secs: u64,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            idle_timeout_secs: default_idle_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_dir() -> String {
    "chat_logs".to_string()
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    5
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = Config::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(
            ConfigEnvironment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
