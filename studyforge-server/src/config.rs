use anyhow::Result;
use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;

use studyforge_api::security::RateLimitSettings;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    /// When set, audit events are appended here as JSON lines in addition
    /// to the tracing sink.
    pub audit_log_path: Option<String>,
    pub rate_limits: RateLimitSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("STUDYFORGE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            log_level: "info".to_string(),
            audit_log_path: None,
            rate_limits: RateLimitSettings::default(),
        }
    }
}
