use anyhow::{Context, Result};
use serde::Deserialize;

use guard_alarm::AlarmConfig;
use guard_stream::StreamConfig;
use guard_vision::{DetectionConfig, OverlayConfig};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub detection: DetectionConfig,
    pub overlay: OverlayConfig,
    pub alarm: AlarmConfig,
}

pub fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}
