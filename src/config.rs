use crate::collectors;
use crate::error::ExporterError;
use crate::shelly::connection::normalize_endpoint;
use crate::shelly::http::normalize_base_url;
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
        }
    }
}

/// Supported device families.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceModel {
    /// Gen2+ relay/plug with a metering switch component (`Switch.GetStatus`)
    Switch,
    /// Gen2 three-phase energy meter (`EM.GetStatus` + `EMData.GetStatus`)
    Pro3em,
    /// Gen1 device polled over plain HTTP (`GET /status`)
    Gen1,
}

impl DeviceModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceModel::Switch => "switch",
            DeviceModel::Pro3em => "pro3em",
            DeviceModel::Gen1 => "gen1",
        }
    }

    /// Whether this model talks JSON-RPC over a websocket
    pub fn uses_rpc(&self) -> bool {
        !matches!(self, DeviceModel::Gen1)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    pub name: String,
    pub url: String,
    pub model: DeviceModel,
    #[serde(default)]
    pub channel: u32,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_min_poll_interval")]
    pub min_poll_interval_ms: u64,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub derive_current: bool,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.min_poll_interval_ms)
    }

    pub fn is_ignored(&self, metric: &str) -> bool {
        self.ignore.iter().any(|name| name == metric)
    }
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9784
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_timeout() -> u64 {
    5
}

fn default_min_poll_interval() -> u64 {
    800
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SHELLY_EXPORTER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject configurations that could never produce a working exporter.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.devices.is_empty() {
            return Err(ExporterError::Config("No devices configured".to_string()));
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(ExporterError::Config("Device name is empty".to_string()));
            }
            if !names.insert(device.name.as_str()) {
                return Err(ExporterError::Config(format!(
                    "Duplicate device name: {}",
                    device.name
                )));
            }
            if device.timeout_seconds == 0 {
                return Err(ExporterError::Config(format!(
                    "Device {}: timeout_seconds must be greater than zero",
                    device.name
                )));
            }

            if device.model.uses_rpc() {
                normalize_endpoint(&device.url)?;
            } else {
                normalize_base_url(&device.url)?;
            }

            let known = collectors::metric_names(device.model);
            if let Some(unknown) = device.ignore.iter().find(|name| !known.contains(&name.as_str())) {
                return Err(ExporterError::Config(format!(
                    "Device {}: unknown metric in ignore list: {} (model {})",
                    device.name,
                    unknown,
                    device.model.as_str()
                )));
            }
        }

        Ok(())
    }
}
