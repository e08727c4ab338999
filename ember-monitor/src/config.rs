//! Configuration for the monitor client.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Device connection settings.
    pub device: DeviceSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Which device to pair with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Hostname or IP address of the device.
    pub hostname: String,
    /// TCP port the device listens on.
    pub port: u16,
    /// Shared secret; empty logs in anonymously.
    pub password: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device: DeviceSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            port: ember_core::DEFAULT_PORT,
            password: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl MonitorConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert into the library's connection config.
    pub fn to_device_config(&self) -> ember_core::DeviceConfig {
        let mut config = ember_core::DeviceConfig::new(self.device.hostname.clone());
        config.port = self.device.port;
        if !self.device.password.is_empty() {
            config.password = Some(self.device.password.clone());
        }
        config.client_info = "ember-monitor".to_string();
        config
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = MonitorConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("hostname"));
        assert!(text.contains("level"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = MonitorConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MonitorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.device.port, ember_core::DEFAULT_PORT);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn empty_password_maps_to_anonymous_login() {
        let cfg = MonitorConfig::default();
        assert!(cfg.to_device_config().password.is_none());
    }
}
