//! CLI configuration management

use anyhow::{Context, Result, anyhow};
use common::BridgeSettings;
use native::NativeSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub native: NativeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default = "GeneralSettings::default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl GeneralSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Device to open when none is given on the command line
///
/// Ids are strings so both `"0x2341"` and `"9025"` can be written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
}

impl DeviceSettings {
    /// Parsed `(vendor_id, product_id)`, if both are set
    pub fn ids(&self) -> Result<Option<(u16, u16)>> {
        match (&self.vendor_id, &self.product_id) {
            (Some(vendor_id), Some(product_id)) => {
                Ok(Some((parse_usb_id(vendor_id)?, parse_usb_id(product_id)?)))
            }
            (None, None) => Ok(None),
            _ => Err(anyhow!(
                "[device] needs both vendor_id and product_id, or neither"
            )),
        }
    }
}

/// Parse a USB id written as decimal or `0x`-prefixed hex
pub fn parse_usb_id(text: &str) -> Result<u16> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse::<u16>(),
    };
    parsed.with_context(|| format!("Invalid USB id '{}'", text))
}

impl CliConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-bridge/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                // Print to stderr since logging might not be initialized yet
                eprintln!("Config: {:#}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-bridge").join("config.toml")
        } else {
            PathBuf::from(".config/usb-bridge/config.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                valid_levels.join(", ")
            ));
        }

        self.device.ids()?;

        if self.bridge.frame_channel_capacity == 0 {
            return Err(anyhow!("bridge.frame_channel_capacity must be at least 1"));
        }

        Ok(())
    }
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::DecodeMode;
    use std::io::Write;

    const FULL_CONFIG: &str = r#"
[general]
log_level = "debug"

[device]
vendor_id = "0x2341"
product_id = "67"

[bridge]
decode_mode = "lenient"
frame_channel_capacity = 16

[native]
read_interval_ms = 10
read_timeout_ms = 20
write_timeout_ms = 500
pad_writes = false
"#;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.device.ids().unwrap().is_none());
        assert_eq!(config.bridge.decode_mode, DecodeMode::Strict);
        assert!(config.native.pad_writes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let config: CliConfig = toml::from_str(FULL_CONFIG).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.device.ids().unwrap(), Some((0x2341, 67)));
        assert_eq!(config.bridge.decode_mode, DecodeMode::Lenient);
        assert_eq!(config.bridge.frame_channel_capacity, 16);
        assert_eq!(config.native.read_interval_ms, 10);
        assert_eq!(config.native.read_timeout_ms, 20);
        assert_eq!(config.native.write_timeout_ms, 500);
        assert!(!config.native.pad_writes);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.native, NativeSettings::default());
    }

    #[test]
    fn test_config_serialization() {
        let config: CliConfig = toml::from_str(FULL_CONFIG).unwrap();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: CliConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.bridge, parsed.bridge);
        assert_eq!(config.native, parsed.native);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = CliConfig::default();
        config.general.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.general.log_level = "trace".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_device_ids() {
        let mut config = CliConfig::default();
        config.device.vendor_id = Some("0x2341".to_string());
        assert!(config.validate().is_err());

        config.device.product_id = Some("not-a-number".to_string());
        assert!(config.validate().is_err());

        config.device.product_id = Some("0x0043".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_channel_capacity() {
        let mut config = CliConfig::default();
        config.bridge.frame_channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_usb_id() {
        assert_eq!(parse_usb_id("0x2341").unwrap(), 0x2341);
        assert_eq!(parse_usb_id("0XFFFF").unwrap(), 0xffff);
        assert_eq!(parse_usb_id(" 1027 ").unwrap(), 1027);
        assert!(parse_usb_id("65536").is_err());
        assert!(parse_usb_id("0x").is_err());
        assert!(parse_usb_id("2341h").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let config = CliConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[general]\nlog_level = \"loud\"\n").unwrap();

        assert!(CliConfig::load(Some(file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CliConfig::default();
        config.device.vendor_id = Some("0x1234".to_string());
        config.device.product_id = Some("0x5678".to_string());
        config.save(&path).unwrap();

        let reloaded = CliConfig::load(Some(path)).unwrap();
        assert_eq!(reloaded.device.ids().unwrap(), Some((0x1234, 0x5678)));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        assert_eq!(
            expand_path("/etc/usb-bridge/config.toml"),
            PathBuf::from("/etc/usb-bridge/config.toml")
        );
    }
}
