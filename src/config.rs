//! Bridge configuration, loaded once at startup from a TOML file and
//! passed by reference into the translator and upload session.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub feature: FeatureConfig,
}

/// Serial link settings.
///
/// The hello command is sent exactly once at connection establishment;
/// it takes control of the printer over USB, which is why the Marlin
/// per-command hello (M110) is suppressed by the translator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    pub port: String,

    #[serde(default = "default_baud")]
    pub baud: u32,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_hello_command")]
    pub hello_command: String,

    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
}

/// Printer-profile settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProfileConfig {
    /// Device does not support native relative positioning (G91). Finder 2
    /// and Guider 2 need this; it also changes how multi-axis homing is
    /// issued.
    #[serde(default)]
    pub disable_g91: bool,
}

/// Feature toggles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureConfig {
    /// Opcodes exempt from letter-case normalization. M146 takes lowercase
    /// r,g,b arguments.
    #[serde(default = "default_case_sensitive_opcodes")]
    pub case_sensitive_opcodes: Vec<String>,
}

/// Snapshot of the two flags the translator reads. Built once per
/// connection so the translator never touches ambient settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigFlags {
    pub disable_g91: bool,
    pub case_sensitive_opcodes: Vec<String>,
}

fn default_baud() -> u32 {
    115200
}
fn default_read_timeout_ms() -> u64 {
    2000
}
fn default_hello_command() -> String {
    "M601 S0".to_string()
}
fn default_keep_alive_interval_ms() -> u64 {
    2000
}
fn default_case_sensitive_opcodes() -> Vec<String> {
    vec!["M146".to_string()]
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: default_baud(),
            read_timeout_ms: default_read_timeout_ms(),
            hello_command: default_hello_command(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            case_sensitive_opcodes: default_case_sensitive_opcodes(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(config_path: &str) -> Result<Self, ConfigError> {
        let mut file = File::open(config_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded configuration from {}", config_path);
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.is_empty() {
            return Err(ConfigError::Invalid(
                "serial port must be specified".to_string(),
            ));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("baud rate must be positive".to_string()));
        }
        if self.serial.keep_alive_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "keep_alive_interval_ms must be positive".to_string(),
            ));
        }
        if self.serial.hello_command.is_empty() {
            return Err(ConfigError::Invalid(
                "hello_command must be specified".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot the flags consumed by the translator.
    pub fn flags(&self) -> ConfigFlags {
        ConfigFlags {
            disable_g91: self.profile.disable_g91,
            case_sensitive_opcodes: self.feature.case_sensitive_opcodes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.serial.baud, 115200);
        assert_eq!(config.serial.hello_command, "M601 S0");
        assert_eq!(config.serial.keep_alive_interval_ms, 2000);
        assert!(!config.profile.disable_g91);
        assert_eq!(config.feature.case_sensitive_opcodes, vec!["M146"]);
    }

    #[test]
    fn test_parse_toml() {
        let toml_config = r#"
[serial]
port = "/dev/ttyACM0"
baud = 115200
hello_command = "M601 S0"
keep_alive_interval_ms = 1000

[profile]
disable_g91 = true

[feature]
case_sensitive_opcodes = ["M146"]
        "#;

        let config: Config = toml::from_str(toml_config).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.keep_alive_interval_ms, 1000);
        assert!(config.profile.disable_g91);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();

        // No port specified
        assert!(config.validate().is_err());

        config.serial.port = "/dev/ttyACM0".to_string();
        assert!(config.validate().is_ok());

        config.serial.keep_alive_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flags_snapshot() {
        let mut config = Config::default();
        config.profile.disable_g91 = true;
        let flags = config.flags();
        assert!(flags.disable_g91);
        assert_eq!(flags.case_sensitive_opcodes, vec!["M146"]);
    }
}
