use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::{
    deserialize_duration_from_seconds, deserialize_nonzero_duration_from_seconds,
    deserialize_webhook_url,
};

/// Provides the default value for check_interval_secs.
fn default_check_interval() -> Duration {
    Duration::from_secs(60)
}

/// Provides the default value for throttle_window_secs.
fn default_throttle_window() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for webhook_timeout_secs.
fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Provides the default value for shutdown_timeout_secs.
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Provides the default value for webhook_message.
fn default_webhook_message() -> String {
    "Reminder: Wi-Fi disconnected".to_string()
}

/// Which local notification backend to use.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocalNotifierKind {
    /// Desktop notifications through `notify-send`.
    Desktop,
    /// Notifications written to the log only.
    #[default]
    Log,
}

/// Initial user settings, written to the store only when absent there.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SettingsDefaults {
    /// Initial target network name.
    #[serde(default)]
    pub target_network_name: String,

    /// Initial alert switch.
    #[serde(default)]
    pub check_enabled: bool,

    /// Initial webhook endpoint.
    #[serde(default, deserialize_with = "deserialize_webhook_url")]
    pub webhook_url: Option<String>,
}

/// Application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Database URL for the SQLite database.
    pub database_url: String,

    /// Interval between two scheduled checks.
    #[serde(
        rename = "check_interval_secs",
        deserialize_with = "deserialize_nonzero_duration_from_seconds",
        default = "default_check_interval"
    )]
    pub check_interval: Duration,

    /// Minimum spacing between two alerts of the same kind.
    #[serde(
        rename = "throttle_window_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_throttle_window"
    )]
    pub throttle_window: Duration,

    /// Deadline for a single webhook request.
    #[serde(
        rename = "webhook_timeout_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_webhook_timeout"
    )]
    pub webhook_timeout: Duration,

    /// The maximum time to wait for in-flight deliveries on shutdown.
    #[serde(
        rename = "shutdown_timeout_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout: Duration,

    /// Local notification backend.
    #[serde(default)]
    pub local_notifier: LocalNotifierKind,

    /// Text content of the webhook message.
    #[serde(default = "default_webhook_message")]
    pub webhook_message: String,

    /// Initial user settings.
    #[serde(default)]
    pub defaults: SettingsDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            check_interval: default_check_interval(),
            throttle_window: default_throttle_window(),
            webhook_timeout: default_webhook_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            local_notifier: LocalNotifierKind::default(),
            webhook_message: default_webhook_message(),
            defaults: SettingsDefaults::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new `AppConfig` by reading `app.yaml` from the configuration
    /// directory, overridden by `WIFI_LEDGER__*` environment variables.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/app.yaml", config_dir_str)))
            .add_source(Environment::with_prefix("WIFI_LEDGER").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use tempfile::TempDir;

    use super::*;

    fn write_config(dir: &Path, content: &str) {
        fs::write(dir.join("app.yaml"), content).unwrap();
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "database_url: \"sqlite:ledger.db\"\n");

        let config = AppConfig::new(dir.path().to_str()).unwrap();

        assert_eq!(config.database_url, "sqlite:ledger.db");
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.throttle_window, Duration::from_secs(30));
        assert_eq!(config.webhook_timeout, Duration::from_secs(10));
        assert_eq!(config.local_notifier, LocalNotifierKind::Log);
        assert_eq!(config.defaults, SettingsDefaults::default());
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
database_url: "sqlite:/var/lib/wifi-ledger/state.db"
check_interval_secs: 120
throttle_window_secs: 45
webhook_timeout_secs: 5
shutdown_timeout_secs: 3
local_notifier: desktop
webhook_message: "Office Wi-Fi dropped"
defaults:
  target_network_name: "Office"
  check_enabled: true
  webhook_url: "https://hooks.example.com/send"
"#,
        );

        let config = AppConfig::new(dir.path().to_str()).unwrap();

        assert_eq!(config.check_interval, Duration::from_secs(120));
        assert_eq!(config.throttle_window, Duration::from_secs(45));
        assert_eq!(config.webhook_timeout, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.local_notifier, LocalNotifierKind::Desktop);
        assert_eq!(config.webhook_message, "Office Wi-Fi dropped");
        assert_eq!(config.defaults.target_network_name, "Office");
        assert!(config.defaults.check_enabled);
        assert_eq!(config.defaults.webhook_url.as_deref(), Some("https://hooks.example.com/send"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(AppConfig::new(dir.path().to_str()).is_err());
    }

    #[test]
    fn test_zero_check_interval_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "database_url: \"sqlite:x.db\"\ncheck_interval_secs: 0\n");
        assert!(AppConfig::new(dir.path().to_str()).is_err());
    }

    #[test]
    fn test_invalid_webhook_default_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            "database_url: \"sqlite:x.db\"\ndefaults:\n  webhook_url: \"not a url\"\n",
        );
        assert!(AppConfig::new(dir.path().to_str()).is_err());
    }
}
