use std::path::PathBuf;

use tokio::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::gatt::PeripheralAddress;
use crate::poller::{BackoffPolicy, PollSettings};

const DEFAULT_ADDRESS: &str = "A0:DD:6C:4B:9C:36";
const DEFAULT_DATA_DIR: &str = "/data/shelly-v1";
const DEFAULT_LOG_DIR: &str = "/data/logs/shelly";

/// Service configuration, read from `SHELLY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub address: PeripheralAddress,
    pub interval: Duration,
    pub call_timeout: Duration,
    pub connect_timeout: Duration,
    pub startup_delay: Duration,
    pub data_dir: PathBuf,
    /// Warnings and errors are also written here, rotated daily. Set `SHELLY_LOG_DIR=` to disable.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let address: PeripheralAddress = lookup("SHELLY_MAC")
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_owned())
            .parse()?;

        Ok(Self {
            address,
            interval: seconds(&lookup, "SHELLY_SCAN_INTERVAL", 30, 10, u64::MAX)?,
            call_timeout: seconds(&lookup, "SHELLY_POLL_TIMEOUT", 5, 1, 30)?,
            connect_timeout: seconds(&lookup, "SHELLY_CONNECT_TIMEOUT", 10, 1, 60)?,
            startup_delay: seconds(&lookup, "SHELLY_STARTUP_DELAY", 5, 0, 300)?,
            data_dir: lookup("SHELLY_DATA_DIR")
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_owned())
                .into(),
            log_dir: match lookup("SHELLY_LOG_DIR") {
                Some(dir) if dir.trim().is_empty() => None,
                Some(dir) => Some(dir.into()),
                None => Some(DEFAULT_LOG_DIR.into()),
            },
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.interval,
            call_timeout: self.call_timeout,
            startup_delay: self.startup_delay,
            backoff: BackoffPolicy::default(),
        }
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64, min: u64, max: u64) -> Result<Duration> {
    let value = match lookup(key) {
        None => default,
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::Config(format!("{key} must be a whole number of seconds, got {raw:?}")))?,
    };
    let clamped = value.clamp(min, max);
    if clamped != value {
        debug!(key, value, clamped, "clamped configuration value");
    }
    Ok(Duration::from_secs(clamped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.address.as_str(), "A0:DD:6C:4B:9C:36");
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.data_dir, PathBuf::from("/data/shelly-v1"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/data/logs/shelly")));
    }

    #[test]
    fn values_are_clamped() {
        let config = config(&[("SHELLY_SCAN_INTERVAL", "3"), ("SHELLY_POLL_TIMEOUT", "90")]).unwrap();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.call_timeout, Duration::from_secs(30));

        let config = self::config(&[("SHELLY_POLL_TIMEOUT", "0")]).unwrap();
        assert_eq!(config.call_timeout, Duration::from_secs(1));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let err = config(&[("SHELLY_SCAN_INTERVAL", "soon")]).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("SHELLY_SCAN_INTERVAL")));
    }

    #[test]
    fn address_is_validated_and_normalised() {
        assert!(config(&[("SHELLY_MAC", "not-a-mac")]).is_err());
        let config = config(&[("SHELLY_MAC", "a0:dd:6c:4b:9c:37")]).unwrap();
        assert_eq!(config.address.to_string(), "A0:DD:6C:4B:9C:37");
    }

    #[test]
    fn empty_log_dir_disables_file_logging() {
        let config = config(&[("SHELLY_LOG_DIR", "")]).unwrap();
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn poll_settings_carry_the_interval() {
        let settings = config(&[("SHELLY_SCAN_INTERVAL", "60")]).unwrap().poll_settings();
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.backoff.max, Duration::from_secs(300));
    }
}
