use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_LEASES_FILE: &str = "/var/lib/dhcp/dhcpd.leases";
pub const DEFAULT_OUI_FILE: &str = "/usr/local/etc/oui.txt";
pub const DEFAULT_OUI_DATABASE: &str = "oui.db";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub const ENV_LEASES_FILE: &str = "DHCP_LEASES_FILE";
pub const ENV_OUI_FILE: &str = "OUI_FILE";
pub const ENV_OUI_DATABASE: &str = "OUI_DATABASE";

/// How lease-log timestamps (which carry no zone) are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimestampZone {
    /// ISC dhcpd writes lease times in UTC.
    #[default]
    Utc,
    /// The zone of the machine running the report.
    Local,
}

impl TimestampZone {
    /// Pins a zone-less lease timestamp to an instant.
    ///
    /// Returns `None` for local times that fall into a DST gap.
    pub fn to_utc(self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            TimestampZone::Utc => Some(naive.and_utc()),
            TimestampZone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub leases_file: PathBuf,
    pub oui_file: PathBuf,
    pub oui_database: PathBuf,
    pub batch_size: usize,
    pub timestamp_zone: TimestampZone,
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leases_file: PathBuf::from(DEFAULT_LEASES_FILE),
            oui_file: PathBuf::from(DEFAULT_OUI_FILE),
            oui_database: PathBuf::from(DEFAULT_OUI_DATABASE),
            batch_size: DEFAULT_BATCH_SIZE,
            timestamp_zone: TimestampZone::Utc,
            strict: true,
        }
    }
}

impl Config {
    /// Loads the JSON config at `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Applies `DHCP_LEASES_FILE`, `OUI_FILE` and `OUI_DATABASE` from the
    /// process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_LEASES_FILE) {
            self.leases_file = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_OUI_FILE) {
            self.oui_file = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_OUI_DATABASE) {
            self.oui_database = PathBuf::from(value);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        for (name, path) in [
            ("leases_file", &self.leases_file),
            ("oui_file", &self.oui_file),
            ("oui_database", &self.oui_database),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(format!("{} must not be empty", name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.leases_file, PathBuf::from(DEFAULT_LEASES_FILE));
        assert_eq!(config.batch_size, 1000);
        assert!(config.strict);
    }

    #[test]
    fn test_zero_batch_size() {
        let config = Config {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_path() {
        let config = Config {
            oui_database: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_LEASES_FILE, "/tmp/dhcpd.leases"),
            (ENV_OUI_DATABASE, "/tmp/oui.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.leases_file, PathBuf::from("/tmp/dhcpd.leases"));
        assert_eq!(config.oui_file, PathBuf::from(DEFAULT_OUI_FILE));
        assert_eq!(config.oui_database, PathBuf::from("/tmp/oui.db"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("missing.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "batch_size": 50, "timestamp_zone": "local" }"#).unwrap();

        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.timestamp_zone, TimestampZone::Local);
        assert_eq!(config.oui_file, PathBuf::from(DEFAULT_OUI_FILE));
    }

    #[test]
    fn test_utc_zone_keeps_wall_clock() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        let instant = TimestampZone::Utc.to_utc(naive).unwrap();
        assert_eq!(instant.naive_utc(), naive);
    }
}
