// ⚙️ Configuration
// Loaded from a TOML file; every field has a default so the file is optional.
//
//   [device]
//   port = "/dev/ttyUSB0"
//   baud_rate = 115200
//
//   [storage]
//   ledger_path = "Recycling_Logs.db"

use crate::error::ConfigError;
use crate::ingest::IngestTiming;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "scale-ledger.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Serial port of the scale; usually given on the command line
    pub port: Option<String>,
    pub baud_rate: u32,
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            port: None,
            baud_rate: 115_200,
            settle_ms: 2_000,
            poll_interval_ms: 100,
            read_timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub ledger_path: PathBuf,
    pub directory_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            ledger_path: PathBuf::from("Recycling_Logs.db"),
            directory_path: PathBuf::from("Collectors_Database.csv"),
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn timing(&self) -> IngestTiming {
        IngestTiming {
            settle: Duration::from_millis(self.device.settle_ms),
            poll_interval: Duration::from_millis(self.device.poll_interval_ms),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.device.read_timeout_ms)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.device.baud_rate, 115_200);
        assert_eq!(settings.timing(), IngestTiming::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scale-ledger.toml");
        fs::write(
            &path,
            "[device]\nport = \"/dev/ttyUSB0\"\npoll_interval_ms = 50\n\n[storage]\nledger_path = \"logs/ledger.db\"\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();

        assert_eq!(settings.device.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(settings.device.baud_rate, 115_200);
        assert_eq!(settings.timing().poll_interval, Duration::from_millis(50));
        assert_eq!(settings.storage.ledger_path, PathBuf::from("logs/ledger.db"));
        assert_eq!(
            settings.storage.directory_path,
            PathBuf::from("Collectors_Database.csv")
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scale-ledger.toml");
        fs::write(&path, "[device\nbaud_rate = \"fast\"").unwrap();

        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
    }
}
