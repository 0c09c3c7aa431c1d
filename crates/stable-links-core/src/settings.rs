use crate::error::SettingsError;
use crate::link_parser::ScanOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

/// Runtime settings, loadable from a TOML file. Every field has a default.
///
/// ```toml
/// vault = "/home/me/notes"
/// extensions = ["md"]
/// quiet_period_ms = 500
/// max_wait_ms = 5000
/// skip_code = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub vault: PathBuf,
    pub extensions: Vec<String>,
    pub quiet_period_ms: u64,
    pub max_wait_ms: u64,
    pub skip_code: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault: PathBuf::from("."),
            extensions: vec!["md".to_string()],
            quiet_period_ms: 500,
            max_wait_ms: 5000,
            skip_code: false,
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, SettingsError> {
        toml::from_str(text).map_err(|source| SettingsError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            skip_code: self.skip_code,
        }
    }
}
