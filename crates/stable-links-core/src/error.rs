use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a [`crate::vault::Vault`] implementation.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document is not valid UTF-8 text: {0}")]
    NotText(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to enumerate vault {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl VaultError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => VaultError::NotFound(path.into().display().to_string()),
            std::io::ErrorKind::InvalidData => VaultError::NotText(path.into().display().to_string()),
            _ => VaultError::Io {
                path: path.into(),
                source,
            },
        }
    }
}

/// Failures that abort one pipeline instance.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document {0} has no usable base name")]
    NoBaseName(String),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T, E = VaultError> = std::result::Result<T, E>;
