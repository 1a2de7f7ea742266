//! DMON-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DiskmonError>;

/// Top-level error type for the disk monitor.
#[derive(Debug, Error)]
pub enum DiskmonError {
    #[error("[DMON-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DMON-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DMON-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DMON-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[DMON-2001] filesystem stats failure for {path}: {details}")]
    FsStats { path: PathBuf, details: String },

    #[error("[DMON-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DMON-3001] transport failure: {details}")]
    Transport { details: String },

    #[error("[DMON-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DMON-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DMON-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DiskmonError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DMON-1001",
            Self::MissingConfig { .. } => "DMON-1002",
            Self::ConfigParse { .. } => "DMON-1003",
            Self::UnsupportedPlatform { .. } => "DMON-1101",
            Self::FsStats { .. } => "DMON-2001",
            Self::Serialization { .. } => "DMON-2101",
            Self::Transport { .. } => "DMON-3001",
            Self::Io { .. } => "DMON-3002",
            Self::ChannelClosed { .. } => "DMON-3003",
            Self::Runtime { .. } => "DMON-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Nothing in the monitor retries on its own; this only classifies errors
    /// for the activity log.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::FsStats { .. }
                | Self::Transport { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for DiskmonError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DiskmonError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
