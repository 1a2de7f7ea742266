//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DiskmonError, Result};

/// Upper bound for every schedule knob (30 days), so `interval + slack`
/// always fits a timer deadline.
pub const MAX_SCHEDULE_SECS: u64 = 30 * 24 * 60 * 60;

/// Full disk monitor configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub schedule: ScheduleConfig,
    pub backend: BackendConfig,
    pub startup: StartupConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// Check cadence and debounce knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Wake-up interval while the device is in active use.
    pub active_interval_secs: u64,
    /// Wake-up interval while the device is idle.
    pub idle_interval_secs: u64,
    /// Extra window handed to the wake-up provider on top of the interval.
    pub slack_secs: u64,
    /// A transition into active forces a check when the last one is at least this old.
    pub stale_threshold_secs: u64,
}

/// Per-mount usage limits checked against the mount table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Mount point → maximum usage percent before a warning is signaled.
    pub limits: BTreeMap<String, u8>,
}

/// Startup ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct StartupConfig {
    /// Treat the readiness notification as already received.
    pub assume_ready: bool,
}

/// Filesystem paths used by diskmon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
}

/// Activity log tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub channel_capacity: usize,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            active_interval_secs: 300,
            idle_interval_secs: 1_800,
            slack_secs: 120,
            stale_threshold_secs: 900,
        }
    }
}

impl ScheduleConfig {
    #[must_use]
    pub const fn active_interval(&self) -> Duration {
        Duration::from_secs(self.active_interval_secs)
    }

    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    #[must_use]
    pub const fn slack(&self) -> Duration {
        Duration::from_secs(self.slack_secs)
    }

    #[must_use]
    pub const fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            limits: BTreeMap::from([
                ("/".to_string(), 90),
                ("/tmp".to_string(), 70),
                ("/run".to_string(), 70),
                ("/home".to_string(), 90),
            ]),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[DMON-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("diskmon").join("config.toml"),
            jsonl_log: home_dir
                .join(".local")
                .join("share")
                .join("diskmon")
                .join("activity.jsonl"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 30,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DiskmonError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(DiskmonError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config, used to skip no-op reloads.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        for (name, slot) in [
            (
                "DMON_SCHEDULE_ACTIVE_INTERVAL_SECS",
                &mut self.schedule.active_interval_secs,
            ),
            (
                "DMON_SCHEDULE_IDLE_INTERVAL_SECS",
                &mut self.schedule.idle_interval_secs,
            ),
            ("DMON_SCHEDULE_SLACK_SECS", &mut self.schedule.slack_secs),
            (
                "DMON_SCHEDULE_STALE_THRESHOLD_SECS",
                &mut self.schedule.stale_threshold_secs,
            ),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env_u64(name, &raw)?;
            }
        }

        if let Some(raw) = lookup("DMON_STARTUP_ASSUME_READY") {
            self.startup.assume_ready = parse_env_bool("DMON_STARTUP_ASSUME_READY", &raw)?;
        }

        if let Some(raw) = lookup("DMON_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Strip trailing slashes from limit keys so `/home/` and `/home` match the mount table.
    fn normalize_paths(&mut self) {
        self.backend.limits = std::mem::take(&mut self.backend.limits)
            .into_iter()
            .map(|(mount, limit)| (normalize_mount(&mount), limit))
            .collect();
    }

    fn validate(&self) -> Result<()> {
        for (name, val) in [
            (
                "active_interval_secs",
                self.schedule.active_interval_secs,
            ),
            ("idle_interval_secs", self.schedule.idle_interval_secs),
            (
                "stale_threshold_secs",
                self.schedule.stale_threshold_secs,
            ),
        ] {
            if val == 0 {
                return Err(DiskmonError::InvalidConfig {
                    details: format!("schedule.{name} must be > 0"),
                });
            }
        }

        for (name, val) in [
            (
                "active_interval_secs",
                self.schedule.active_interval_secs,
            ),
            ("idle_interval_secs", self.schedule.idle_interval_secs),
            ("slack_secs", self.schedule.slack_secs),
            (
                "stale_threshold_secs",
                self.schedule.stale_threshold_secs,
            ),
        ] {
            if val > MAX_SCHEDULE_SECS {
                return Err(DiskmonError::InvalidConfig {
                    details: format!(
                        "schedule.{name} ({val}) must be <= {MAX_SCHEDULE_SECS} (30 days)"
                    ),
                });
            }
        }

        if self.schedule.active_interval_secs > self.schedule.idle_interval_secs {
            return Err(DiskmonError::InvalidConfig {
                details: format!(
                    "schedule.active_interval_secs ({}) must be <= schedule.idle_interval_secs ({})",
                    self.schedule.active_interval_secs, self.schedule.idle_interval_secs
                ),
            });
        }

        for (mount, limit) in &self.backend.limits {
            if !(1..=100).contains(limit) {
                return Err(DiskmonError::InvalidConfig {
                    details: format!("backend.limits.{mount:?} must be in [1, 100], got {limit}"),
                });
            }
            if !mount.starts_with('/') {
                return Err(DiskmonError::InvalidConfig {
                    details: format!("backend.limits key {mount:?} must be an absolute mount path"),
                });
            }
        }

        if self.logging.channel_capacity == 0 {
            return Err(DiskmonError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Normalize a mount path key: strip one trailing slash, keep `/` as is.
#[must_use]
pub fn normalize_mount(raw: &str) -> String {
    if raw.len() > 1 {
        raw.strip_suffix('/').unwrap_or(raw).to_string()
    } else {
        raw.to_string()
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| DiskmonError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| DiskmonError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
