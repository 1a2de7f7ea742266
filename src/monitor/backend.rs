//! Usage backend: the narrow seam between the scheduler and whatever actually
//! measures disk usage.
//!
//! The scheduler only ever calls [`UsageBackend::check_now`] and forwards the
//! returned reports. Limit evaluation lives here, behind the seam: a mount that
//! is over its limit is reported on every check, and a return to normal is
//! reported once (also once after startup, so listeners learn the initial state).
//!
//! [`StatvfsBackend`] reads the mount table and `statvfs` block counts through
//! the [`Platform`] layer.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::{BackendConfig, normalize_mount};
use crate::core::errors::Result;
use crate::platform::pal::{Platform, detect_platform};

/// Limit state last signaled for a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsageState {
    #[default]
    Undefined,
    Normal,
    Warning,
}

/// One disk-usage result to be signaled outward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub path: String,
    pub percent_used: u8,
    pub state: UsageState,
}

/// Usage measured for one mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSample {
    pub mount: String,
    pub percent_used: u8,
}

/// Performs a disk check and returns zero or more usage reports.
pub trait UsageBackend: Send {
    fn check_now(&mut self) -> Result<Vec<UsageReport>>;

    /// Replace the configured limits (config reload). Default: ignore.
    fn update_config(&mut self, _config: &BackendConfig) {}
}

// ──────────────────── limits ────────────────────

#[derive(Debug, Clone)]
struct LimitEntry {
    max_usage_percent: u8,
    signaled: UsageState,
    check_tag: u64,
}

/// Per-mount limits with signaled-state hysteresis.
#[derive(Debug, Clone, Default)]
pub struct UsageLimits {
    entries: BTreeMap<String, LimitEntry>,
    check_tag: u64,
}

impl UsageLimits {
    #[must_use]
    pub fn new(limits: &BTreeMap<String, u8>) -> Self {
        let entries = limits
            .iter()
            .map(|(mount, max)| {
                (
                    normalize_mount(mount),
                    LimitEntry {
                        max_usage_percent: *max,
                        signaled: UsageState::Undefined,
                        check_tag: 0,
                    },
                )
            })
            .collect();
        Self {
            entries,
            check_tag: 0,
        }
    }

    /// Swap in new limits, keeping the signaled state of mounts that remain.
    pub fn replace(&mut self, limits: &BTreeMap<String, u8>) {
        let mut next = Self::new(limits);
        for (mount, entry) in &mut next.entries {
            if let Some(old) = self.entries.get(mount) {
                entry.signaled = old.signaled;
            }
        }
        next.check_tag = self.check_tag;
        *self = next;
    }

    #[must_use]
    pub fn has_limit(&self, mount: &str) -> bool {
        self.entries.contains_key(mount)
    }

    /// Signaled state for `mount`, if it has a limit.
    #[must_use]
    pub fn state(&self, mount: &str) -> Option<UsageState> {
        self.entries.get(mount).map(|e| e.signaled)
    }

    /// Evaluate one check's worth of samples and return the reports to signal.
    pub fn evaluate(&mut self, samples: &[MountSample]) -> Vec<UsageReport> {
        self.check_tag = self.check_tag.wrapping_add(1);
        let tag = self.check_tag;
        let mut reports = Vec::new();

        for sample in samples {
            let Some(entry) = self.entries.get_mut(&sample.mount) else {
                continue;
            };
            // Bind mounts can list the same target twice.
            if entry.check_tag == tag {
                continue;
            }
            entry.check_tag = tag;

            if sample.percent_used >= entry.max_usage_percent {
                eprintln!(
                    "[DMON-BACKEND] disk space usage ({}%) for ({}) exceeds the limit ({}%)",
                    sample.percent_used, sample.mount, entry.max_usage_percent
                );
                entry.signaled = UsageState::Warning;
            } else if entry.signaled != UsageState::Normal {
                if entry.signaled != UsageState::Undefined {
                    eprintln!(
                        "[DMON-BACKEND] disk space usage ({}%) for ({}) within the limit ({}%)",
                        sample.percent_used, sample.mount, entry.max_usage_percent
                    );
                }
                entry.signaled = UsageState::Normal;
            } else {
                continue;
            }

            reports.push(UsageReport {
                path: sample.mount.clone(),
                percent_used: sample.percent_used,
                state: entry.signaled,
            });
        }

        reports
    }
}

// ──────────────────── statvfs backend ────────────────────

/// Backend that walks the mount table, measures every mount that has a limit
/// and applies [`UsageLimits`] to the results.
pub struct StatvfsBackend {
    platform: Arc<dyn Platform>,
    limits: UsageLimits,
}

impl StatvfsBackend {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, config: &BackendConfig) -> Self {
        Self {
            platform,
            limits: UsageLimits::new(&config.limits),
        }
    }

    /// Backend over the host platform.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Ok(Self::new(detect_platform()?, config))
    }

    /// Measure mounts that have a limit, in mount-table order. A mount whose
    /// stats cannot be read is skipped, as is one that reports zero blocks.
    fn sample_mounts(&self) -> Result<Vec<MountSample>> {
        let mounts = self.platform.mount_points()?;
        let mut seen = HashSet::new();
        let mut samples = Vec::new();

        for mount in mounts {
            let key = normalize_mount(&mount.path.to_string_lossy());
            if !self.limits.has_limit(&key) || !seen.insert(key.clone()) {
                continue;
            }
            let stats = match self.platform.mount_stats(&mount.path) {
                Ok(stats) => stats,
                Err(err) => {
                    eprintln!("[DMON-BACKEND] skipping {key}: {err}");
                    continue;
                }
            };
            let Some(percent_used) = stats.used_percent() else {
                continue;
            };
            samples.push(MountSample {
                mount: key,
                percent_used,
            });
        }

        Ok(samples)
    }
}

impl UsageBackend for StatvfsBackend {
    fn check_now(&mut self) -> Result<Vec<UsageReport>> {
        let samples = self.sample_mounts()?;
        Ok(self.limits.evaluate(&samples))
    }

    fn update_config(&mut self, config: &BackendConfig) {
        self.limits.replace(&config.limits);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::platform::pal::{MockPlatform, MountStats};

    fn limits() -> UsageLimits {
        UsageLimits::new(&BTreeMap::from([
            ("/".to_string(), 90),
            ("/tmp".to_string(), 70),
        ]))
    }

    fn sample(mount: &str, pct: u8) -> MountSample {
        MountSample {
            mount: mount.to_string(),
            percent_used: pct,
        }
    }

    #[test]
    fn first_check_reports_normal_once() {
        let mut limits = limits();
        let first = limits.evaluate(&[sample("/", 40), sample("/tmp", 10)]);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|r| r.state == UsageState::Normal));

        let second = limits.evaluate(&[sample("/", 41), sample("/tmp", 11)]);
        assert!(second.is_empty());
    }

    #[test]
    fn over_limit_is_reported_every_check() {
        let mut limits = limits();
        for _ in 0..3 {
            let reports = limits.evaluate(&[sample("/tmp", 75)]);
            assert_eq!(
                reports,
                vec![UsageReport {
                    path: "/tmp".to_string(),
                    percent_used: 75,
                    state: UsageState::Warning,
                }]
            );
        }
    }

    #[test]
    fn recovery_is_reported_once() {
        let mut limits = limits();
        let _ = limits.evaluate(&[sample("/", 95)]);
        assert_eq!(limits.state("/"), Some(UsageState::Warning));

        let recovered = limits.evaluate(&[sample("/", 80)]);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].state, UsageState::Normal);
        assert!(limits.evaluate(&[sample("/", 80)]).is_empty());
    }

    #[test]
    fn mounts_without_limits_are_ignored() {
        let mut limits = limits();
        assert!(limits.evaluate(&[sample("/data", 99)]).is_empty());
    }

    #[test]
    fn duplicate_rows_checked_once_per_check() {
        let mut limits = limits();
        let reports = limits.evaluate(&[sample("/tmp", 80), sample("/tmp", 80)]);
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn replace_keeps_state_of_surviving_mounts() {
        let mut limits = limits();
        let _ = limits.evaluate(&[sample("/", 95), sample("/tmp", 10)]);
        limits.replace(&BTreeMap::from([("/".to_string(), 99)]));
        assert_eq!(limits.state("/"), Some(UsageState::Warning));
        assert_eq!(limits.state("/tmp"), None);

        // 95% is now within the raised limit: recovery is signaled.
        let reports = limits.evaluate(&[sample("/", 95)]);
        assert_eq!(reports[0].state, UsageState::Normal);
    }

    const MOUNT_TABLE: &str = "/dev/sda1 / ext4 rw 0 0\n\
                               tmpfs /tmp tmpfs rw 0 0\n\
                               /dev/sdb1 /data ext4 rw 0 0\n\
                               tmpfs /run tmpfs rw 0 0\n\
                               /dev/sda1 / ext4 rw 0 0\n";

    fn backend(stats: &[(&str, u64, u64)], limits: &[(&str, u8)]) -> StatvfsBackend {
        let stats = stats
            .iter()
            .map(|(mount, blocks, blocks_free)| {
                (
                    PathBuf::from(mount),
                    MountStats {
                        blocks: *blocks,
                        blocks_free: *blocks_free,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        let config = BackendConfig {
            limits: limits
                .iter()
                .map(|(mount, max)| ((*mount).to_string(), *max))
                .collect(),
        };
        StatvfsBackend::new(
            Arc::new(MockPlatform::from_mount_table(MOUNT_TABLE, stats)),
            &config,
        )
    }

    #[test]
    fn statvfs_backend_measures_limited_mounts_in_table_order() {
        let mut backend = backend(
            &[("/", 1000, 55), ("/tmp", 200, 190), ("/data", 100, 1)],
            &[("/tmp", 70), ("/", 90)],
        );
        let reports = backend.check_now().expect("check should run");
        assert_eq!(
            reports,
            vec![
                UsageReport {
                    path: "/".to_string(),
                    percent_used: 95,
                    state: UsageState::Warning,
                },
                UsageReport {
                    path: "/tmp".to_string(),
                    percent_used: 5,
                    state: UsageState::Normal,
                },
            ]
        );
    }

    #[test]
    fn statvfs_backend_rounds_percentages_half_up() {
        // 44.5% used on a 90% limit.
        let mut backend = backend(&[("/", 1000, 555)], &[("/", 90)]);
        let reports = backend.check_now().expect("check should run");
        assert_eq!(reports[0].percent_used, 45);
    }

    #[test]
    fn statvfs_backend_skips_unreadable_and_empty_mounts() {
        // /run has no stats (stat failure); /tmp reports zero blocks.
        let mut backend = backend(
            &[("/", 100, 50), ("/tmp", 0, 0)],
            &[("/", 90), ("/tmp", 70), ("/run", 70)],
        );
        let reports = backend.check_now().expect("one bad mount must not fail the check");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].path, "/");
        assert_eq!(backend.limits.state("/tmp"), Some(UsageState::Undefined));
        assert_eq!(backend.limits.state("/run"), Some(UsageState::Undefined));
    }

    #[test]
    fn statvfs_backend_reports_duplicate_mounts_once() {
        let mut backend = backend(&[("/", 100, 1)], &[("/", 90)]);
        let reports = backend.check_now().expect("check should run");
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn statvfs_backend_applies_reloaded_limits() {
        let mut backend = backend(&[("/", 100, 20)], &[("/", 90)]);
        let first = backend.check_now().expect("check should run");
        assert_eq!(first[0].state, UsageState::Normal);

        backend.update_config(&BackendConfig {
            limits: BTreeMap::from([("/".to_string(), 75)]),
        });
        let second = backend.check_now().expect("check should run");
        assert_eq!(second[0].state, UsageState::Warning);
        assert_eq!(second[0].percent_used, 80);
    }

    #[test]
    fn statvfs_backend_without_limits_measures_nothing() {
        let mut backend = backend(&[("/", 100, 1)], &[]);
        assert!(backend.check_now().expect("check should run").is_empty());
    }
}
