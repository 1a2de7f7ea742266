//! PAL trait with the Linux implementation (`/proc/self/mounts` + `statvfs`)
//! and an in-memory mock.

#![allow(missing_docs)]

use std::collections::HashMap;
#[cfg(unix)]
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DiskmonError, Result};

#[cfg(unix)]
const PROC_MOUNTS: &str = "/proc/self/mounts";

/// One row of the mount table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountPoint {
    pub path: PathBuf,
    pub device: String,
    pub fs_type: String,
}

/// Block counts for a mounted filesystem, in fragment-size units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MountStats {
    pub blocks: u64,
    pub blocks_free: u64,
}

impl MountStats {
    /// Used space as a whole percentage, rounded half up. `None` for a
    /// filesystem that reports no blocks.
    #[must_use]
    pub fn used_percent(&self) -> Option<u8> {
        if self.blocks == 0 {
            return None;
        }
        let total = u128::from(self.blocks);
        let used = total.saturating_sub(u128::from(self.blocks_free));
        // (used * 100 / total) + 0.5, truncated.
        let pct = (used * 200 + total) / (total * 2);
        u8::try_from(pct.min(100)).ok()
    }
}

/// Source of the mount table and per-mount block counts.
pub trait Platform: Send + Sync {
    /// Mount table in kernel order.
    fn mount_points(&self) -> Result<Vec<MountPoint>>;
    fn mount_stats(&self, mount: &Path) -> Result<MountStats>;
}

/// Linux platform implementation using `/proc` + `statvfs`.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct LinuxPlatform;

#[cfg(unix)]
impl LinuxPlatform {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Platform for LinuxPlatform {
    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        let raw = fs::read_to_string(PROC_MOUNTS)
            .map_err(|source| DiskmonError::io(PROC_MOUNTS, source))?;
        Ok(parse_proc_mounts(&raw))
    }

    fn mount_stats(&self, mount: &Path) -> Result<MountStats> {
        let stat = nix::sys::statvfs::statvfs(mount).map_err(|error| DiskmonError::FsStats {
            path: mount.to_path_buf(),
            details: error.to_string(),
        })?;
        #[allow(clippy::useless_conversion)]
        let (blocks, blocks_free) = (u64::from(stat.blocks()), u64::from(stat.blocks_free()));
        Ok(MountStats {
            blocks,
            blocks_free,
        })
    }
}

/// In-memory mock implementation for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    mounts: Vec<MountPoint>,
    stats_by_mount: HashMap<PathBuf, MountStats>,
}

impl MockPlatform {
    #[must_use]
    pub const fn new(
        mounts: Vec<MountPoint>,
        stats_by_mount: HashMap<PathBuf, MountStats>,
    ) -> Self {
        Self {
            mounts,
            stats_by_mount,
        }
    }

    /// Mock whose mount table is parsed from `/proc/self/mounts`-formatted text.
    #[must_use]
    pub fn from_mount_table(raw: &str, stats_by_mount: HashMap<PathBuf, MountStats>) -> Self {
        Self::new(parse_proc_mounts(raw), stats_by_mount)
    }
}

impl Platform for MockPlatform {
    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        Ok(self.mounts.clone())
    }

    fn mount_stats(&self, mount: &Path) -> Result<MountStats> {
        self.stats_by_mount
            .get(mount)
            .copied()
            .ok_or_else(|| DiskmonError::FsStats {
                path: mount.to_path_buf(),
                details: "mock stats not found".to_string(),
            })
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(DiskmonError::UnsupportedPlatform {
            details: "only Linux is currently implemented".to_string(),
        })
    }
}

/// Parse `/proc/self/mounts`, keeping kernel order. Lines with fewer than
/// three fields are skipped.
#[must_use]
pub fn parse_proc_mounts(raw: &str) -> Vec<MountPoint> {
    let mut mounts = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            if !line.trim().is_empty() {
                eprintln!("[DMON-PLATFORM] skipping malformed mount table line: {line}");
            }
            continue;
        }
        mounts.push(MountPoint {
            path: unescape_mount_path(fields[1]),
            device: fields[0].to_string(),
            fs_type: fields[2].to_string(),
        });
    }
    mounts
}

/// Decode the kernel's octal escapes (`\NNN`) in a mount path, keeping raw bytes.
fn unescape_mount_path(raw: &str) -> PathBuf {
    let raw_bytes = raw.as_bytes();
    let mut bytes = Vec::with_capacity(raw_bytes.len());
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\'
            && let Some(&[a, b, c]) = raw_bytes.get(i + 1..i + 4)
            && [a, b, c].iter().all(|d| (b'0'..=b'7').contains(d))
        {
            bytes.push((a - b'0') * 64 + (b - b'0') * 8 + (c - b'0'));
            i += 4;
            continue;
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}
