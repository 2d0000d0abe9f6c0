//! Procfs Mount Table
//!
//! Reads mount entries from `/proc/mounts` and filesystem statistics via
//! `statvfs(3)`.

use std::ffi::CString;
use std::fs;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::domain::{FsStats, MountEntry, MountTable};
use crate::error::{Error, Result};

/// Configuration for the procfs mount table
#[derive(Debug, Clone)]
pub struct ProcMountsConfig {
    /// Mount table file
    pub path: PathBuf,
}

impl Default for ProcMountsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/proc/mounts"),
        }
    }
}

/// Mount table backed by procfs.
#[derive(Debug, Clone, Default)]
pub struct ProcMounts {
    config: ProcMountsConfig,
}

impl ProcMounts {
    pub fn new(config: ProcMountsConfig) -> Self {
        Self { config }
    }
}

impl MountTable for ProcMounts {
    fn entries(&self) -> Result<Vec<MountEntry>> {
        let contents = fs::read_to_string(&self.config.path).map_err(|e| {
            Error::MountTableUnavailable(format!("{}: {}", self.config.path.display(), e))
        })?;
        Ok(parse_mounts(&contents))
    }

    fn stats(&self, mount_point: &Path) -> Result<FsStats> {
        statvfs(mount_point)
    }
}

/// Parse fstab-formatted mount entries, skipping lines that are too short.
pub fn parse_mounts(input: &str) -> Vec<MountEntry> {
    input
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry::new(
                unescape_mount_field(source),
                unescape_mount_field(mount_point),
                fs_type,
            ))
        })
        .collect()
}

/// Undo the kernel's octal escaping of spaces, tabs and backslashes.
fn unescape_mount_field(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1..index + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            if let Ok(num) = u8::from_str_radix(&value[index + 1..index + 4], 8) {
                output.push(num);
                index += 4;
                continue;
            }
        }
        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}

fn statvfs(mount_point: &Path) -> Result<FsStats> {
    let path = CString::new(mount_point.as_os_str().as_bytes()).map_err(|_| {
        Error::MountTableUnavailable(format!(
            "mount point contains NUL byte: {:?}",
            mount_point
        ))
    })?;

    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let rc = unsafe { libc::statvfs(path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(Error::MountTableUnavailable(format!(
            "statvfs failed for {}: {}",
            mount_point.display(),
            std::io::Error::last_os_error()
        )));
    }

    let stat = unsafe { stat.assume_init() };
    Ok(FsStats {
        block_size: stat.f_bsize as u64,
        total_blocks: stat.f_blocks as u64,
        available_blocks: stat.f_bavail as u64,
    })
}
