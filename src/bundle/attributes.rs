//! Resource attributes: timestamps and the user executable bit

use crate::exceptions::Result;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use log::trace;
use serde::{Deserialize, Serialize};
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

/// User execute permission bit
pub const USER_EXEC: u32 = 0o100;

/// How a resource is written and which attributes it gets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceOptions {
    /// Access time to set
    pub atime: Option<DateTime<Utc>>,
    /// Take the access time from the source
    pub atime_copy: bool,
    /// Modification time to set
    pub mtime: Option<DateTime<Utc>>,
    /// Take the modification time from the source
    pub mtime_copy: bool,
    /// Set or clear the user executable bit
    pub executable: Option<bool>,
    /// Take the executable bit from the source
    pub executable_copy: bool,
    /// An existing directory at the destination is reused
    pub merge: bool,
    /// Copy a directory without its contents
    pub no_recurse: bool,
}

impl ResourceOptions {
    /// True when any attribute would be written
    pub fn has_attributes(&self) -> bool {
        self.has_times() || self.executable.is_some()
    }

    /// True when a timestamp would be written
    pub fn has_times(&self) -> bool {
        self.atime.is_some() || self.mtime.is_some()
    }

    /// Resolve the `*_copy` flags against the source metadata.
    ///
    /// `metadata` is only called when a flag needs it, at most once.
    pub fn expand_copy(
        &self,
        metadata: impl FnOnce() -> std::io::Result<Metadata>,
    ) -> Result<Self> {
        let mut expanded = self.clone();
        let needs_source = (expanded.atime.is_none() && expanded.atime_copy)
            || (expanded.mtime.is_none() && expanded.mtime_copy)
            || (expanded.executable.is_none() && expanded.executable_copy);
        if !needs_source {
            return Ok(expanded);
        }

        let source = metadata()?;
        if expanded.atime.is_none() && expanded.atime_copy {
            expanded.atime = Some(date_time(FileTime::from_last_access_time(&source)));
        }
        if expanded.mtime.is_none() && expanded.mtime_copy {
            expanded.mtime = Some(date_time(FileTime::from_last_modification_time(&source)));
        }
        if expanded.executable.is_none() && expanded.executable_copy {
            expanded.executable = Some(is_executable(&source));
        }
        Ok(expanded)
    }
}

fn date_time(time: FileTime) -> DateTime<Utc> {
    DateTime::from_timestamp(time.unix_seconds(), time.nanoseconds()).unwrap_or_default()
}

fn file_time(time: &DateTime<Utc>) -> FileTime {
    FileTime::from_unix_time(time.timestamp(), time.timestamp_subsec_nanos())
}

#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & USER_EXEC != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &Metadata) -> bool {
    false
}

/// `mode` with the user executable bit set or cleared
pub fn with_executable(mode: u32, executable: bool) -> u32 {
    if executable { mode | USER_EXEC } else { mode & !USER_EXEC }
}

#[cfg(unix)]
fn set_executable(path: &Path, metadata: &Metadata, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = with_executable(metadata.permissions().mode(), executable);
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _metadata: &Metadata, _executable: bool) -> Result<()> {
    Ok(())
}

/// Apply the executable bit and timestamps of `options` to `path`.
///
/// Directories never get the executable bit. Symlinks keep their own mode
/// and have their own times changed, not their target's.
pub fn apply(path: &Path, options: &ResourceOptions) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();

    if let Some(executable) = options.executable {
        if !file_type.is_dir() && !file_type.is_symlink() {
            set_executable(path, &metadata, executable)?;
        }
    }

    if options.has_times() {
        let atime = options
            .atime
            .as_ref()
            .map_or_else(|| FileTime::from_last_access_time(&metadata), file_time);
        let mtime = options
            .mtime
            .as_ref()
            .map_or_else(|| FileTime::from_last_modification_time(&metadata), file_time);
        trace!("🕒 Setting times of {}", path.display());
        if file_type.is_symlink() {
            filetime::set_symlink_file_times(path, atime, mtime)?;
        } else {
            filetime::set_file_times(path, atime, mtime)?;
        }
    }
    Ok(())
}

/// Directory attribute writes held until the bundle closes
///
/// Deeper paths run first so writing into a child cannot disturb the times
/// already set on its parent.
#[derive(Debug, Default)]
pub struct DeferredAttributes {
    queue: Vec<(PathBuf, ResourceOptions)>,
}

impl DeferredAttributes {
    /// Queue `options` for the absolute `path`
    pub fn push(&mut self, path: PathBuf, options: ResourceOptions) {
        self.queue.push((path, options));
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Nothing queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Apply every queued write, longest path first
    pub fn run(&mut self) -> Result<()> {
        let mut queue = std::mem::take(&mut self.queue);
        queue.sort_by_key(|(path, _)| std::cmp::Reverse(path.as_os_str().len()));
        for (path, options) in &queue {
            apply(path, options)?;
        }
        Ok(())
    }
}
