//! Skeleton archive readers
//!
//! Every skeleton container (directory tree, zip, tar, tar.gz or disk image)
//! is read the same way: a single streaming pass that hands each entry to a
//! visitor, one at a time. Entries can be read into memory or extracted to a
//! destination path; nothing supports random access.

pub mod dir;
pub mod hdi;
pub mod tarball;
pub mod zipfile;

pub use dir::DirArchive;
pub use hdi::HdiArchive;
pub use tarball::TarArchive;
pub use zipfile::ZipArchive;

use crate::exceptions::{ProjectorError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Type of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Mac resource fork or AppleDouble sidecar
    ResourceFork,
}

/// Metadata of an archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Forward-slash path relative to the archive root, no trailing slash
    pub volume_path: String,
    /// Entry type
    pub kind: EntryKind,
    /// Payload size in bytes
    pub size: u64,
    /// POSIX permission bits
    pub mode: u32,
    /// Link target for symlinks
    pub link: Option<PathBuf>,
}

/// One entry handed to an [`Archive`] visitor
pub trait Entry {
    /// Entry metadata
    fn info(&self) -> &EntryInfo;

    /// Read the whole payload
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Write the entry to `dest`, creating parents and keeping the mode
    fn extract(&mut self, dest: &Path) -> Result<()>;
}

/// Visitor called once per entry, in archive order
pub type Visitor<'v> = dyn FnMut(&mut dyn Entry) -> Result<()> + 'v;

/// A readable skeleton container
pub trait Archive: std::fmt::Debug {
    /// Visit every entry once; a visitor error stops the pass
    fn read(&mut self, visitor: &mut Visitor<'_>) -> Result<()>;
}

/// Options for opening skeleton archives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// Mount disk images without showing them in the Finder
    pub nobrowse: bool,
    /// Disk image tool, located on `PATH` when unset
    pub hdiutil: Option<PathBuf>,
}

/// Open a skeleton by sniffing directory-ness and file extension
///
/// # Errors
/// `SkeletonNotFileOrDirectory` when the path is missing or special,
/// `UnsupportedSkeletonFormat` for an unknown file extension.
pub fn open_archive(path: &Path, options: &ArchiveOptions) -> Result<Box<dyn Archive>> {
    let metadata = fs::metadata(path)
        .map_err(|_| ProjectorError::SkeletonNotFileOrDirectory(path.to_path_buf()))?;

    if metadata.is_dir() {
        debug!("📂 Skeleton is a directory: {}", path.display());
        return Ok(Box::new(DirArchive::new(path)));
    }
    if !metadata.is_file() {
        return Err(ProjectorError::SkeletonNotFileOrDirectory(path.to_path_buf()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let archive: Box<dyn Archive> = if name.ends_with(".zip") {
        Box::new(ZipArchive::new(path))
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Box::new(TarArchive::gzip(path))
    } else if name.ends_with(".tar") {
        Box::new(TarArchive::new(path))
    } else if name.ends_with(".dmg") {
        Box::new(HdiArchive::new(path, options.clone()))
    } else {
        return Err(ProjectorError::UnsupportedSkeletonFormat(path.to_path_buf()));
    };
    debug!("📦 Skeleton archive: {archive:?}");
    Ok(archive)
}

/// True for AppleDouble (`._name`) sidecars and `__MACOSX` members
pub(crate) fn is_apple_double(volume_path: &str) -> bool {
    volume_path.starts_with("__MACOSX/")
        || volume_path == "__MACOSX"
        || crate::utils::volume_basename(volume_path).starts_with("._")
}

/// Reject member paths that are absolute or contain `..`
pub(crate) fn check_entry_path(path: &Path) -> Result<()> {
    let unsafe_component = path.components().any(|component| {
        matches!(component, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    });
    if unsafe_component {
        return Err(ProjectorError::UnsafeEntryPath(path.to_string_lossy().into_owned()));
    }
    Ok(())
}

fn create_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Copy `source` into a new file at `dest` with `mode`
pub(crate) fn write_file(dest: &Path, source: &mut dyn Read, mode: u32) -> Result<()> {
    create_parent(dest)?;
    let mut file = fs::File::create(dest)?;
    io::copy(source, &mut file)?;
    drop(file);
    set_mode(dest, mode)
}

pub(crate) fn create_directory(dest: &Path, mode: u32) -> Result<()> {
    fs::create_dir_all(dest)?;
    set_mode(dest, mode | 0o700)
}

#[cfg(unix)]
pub(crate) fn create_symlink(target: &Path, dest: &Path) -> Result<()> {
    create_parent(dest)?;
    std::os::unix::fs::symlink(target, dest)?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn create_symlink(target: &Path, dest: &Path) -> Result<()> {
    Err(ProjectorError::Generic(format!(
        "Cannot create symlink {} -> {} on this platform",
        dest.display(),
        target.display()
    )))
}

/// Default mode for archives that carry none
pub(crate) fn default_mode(kind: EntryKind) -> u32 {
    match kind {
        EntryKind::Directory => 0o755,
        _ => 0o644,
    }
}

/// Extract or read an entry given only its metadata and a payload reader
pub(crate) fn extract_with(
    info: &EntryInfo,
    dest: &Path,
    payload: &mut dyn Read,
) -> Result<()> {
    match info.kind {
        EntryKind::Directory => create_directory(dest, info.mode),
        EntryKind::Symlink => {
            let target = info.link.as_deref().ok_or_else(|| {
                ProjectorError::Generic(format!("Symlink without target: {}", info.volume_path))
            })?;
            create_symlink(target, dest)
        }
        EntryKind::File | EntryKind::ResourceFork => write_file(dest, payload, info.mode),
    }
}
