//! Precompiled launcher stub payloads
//!
//! Stubs are stored raw-deflate compressed and keyed by an id such as
//! `windows-i686` or `mac-app-ppc`. They are decompressed on demand; callers
//! pass a [`LauncherSource`] in rather than reaching for a global table.

use crate::exceptions::{ProjectorError, Result};
use flate2::read::DeflateDecoder;
use log::{debug, trace};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Directory of compressed launcher payloads when none is configured
pub const LAUNCHERS_ENV: &str = "DIR_PROJECTOR_LAUNCHERS";

/// File extension of compressed payloads inside a launcher directory
pub const LAUNCHER_EXTENSION: &str = "deflate";

/// Windows 32-bit launcher
pub const WINDOWS_I686: &str = "windows-i686";

/// Windows 64-bit launcher
pub const WINDOWS_X86_64: &str = "windows-x86_64";

/// Thin PowerPC Mac app launcher
pub const MAC_APP_PPC: &str = "mac-app-ppc";

/// Thin Intel 32-bit Mac app launcher
pub const MAC_APP_I386: &str = "mac-app-i386";

/// Supplies decompressed launcher stubs by id
pub trait LauncherSource: std::fmt::Debug {
    /// Decompressed launcher bytes for `id`
    fn launcher(&self, id: &str) -> Result<Vec<u8>>;
}

fn inflate(id: &str, compressed: &[u8]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    DeflateDecoder::new(compressed)
        .read_to_end(&mut data)
        .map_err(|e| ProjectorError::MissingLauncher(format!("{id}: {e}")))?;
    trace!("🚀 Inflated launcher {id}: {} -> {} bytes", compressed.len(), data.len());
    Ok(data)
}

/// Launchers stored as `<dir>/<id>.deflate`
#[derive(Debug, Clone)]
pub struct LauncherDirectory {
    root: PathBuf,
}

impl LauncherDirectory {
    /// Use an explicit directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LauncherDirectory { root: root.into() }
    }

    /// Use `explicit` if given, else the `DIR_PROJECTOR_LAUNCHERS` directory
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        match env::var_os(LAUNCHERS_ENV) {
            Some(dir) => {
                debug!("🚀 Launchers from {LAUNCHERS_ENV}={}", PathBuf::from(&dir).display());
                Ok(Self::new(dir))
            }
            None => Err(ProjectorError::MissingLauncher(format!(
                "no launcher directory configured (set {LAUNCHERS_ENV})"
            ))),
        }
    }

    /// Path of the payload for `id`
    pub fn payload_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{LAUNCHER_EXTENSION}"))
    }
}

impl LauncherSource for LauncherDirectory {
    fn launcher(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.payload_path(id);
        let compressed = fs::read(&path).map_err(|e| {
            ProjectorError::MissingLauncher(format!("{id} ({}): {e}", path.display()))
        })?;
        inflate(id, &compressed)
    }
}

/// Compressed launchers held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLaunchers {
    payloads: HashMap<String, Vec<u8>>,
}

impl MemoryLaunchers {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw-deflate payload under `id`
    pub fn insert_compressed(&mut self, id: impl Into<String>, compressed: Vec<u8>) {
        self.payloads.insert(id.into(), compressed);
    }
}

impl LauncherSource for MemoryLaunchers {
    fn launcher(&self, id: &str) -> Result<Vec<u8>> {
        let compressed = self
            .payloads
            .get(id)
            .ok_or_else(|| ProjectorError::MissingLauncher(id.to_string()))?;
        inflate(id, compressed)
    }
}

#[cfg(test)]
pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_launchers_inflate() {
        let mut launchers = MemoryLaunchers::new();
        launchers.insert_compressed(MAC_APP_PPC, deflate(b"ppc stub"));
        assert_eq!(launchers.launcher(MAC_APP_PPC).unwrap(), b"ppc stub");
        assert!(matches!(
            launchers.launcher(MAC_APP_I386),
            Err(ProjectorError::MissingLauncher(_))
        ));
    }

    #[test]
    fn test_launcher_directory_reads_deflate_files() {
        let dir = tempfile::tempdir().unwrap();
        let launchers = LauncherDirectory::new(dir.path());
        fs::write(launchers.payload_path(WINDOWS_I686), deflate(b"MZ stub")).unwrap();
        assert_eq!(launchers.launcher(WINDOWS_I686).unwrap(), b"MZ stub");
        assert!(launchers.launcher(WINDOWS_X86_64).is_err());
    }

    #[test]
    fn test_corrupt_payload_is_missing_launcher() {
        let mut launchers = MemoryLaunchers::new();
        launchers.insert_compressed(WINDOWS_I686, vec![0xff, 0xff, 0xff]);
        assert!(matches!(
            launchers.launcher(WINDOWS_I686),
            Err(ProjectorError::MissingLauncher(_))
        ));
    }

    #[test]
    fn test_resolve_prefers_explicit_directory() {
        let launchers = LauncherDirectory::resolve(Some(Path::new("/opt/launchers"))).unwrap();
        assert_eq!(
            launchers.payload_path(MAC_APP_I386),
            PathBuf::from("/opt/launchers/mac-app-i386.deflate")
        );
    }
}
