//! Plain directory trees (and mounted disk images)

use super::{Archive, Entry, EntryInfo, EntryKind, Visitor, extract_with, is_apple_double};
use crate::exceptions::{ProjectorError, Result};
use log::trace;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads a directory in sorted order, parents before children
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    /// Read the tree under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirArchive { root: root.into() }
    }

    fn walk(&self, dir: &Path, prefix: &str, visitor: &mut Visitor<'_>) -> Result<()> {
        let mut names = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();

        for name in names {
            let path = dir.join(&name);
            let name = name.to_string_lossy();
            let volume_path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            };

            let metadata = fs::symlink_metadata(&path)?;
            let file_type = metadata.file_type();
            let (kind, link) = if file_type.is_symlink() {
                (EntryKind::Symlink, Some(fs::read_link(&path)?))
            } else if file_type.is_dir() {
                (EntryKind::Directory, None)
            } else if file_type.is_file() && is_apple_double(&volume_path) {
                (EntryKind::ResourceFork, None)
            } else if file_type.is_file() {
                (EntryKind::File, None)
            } else {
                trace!("Skipping special file {}", path.display());
                continue;
            };

            let mut entry = DirEntry {
                path: path.clone(),
                info: EntryInfo {
                    volume_path: volume_path.clone(),
                    kind,
                    size: if file_type.is_file() { metadata.len() } else { 0 },
                    mode: file_mode(&metadata, kind),
                    link,
                },
            };
            visitor(&mut entry)?;

            if kind == EntryKind::Directory {
                self.walk(&path, &volume_path, visitor)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata, _kind: EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata, kind: EntryKind) -> u32 {
    super::default_mode(kind)
}

impl Archive for DirArchive {
    fn read(&mut self, visitor: &mut Visitor<'_>) -> Result<()> {
        trace!("📂 Walking {}", self.root.display());
        let root = self.root.clone();
        self.walk(&root, "", visitor)
    }
}

struct DirEntry {
    path: PathBuf,
    info: EntryInfo,
}

impl Entry for DirEntry {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        match self.info.kind {
            EntryKind::File | EntryKind::ResourceFork => Ok(fs::read(&self.path)?),
            _ => Err(ProjectorError::Generic(format!(
                "Not a file: {}",
                self.info.volume_path
            ))),
        }
    }

    fn extract(&mut self, dest: &Path) -> Result<()> {
        match self.info.kind {
            EntryKind::File | EntryKind::ResourceFork => {
                let mut source = fs::File::open(&self.path)?;
                extract_with(&self.info, dest, &mut source)
            }
            _ => extract_with(&self.info, dest, &mut std::io::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixture;
    use tempfile::TempDir;

    #[test]
    fn test_walk_order() {
        let temp = TempDir::new().unwrap();
        fixture::write_dir(temp.path());
        let mut archive = DirArchive::new(temp.path());
        let listing = fixture::listing(&mut archive);
        let paths: Vec<_> = listing.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Projec32.skl",
                "xtras",
                "xtras/Net",
                "xtras/Net/INetURL.x32",
                "xtras/Shockwave 3D Asset.x32",
            ]
        );
        assert_eq!(listing[1].1, EntryKind::Directory);
    }

    #[test]
    fn test_read_and_extract() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir(&source).unwrap();
        fixture::write_dir(&source);
        let out = temp.path().join("out");

        let mut archive = DirArchive::new(&source);
        archive
            .read(&mut |entry| {
                if entry.info().volume_path == "xtras/Net/INetURL.x32" {
                    assert_eq!(entry.read()?, b"net xtra");
                }
                let dest = out.join(&entry.info().volume_path);
                entry.extract(&dest)
            })
            .unwrap();
        assert_eq!(fs::read(out.join("Projec32.skl")).unwrap(), b"MZ stub");
        assert!(out.join("xtras/Net").is_dir());
    }

    #[test]
    fn test_apple_double_files_are_resource_forks() {
        let temp = TempDir::new().unwrap();
        fixture::write_dir(temp.path());
        fs::write(temp.path().join("._Projec32.skl"), b"fork").unwrap();
        fs::create_dir(temp.path().join("__MACOSX")).unwrap();
        fs::write(temp.path().join("__MACOSX/._INetURL.x32"), b"fork").unwrap();
        fs::write(temp.path().join("xtras/._Net"), b"fork").unwrap();

        let listing = fixture::listing(&mut DirArchive::new(temp.path()));
        let forks: Vec<_> = listing
            .iter()
            .filter(|(_, kind)| *kind == EntryKind::ResourceFork)
            .map(|(path, _)| path.as_str())
            .collect();
        assert_eq!(forks, vec!["._Projec32.skl", "__MACOSX/._INetURL.x32", "xtras/._Net"]);
        assert!(listing.contains(&("Projec32.skl".to_string(), EntryKind::File)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_not_followed() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("target"), b"t").unwrap();
        std::os::unix::fs::symlink("target", temp.path().join("link")).unwrap();

        let mut archive = DirArchive::new(temp.path());
        let mut links = Vec::new();
        archive
            .read(&mut |entry| {
                if entry.info().kind == EntryKind::Symlink {
                    links.push(entry.info().link.clone());
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(links, vec![Some(PathBuf::from("target"))]);
    }
}
