//! Tar and gzip-compressed tar skeletons

use super::{
    Archive, Entry, EntryInfo, EntryKind, Visitor, check_entry_path, extract_with, is_apple_double,
};
use crate::exceptions::{ProjectorError, Result};
use flate2::read::GzDecoder;
use log::trace;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Streams a `.tar`, `.tar.gz` or `.tgz` file
#[derive(Debug, Clone)]
pub struct TarArchive {
    path: PathBuf,
    gzip: bool,
}

impl TarArchive {
    /// Uncompressed tar
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TarArchive {
            path: path.into(),
            gzip: false,
        }
    }

    /// Gzip-compressed tar
    pub fn gzip(path: impl Into<PathBuf>) -> Self {
        TarArchive {
            path: path.into(),
            gzip: true,
        }
    }
}

/// Normalize a member name to a volume path
fn volume_path(raw: &Path) -> String {
    let text = raw.to_string_lossy().replace('\\', "/");
    let mut path = text.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.trim_end_matches('/').to_string()
}

impl Archive for TarArchive {
    fn read(&mut self, visitor: &mut Visitor<'_>) -> Result<()> {
        trace!("📦 Reading tar {} (gzip: {})", self.path.display(), self.gzip);
        let file = BufReader::new(File::open(&self.path)?);
        let reader: Box<dyn Read> = if self.gzip {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut archive = ::tar::Archive::new(reader);

        for entry in archive.entries()? {
            let entry = entry?;
            let header = entry.header();
            let path = volume_path(&entry.path()?);
            if path.is_empty() || path == "." {
                continue;
            }
            check_entry_path(Path::new(&path))?;

            let entry_type = header.entry_type();
            let (kind, link) = if entry_type.is_dir() {
                (EntryKind::Directory, None)
            } else if entry_type.is_symlink() {
                let target = entry.link_name()?.ok_or_else(|| {
                    ProjectorError::Generic(format!("Symlink without target: {path}"))
                })?;
                (EntryKind::Symlink, Some(target.into_owned()))
            } else if entry_type.is_file() {
                let kind = if is_apple_double(&path) {
                    EntryKind::ResourceFork
                } else {
                    EntryKind::File
                };
                (kind, None)
            } else {
                trace!("Skipping tar member {path} ({entry_type:?})");
                continue;
            };

            let info = EntryInfo {
                volume_path: path,
                kind,
                size: header.size()?,
                mode: header.mode()? & 0o7777,
                link,
            };
            let mut tar_entry = TarEntry { entry, info };
            visitor(&mut tar_entry)?;
        }
        Ok(())
    }
}

struct TarEntry<'a, R: Read> {
    entry: ::tar::Entry<'a, R>,
    info: EntryInfo,
}

impl<R: Read> Entry for TarEntry<'_, R> {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(usize::try_from(self.info.size).unwrap_or(0));
        self.entry.read_to_end(&mut data)?;
        Ok(data)
    }

    fn extract(&mut self, dest: &Path) -> Result<()> {
        extract_with(&self.info, dest, &mut self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixture;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_volume_path() {
        assert_eq!(volume_path(Path::new("./xtras/")), "xtras");
        assert_eq!(volume_path(Path::new("a/b")), "a/b");
    }

    #[test]
    fn test_tar_listing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skeleton.tar");
        fixture::write_tar(&path, false);
        let listing = fixture::listing(&mut TarArchive::new(&path));
        let expected: Vec<_> = fixture::ENTRIES.iter().map(|(p, _)| p.to_string()).collect();
        let paths: Vec<_> = listing.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(paths, expected);
        assert_eq!(listing[1].1, EntryKind::Directory);
    }

    #[test]
    fn test_tar_gz_extract() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skeleton.tar.gz");
        fixture::write_tar(&path, true);
        let out = temp.path().join("out");
        TarArchive::gzip(&path)
            .read(&mut |entry| {
                let dest = out.join(&entry.info().volume_path);
                entry.extract(&dest)
            })
            .unwrap();
        assert_eq!(
            fs::read(out.join("xtras/Shockwave 3D Asset.x32")).unwrap(),
            b"3d xtra"
        );
    }

    fn raw_member_tar(dest: &Path, name: &str, data: &[u8]) {
        let mut builder = ::tar::Builder::new(fs::File::create(dest).unwrap());
        let mut header = ::tar::Header::new_gnu();
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_entry_type(::tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, data).unwrap();
        builder.finish().unwrap();
    }

    #[test]
    fn test_tar_member_outside_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skeleton.tar");
        raw_member_tar(&path, "xtras/../../escaped.txt", b"escaped");

        let out = temp.path().join("work/out");
        let err = TarArchive::new(&path)
            .read(&mut |entry| {
                let dest = out.join(&entry.info().volume_path);
                entry.extract(&dest)
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectorError::UnsafeEntryPath(ref p) if p == "xtras/../../escaped.txt"
        ));
        assert!(!temp.path().join("escaped.txt").exists());
        assert!(!temp.path().join("work/escaped.txt").exists());
    }

    #[test]
    fn test_tar_absolute_member_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skeleton.tar");
        raw_member_tar(&path, "/tmp/escaped.txt", b"escaped");

        let err = TarArchive::new(&path).read(&mut |_| Ok(())).unwrap_err();
        assert!(matches!(err, ProjectorError::UnsafeEntryPath(_)));
    }

    #[test]
    fn test_apple_double_member_is_resource_fork() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("forks.tar");
        let mut builder = ::tar::Builder::new(fs::File::create(&path).unwrap());
        let mut header = ::tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "Contents/._Info.plist", &b"fork"[..])
            .unwrap();
        builder.finish().unwrap();

        let listing = fixture::listing(&mut TarArchive::new(&path));
        assert_eq!(
            listing,
            vec![("Contents/._Info.plist".to_string(), EntryKind::ResourceFork)]
        );
    }
}
