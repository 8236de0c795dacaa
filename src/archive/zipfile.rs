//! Zip skeletons

use super::{
    Archive, Entry, EntryInfo, EntryKind, Visitor, check_entry_path, default_mode, extract_with,
    is_apple_double,
};
use crate::exceptions::{ProjectorError, Result};
use log::trace;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

/// Reads a `.zip` file in central directory order
#[derive(Debug, Clone)]
pub struct ZipArchive {
    path: PathBuf,
}

impl ZipArchive {
    /// Read the zip at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ZipArchive { path: path.into() }
    }
}

fn entry_info(zip: &mut ::zip::ZipArchive<File>, index: usize) -> Result<Option<EntryInfo>> {
    let mut file = zip.by_index(index)?;
    if file.enclosed_name().is_none() {
        return Err(ProjectorError::UnsafeEntryPath(file.name().to_string()));
    }
    let volume_path = file.name().replace('\\', "/").trim_end_matches('/').to_string();
    if volume_path.is_empty() {
        return Ok(None);
    }
    check_entry_path(Path::new(&volume_path))?;
    let unix_mode = file.unix_mode();

    let (kind, link) = if file.is_dir() {
        (EntryKind::Directory, None)
    } else if unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
        let mut target = String::new();
        file.read_to_string(&mut target)?;
        (EntryKind::Symlink, Some(PathBuf::from(target)))
    } else if is_apple_double(&volume_path) {
        (EntryKind::ResourceFork, None)
    } else {
        (EntryKind::File, None)
    };

    Ok(Some(EntryInfo {
        mode: unix_mode.map_or_else(|| default_mode(kind), |mode| mode & 0o7777),
        size: file.size(),
        volume_path,
        kind,
        link,
    }))
}

impl Archive for ZipArchive {
    fn read(&mut self, visitor: &mut Visitor<'_>) -> Result<()> {
        trace!("🗜️ Reading zip {}", self.path.display());
        let mut zip = ::zip::ZipArchive::new(File::open(&self.path)?)?;
        for index in 0..zip.len() {
            let Some(info) = entry_info(&mut zip, index)? else {
                continue;
            };
            let mut entry = ZipEntry {
                zip: &mut zip,
                index,
                info,
            };
            visitor(&mut entry)?;
        }
        Ok(())
    }
}

struct ZipEntry<'a> {
    zip: &'a mut ::zip::ZipArchive<File>,
    index: usize,
    info: EntryInfo,
}

impl Entry for ZipEntry<'_> {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let mut file = self.zip.by_index(self.index)?;
        let mut data = Vec::with_capacity(usize::try_from(self.info.size).unwrap_or(0));
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn extract(&mut self, dest: &Path) -> Result<()> {
        match self.info.kind {
            EntryKind::File | EntryKind::ResourceFork => {
                let mut file = self.zip.by_index(self.index)?;
                extract_with(&self.info, dest, &mut file)
            }
            _ => extract_with(&self.info, dest, &mut std::io::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixture;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_zip_listing_marks_forks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skeleton.zip");
        fixture::write_zip(&path);
        let listing = fixture::listing(&mut ZipArchive::new(&path));

        assert_eq!(listing.len(), fixture::ENTRIES.len() + 1);
        assert_eq!(listing[1], ("xtras".to_string(), EntryKind::Directory));
        assert_eq!(
            listing.last().unwrap(),
            &("__MACOSX/._Projec32.skl".to_string(), EntryKind::ResourceFork)
        );
    }

    #[test]
    fn test_zip_member_outside_root_is_rejected() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skeleton.zip");
        let mut writer = ::zip::ZipWriter::new(fs::File::create(&path).unwrap());
        writer
            .start_file("xtras/../../escaped.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"escaped").unwrap();
        writer.finish().unwrap();

        let out = temp.path().join("work/out");
        let err = ZipArchive::new(&path)
            .read(&mut |entry| {
                let dest = out.join(&entry.info().volume_path);
                entry.extract(&dest)
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectorError::UnsafeEntryPath(ref p) if p == "xtras/../../escaped.txt"
        ));
        assert!(err.is_skeleton_error());
        assert!(!temp.path().join("escaped.txt").exists());
        assert!(!temp.path().join("work/escaped.txt").exists());
    }

    #[test]
    fn test_zip_backslash_member_outside_root_is_rejected() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skeleton.zip");
        let mut writer = ::zip::ZipWriter::new(fs::File::create(&path).unwrap());
        writer
            .start_file("xtras\\..\\..\\escaped.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"escaped").unwrap();
        writer.finish().unwrap();

        let err = ZipArchive::new(&path).read(&mut |_| Ok(())).unwrap_err();
        assert!(matches!(err, ProjectorError::UnsafeEntryPath(_)));
    }

    #[test]
    fn test_zip_read_and_extract() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skeleton.zip");
        fixture::write_zip(&path);
        let out = temp.path().join("out");

        let mut read = Vec::new();
        ZipArchive::new(&path)
            .read(&mut |entry| {
                if entry.info().kind == EntryKind::File {
                    read.push(entry.read()?);
                }
                let dest = out.join(&entry.info().volume_path);
                entry.extract(&dest)
            })
            .unwrap();

        assert_eq!(read[0], b"MZ stub");
        assert_eq!(fs::read(out.join("xtras/Net/INetURL.x32")).unwrap(), b"net xtra");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(out.join("Projec32.skl")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }
}
