//! In-stream patch descriptors
//!
//! A [`PatchSet`] is computed once per build. While the skeleton streams by,
//! every claimed file entry is tested against each descriptor; matching
//! entries are read into memory, modified in registration order and written
//! with their original mode. Hit counts live in the set, not in the
//! descriptors, and are handed to each `after` hook once the stream ends.

use crate::archive::{Entry, EntryKind};
use crate::exceptions::Result;
use log::debug;
use std::fmt::Debug;
use std::path::Path;

/// One in-stream file transformation
pub trait FilePatch: Debug {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    /// Whether the entry at `volume_path` is a target
    fn matches(&self, volume_path: &str) -> bool;

    /// Transform a matched file
    fn modify(&self, data: Vec<u8>) -> Result<Vec<u8>>;

    /// Runs once after the stream with the number of matched entries
    fn after(&self, hits: usize) -> Result<()>;
}

/// Fire counts per patch name, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchTally {
    counts: Vec<(String, usize)>,
}

impl PatchTally {
    /// Add `hits` to the count for `name`
    pub fn record(&mut self, name: &str, hits: usize) {
        match self.counts.iter_mut().find(|(n, _)| n == name) {
            Some((_, count)) => *count += hits,
            None => self.counts.push((name.to_string(), hits)),
        }
    }

    /// Count for `name`, zero when never recorded
    pub fn get(&self, name: &str) -> usize {
        self.counts
            .iter()
            .find(|(n, _)| n == name)
            .map_or(0, |(_, count)| *count)
    }

    /// All counts
    pub fn counts(&self) -> &[(String, usize)] {
        &self.counts
    }
}

/// Descriptors for one build with their hit counts
#[derive(Debug, Default)]
pub struct PatchSet {
    patches: Vec<(Box<dyn FilePatch>, usize)>,
}

impl PatchSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor
    pub fn push(&mut self, patch: impl FilePatch + 'static) {
        self.patches.push((Box::new(patch), 0));
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// No descriptors registered
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Extract a claimed entry to `dest`, patching it when any descriptor matches
    pub fn extract(&mut self, entry: &mut dyn Entry, dest: &Path) -> Result<()> {
        let info = entry.info();
        if info.kind != EntryKind::File
            || !self.patches.iter().any(|(p, _)| p.matches(&info.volume_path))
        {
            return entry.extract(dest);
        }

        let volume_path = info.volume_path.clone();
        let mode = info.mode;
        let mut data = entry.read()?;
        for (patch, hits) in &mut self.patches {
            if patch.matches(&volume_path) {
                debug!("🩹 Applying {} to {volume_path}", patch.name());
                data = patch.modify(data)?;
                *hits += 1;
            }
        }
        crate::archive::write_file(dest, &mut data.as_slice(), mode)
    }

    /// Run every `after` hook in order and report the counts
    pub fn finish(self) -> Result<PatchTally> {
        let mut tally = PatchTally::default();
        for (patch, hits) in &self.patches {
            patch.after(*hits)?;
            tally.record(patch.name(), *hits);
        }
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{Archive, DirArchive, fixture};
    use crate::exceptions::ProjectorError;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct Upper {
        suffix: &'static str,
    }

    impl FilePatch for Upper {
        fn name(&self) -> &str {
            self.suffix
        }

        fn matches(&self, volume_path: &str) -> bool {
            volume_path.ends_with(self.suffix)
        }

        fn modify(&self, data: Vec<u8>) -> Result<Vec<u8>> {
            Ok(data.to_ascii_uppercase())
        }

        fn after(&self, hits: usize) -> Result<()> {
            if hits == 0 {
                return Err(ProjectorError::PatchTargetNotFound(self.suffix.to_string()));
            }
            Ok(())
        }
    }

    fn run(patches: &mut PatchSet, source: &Path, out: &Path) {
        DirArchive::new(source)
            .read(&mut |entry| {
                let dest = out.join(&entry.info().volume_path);
                patches.extract(entry, &dest)
            })
            .unwrap();
    }

    #[test]
    fn test_matching_entries_are_modified() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir(&source).unwrap();
        fixture::write_dir(&source);
        let out = temp.path().join("out");

        let mut patches = PatchSet::new();
        patches.push(Upper { suffix: ".x32" });
        run(&mut patches, &source, &out);

        assert_eq!(fs::read(out.join("xtras/Net/INetURL.x32")).unwrap(), b"NET XTRA");
        assert_eq!(fs::read(out.join("Projec32.skl")).unwrap(), b"MZ stub");
        let tally = patches.finish().unwrap();
        assert_eq!(tally.get(".x32"), 2);
    }

    #[test]
    fn test_after_sees_zero_hits() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir(&source).unwrap();
        fixture::write_dir(&source);

        let mut patches = PatchSet::new();
        patches.push(Upper { suffix: ".dll" });
        run(&mut patches, &source, &temp.path().join("out"));
        assert!(matches!(patches.finish(), Err(ProjectorError::PatchTargetNotFound(_))));
    }

    #[test]
    fn test_tally_accumulates() {
        let mut tally = PatchTally::default();
        tally.record("a", 1);
        tally.record("b", 0);
        tally.record("a", 2);
        assert_eq!(tally.get("a"), 3);
        assert_eq!(tally.get("missing"), 0);
        assert_eq!(tally.counts().len(), 2);
    }
}
