//! Projector bundles
//!
//! A bundle nests a projector one level down and places a small launcher at
//! the output path. Resources are copied next to the nested projector while
//! the bundle is open; directory attributes are held back until it closes.

pub mod attributes;
pub mod launchers;

pub use attributes::{DeferredAttributes, ResourceOptions};

use crate::archive::{create_symlink, write_file};
use crate::exceptions::{ProjectorError, Result};
use crate::launcher::LauncherSource;
use crate::projector::{self, BuildReport, ProjectorConfig, ProjectorKind, TextPayload};
use crate::utils::trim_extension;
use glob::Pattern;
use log::{debug, info, trace};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// File names never copied out of a resource directory
pub const DEFAULT_EXCLUDES: &[&str] = &[".*", "ehthumbs.db", "Thumbs.db"];

const WINDOWS_EXTENSION: &str = ".exe";

/// A projector wrapped in a launcher, plus its resources
#[derive(Debug)]
pub struct Bundle {
    path: PathBuf,
    flat: bool,
    projector: ProjectorConfig,
    launchers: Box<dyn LauncherSource>,
    excludes: Vec<Pattern>,
    open: bool,
    deferred: DeferredAttributes,
}

impl Bundle {
    /// Bundle at `path` around `projector`; the projector's own path is ignored
    pub fn new(
        path: impl Into<PathBuf>,
        projector: ProjectorConfig,
        launchers: Box<dyn LauncherSource>,
    ) -> Self {
        Bundle {
            path: path.into(),
            flat: false,
            projector,
            launchers,
            excludes: DEFAULT_EXCLUDES.iter().filter_map(|p| Pattern::new(p).ok()).collect(),
            open: false,
            deferred: DeferredAttributes::default(),
        }
    }

    /// Write the projector at the output path with no launcher
    pub fn flat(mut self, flat: bool) -> Self {
        self.flat = flat;
        self
    }

    /// Replace the names skipped when copying directories
    pub fn excludes(mut self, patterns: &[&str]) -> Result<Self> {
        self.excludes = patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| ProjectorError::InvalidConfig(format!("Bad exclude {p}: {e}")))
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Bundle output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while between `open` and `close`
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// True when no launcher is written
    pub fn is_flat(&self) -> bool {
        self.flat || matches!(self.projector.kind, ProjectorKind::Html(_))
    }

    /// Where the projector itself is written
    pub fn projector_path(&self) -> Result<PathBuf> {
        if self.is_flat() {
            return Ok(self.path.clone());
        }
        let name = self.path.file_name().ok_or_else(|| {
            ProjectorError::InvalidConfig(format!(
                "Output path has no name: {}",
                self.path.display()
            ))
        })?;

        match &self.projector.kind {
            ProjectorKind::WindowsExe(_) | ProjectorKind::OttoWindows(_) => {
                let text = self.path.to_string_lossy();
                let trimmed = trim_extension(&text, WINDOWS_EXTENSION, true);
                if trimmed.len() == text.len() {
                    return Err(ProjectorError::InvalidConfig(format!(
                        "Output path must end with: {WINDOWS_EXTENSION}"
                    )));
                }
                Ok(PathBuf::from(trimmed).join(name))
            }
            ProjectorKind::MacApp(_) | ProjectorKind::OttoMac(_) => {
                Ok(self.path.join("Contents").join("Resources").join(name))
            }
            ProjectorKind::Html(_) => Ok(self.path.clone()),
        }
    }

    /// Path of a resource destination, relative to the projector's directory
    pub fn resource_path(&self, destination: &str) -> Result<PathBuf> {
        let projector = self.projector_path()?;
        let directory = projector.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(if destination.is_empty() {
            directory
        } else {
            directory.join(destination)
        })
    }

    /// True when something already exists at the resource destination
    pub fn resource_exists(&self, destination: &str) -> Result<bool> {
        Ok(fs::symlink_metadata(self.resource_path(destination)?).is_ok())
    }

    /// True when a file name matches an exclude pattern
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excludes.iter().any(|p| p.matches(name))
    }

    /// Write the nested projector and mark the bundle open
    pub fn open(&mut self) -> Result<BuildReport> {
        if self.open {
            return Err(ProjectorError::BundleState("Already open".to_string()));
        }
        let mut outputs = vec![self.path.clone()];
        if !self.is_flat() {
            outputs.push(self.resource_path("")?);
        }
        if let Some(existing) = outputs.into_iter().find(|p| fs::symlink_metadata(p).is_ok()) {
            return Err(ProjectorError::OutputAlreadyExists(existing));
        }

        let mut config = self.projector.clone();
        config.path = self.projector_path()?;
        info!("📦 Opening bundle: {}", self.path.display());
        let report = projector::write(&config)?;
        self.open = true;
        Ok(report)
    }

    /// Open with `player` as skeleton and `config` as the projector config data
    pub fn open_data(&mut self, player: &Path, config: Option<Vec<u8>>) -> Result<BuildReport> {
        self.projector.settings.skeleton = Some(player.to_path_buf());
        self.projector.settings.config = config.map(TextPayload::Data);
        self.open()
    }

    /// Open with `player` as skeleton and `config` as the projector config file
    pub fn open_file(&mut self, player: &Path, config: Option<&Path>) -> Result<BuildReport> {
        self.projector.settings.skeleton = Some(player.to_path_buf());
        self.projector.settings.config = config.map(|c| TextPayload::File(c.to_path_buf()));
        self.open()
    }

    /// Write the launcher and the deferred attributes, then mark closed
    pub fn close(&mut self) -> Result<()> {
        self.assert_open()?;
        if !self.is_flat() {
            self.write_launcher()?;
        }
        debug!("🕒 Applying {} deferred attribute write(s)", self.deferred.len());
        self.deferred.run()?;
        self.open = false;
        info!("✅ Bundle written: {}", self.path.display());
        Ok(())
    }

    /// Open with data, run `f`, and close even when `f` fails
    pub fn with_data<F>(
        &mut self,
        player: &Path,
        config: Option<Vec<u8>>,
        f: F,
    ) -> Result<BuildReport>
    where
        F: FnOnce(&mut Bundle) -> Result<()>,
    {
        let report = self.open_data(player, config)?;
        self.run_and_close(f)?;
        Ok(report)
    }

    /// Open with the configured settings, run `f`, and close even when `f` fails
    pub fn write<F>(&mut self, f: F) -> Result<BuildReport>
    where
        F: FnOnce(&mut Bundle) -> Result<()>,
    {
        let report = self.open()?;
        self.run_and_close(f)?;
        Ok(report)
    }

    fn run_and_close<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Bundle) -> Result<()>,
    {
        let result = f(self);
        let closed = self.close();
        result.and(closed)
    }

    fn assert_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(ProjectorError::BundleState("Not open".to_string()))
        }
    }

    fn write_launcher(&self) -> Result<()> {
        let nested = self.projector_path()?;
        match &self.projector.kind {
            ProjectorKind::WindowsExe(_) | ProjectorKind::OttoWindows(_) => {
                launchers::write_windows_launcher(&self.path, &nested, self.launchers.as_ref())
            }
            ProjectorKind::MacApp(mac) | ProjectorKind::OttoMac(mac) => {
                launchers::write_mac_launcher(&self.path, &nested, mac, self.launchers.as_ref())
            }
            ProjectorKind::Html(_) => Ok(()),
        }
    }

    /// Resource target for `destination`, failing when it exists
    fn new_resource_path(&self, destination: &str) -> Result<PathBuf> {
        self.assert_open()?;
        let path = self.resource_path(destination)?;
        if fs::symlink_metadata(&path).is_ok() {
            return Err(ProjectorError::ResourceExists(path));
        }
        Ok(path)
    }

    /// Copy a file, directory or symlink from `source`
    pub fn copy_resource(
        &mut self,
        destination: &str,
        source: &Path,
        options: &ResourceOptions,
    ) -> Result<()> {
        let file_type = fs::symlink_metadata(source)?.file_type();
        if file_type.is_symlink() {
            self.copy_resource_symlink(destination, source, options)
        } else if file_type.is_file() {
            self.copy_resource_file(destination, source, options)
        } else if file_type.is_dir() {
            self.copy_resource_directory(destination, source, options)
        } else {
            Err(ProjectorError::UnsupportedResourceType(source.to_path_buf()))
        }
    }

    /// Copy a directory, recursing unless `no_recurse` is set
    pub fn copy_resource_directory(
        &mut self,
        destination: &str,
        source: &Path,
        options: &ResourceOptions,
    ) -> Result<()> {
        let expanded = options.expand_copy(|| fs::metadata(source))?;
        self.create_resource_directory(destination, &expanded)?;
        if options.no_recurse {
            return Ok(());
        }

        let child_options = ResourceOptions {
            no_recurse: true,
            ..options.clone()
        };
        self.copy_children(destination, source, &child_options)
    }

    fn copy_children(
        &mut self,
        destination: &str,
        source: &Path,
        options: &ResourceOptions,
    ) -> Result<()> {
        let mut entries = fs::read_dir(source)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_excluded(&name) {
                trace!("⏭️ Excluding {}", entry.path().display());
                continue;
            }
            let child = format!("{destination}/{name}");
            let path = entry.path();
            self.copy_resource(&child, &path, options)?;
            if entry.file_type()?.is_dir() {
                self.copy_children(&child, &path, options)?;
            }
        }
        Ok(())
    }

    /// Copy one regular file, keeping its permissions
    pub fn copy_resource_file(
        &mut self,
        destination: &str,
        source: &Path,
        options: &ResourceOptions,
    ) -> Result<()> {
        let path = self.new_resource_path(destination)?;
        let expanded = options.expand_copy(|| fs::metadata(source))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &path)?;
        trace!("📄 Copied {} -> {}", source.display(), path.display());
        self.apply(&path, &expanded)
    }

    /// Recreate a symlink with the same target
    pub fn copy_resource_symlink(
        &mut self,
        destination: &str,
        source: &Path,
        options: &ResourceOptions,
    ) -> Result<()> {
        let expanded = options.expand_copy(|| fs::symlink_metadata(source))?;
        let target = fs::read_link(source)?;
        self.create_resource_symlink(destination, &target, &expanded)
    }

    /// Create a directory; an existing one is reused only with `merge`
    pub fn create_resource_directory(
        &mut self,
        destination: &str,
        options: &ResourceOptions,
    ) -> Result<()> {
        self.assert_open()?;
        let path = self.resource_path(destination)?;
        match fs::symlink_metadata(&path) {
            Ok(metadata) if options.merge && metadata.is_dir() => {}
            Ok(_) => return Err(ProjectorError::ResourceExists(path)),
            Err(_) => fs::create_dir_all(&path)?,
        }
        if options.has_attributes() {
            self.deferred.push(std::path::absolute(&path)?, options.clone());
        }
        Ok(())
    }

    /// Create a file holding `data`
    pub fn create_resource_file(
        &mut self,
        destination: &str,
        data: &[u8],
        options: &ResourceOptions,
    ) -> Result<()> {
        self.stream_resource_file(destination, &mut &data[..], options)
    }

    /// Create a symlink pointing at `target`
    pub fn create_resource_symlink(
        &mut self,
        destination: &str,
        target: &Path,
        options: &ResourceOptions,
    ) -> Result<()> {
        let path = self.new_resource_path(destination)?;
        create_symlink(target, &path)?;
        self.apply(&path, options)
    }

    /// Create a file from a reader
    pub fn stream_resource_file(
        &mut self,
        destination: &str,
        data: &mut dyn Read,
        options: &ResourceOptions,
    ) -> Result<()> {
        let path = self.new_resource_path(destination)?;
        write_file(&path, data, 0o644)?;
        self.apply(&path, options)
    }

    fn apply(&self, path: &Path, options: &ResourceOptions) -> Result<()> {
        if options.has_attributes() {
            attributes::apply(path, options)?;
        }
        Ok(())
    }
}
