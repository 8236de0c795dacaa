//! Projector builds
//!
//! A build runs once, in a fixed order:
//! 1. refuse to overwrite any output;
//! 2. stream the skeleton, claiming entries per platform and applying the
//!    in-stream patches;
//! 3. run the patch `after` hooks;
//! 4. write the config, splash, lingo and movie files;
//! 5. finalize (post-extraction edits for the classic variants).

pub mod config;
pub mod html;
pub mod mac;
pub mod patches;
pub mod windows;
pub mod xtras;

pub use config::{
    BinaryPayload, BundleName, Generator, HtmlSettings, MacSettings, ProjectorConfig,
    ProjectorKind, ProjectorSettings, TextPayload, WindowsSettings, XtraMapping,
};
pub use patches::{FilePatch, PatchSet, PatchTally};

use crate::archive::{Archive, Entry, open_archive};
use crate::exceptions::{ProjectorError, Result};
use crate::utils::{path_relative_base, trim_extension};
use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Build progress, strictly linear
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum BuildState {
    /// Nothing written
    Unconfigured,
    /// Skeleton entries extracted
    SkeletonWritten,
    /// Patch hooks verified
    ResourcesPatched,
    /// Config, splash, lingo and movie written
    AuxFilesWritten,
    /// Build complete
    Finalized,
}

impl BuildState {
    fn advance(self) -> Self {
        let next = match self {
            BuildState::Unconfigured => BuildState::SkeletonWritten,
            BuildState::SkeletonWritten => BuildState::ResourcesPatched,
            BuildState::ResourcesPatched => BuildState::AuxFilesWritten,
            BuildState::AuxFilesWritten | BuildState::Finalized => BuildState::Finalized,
        };
        debug!("🔁 {self:?} -> {next:?}");
        next
    }
}

/// Result of a finished build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Final state
    pub state: BuildState,
    /// Fire counts per patch
    pub patches: PatchTally,
}

/// Per-kind constants and hooks
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Output extension
    pub extension: &'static str,
    /// Newline for config lines
    pub config_newline: &'static str,
    /// Newline for lingo lines
    pub lingo_newline: &'static str,
    /// Splash image extension
    pub splash_extension: &'static str,
    /// Config, splash, lingo and movie are written
    pub supports_aux_files: bool,
    /// Stream the skeleton, returning the in-stream patches with their counts
    pub write_skeleton: fn(&Build<'_>) -> Result<PatchSet>,
    /// Post-extraction edits
    pub modify_skeleton: fn(&Build<'_>, &mut PatchTally) -> Result<()>,
}

impl ProjectorKind {
    /// Constants and hooks for this kind
    pub fn capabilities(&self) -> Capabilities {
        match self {
            ProjectorKind::Html(_) => html::CAPABILITIES,
            ProjectorKind::MacApp(_) => mac::CLASSIC,
            ProjectorKind::OttoMac(_) => mac::OTTO,
            ProjectorKind::WindowsExe(_) => windows::CLASSIC,
            ProjectorKind::OttoWindows(_) => windows::OTTO,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ProjectorKind::Html(_) => "html",
            ProjectorKind::MacApp(_) => "mac app",
            ProjectorKind::OttoMac(_) => "otto mac",
            ProjectorKind::WindowsExe(_) => "windows exe",
            ProjectorKind::OttoWindows(_) => "otto windows",
        }
    }
}

/// Output locations derived from the config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Main output
    pub path: PathBuf,
    /// Directory holding the main output
    pub directory: PathBuf,
    /// Config file
    pub config: PathBuf,
    /// Splash image
    pub splash: PathBuf,
    /// `LINGO.INI`
    pub lingo: PathBuf,
    /// Xtras directory
    pub xtras: PathBuf,
    /// Movie file, when a movie name is set
    pub movie: Option<PathBuf>,
}

impl OutputPaths {
    /// Paths for `config` with the given kind constants
    pub fn new(config: &ProjectorConfig, caps: &Capabilities) -> Self {
        let path = config.path.clone();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let text = path.to_string_lossy();
        let trimmed = trim_extension(&text, caps.extension, true);

        let xtras = match config.kind.mac() {
            Some(mac) if mac.nest_xtras_contents => path.join("Contents").join(xtras::XTRAS_DIR),
            _ if config.settings.nest_xtras_configuration => {
                directory.join("Configuration").join(xtras::XTRAS_DIR)
            }
            _ => directory.join(xtras::XTRAS_DIR),
        };

        OutputPaths {
            config: PathBuf::from(format!("{trimmed}.INI")),
            splash: PathBuf::from(format!("{trimmed}{}", caps.splash_extension)),
            lingo: directory.join("LINGO.INI"),
            movie: config.settings.movie_name.as_ref().map(|name| directory.join(name)),
            xtras,
            directory,
            path,
        }
    }
}

/// One build in progress
#[derive(Debug)]
pub struct Build<'a> {
    /// Configuration being built
    pub config: &'a ProjectorConfig,
    /// Kind constants and hooks
    pub caps: Capabilities,
    /// Output locations
    pub paths: OutputPaths,
}

impl<'a> Build<'a> {
    /// Prepare a build of `config`
    pub fn new(config: &'a ProjectorConfig) -> Result<Self> {
        let settings = &config.settings;
        if settings.movie.is_some() && settings.movie_name.is_none() {
            return Err(ProjectorError::InvalidConfig(
                "Cannot write movie data without a movie name".to_string(),
            ));
        }
        let caps = config.kind.capabilities();
        let paths = OutputPaths::new(config, &caps);
        Ok(Build { config, caps, paths })
    }

    /// Every output this build may create
    pub fn output_paths(&self) -> Vec<&Path> {
        let mut outputs = vec![self.paths.path.as_path()];
        if self.caps.supports_aux_files {
            outputs.push(&self.paths.config);
            outputs.push(&self.paths.splash);
            outputs.push(&self.paths.lingo);
            if let Some(movie) = &self.paths.movie {
                outputs.push(movie);
            }
        }
        outputs
    }

    /// Fail when any output already exists
    pub fn check_outputs(&self) -> Result<()> {
        match self.output_paths().into_iter().find(|p| fs::symlink_metadata(p).is_ok()) {
            Some(existing) => Err(ProjectorError::OutputAlreadyExists(existing.to_path_buf())),
            None => Ok(()),
        }
    }

    /// Open the configured skeleton
    pub fn open_skeleton(&self) -> Result<Box<dyn Archive>> {
        let settings = &self.config.settings;
        let skeleton = settings
            .skeleton
            .as_deref()
            .ok_or_else(|| ProjectorError::InvalidConfig("Skeleton not configured".to_string()))?;
        open_archive(skeleton, &settings.archive)
    }

    /// Claim an entry under the skeleton xtras root
    ///
    /// Returns `false` when the entry lies elsewhere.
    pub fn extract_xtra(
        &self,
        entry: &mut dyn Entry,
        patches: &mut PatchSet,
        found: &mut bool,
    ) -> Result<bool> {
        let volume_path = &entry.info().volume_path;
        let Some(relative) = path_relative_base(volume_path, xtras::XTRAS_DIR, true) else {
            return Ok(false);
        };
        *found = true;
        let dest = xtras::destination_for(&self.config.settings.include_xtras, relative);
        match dest {
            Some(dest) if !dest.is_empty() => {
                patches.extract(entry, &self.paths.xtras.join(dest))?;
            }
            _ => debug!("⏭️ Excluding xtra {}", entry.info().volume_path),
        }
        Ok(true)
    }

    fn write_aux_files(&self) -> Result<()> {
        let settings = &self.config.settings;
        let caps = &self.caps;
        let outputs = [
            (
                config::resolve_text(settings.config.as_ref(), caps.config_newline)?,
                &self.paths.config,
            ),
            (config::resolve_binary(settings.splash.as_ref())?, &self.paths.splash),
            (
                config::resolve_text(settings.lingo.as_ref(), caps.lingo_newline)?,
                &self.paths.lingo,
            ),
        ];
        for (data, path) in outputs {
            if let Some(data) = data {
                write_output(path, &data)?;
            }
        }

        if let (Some(movie), Some(path)) = (&settings.movie, &self.paths.movie) {
            write_output(path, &movie.resolve()?)?;
        }
        Ok(())
    }
}

/// Create `path` with `data`, creating parents
pub(crate) fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!("📝 Writing {} ({} bytes)", path.display(), data.len());
    fs::write(path, data)?;
    Ok(())
}

/// Fail with the missing marker unless `found`
pub(crate) fn require(found: bool, marker: impl Into<String>) -> Result<()> {
    if found {
        Ok(())
    } else {
        Err(ProjectorError::MissingRequiredSkeletonEntry(marker.into()))
    }
}

/// Build the projector described by `config`
pub fn write(config: &ProjectorConfig) -> Result<BuildReport> {
    let build = Build::new(config)?;
    let mut state = BuildState::Unconfigured;
    build.check_outputs()?;
    info!(
        "🔨 Building {} projector: {}",
        config.kind.label(),
        build.paths.path.display()
    );

    let patches = (build.caps.write_skeleton)(&build)?;
    state = state.advance();
    debug!("🩹 {} in-stream patches registered", patches.len());

    let mut tally = patches.finish()?;
    state = state.advance();

    if build.caps.supports_aux_files {
        build.write_aux_files()?;
    }
    state = state.advance();

    (build.caps.modify_skeleton)(&build, &mut tally)?;
    state = state.advance();

    info!("✅ Projector written: {}", build.paths.path.display());
    Ok(BuildReport {
        state,
        patches: tally,
    })
}
