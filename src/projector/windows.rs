//! Windows projectors
//!
//! Skeleton layout: `Projec32.skl` (the projector stub), optional top-level
//! DLLs and an `xtras` directory.

use super::config::{WindowsSettings, resolve_binary};
use super::patches::{FilePatch, PatchSet, PatchTally};
use super::xtras::XTRAS_DIR;
use super::{Build, Capabilities, require};
use crate::archive::EntryKind;
use crate::exceptions::{ProjectorError, Result};
use crate::patcher::{SHOCKWAVE_3D_ASSET_XTRA, patch_shockwave_3d_display_drivers_size};
use crate::pe::{ResourceEdits, replace_resources};
use crate::utils::volume_basename;
use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;

/// Projector stub inside Windows skeletons
pub const SKELETON_STUB: &str = "Projec32.skl";

/// Xtra whose display driver buffers can be enlarged
pub const SHOCKWAVE_3D_ASSET: &str = "Shockwave 3D Asset.x32";

/// Customized after extraction
pub const CLASSIC: Capabilities = Capabilities {
    extension: ".exe",
    config_newline: "\r\n",
    lingo_newline: "\r\n",
    splash_extension: ".BMP",
    supports_aux_files: true,
    write_skeleton: write_classic,
    modify_skeleton: modify_classic,
};

/// Customized while extracting
pub const OTTO: Capabilities = Capabilities {
    write_skeleton: write_otto,
    modify_skeleton: modify_otto,
    ..CLASSIC
};

fn settings<'a>(build: &Build<'a>) -> Result<&'a WindowsSettings> {
    build
        .config
        .kind
        .windows()
        .ok_or_else(|| ProjectorError::InvalidConfig("Not a Windows projector".to_string()))
}

/// Resource edits requested by `settings`
pub fn resource_edits(settings: &WindowsSettings) -> Result<ResourceEdits> {
    Ok(ResourceEdits {
        icon_data: resolve_binary(settings.icon.as_ref())?,
        version_strings: settings.version_strings.clone(),
        remove_signature: settings.remove_signature,
    })
}

fn basename_is(volume_path: &str, name: &str) -> bool {
    volume_basename(volume_path).eq_ignore_ascii_case(name)
}

/// Enlarges the display driver buffers of every `Shockwave 3D Asset.x32`
#[derive(Debug, Default)]
pub struct DisplayDriversSizePatch;

impl FilePatch for DisplayDriversSizePatch {
    fn name(&self) -> &str {
        SHOCKWAVE_3D_ASSET
    }

    fn matches(&self, volume_path: &str) -> bool {
        basename_is(volume_path, SHOCKWAVE_3D_ASSET_XTRA)
    }

    fn modify(&self, mut data: Vec<u8>) -> Result<Vec<u8>> {
        patch_shockwave_3d_display_drivers_size(&mut data)?;
        Ok(data)
    }

    fn after(&self, hits: usize) -> Result<()> {
        if hits == 0 {
            return Err(ProjectorError::PatchTargetNotFound(SHOCKWAVE_3D_ASSET.to_string()));
        }
        Ok(())
    }
}

/// Applies icon, version and signature edits to the projector stub
#[derive(Debug)]
pub struct ResourcePatch {
    edits: ResourceEdits,
}

impl ResourcePatch {
    /// Patch applying `edits`
    pub fn new(edits: ResourceEdits) -> Self {
        ResourcePatch { edits }
    }
}

impl FilePatch for ResourcePatch {
    fn name(&self) -> &str {
        SKELETON_STUB
    }

    fn matches(&self, volume_path: &str) -> bool {
        basename_is(volume_path, SKELETON_STUB)
    }

    fn modify(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        replace_resources(data, &self.edits)
    }

    fn after(&self, hits: usize) -> Result<()> {
        if hits == 0 {
            return Err(ProjectorError::PatchTargetNotFound(SKELETON_STUB.to_string()));
        }
        Ok(())
    }
}

fn extract_skeleton(build: &Build<'_>, mut patches: PatchSet) -> Result<PatchSet> {
    let shockwave = build.config.settings.shockwave;
    let mut found_stub = false;
    let mut found_xtras = false;

    let mut archive = build.open_skeleton()?;
    archive.read(&mut |entry| {
        if entry.info().kind == EntryKind::ResourceFork {
            return Ok(());
        }
        if build.extract_xtra(entry, &mut patches, &mut found_xtras)? {
            return Ok(());
        }

        let volume_path = entry.info().volume_path.clone();
        if volume_path.contains('/') {
            return Ok(());
        }
        if volume_path.eq_ignore_ascii_case(SKELETON_STUB) {
            found_stub = true;
            return patches.extract(entry, &build.paths.path);
        }
        if volume_path.to_ascii_lowercase().ends_with(".dll") {
            if shockwave {
                debug!("⏭️ Excluding {volume_path} from shockwave projector");
                return Ok(());
            }
            return patches.extract(entry, &build.paths.directory.join(&volume_path));
        }
        Ok(())
    })?;

    require(found_stub, SKELETON_STUB)?;
    require(found_xtras, XTRAS_DIR)?;
    Ok(patches)
}

fn write_classic(build: &Build<'_>) -> Result<PatchSet> {
    extract_skeleton(build, PatchSet::new())
}

fn write_otto(build: &Build<'_>) -> Result<PatchSet> {
    let settings = settings(build)?;
    let mut patches = PatchSet::new();
    if settings.patch_3d_display_drivers_size {
        patches.push(DisplayDriversSizePatch);
    }
    let edits = resource_edits(settings)?;
    if !edits.is_noop() {
        patches.push(ResourcePatch::new(edits));
    }
    extract_skeleton(build, patches)
}

fn modify_otto(_build: &Build<'_>, _tally: &mut PatchTally) -> Result<()> {
    Ok(())
}

fn modify_classic(build: &Build<'_>, tally: &mut PatchTally) -> Result<()> {
    let settings = settings(build)?;
    let edits = resource_edits(settings)?;
    if !edits.is_noop() {
        let path = &build.paths.path;
        info!("🖼️ Updating resources of {}", path.display());
        let data = replace_resources(fs::read(path)?, &edits)?;
        fs::write(path, data)?;
        tally.record(SKELETON_STUB, 1);
    }

    if settings.patch_3d_display_drivers_size {
        let hits = patch_installed_3d_xtras(build)?;
        tally.record(SHOCKWAVE_3D_ASSET, hits);
    }
    Ok(())
}

/// Every `Shockwave 3D Asset.x32` under the xtras output, at any depth
fn installed_3d_xtras(build: &Build<'_>) -> Result<Vec<PathBuf>> {
    let root = build.paths.xtras.to_string_lossy();
    let pattern = format!("{}/**/{}", glob::Pattern::escape(&root), SHOCKWAVE_3D_ASSET);
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let paths = glob::glob_with(&pattern, options)
        .map_err(|e| ProjectorError::Generic(format!("Invalid xtras pattern: {e}")))?;

    let mut found = Vec::new();
    for path in paths {
        match path {
            Ok(path) if path.is_file() => found.push(path),
            Ok(_) => {}
            Err(e) => warn!("⚠️ Skipping unreadable path: {e}"),
        }
    }
    Ok(found)
}

fn patch_installed_3d_xtras(build: &Build<'_>) -> Result<usize> {
    let xtras = installed_3d_xtras(build)?;
    if xtras.is_empty() {
        return Err(ProjectorError::PatchTargetNotFound(SHOCKWAVE_3D_ASSET.to_string()));
    }
    for path in &xtras {
        debug!("🩹 Patching {}", path.display());
        let mut data = fs::read(path)?;
        patch_shockwave_3d_display_drivers_size(&mut data)?;
        fs::write(path, data)?;
    }
    Ok(xtras.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::test_image;
    use crate::projector::{ProjectorConfig, ProjectorKind, XtraMapping, write};
    use std::path::Path;
    use tempfile::TempDir;

    fn write_skeleton(root: &Path, stub: &[u8]) {
        fs::create_dir_all(root.join("xtras/Net")).unwrap();
        fs::write(root.join("Projec32.skl"), stub).unwrap();
        fs::write(root.join("DIRAPI.DLL"), b"dll").unwrap();
        fs::write(root.join("readme.txt"), b"unclaimed").unwrap();
        fs::write(root.join("xtras/Net/INetURL.x32"), b"net").unwrap();
        let xtra_3d = crate::patcher::sample_3d_xtra();
        fs::write(root.join("xtras/Shockwave 3D Asset.x32"), xtra_3d).unwrap();
    }

    fn config(temp: &TempDir, kind: ProjectorKind) -> ProjectorConfig {
        let skeleton = temp.path().join("skeleton");
        write_skeleton(&skeleton, &test_image::projector(0x14c));
        let mut config = ProjectorConfig::new(temp.path().join("out/movie.exe"), kind);
        config.settings.skeleton = Some(skeleton);
        config
    }

    #[test]
    fn test_classic_extracts_stub_dlls_and_no_xtras() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, ProjectorKind::WindowsExe(WindowsSettings::default()));
        let report = write(&config).unwrap();

        let out = temp.path().join("out");
        assert_eq!(report.state, crate::projector::BuildState::Finalized);
        assert_eq!(fs::read(out.join("movie.exe")).unwrap(), test_image::projector(0x14c));
        assert!(out.join("DIRAPI.DLL").is_file());
        assert!(!out.join("readme.txt").exists());
        assert!(!out.join("xtras").exists());
    }

    #[test]
    fn test_shockwave_drops_dlls() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp, ProjectorKind::WindowsExe(WindowsSettings::default()));
        config.settings.shockwave = true;
        write(&config).unwrap();
        assert!(!temp.path().join("out/DIRAPI.DLL").exists());
    }

    #[test]
    fn test_otto_patches_in_stream() {
        let temp = TempDir::new().unwrap();
        let mut config = config(
            &temp,
            ProjectorKind::OttoWindows(WindowsSettings {
                version_strings: Some(vec![("FileVersion".to_string(), "1.2.3.4".to_string())]),
                patch_3d_display_drivers_size: true,
                ..Default::default()
            }),
        );
        config.settings.include_xtras = vec![XtraMapping::all()];
        let report = write(&config).unwrap();

        assert_eq!(report.patches.get(SKELETON_STUB), 1);
        assert_eq!(report.patches.get(SHOCKWAVE_3D_ASSET), 1);
        let exe = fs::read(temp.path().join("out/movie.exe")).unwrap();
        assert_ne!(exe, test_image::projector(0x14c));
        let xtra = fs::read(temp.path().join("out/xtras/Shockwave 3D Asset.x32")).unwrap();
        assert_ne!(xtra, crate::patcher::sample_3d_xtra());
    }

    #[test]
    fn test_classic_3d_patch_walks_xtras_output() {
        let temp = TempDir::new().unwrap();
        let mut config = config(
            &temp,
            ProjectorKind::WindowsExe(WindowsSettings {
                patch_3d_display_drivers_size: true,
                ..Default::default()
            }),
        );
        config.settings.include_xtras = vec![XtraMapping::new("", Some("Media/3D"))];
        let report = write(&config).unwrap();
        assert_eq!(report.patches.get(SHOCKWAVE_3D_ASSET), 1);
        assert!(temp.path().join("out/xtras/Media/3D/Shockwave 3D Asset.x32").is_file());
    }

    #[test]
    fn test_classic_3d_patch_without_xtras_fails() {
        let temp = TempDir::new().unwrap();
        let config = config(
            &temp,
            ProjectorKind::WindowsExe(WindowsSettings {
                patch_3d_display_drivers_size: true,
                ..Default::default()
            }),
        );
        assert!(matches!(
            write(&config),
            Err(ProjectorError::PatchTargetNotFound(name)) if name == SHOCKWAVE_3D_ASSET
        ));
    }

    #[test]
    fn test_missing_stub() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, ProjectorKind::WindowsExe(WindowsSettings::default()));
        fs::remove_file(temp.path().join("skeleton/Projec32.skl")).unwrap();
        let err = write(&config).unwrap_err();
        assert_eq!(err.to_string(), "Failed to locate: Projec32.skl");
    }

    #[test]
    fn test_missing_xtras() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, ProjectorKind::WindowsExe(WindowsSettings::default()));
        fs::remove_dir_all(temp.path().join("skeleton/xtras")).unwrap();
        let err = write(&config).unwrap_err();
        assert_eq!(err.to_string(), "Failed to locate: xtras");
    }
}
