//! Mac app projectors
//!
//! The skeleton holds the app contents under `Projector Resources` (or
//! `Projector Intel Resources`) and Xtras under `xtras`. A custom binary name
//! renames the binary, the icon and the rsrc file together.

use super::config::{BundleName, MacSettings, resolve_binary, resolve_text};
use super::patches::{FilePatch, PatchSet, PatchTally};
use super::xtras::XTRAS_DIR;
use super::{Build, Capabilities, require, write_output};
use crate::archive::EntryKind;
use crate::exceptions::{ProjectorError, Result};
use crate::utils::{path_relative_base, path_relative_base_match, trim_extension};
use log::{debug, info};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// App bundle `Info.plist`
pub const INFO_PLIST: &str = "Contents/Info.plist";
/// App bundle `PkgInfo`
pub const PKG_INFO: &str = "Contents/PkgInfo";
/// Frameworks directory, left out of shockwave projectors
pub const FRAMEWORKS: &str = "Contents/Frameworks";
/// Skeleton binary name
pub const BINARY_NAME: &str = "Projector";
/// Skeleton icon name
pub const ICON_NAME: &str = "projector.icns";
/// Skeleton rsrc name
pub const RSRC_NAME: &str = "Projector.rsrc";

const NEWLINE: &str = "\n";

/// Customized after extraction
pub const CLASSIC: Capabilities = Capabilities {
    extension: ".app",
    config_newline: NEWLINE,
    lingo_newline: NEWLINE,
    splash_extension: ".pict",
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

/// Names inside the app for one settings block
#[derive(Debug, Clone, Copy)]
pub struct MacLayout<'a> {
    settings: &'a MacSettings,
}

impl<'a> MacLayout<'a> {
    /// Layout for `settings`
    pub fn new(settings: &'a MacSettings) -> Self {
        MacLayout { settings }
    }

    /// Skeleton directory holding the app contents
    pub fn resources_dir(&self) -> &'static str {
        if self.settings.intel {
            "Projector Intel Resources"
        } else {
            "Projector Resources"
        }
    }

    /// Binary name in the output
    pub fn binary_name(&self) -> &'a str {
        self.settings.binary_name.as_deref().unwrap_or(BINARY_NAME)
    }

    /// Icon name in the output
    pub fn icon_name(&self) -> String {
        match &self.settings.binary_name {
            Some(name) => format!("{name}.icns"),
            None => ICON_NAME.to_string(),
        }
    }

    /// Binary path in the skeleton
    pub fn binary_path_default() -> String {
        format!("Contents/MacOS/{BINARY_NAME}")
    }

    /// Icon path in the skeleton
    pub fn icon_path_default() -> String {
        format!("Contents/Resources/{ICON_NAME}")
    }

    /// Rsrc path in the skeleton
    pub fn rsrc_path_default() -> String {
        format!("Contents/Resources/{RSRC_NAME}")
    }

    /// Renamed binary path
    pub fn binary_path_custom(&self) -> Option<String> {
        let name = self.settings.binary_name.as_ref()?;
        Some(format!("Contents/MacOS/{name}"))
    }

    /// Renamed icon path
    pub fn icon_path_custom(&self) -> Option<String> {
        let name = self.settings.binary_name.as_ref()?;
        Some(format!("Contents/Resources/{name}.icns"))
    }

    /// Renamed rsrc path
    pub fn rsrc_path_custom(&self) -> Option<String> {
        let name = self.settings.binary_name.as_ref()?;
        Some(format!("Contents/Resources/{name}.rsrc"))
    }

    /// Binary path in the output
    pub fn binary_path(&self) -> String {
        self.binary_path_custom().unwrap_or_else(Self::binary_path_default)
    }

    /// Icon path in the output
    pub fn icon_path(&self) -> String {
        self.icon_path_custom().unwrap_or_else(Self::icon_path_default)
    }

    /// Skeleton path of an app-relative file
    fn skeleton_path(&self, relative: &str) -> String {
        format!("{}/{relative}", self.resources_dir())
    }
}

/// True when the Info.plist has to be rewritten
pub fn info_plist_needs_update(settings: &MacSettings) -> bool {
    settings.has_info_plist()
        || settings.binary_name.is_some()
        || settings.bundle_name != BundleName::Default
}

/// Set the icon, executable and bundle name keys of an Info.plist
///
/// # Errors
/// Fails when `source` is not a property list with a dictionary root.
pub fn update_info_plist(
    source: &[u8],
    settings: &MacSettings,
    app_path: &Path,
) -> Result<Vec<u8>> {
    let layout = MacLayout::new(settings);
    let mut value = plist::Value::from_reader(Cursor::new(source))?;
    let dict = value.as_dictionary_mut().ok_or_else(|| {
        ProjectorError::InvalidConfig("Info.plist root is not a dictionary".to_string())
    })?;

    dict.insert("CFBundleIconFile".to_string(), plist::Value::String(layout.icon_name()));
    dict.insert(
        "CFBundleExecutable".to_string(),
        plist::Value::String(layout.binary_name().to_string()),
    );
    let bundle_name = match &settings.bundle_name {
        BundleName::Default => None,
        BundleName::Output => {
            let file_name = app_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Some(Some(trim_extension(&file_name, ".app", true).to_string()))
        }
        BundleName::Name(name) => Some(Some(name.clone())),
        BundleName::Remove => Some(None),
    };
    match bundle_name {
        Some(Some(name)) => {
            dict.insert("CFBundleName".to_string(), plist::Value::String(name));
        }
        Some(None) => {
            dict.remove("CFBundleName");
        }
        None => {}
    }

    let mut out = Vec::new();
    value.to_writer_xml(&mut out)?;
    Ok(out)
}

fn settings<'a>(build: &Build<'a>) -> Result<&'a MacSettings> {
    build
        .config
        .kind
        .mac()
        .ok_or_else(|| ProjectorError::InvalidConfig("Not a Mac projector".to_string()))
}

/// Rewrites the skeleton Info.plist, or replaces it with a custom one
#[derive(Debug)]
pub struct InfoPlistPatch {
    target: String,
    custom: Option<Vec<u8>>,
    settings: MacSettings,
    app_path: PathBuf,
}

impl FilePatch for InfoPlistPatch {
    fn name(&self) -> &str {
        INFO_PLIST
    }

    fn matches(&self, volume_path: &str) -> bool {
        volume_path.eq_ignore_ascii_case(&self.target)
    }

    fn modify(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let source = self.custom.as_deref().unwrap_or(&data);
        update_info_plist(source, &self.settings, &self.app_path)
    }

    fn after(&self, hits: usize) -> Result<()> {
        if hits == 0 {
            return Err(ProjectorError::PatchTargetNotFound(self.target.clone()));
        }
        Ok(())
    }
}

/// Swaps a skeleton file for configured contents
///
/// With a fallback path, a skeleton without the file gets it written there.
#[derive(Debug)]
pub struct ReplaceFilePatch {
    name: &'static str,
    target: String,
    data: Vec<u8>,
    fallback: Option<PathBuf>,
}

impl FilePatch for ReplaceFilePatch {
    fn name(&self) -> &str {
        self.name
    }

    fn matches(&self, volume_path: &str) -> bool {
        volume_path.eq_ignore_ascii_case(&self.target)
    }

    fn modify(&self, _data: Vec<u8>) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn after(&self, hits: usize) -> Result<()> {
        match (&self.fallback, hits) {
            (_, 1..) => Ok(()),
            (Some(path), 0) => {
                debug!("📝 {} absent from skeleton, writing it", self.name);
                write_output(path, &self.data)
            }
            (None, 0) => Err(ProjectorError::PatchTargetNotFound(self.target.clone())),
        }
    }
}

fn otto_patches(build: &Build<'_>, settings: &MacSettings) -> Result<PatchSet> {
    let layout = MacLayout::new(settings);
    let app = &build.paths.path;
    let mut patches = PatchSet::new();

    if info_plist_needs_update(settings) {
        patches.push(InfoPlistPatch {
            target: layout.skeleton_path(INFO_PLIST),
            custom: resolve_text(settings.info_plist.as_ref(), NEWLINE)?,
            settings: settings.clone(),
            app_path: app.clone(),
        });
    }
    if let Some(data) = resolve_text(settings.pkg_info.as_ref(), NEWLINE)? {
        patches.push(ReplaceFilePatch {
            name: PKG_INFO,
            target: layout.skeleton_path(PKG_INFO),
            data,
            fallback: Some(app.join(PKG_INFO)),
        });
    }
    if let Some(data) = resolve_binary(settings.icon.as_ref())? {
        patches.push(ReplaceFilePatch {
            name: ICON_NAME,
            target: layout.skeleton_path(&MacLayout::icon_path_default()),
            data,
            fallback: None,
        });
    }
    Ok(patches)
}

#[derive(Debug, Default)]
struct Markers {
    resources: bool,
    frameworks: bool,
    binary: bool,
    info_plist: bool,
    pkg_info: bool,
    icon: bool,
    rsrc: bool,
    xtras: bool,
}

/// Stream the skeleton into the app
///
/// With `in_stream` set, custom files replace skeleton files through the
/// patches instead of being left out for finalize.
fn extract_skeleton(build: &Build<'_>, mut patches: PatchSet, in_stream: bool) -> Result<PatchSet> {
    let settings = settings(build)?;
    let layout = MacLayout::new(settings);
    let resources = layout.resources_dir();
    let shockwave = build.config.settings.shockwave;
    let skip_custom = |custom: bool| custom && !in_stream;

    let binary_default = MacLayout::binary_path_default();
    let icon_default = MacLayout::icon_path_default();
    let rsrc_default = MacLayout::rsrc_path_default();
    let binary_custom = layout.binary_path_custom();
    let icon_custom = layout.icon_path_custom();
    let rsrc_custom = layout.rsrc_path_custom();

    let mut found = Markers::default();
    let mut archive = build.open_skeleton()?;
    archive.read(&mut |entry| {
        if entry.info().kind == EntryKind::ResourceFork {
            return Ok(());
        }
        if build.extract_xtra(entry, &mut patches, &mut found.xtras)? {
            return Ok(());
        }

        let volume_path = entry.info().volume_path.clone();
        let Some(relative) = path_relative_base(&volume_path, resources, true) else {
            return Ok(());
        };
        found.resources = true;

        if path_relative_base_match(relative, FRAMEWORKS, true) {
            found.frameworks = true;
            if shockwave {
                return Ok(());
            }
        }
        if path_relative_base_match(relative, INFO_PLIST, true) {
            found.info_plist = true;
            if skip_custom(settings.has_info_plist()) {
                return Ok(());
            }
        }
        if path_relative_base_match(relative, PKG_INFO, true) {
            found.pkg_info = true;
            if skip_custom(settings.has_pkg_info()) {
                return Ok(());
            }
        }

        let mut dest = relative;
        if path_relative_base_match(relative, &binary_default, true) {
            found.binary = true;
            if let Some(custom) = &binary_custom {
                dest = custom.as_str();
            }
        }
        if path_relative_base_match(relative, &icon_default, true) {
            found.icon = true;
            if skip_custom(settings.has_icon()) {
                return Ok(());
            }
            if let Some(custom) = &icon_custom {
                dest = custom.as_str();
            }
        }
        if path_relative_base_match(relative, &rsrc_default, true) {
            found.rsrc = true;
            if let Some(custom) = &rsrc_custom {
                dest = custom.as_str();
            }
        }

        let dest = build.paths.path.join(dest);
        patches.extract(entry, &dest)
    })?;

    require(found.resources, resources)?;
    require(found.frameworks, format!("{resources}/{FRAMEWORKS}"))?;
    require(found.binary, format!("{resources}/{binary_default}"))?;
    require(found.info_plist, format!("{resources}/{INFO_PLIST}"))?;
    require(found.icon, format!("{resources}/{icon_default}"))?;
    require(found.rsrc, format!("{resources}/{rsrc_default}"))?;
    require(found.xtras, XTRAS_DIR)?;
    if !found.pkg_info {
        debug!("📦 Skeleton has no {PKG_INFO}");
    }
    Ok(patches)
}

fn write_classic(build: &Build<'_>) -> Result<PatchSet> {
    extract_skeleton(build, PatchSet::new(), false)
}

fn write_otto(build: &Build<'_>) -> Result<PatchSet> {
    let patches = otto_patches(build, settings(build)?)?;
    extract_skeleton(build, patches, true)
}

fn modify_otto(_build: &Build<'_>, _tally: &mut PatchTally) -> Result<()> {
    Ok(())
}

fn modify_classic(build: &Build<'_>, tally: &mut PatchTally) -> Result<()> {
    let settings = settings(build)?;
    let layout = MacLayout::new(settings);
    let app = &build.paths.path;

    if let Some(icon) = resolve_binary(settings.icon.as_ref())? {
        write_output(&app.join(layout.icon_path()), &icon)?;
    }
    if let Some(pkg_info) = resolve_text(settings.pkg_info.as_ref(), NEWLINE)? {
        write_output(&app.join(PKG_INFO), &pkg_info)?;
    }

    if info_plist_needs_update(settings) {
        let path = app.join(INFO_PLIST);
        let source = match resolve_text(settings.info_plist.as_ref(), NEWLINE)? {
            Some(custom) => custom,
            None => fs::read(&path)?,
        };
        info!("📝 Updating {}", path.display());
        fs::write(&path, update_info_plist(&source, settings, app)?)?;
        tally.record(INFO_PLIST, 1);
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::config::{BinaryPayload, TextPayload};
    use crate::projector::{ProjectorConfig, ProjectorKind, XtraMapping, write};
    use tempfile::TempDir;

    fn plist_dict(path: &Path) -> plist::Dictionary {
        plist::Value::from_file(path)
            .unwrap()
            .into_dictionary()
            .unwrap()
    }

    fn config(temp: &TempDir, kind: ProjectorKind, pkg_info: bool) -> ProjectorConfig {
        let skeleton = temp.path().join("skeleton");
        fixture::write_skeleton(&skeleton, b"binary", pkg_info);
        let mut config = ProjectorConfig::new(temp.path().join("out/movie.app"), kind);
        config.settings.skeleton = Some(skeleton);
        config.settings.include_xtras = vec![XtraMapping::all()];
        config
    }

    fn custom() -> MacSettings {
        MacSettings {
            binary_name: Some("Movie".to_string()),
            icon: Some(BinaryPayload::Data(b"custom icns".to_vec())),
            pkg_info: Some(TextPayload::Text("APPL????".to_string())),
            bundle_name: BundleName::Output,
            ..Default::default()
        }
    }

    #[test]
    fn test_layout_names() {
        let settings = MacSettings::default();
        let layout = MacLayout::new(&settings);
        assert_eq!(layout.binary_path(), "Contents/MacOS/Projector");
        assert_eq!(layout.icon_path(), "Contents/Resources/projector.icns");
        assert_eq!(layout.resources_dir(), "Projector Resources");

        let settings = MacSettings {
            binary_name: Some("Movie".to_string()),
            intel: true,
            ..Default::default()
        };
        let layout = MacLayout::new(&settings);
        assert_eq!(layout.binary_path(), "Contents/MacOS/Movie");
        assert_eq!(layout.icon_name(), "Movie.icns");
        assert_eq!(layout.rsrc_path_custom().as_deref(), Some("Contents/Resources/Movie.rsrc"));
        assert_eq!(layout.resources_dir(), "Projector Intel Resources");
    }

    #[test]
    fn test_update_info_plist_keys() {
        let settings = MacSettings {
            binary_name: Some("Movie".to_string()),
            bundle_name: BundleName::Remove,
            ..Default::default()
        };
        let out = update_info_plist(
            fixture::INFO_PLIST_XML.as_bytes(),
            &settings,
            Path::new("out/Movie.app"),
        )
        .unwrap();
        let dict = plist::Value::from_reader(Cursor::new(out)).unwrap().into_dictionary().unwrap();
        assert_eq!(dict.get("CFBundleExecutable").and_then(|v| v.as_string()), Some("Movie"));
        assert_eq!(dict.get("CFBundleIconFile").and_then(|v| v.as_string()), Some("Movie.icns"));
        assert!(dict.get("CFBundleName").is_none());
    }

    #[test]
    fn test_needs_update() {
        assert!(!info_plist_needs_update(&MacSettings::default()));
        assert!(info_plist_needs_update(&MacSettings {
            bundle_name: BundleName::Name("X".to_string()),
            ..Default::default()
        }));
    }

    #[test]
    fn test_classic_default_extraction() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, ProjectorKind::MacApp(MacSettings::default()), true);
        write(&config).unwrap();

        let app = temp.path().join("out/movie.app");
        assert_eq!(fs::read(app.join("Contents/MacOS/Projector")).unwrap(), b"binary");
        assert!(app.join("Contents/Frameworks/DPLib.framework/DPLib").is_file());
        assert_eq!(fs::read_to_string(app.join(INFO_PLIST)).unwrap(), fixture::INFO_PLIST_XML);
        assert!(temp.path().join("out/xtras/Net/INetURL.xtra").is_file());
    }

    #[test]
    fn test_classic_customized() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp, ProjectorKind::MacApp(custom()), true);
        config.settings.shockwave = true;
        let report = write(&config).unwrap();

        let app = temp.path().join("out/movie.app");
        assert_eq!(report.patches.get(INFO_PLIST), 1);
        assert!(!app.join("Contents/Frameworks").exists());
        assert!(app.join("Contents/MacOS/Movie").is_file());
        assert!(!app.join("Contents/MacOS/Projector").exists());
        assert_eq!(fs::read(app.join("Contents/Resources/Movie.icns")).unwrap(), b"custom icns");
        assert!(app.join("Contents/Resources/Movie.rsrc").is_file());
        assert_eq!(fs::read(app.join(PKG_INFO)).unwrap(), b"APPL????");

        let dict = plist_dict(&app.join(INFO_PLIST));
        assert_eq!(dict.get("CFBundleName").and_then(|v| v.as_string()), Some("movie"));
        assert_eq!(dict.get("CFBundleExecutable").and_then(|v| v.as_string()), Some("Movie"));
    }

    #[test]
    fn test_otto_customized_in_stream() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, ProjectorKind::OttoMac(custom()), true);
        let report = write(&config).unwrap();

        let app = temp.path().join("out/movie.app");
        assert_eq!(report.patches.get(INFO_PLIST), 1);
        assert_eq!(report.patches.get(PKG_INFO), 1);
        assert_eq!(report.patches.get(ICON_NAME), 1);
        assert_eq!(fs::read(app.join("Contents/Resources/Movie.icns")).unwrap(), b"custom icns");
        assert_eq!(fs::read(app.join(PKG_INFO)).unwrap(), b"APPL????");
        let dict = plist_dict(&app.join(INFO_PLIST));
        assert_eq!(dict.get("CFBundleIconFile").and_then(|v| v.as_string()), Some("Movie.icns"));
    }

    #[test]
    fn test_otto_pkg_info_written_when_skeleton_lacks_it() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, ProjectorKind::OttoMac(custom()), false);
        let report = write(&config).unwrap();
        assert_eq!(report.patches.get(PKG_INFO), 0);
        assert_eq!(
            fs::read(temp.path().join("out/movie.app").join(PKG_INFO)).unwrap(),
            b"APPL????"
        );
    }

    #[test]
    fn test_nested_xtras_contents() {
        let temp = TempDir::new().unwrap();
        let settings = MacSettings {
            nest_xtras_contents: true,
            ..Default::default()
        };
        let config = config(&temp, ProjectorKind::MacApp(settings), true);
        write(&config).unwrap();
        assert!(
            temp.path()
                .join("out/movie.app/Contents/xtras/Net/INetURL.xtra")
                .is_file()
        );
    }

    #[test]
    fn test_missing_rsrc() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, ProjectorKind::MacApp(MacSettings::default()), true);
        let rsrc = "skeleton/Projector Resources/Contents/Resources/Projector.rsrc";
        fs::remove_file(temp.path().join(rsrc)).unwrap();
        let err = write(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to locate: Projector Resources/Contents/Resources/Projector.rsrc"
        );
    }

    #[test]
    fn test_intel_resources_required() {
        let temp = TempDir::new().unwrap();
        let settings = MacSettings {
            intel: true,
            ..Default::default()
        };
        let config = config(&temp, ProjectorKind::MacApp(settings), true);
        let err = write(&config).unwrap_err();
        assert_eq!(err.to_string(), "Failed to locate: Projector Intel Resources");
    }
}
