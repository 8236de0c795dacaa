//! Projector configuration
//!
//! One [`ProjectorConfig`] describes one build. It is deserialized from a JSON
//! manifest or assembled in code, then handed to [`super::write`] which never
//! mutates it.

use crate::archive::ArchiveOptions;
use crate::exceptions::{ProjectorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Deferred payload producer, evaluated at write time
pub type Generator = Arc<dyn Fn() -> Result<Vec<u8>> + Send + Sync>;

/// Text file contents (config, lingo, Info.plist, PkgInfo, HTML)
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPayload {
    /// Raw bytes
    Data(Vec<u8>),
    /// A string written as-is
    Text(String),
    /// Lines joined with the platform newline, no trailing newline
    Lines(Vec<String>),
    /// Contents of a file
    File(PathBuf),
    /// Produced on demand
    #[serde(skip)]
    Generator(Generator),
}

impl fmt::Debug for TextPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextPayload::Data(data) => f.debug_tuple("Data").field(&data.len()).finish(),
            TextPayload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            TextPayload::Lines(lines) => f.debug_tuple("Lines").field(lines).finish(),
            TextPayload::File(path) => f.debug_tuple("File").field(path).finish(),
            TextPayload::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl TextPayload {
    /// Bytes of this payload, joining lines with `newline`
    pub fn resolve(&self, newline: &str) -> Result<Vec<u8>> {
        match self {
            TextPayload::Data(data) => Ok(data.clone()),
            TextPayload::Text(text) => Ok(text.as_bytes().to_vec()),
            TextPayload::Lines(lines) => Ok(lines.join(newline).into_bytes()),
            TextPayload::File(path) => read_payload_file(path),
            TextPayload::Generator(generate) => generate(),
        }
    }

    fn rebase(&mut self, base: &Path) {
        if let TextPayload::File(path) = self {
            *path = base.join(&*path);
        }
    }
}

/// Binary file contents (movie, splash image, icons)
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryPayload {
    /// Raw bytes
    Data(Vec<u8>),
    /// Contents of a file
    File(PathBuf),
    /// Produced on demand
    #[serde(skip)]
    Generator(Generator),
}

impl fmt::Debug for BinaryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryPayload::Data(data) => f.debug_tuple("Data").field(&data.len()).finish(),
            BinaryPayload::File(path) => f.debug_tuple("File").field(path).finish(),
            BinaryPayload::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl BinaryPayload {
    /// Bytes of this payload
    pub fn resolve(&self) -> Result<Vec<u8>> {
        match self {
            BinaryPayload::Data(data) => Ok(data.clone()),
            BinaryPayload::File(path) => read_payload_file(path),
            BinaryPayload::Generator(generate) => generate(),
        }
    }

    fn rebase(&mut self, base: &Path) {
        if let BinaryPayload::File(path) = self {
            *path = base.join(&*path);
        }
    }
}

fn read_payload_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        ProjectorError::InvalidConfig(format!("Failed to read {}: {e}", path.display()))
    })
}

/// Resolve an optional text payload
pub fn resolve_text(payload: Option<&TextPayload>, newline: &str) -> Result<Option<Vec<u8>>> {
    payload.map(|p| p.resolve(newline)).transpose()
}

/// Resolve an optional binary payload
pub fn resolve_binary(payload: Option<&BinaryPayload>) -> Result<Option<Vec<u8>>> {
    payload.map(BinaryPayload::resolve).transpose()
}

/// One Xtras inclusion rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XtraMapping {
    /// Source prefix under the skeleton xtras root; empty matches everything
    pub src: String,
    /// Replacement prefix; `None` keeps the source prefix
    #[serde(default)]
    pub dest: Option<String>,
}

impl XtraMapping {
    /// Mapping from `src` to `dest`
    pub fn new(src: impl Into<String>, dest: Option<&str>) -> Self {
        XtraMapping {
            src: src.into(),
            dest: dest.map(str::to_string),
        }
    }

    /// The `{"": null}` mapping that includes every Xtra unchanged
    pub fn all() -> Self {
        XtraMapping::new("", None)
    }
}

/// Settings shared by every projector kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorSettings {
    /// Skeleton directory or archive
    pub skeleton: Option<PathBuf>,
    /// Movie copied next to the projector
    pub movie: Option<BinaryPayload>,
    /// File name of the copied movie
    pub movie_name: Option<String>,
    /// Build the lighter Shockwave player
    pub shockwave: bool,
    /// Projector configuration file
    pub config: Option<TextPayload>,
    /// `LINGO.INI` contents
    pub lingo: Option<TextPayload>,
    /// Splash image
    pub splash: Option<BinaryPayload>,
    /// Xtras inclusion rules, in priority order for equal prefixes
    pub include_xtras: Vec<XtraMapping>,
    /// Put xtras under `Configuration/xtras`
    pub nest_xtras_configuration: bool,
    /// How to open the skeleton
    pub archive: ArchiveOptions,
}

/// Windows settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowsSettings {
    /// Replacement `.ico`
    pub icon: Option<BinaryPayload>,
    /// Version strings to set, in order
    pub version_strings: Option<Vec<(String, String)>>,
    /// Enlarge the display driver buffers of the Shockwave 3D Xtra
    pub patch_3d_display_drivers_size: bool,
    /// Drop the Authenticode signature instead of reattaching it
    pub remove_signature: bool,
}

/// `CFBundleName` handling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleName {
    /// Leave the skeleton value
    #[default]
    Default,
    /// Use the output name without `.app`
    Output,
    /// Use the given name
    Name(String),
    /// Remove the key
    Remove,
}

/// Mac app settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MacSettings {
    /// Rename the binary, icon and rsrc files
    pub binary_name: Option<String>,
    /// Use the Intel resources of the skeleton
    pub intel: bool,
    /// Replacement `.icns`
    pub icon: Option<BinaryPayload>,
    /// Replacement `Info.plist`
    pub info_plist: Option<TextPayload>,
    /// Replacement `PkgInfo`
    pub pkg_info: Option<TextPayload>,
    /// `CFBundleName` handling
    pub bundle_name: BundleName,
    /// Put xtras under `Contents/xtras` inside the app
    pub nest_xtras_contents: bool,
}

impl MacSettings {
    /// A custom icon is configured
    pub fn has_icon(&self) -> bool {
        self.icon.is_some()
    }

    /// A custom Info.plist is configured
    pub fn has_info_plist(&self) -> bool {
        self.info_plist.is_some()
    }

    /// A custom PkgInfo is configured
    pub fn has_pkg_info(&self) -> bool {
        self.pkg_info.is_some()
    }
}

fn default_classid() -> String {
    "clsid:166B1BCA-3F9C-11CF-8075-444553540000".to_string()
}

fn default_type() -> String {
    "application/x-director".to_string()
}

/// HTML embed page settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct HtmlSettings {
    pub lang: Option<String>,
    pub title: Option<String>,
    pub background: Option<String>,
    pub color: Option<String>,
    pub classid: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub codebase: Option<String>,
    pub pluginspage: Option<String>,
    pub src: String,
    pub width: Option<String>,
    pub height: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub bgcolor: Option<String>,
    pub sw_stretch_style: Option<String>,
    pub sw_stretch_h_align: Option<String>,
    pub sw_stretch_v_align: Option<String>,
    pub sw_remote: Option<String>,
    pub sw1: Option<String>,
    pub sw2: Option<String>,
    pub sw3: Option<String>,
    pub sw4: Option<String>,
    pub sw5: Option<String>,
    pub sw6: Option<String>,
    pub sw7: Option<String>,
    pub sw8: Option<String>,
    pub sw9: Option<String>,
    pub progress: Option<String>,
    pub logo: Option<String>,
    pub player_version: Option<String>,
    /// Complete replacement document
    pub html: Option<TextPayload>,
}

impl Default for HtmlSettings {
    fn default() -> Self {
        HtmlSettings {
            lang: None,
            title: None,
            background: None,
            color: None,
            classid: default_classid(),
            mime_type: default_type(),
            codebase: None,
            pluginspage: None,
            src: String::new(),
            width: None,
            height: None,
            name: None,
            id: None,
            bgcolor: None,
            sw_stretch_style: None,
            sw_stretch_h_align: None,
            sw_stretch_v_align: None,
            sw_remote: None,
            sw1: None,
            sw2: None,
            sw3: None,
            sw4: None,
            sw5: None,
            sw6: None,
            sw7: None,
            sw8: None,
            sw9: None,
            progress: None,
            logo: None,
            player_version: None,
            html: None,
        }
    }
}

/// Projector variant with its own settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectorKind {
    /// HTML embed page
    Html(HtmlSettings),
    /// Mac app, customized after extraction
    MacApp(MacSettings),
    /// Windows executable, customized after extraction
    WindowsExe(WindowsSettings),
    /// Mac app, customized while extracting
    OttoMac(MacSettings),
    /// Windows executable, customized while extracting
    OttoWindows(WindowsSettings),
}

impl ProjectorKind {
    /// Windows settings, for Windows kinds
    pub fn windows(&self) -> Option<&WindowsSettings> {
        match self {
            ProjectorKind::WindowsExe(s) | ProjectorKind::OttoWindows(s) => Some(s),
            _ => None,
        }
    }

    /// Mac settings, for Mac kinds
    pub fn mac(&self) -> Option<&MacSettings> {
        match self {
            ProjectorKind::MacApp(s) | ProjectorKind::OttoMac(s) => Some(s),
            _ => None,
        }
    }

    /// HTML settings, for the HTML kind
    pub fn html(&self) -> Option<&HtmlSettings> {
        match self {
            ProjectorKind::Html(s) => Some(s),
            _ => None,
        }
    }

    /// Customizations are applied while extracting
    pub fn is_otto(&self) -> bool {
        matches!(self, ProjectorKind::OttoMac(_) | ProjectorKind::OttoWindows(_))
    }
}

/// Everything needed for one projector build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectorConfig {
    /// Output executable, app bundle or HTML file
    pub path: PathBuf,
    /// Shared settings
    #[serde(default)]
    pub settings: ProjectorSettings,
    /// Variant
    pub kind: ProjectorKind,
}

impl ProjectorConfig {
    /// New config with default shared settings
    pub fn new(path: impl Into<PathBuf>, kind: ProjectorKind) -> Self {
        ProjectorConfig {
            path: path.into(),
            settings: ProjectorSettings::default(),
            kind,
        }
    }

    /// Make every relative path absolute against `base`
    pub fn rebase(&mut self, base: &Path) {
        self.path = base.join(&self.path);
        let settings = &mut self.settings;
        if let Some(skeleton) = &mut settings.skeleton {
            *skeleton = base.join(&*skeleton);
        }
        if let Some(hdiutil) = &mut settings.archive.hdiutil {
            if hdiutil.components().count() > 1 {
                *hdiutil = base.join(&*hdiutil);
            }
        }
        for payload in [&mut settings.config, &mut settings.lingo].into_iter().flatten() {
            payload.rebase(base);
        }
        for payload in [&mut settings.movie, &mut settings.splash].into_iter().flatten() {
            payload.rebase(base);
        }

        match &mut self.kind {
            ProjectorKind::Html(html) => {
                if let Some(doc) = &mut html.html {
                    doc.rebase(base);
                }
            }
            ProjectorKind::MacApp(mac) | ProjectorKind::OttoMac(mac) => {
                if let Some(icon) = &mut mac.icon {
                    icon.rebase(base);
                }
                for payload in [&mut mac.info_plist, &mut mac.pkg_info].into_iter().flatten() {
                    payload.rebase(base);
                }
            }
            ProjectorKind::WindowsExe(win) | ProjectorKind::OttoWindows(win) => {
                if let Some(icon) = &mut win.icon {
                    icon.rebase(base);
                }
            }
        }
    }
}
