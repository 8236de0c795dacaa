//! High-level API: build a projector or bundle from a JSON manifest

use crate::bundle::{Bundle, ResourceOptions};
use crate::exceptions::Result;
use crate::launcher::{LauncherDirectory, LauncherSource, MemoryLaunchers};
use crate::projector::{self, BuildReport, ProjectorConfig};
use anyhow::Context;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options that do not come from the manifest
#[derive(Debug, Default, Clone)]
pub struct BuildOptions {
    /// Directory of compressed launcher stubs
    pub launchers_dir: Option<PathBuf>,
}

/// One resource copied into a bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Path relative to the nested projector's directory
    pub destination: String,
    /// File, directory or symlink to copy
    pub source: PathBuf,
    /// Attribute handling
    #[serde(default)]
    pub options: ResourceOptions,
}

/// Bundle section of a manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleManifest {
    /// Write the projector at the output path with no launcher
    pub flat: bool,
    /// Resources in copy order
    pub resources: Vec<ResourceEntry>,
}

/// Build manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    /// The projector to build
    pub projector: ProjectorConfig,
    /// Wrap the projector in a bundle
    #[serde(default)]
    pub bundle: Option<BundleManifest>,
}

impl BuildManifest {
    /// Parse a manifest from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a manifest and resolve its relative paths against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let mut manifest = Self::from_json(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        manifest.rebase(base);
        Ok(manifest)
    }

    /// Make every relative path absolute against `base`
    pub fn rebase(&mut self, base: &Path) {
        self.projector.rebase(base);
        if let Some(bundle) = &mut self.bundle {
            for resource in &mut bundle.resources {
                resource.source = base.join(&resource.source);
            }
        }
    }
}

/// Build the projector or bundle described by a manifest.
///
/// `output` replaces the output path named in the manifest.
pub fn build_projector(
    manifest_path: &Path,
    output: Option<&Path>,
    options: BuildOptions,
) -> Result<BuildReport> {
    let mut manifest = BuildManifest::load(manifest_path)?;
    if let Some(output) = output {
        manifest.projector.path = output.to_path_buf();
    }
    debug!("📋 Manifest {}: {:?}", manifest_path.display(), manifest.projector.kind);
    build(manifest, &options)
}

/// Build an already loaded manifest
pub fn build(manifest: BuildManifest, options: &BuildOptions) -> Result<BuildReport> {
    let Some(bundle_manifest) = manifest.bundle else {
        return projector::write(&manifest.projector);
    };

    let path = manifest.projector.path.clone();
    let launchers: Box<dyn LauncherSource> = if bundle_manifest.flat {
        Box::new(MemoryLaunchers::new())
    } else {
        Box::new(LauncherDirectory::resolve(options.launchers_dir.as_deref())?)
    };
    let mut bundle = Bundle::new(path, manifest.projector, launchers).flat(bundle_manifest.flat);
    let report = bundle.write(|bundle| {
        for resource in &bundle_manifest.resources {
            info!("📁 Resource {} <- {}", resource.destination, resource.source.display());
            bundle.copy_resource(&resource.destination, &resource.source, &resource.options)?;
        }
        Ok(())
    })?;
    Ok(report)
}
