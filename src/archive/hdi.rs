//! Disk image skeletons mounted through `hdiutil`

use super::{Archive, ArchiveOptions, DirArchive, Visitor};
use crate::exceptions::{ProjectorError, Result};
use log::{debug, info, warn};
use std::env;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Overrides the disk image tool location
pub const HDIUTIL_ENV: &str = "DIR_PROJECTOR_HDIUTIL";

/// Mounts a `.dmg` read-only, reads it as a directory, then detaches it
#[derive(Debug, Clone)]
pub struct HdiArchive {
    path: PathBuf,
    options: ArchiveOptions,
}

impl HdiArchive {
    /// Disk image at `path`
    pub fn new(path: impl Into<PathBuf>, options: ArchiveOptions) -> Self {
        HdiArchive {
            path: path.into(),
            options,
        }
    }

    fn tool(&self) -> Result<PathBuf> {
        if let Some(tool) = &self.options.hdiutil {
            return Ok(tool.clone());
        }
        if let Some(tool) = env::var_os(HDIUTIL_ENV) {
            return Ok(PathBuf::from(tool));
        }
        which::which("hdiutil")
            .map_err(|e| ProjectorError::Generic(format!("Failed to locate hdiutil: {e}")))
    }

    fn attach(&self, tool: &Path, mount_root: &Path) -> Result<PathBuf> {
        let mut command = Command::new(tool);
        command
            .arg("attach")
            .arg("-plist")
            .arg("-readonly")
            .arg("-noautoopen")
            .arg("-mountrandom")
            .arg(mount_root);
        if self.options.nobrowse {
            command.arg("-nobrowse");
        }
        command.arg(&self.path);

        debug!("💿 Running {command:?}");
        let output = command.output()?;
        if !output.status.success() {
            return Err(ProjectorError::Generic(format!(
                "hdiutil attach failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        mount_point_from_plist(&output.stdout)
    }

    fn detach(tool: &Path, mount_point: &Path) -> Result<()> {
        let output = Command::new(tool)
            .arg("detach")
            .arg(mount_point)
            .arg("-force")
            .output()?;
        if !output.status.success() {
            return Err(ProjectorError::Generic(format!(
                "hdiutil detach failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// First `mount-point` of the `system-entities` in an attach reply
pub fn mount_point_from_plist(reply: &[u8]) -> Result<PathBuf> {
    let value = plist::Value::from_reader(Cursor::new(reply))?;
    value
        .as_dictionary()
        .and_then(|root| root.get("system-entities"))
        .and_then(plist::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(plist::Value::as_dictionary)
        .find_map(|entity| entity.get("mount-point").and_then(plist::Value::as_string))
        .map(PathBuf::from)
        .ok_or_else(|| {
            ProjectorError::Generic("hdiutil attach reported no mount point".to_string())
        })
}

impl Archive for HdiArchive {
    fn read(&mut self, visitor: &mut Visitor<'_>) -> Result<()> {
        let tool = self.tool()?;
        let mount_root = tempfile::Builder::new()
            .prefix("dir-projector-mount-")
            .tempdir()?;
        let mount_point = self.attach(&tool, mount_root.path())?;
        info!("💿 Mounted {} at {}", self.path.display(), mount_point.display());

        let result = DirArchive::new(&mount_point).read(visitor);
        let detached = Self::detach(&tool, &mount_point);
        if let Err(e) = &detached {
            warn!("⚠️ {e}");
        }
        result.and(detached)
    }
}
