//! Outer launchers for bundled projectors

use crate::archive::set_mode;
use crate::exceptions::{ProjectorError, Result};
use crate::launcher::{LauncherSource, WINDOWS_I686, WINDOWS_X86_64};
use crate::macho::{app_launcher, read_types_file};
use crate::pe::editor::launcher_with_resources;
use crate::pe::machine_type;
use crate::projector::mac::{INFO_PLIST, MacLayout, PKG_INFO};
use crate::projector::{MacSettings, write_output};
use log::{debug, info};
use std::fs;
use std::path::Path;

/// COFF machine of 32-bit x86 images
pub const IMAGE_FILE_MACHINE_I386: u16 = 0x014c;

/// COFF machine of x86-64 images
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

/// Launcher id for a COFF machine type
pub fn windows_launcher_id(machine: u16) -> Result<&'static str> {
    match machine {
        IMAGE_FILE_MACHINE_I386 => Ok(WINDOWS_I686),
        IMAGE_FILE_MACHINE_AMD64 => Ok(WINDOWS_X86_64),
        other => Err(ProjectorError::UnknownMachineType(other)),
    }
}

/// Launcher stub for `projector` carrying its icons and version info
pub fn windows_launcher(projector: &[u8], source: &dyn LauncherSource) -> Result<Vec<u8>> {
    let id = windows_launcher_id(machine_type(projector)?)?;
    debug!("🚀 Windows launcher {id}");
    launcher_with_resources(source.launcher(id)?, projector)
}

/// Write the Windows launcher for the nested `projector` exe to `output`
pub fn write_windows_launcher(
    output: &Path,
    projector: &Path,
    source: &dyn LauncherSource,
) -> Result<()> {
    let data = windows_launcher(&fs::read(projector)?, source)?;
    write_output(output, &data)?;
    set_mode(output, 0o755)?;
    info!("🚀 Launcher written: {}", output.display());
    Ok(())
}

/// Write the Mac launcher app at `output` around the nested `app`.
///
/// The launcher binary mirrors the architectures of the nested binary; the
/// Info.plist, PkgInfo and icon are copied from the nested app.
pub fn write_mac_launcher(
    output: &Path,
    app: &Path,
    settings: &MacSettings,
    source: &dyn LauncherSource,
) -> Result<()> {
    let layout = MacLayout::new(settings);
    let binary_path = layout.binary_path();

    let types = read_types_file(&app.join(&binary_path))?;
    debug!("🍎 Nested binary types: {:?}", types.to_vec());
    let binary = output.join(&binary_path);
    write_output(&binary, &app_launcher(&types, source)?)?;
    set_mode(&binary, 0o755)?;

    let icon_path = layout.icon_path();
    for relative in [INFO_PLIST, PKG_INFO, icon_path.as_str()] {
        let from = app.join(relative);
        if relative == PKG_INFO && fs::symlink_metadata(&from).is_err() {
            continue;
        }
        write_output(&output.join(relative), &fs::read(&from)?)?;
    }
    info!("🚀 Launcher written: {}", output.display());
    Ok(())
}
