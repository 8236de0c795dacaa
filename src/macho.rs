//! Mach-O header inspection and FAT launcher synthesis

use crate::exceptions::{ProjectorError, Result};
use crate::launcher::{LauncherSource, MAC_APP_I386, MAC_APP_PPC};
use goblin::mach::cputype::CPU_TYPE_X86;
use goblin::mach::fat::FAT_MAGIC;
use goblin::mach::header::{MH_CIGAM, MH_CIGAM_64, MH_MAGIC, MH_MAGIC_64};
use log::{debug, trace};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// PowerPC CPU type
pub const CPU_TYPE_POWERPC: u32 = 0x12;

/// Intel 32-bit CPU type
pub const CPU_TYPE_I386: u32 = CPU_TYPE_X86;

/// Alignment of slices inside a synthesized FAT binary (2^12)
pub const FAT_ALIGN: u32 = 12;

const FAT_ARCH_SIZE: usize = 20;

/// CPU type and subtype of one Mach-O slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachoType {
    /// `cputype` header field
    pub cpu_type: u32,
    /// `cpusubtype` header field
    pub cpu_subtype: u32,
}

/// Types found in a thin binary or in each slice of a FAT binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachoTypes {
    /// Single-architecture binary
    Thin(MachoType),
    /// Multi-architecture binary, slices in file order
    Fat(Vec<MachoType>),
}

impl MachoTypes {
    /// All types in file order
    pub fn to_vec(&self) -> Vec<MachoType> {
        match self {
            MachoTypes::Thin(t) => vec![*t],
            MachoTypes::Fat(types) => types.clone(),
        }
    }
}

fn be_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| {
            ProjectorError::MalformedExecutable(format!("Mach-O header truncated at {offset}"))
        })
}

fn le_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| {
            ProjectorError::MalformedExecutable(format!("Mach-O header truncated at {offset}"))
        })
}

/// Size of a FAT header with `count` slice records
fn fat_header_len(count: usize) -> Result<usize> {
    count
        .checked_mul(FAT_ARCH_SIZE)
        .and_then(|len| len.checked_add(8))
        .ok_or_else(|| {
            ProjectorError::MalformedExecutable(format!("FAT slice count {count} overflows"))
        })
}

/// Read the CPU types of a Mach-O or FAT binary.
///
/// # Errors
/// `UnknownHeaderMagic` when the first four bytes are no known magic.
pub fn read_types(data: &[u8]) -> Result<MachoTypes> {
    let magic = be_u32(data, 0)?;
    match magic {
        FAT_MAGIC => {
            let count = be_u32(data, 4)? as usize;
            if fat_header_len(count)? > data.len() {
                return Err(ProjectorError::MalformedExecutable(format!(
                    "FAT header with {count} slices exceeds {} bytes",
                    data.len()
                )));
            }
            let mut types = Vec::with_capacity(count);
            for i in 0..count {
                let offset = 8 + i * FAT_ARCH_SIZE;
                types.push(MachoType {
                    cpu_type: be_u32(data, offset)?,
                    cpu_subtype: be_u32(data, offset + 4)?,
                });
            }
            trace!("🍎 FAT binary with {count} slice(s)");
            Ok(MachoTypes::Fat(types))
        }
        MH_MAGIC | MH_MAGIC_64 => Ok(MachoTypes::Thin(MachoType {
            cpu_type: be_u32(data, 4)?,
            cpu_subtype: be_u32(data, 8)?,
        })),
        MH_CIGAM | MH_CIGAM_64 => Ok(MachoTypes::Thin(MachoType {
            cpu_type: le_u32(data, 4)?,
            cpu_subtype: le_u32(data, 8)?,
        })),
        other => Err(ProjectorError::UnknownHeaderMagic(other)),
    }
}

/// Read the CPU types from a file, reading only the header region
pub fn read_types_file(path: &Path) -> Result<MachoTypes> {
    let mut file = File::open(path)?;
    let mut head = vec![0u8; 12];
    let read = read_up_to(&mut file, &mut head)?;
    head.truncate(read);

    if be_u32(&head, 0)? == FAT_MAGIC {
        let count = be_u32(&head, 4)? as usize;
        let file_len = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        let wanted = fat_header_len(count)?.min(file_len);
        let mut rest = vec![0u8; wanted.saturating_sub(head.len())];
        let read = read_up_to(&mut file, &mut rest)?;
        head.extend_from_slice(&rest[..read]);
    }
    read_types(&head)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn launcher_id(cpu_type: u32) -> Result<&'static str> {
    match cpu_type {
        CPU_TYPE_POWERPC => Ok(MAC_APP_PPC),
        CPU_TYPE_I386 => Ok(MAC_APP_I386),
        other => Err(ProjectorError::UnknownCpuType(other)),
    }
}

/// Thin launcher payload for one CPU type
pub fn thin_launcher(cpu_type: u32, source: &dyn LauncherSource) -> Result<Vec<u8>> {
    source.launcher(launcher_id(cpu_type)?)
}

/// Build a FAT launcher holding one thin launcher per requested type.
///
/// Slices are laid out in request order, each starting on a 2^12 boundary.
pub fn fat_launcher(types: &[MachoType], source: &dyn LauncherSource) -> Result<Vec<u8>> {
    let bodies = types
        .iter()
        .map(|t| thin_launcher(t.cpu_type, source))
        .collect::<Result<Vec<_>>>()?;

    let count = u32::try_from(types.len())
        .map_err(|_| ProjectorError::InvalidConfig("Too many architectures".to_string()))?;
    let mut out = Vec::new();
    out.extend_from_slice(&FAT_MAGIC.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    for t in types {
        out.extend_from_slice(&t.cpu_type.to_be_bytes());
        out.extend_from_slice(&t.cpu_subtype.to_be_bytes());
        // offset and size are filled in once the body is placed
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&FAT_ALIGN.to_be_bytes());
    }

    let align = 1usize << FAT_ALIGN;
    for (i, body) in bodies.iter().enumerate() {
        let padded = out.len().div_ceil(align) * align;
        out.resize(padded, 0);

        let head = 8 + i * FAT_ARCH_SIZE;
        let offset = u32::try_from(padded)
            .map_err(|_| ProjectorError::InvalidConfig("FAT launcher too large".to_string()))?;
        let size = u32::try_from(body.len())
            .map_err(|_| ProjectorError::InvalidConfig("FAT slice too large".to_string()))?;
        out[head + 8..head + 12].copy_from_slice(&offset.to_be_bytes());
        out[head + 12..head + 16].copy_from_slice(&size.to_be_bytes());
        out.extend_from_slice(body);
    }

    debug!("🍎 FAT launcher with {} slice(s), {} bytes", types.len(), out.len());
    Ok(out)
}

/// Launcher matching the layout of a projector binary: thin for thin, FAT for FAT
pub fn app_launcher(types: &MachoTypes, source: &dyn LauncherSource) -> Result<Vec<u8>> {
    match types {
        MachoTypes::Thin(t) => thin_launcher(t.cpu_type, source),
        MachoTypes::Fat(types) => fat_launcher(types, source),
    }
}
