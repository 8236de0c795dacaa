//
// SPDX-FileCopyrightText: Copyright (c) 2025 provide.io llc. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//

//! Windows PE Executable Utilities
//!
//! Header and section table access for editing PE images in place: resource
//! section rebuilding, Authenticode certificate handling and the size and
//! checksum fields that must follow those edits.

pub mod editor;
pub mod icon;
pub mod resource;
pub mod signature;
pub mod version;

pub use editor::{ResourceEdits, launcher_with_resources, pe_version_ints, replace_resources};
pub use resource::{ResourceEntry, ResourceId, ResourceTable};

use crate::exceptions::{ProjectorError, Result};
use log::trace;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Offset of `e_lfanew` in the DOS header
pub const PE_POINTER_OFFSET: usize = 0x3C;

/// Data directory index of the resource table
pub const DIRECTORY_RESOURCE: usize = 2;

/// Data directory index of the attribute certificate table
pub const DIRECTORY_SECURITY: usize = 4;

/// Section contains code
pub const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;

/// Section contains initialized data
pub const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;

/// Section contains uninitialized data
pub const IMAGE_SCN_CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;

const SECTION_HEADER_SIZE: usize = 40;
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;

pub(crate) fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| ProjectorError::MalformedExecutable(format!("truncated at 0x{offset:x}")))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ProjectorError::MalformedExecutable(format!("truncated at 0x{offset:x}")))
}

pub(crate) fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// Check if data starts with a valid Windows PE executable header.
///
/// # Returns
/// `true` if data starts with "MZ" signature (PE executable)
pub fn is_pe_executable(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == b'M' && data[1] == b'Z'
}

/// Read the PE header offset from the DOS header.
///
/// The offset is stored at position 0x3C (e_lfanew field) as a 4-byte
/// little-endian integer.
///
/// # Returns
/// PE header offset, or None if the PE signature is not found there
pub fn get_pe_header_offset(data: &[u8]) -> Option<usize> {
    let pe_offset = read_u32(data, PE_POINTER_OFFSET).ok()? as usize;
    match data.get(pe_offset..pe_offset + 4) {
        Some(b"PE\x00\x00") => Some(pe_offset),
        _ => None,
    }
}

/// Read the COFF machine field: u32 at offset 60 gives the COFF header,
/// the machine is the u16 four bytes past it.
pub fn machine_type(data: &[u8]) -> Result<u16> {
    let coff = read_u32(data, PE_POINTER_OFFSET)? as usize;
    read_u16(data, coff + 4)
}

/// [`machine_type`] reading only the two header fields from a file
pub fn machine_type_file(path: &Path) -> Result<u16> {
    let mut file = File::open(path)?;
    let mut word = [0u8; 4];
    file.seek(SeekFrom::Start(PE_POINTER_OFFSET as u64))?;
    file.read_exact(&mut word)?;
    let coff = u32::from_le_bytes(word);
    let mut half = [0u8; 2];
    file.seek(SeekFrom::Start(u64::from(coff) + 4))?;
    file.read_exact(&mut half)?;
    Ok(u16::from_le_bytes(half))
}

/// One section table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Position in the section table
    pub index: usize,
    /// Raw 8-byte name
    pub name: [u8; 8],
    /// `VirtualSize`
    pub virtual_size: u32,
    /// `VirtualAddress`
    pub virtual_address: u32,
    /// `SizeOfRawData`
    pub size_of_raw_data: u32,
    /// `PointerToRawData`
    pub pointer_to_raw_data: u32,
    /// `Characteristics`
    pub characteristics: u32,
}

impl SectionHeader {
    /// Name with trailing NULs removed
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// True when `rva` falls inside the mapped extent of this section
    pub fn contains_rva(&self, rva: u32) -> bool {
        let extent = self.virtual_size.max(self.size_of_raw_data);
        rva >= self.virtual_address && rva - self.virtual_address < extent
    }
}

/// Offsets of the header structures of a parsed image
#[derive(Debug, Clone)]
pub struct PeHeaders {
    /// Offset of the `PE\0\0` signature
    pub pe_offset: usize,
    /// Offset of the COFF file header
    pub coff_offset: usize,
    /// COFF machine
    pub machine: u16,
    /// Offset of the optional header
    pub optional_offset: usize,
    /// True for PE32+
    pub is_64: bool,
    /// Number of data directories present
    pub number_of_rva_and_sizes: usize,
    /// Offset of the first data directory
    pub data_directory_offset: usize,
    /// Offset of the section table
    pub section_table_offset: usize,
    /// Number of sections
    pub number_of_sections: usize,
    /// `SectionAlignment`
    pub section_alignment: u32,
    /// `FileAlignment`
    pub file_alignment: u32,
}

impl PeHeaders {
    /// Parse the DOS, COFF and optional headers.
    ///
    /// # Errors
    /// `MalformedExecutable` when a signature or magic is wrong or a
    /// structure runs past the end of the data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !is_pe_executable(data) {
            return Err(ProjectorError::MalformedExecutable(
                "missing MZ signature".to_string(),
            ));
        }
        let pe_offset = get_pe_header_offset(data).ok_or_else(|| {
            ProjectorError::MalformedExecutable("missing PE signature".to_string())
        })?;
        let coff_offset = pe_offset + 4;
        let machine = read_u16(data, coff_offset)?;
        let number_of_sections = read_u16(data, coff_offset + 2)? as usize;
        let optional_size = read_u16(data, coff_offset + 16)? as usize;
        let optional_offset = coff_offset + 20;

        let is_64 = match read_u16(data, optional_offset)? {
            PE32_MAGIC => false,
            PE32_PLUS_MAGIC => true,
            other => {
                return Err(ProjectorError::MalformedExecutable(format!(
                    "unknown optional header magic 0x{other:x}"
                )));
            }
        };
        let (count_offset, data_directory_offset) = if is_64 {
            (optional_offset + 108, optional_offset + 112)
        } else {
            (optional_offset + 92, optional_offset + 96)
        };
        let number_of_rva_and_sizes = read_u32(data, count_offset)? as usize;
        let section_table_offset = optional_offset + optional_size;
        let section_table_end = section_table_offset + number_of_sections * SECTION_HEADER_SIZE;
        if section_table_end > data.len() || data_directory_offset > section_table_offset {
            return Err(ProjectorError::MalformedExecutable(
                "section table out of bounds".to_string(),
            ));
        }

        let headers = PeHeaders {
            pe_offset,
            coff_offset,
            machine,
            optional_offset,
            is_64,
            number_of_rva_and_sizes,
            data_directory_offset,
            section_table_offset,
            number_of_sections,
            section_alignment: read_u32(data, optional_offset + 32)?,
            file_alignment: read_u32(data, optional_offset + 36)?,
        };
        trace!(
            "PE headers: machine=0x{:x} sections={} pe32+={}",
            headers.machine, headers.number_of_sections, headers.is_64
        );
        Ok(headers)
    }

    /// Offset of the `CheckSum` field
    pub fn checksum_offset(&self) -> usize {
        self.optional_offset + 64
    }

    /// (RVA, size) of a data directory, `None` when absent or empty
    pub fn data_directory(&self, data: &[u8], index: usize) -> Result<Option<(u32, u32)>> {
        if index >= self.number_of_rva_and_sizes {
            return Ok(None);
        }
        let offset = self.data_directory_offset + index * 8;
        let rva = read_u32(data, offset)?;
        let size = read_u32(data, offset + 4)?;
        Ok(if rva == 0 && size == 0 {
            None
        } else {
            Some((rva, size))
        })
    }

    /// Overwrite a data directory entry
    pub fn set_data_directory(
        &self,
        data: &mut [u8],
        index: usize,
        rva: u32,
        size: u32,
    ) -> Result<()> {
        if index >= self.number_of_rva_and_sizes {
            return Err(ProjectorError::MalformedExecutable(format!(
                "no data directory slot {index}"
            )));
        }
        let offset = self.data_directory_offset + index * 8;
        write_u32(data, offset, rva);
        write_u32(data, offset + 4, size);
        Ok(())
    }

    /// All section headers in table order
    pub fn sections(&self, data: &[u8]) -> Result<Vec<SectionHeader>> {
        (0..self.number_of_sections)
            .map(|index| {
                let offset = self.section_table_offset + index * SECTION_HEADER_SIZE;
                let mut name = [0u8; 8];
                name.copy_from_slice(&data[offset..offset + 8]);
                Ok(SectionHeader {
                    index,
                    name,
                    virtual_size: read_u32(data, offset + 8)?,
                    virtual_address: read_u32(data, offset + 12)?,
                    size_of_raw_data: read_u32(data, offset + 16)?,
                    pointer_to_raw_data: read_u32(data, offset + 20)?,
                    characteristics: read_u32(data, offset + 36)?,
                })
            })
            .collect()
    }

    /// Write the size and position fields of a section header back
    pub fn write_section(&self, data: &mut [u8], section: &SectionHeader) {
        let offset = self.section_table_offset + section.index * SECTION_HEADER_SIZE;
        write_u32(data, offset + 8, section.virtual_size);
        write_u32(data, offset + 12, section.virtual_address);
        write_u32(data, offset + 16, section.size_of_raw_data);
        write_u32(data, offset + 20, section.pointer_to_raw_data);
    }

    /// Map an RVA to a file offset by walking the section table
    pub fn rva_to_file_offset(&self, data: &[u8], rva: u32) -> Result<Option<usize>> {
        for section in self.sections(data)? {
            if section.contains_rva(rva) {
                let offset = section.pointer_to_raw_data as usize
                    + (rva - section.virtual_address) as usize;
                return Ok(Some(offset));
            }
        }
        trace!("RVA 0x{:x} not found in any section", rva);
        Ok(None)
    }

    /// Recompute `SizeOfCode`, `SizeOfInitializedData`,
    /// `SizeOfUninitializedData` and `SizeOfImage` from the section table
    pub fn update_size_fields(&self, data: &mut [u8]) -> Result<()> {
        let sections = self.sections(data)?;
        let mut code = 0u32;
        let mut initialized = 0u32;
        let mut uninitialized = 0u32;
        let mut image_end = 0usize;
        for section in &sections {
            if section.characteristics & IMAGE_SCN_CNT_CODE != 0 {
                code = code.wrapping_add(section.size_of_raw_data);
            }
            if section.characteristics & IMAGE_SCN_CNT_INITIALIZED_DATA != 0 {
                initialized = initialized.wrapping_add(section.size_of_raw_data);
            }
            if section.characteristics & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0 {
                uninitialized = uninitialized.wrapping_add(section.virtual_size);
            }
            let extent = section.virtual_size.max(section.size_of_raw_data) as usize;
            image_end = image_end.max(section.virtual_address as usize + extent);
        }
        let size_of_image = align_up(image_end, self.section_alignment as usize);

        write_u32(data, self.optional_offset + 4, code);
        write_u32(data, self.optional_offset + 8, initialized);
        write_u32(data, self.optional_offset + 12, uninitialized);
        write_u32(
            data,
            self.optional_offset + 56,
            u32::try_from(size_of_image).map_err(|_| {
                ProjectorError::MalformedExecutable("image too large".to_string())
            })?,
        );
        Ok(())
    }

    /// Recompute the optional header checksum over the whole file
    pub fn update_checksum(&self, data: &mut [u8]) {
        let checksum = compute_checksum(data, self.checksum_offset());
        write_u32(data, self.checksum_offset(), checksum);
    }
}

/// Standard PE image checksum with the checksum field itself skipped
pub fn compute_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let mut sum: u64 = 0;
    let mut offset = 0;
    while offset < data.len() {
        if offset == checksum_offset || offset == checksum_offset + 2 {
            offset += 2;
            continue;
        }
        let low = u64::from(data[offset]);
        let high = data.get(offset + 1).map(|&b| u64::from(b)).unwrap_or(0);
        sum += low | (high << 8);
        sum = (sum & 0xffff) + (sum >> 16);
        offset += 2;
    }
    sum = (sum & 0xffff) + (sum >> 16);
    (sum as u32).wrapping_add(data.len() as u32)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_pe_executable() {
        let pe_data = b"MZ\x90\x00";
        assert!(is_pe_executable(pe_data));

        let elf_data = b"\x7fELF";
        assert!(!is_pe_executable(elf_data));

        let short_data = b"M";
        assert!(!is_pe_executable(short_data));
    }

    #[test]
    fn test_machine_type() {
        let image = test_image::build(0x14c, true);
        assert_eq!(machine_type(&image).unwrap(), 0x14c);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.exe");
        std::fs::write(&path, test_image::build(0x8664, true)).unwrap();
        assert_eq!(machine_type_file(&path).unwrap(), 0x8664);
    }

    #[test]
    fn test_parse_headers_and_sections() {
        let image = test_image::build(0x14c, true);
        let headers = PeHeaders::parse(&image).unwrap();
        assert!(!headers.is_64);
        assert_eq!(headers.file_alignment, 0x200);
        let sections = headers.sections(&image).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].name(), ".rsrc");
        assert_eq!(
            headers.data_directory(&image, DIRECTORY_RESOURCE).unwrap(),
            Some((test_image::RSRC_RVA, 16))
        );
        assert_eq!(
            headers
                .rva_to_file_offset(&image, test_image::RSRC_RVA + 4)
                .unwrap(),
            Some(0x404)
        );
    }

    #[test]
    fn test_size_fields_match_goblin() {
        let image = test_image::build(0x14c, true);
        let pe = goblin::pe::PE::parse(&image).unwrap();
        let optional = pe.header.optional_header.unwrap();
        assert_eq!(u64::from(optional.standard_fields.size_of_code), 0x200);
        assert_eq!(
            u64::from(optional.standard_fields.size_of_initialized_data),
            0x200
        );
        assert_eq!(u64::from(optional.windows_fields.size_of_image), 0x3000);
    }

    #[test]
    fn test_rejects_non_pe() {
        assert!(matches!(
            PeHeaders::parse(b"MZ but nothing else"),
            Err(ProjectorError::MalformedExecutable(_))
        ));
    }

    #[test]
    fn test_checksum_skips_checksum_field() {
        let mut image = test_image::build(0x14c, true);
        let headers = PeHeaders::parse(&image).unwrap();
        let before = compute_checksum(&image, headers.checksum_offset());
        write_u32(&mut image, headers.checksum_offset(), 0xdead_beef);
        assert_eq!(compute_checksum(&image, headers.checksum_offset()), before);
    }
}
