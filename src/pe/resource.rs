//! Resource directory tree codec
//!
//! The tree is flattened to `(type, name, language) -> data` leaves on read
//! and laid out again on write: directory tables breadth first, then data
//! entries, then name strings, then 8-byte aligned data blobs.

use super::{DIRECTORY_RESOURCE, PeHeaders, align_up, read_u16, read_u32, write_u16, write_u32};
use crate::exceptions::{ProjectorError, Result};
use log::{debug, trace};
use std::collections::{BTreeMap, HashMap};

/// Icon image resource type
pub const RT_ICON: u16 = 3;

/// Icon group resource type
pub const RT_GROUP_ICON: u16 = 14;

/// Version information resource type
pub const RT_VERSION: u16 = 16;

const NAME_IS_STRING: u32 = 0x8000_0000;
const DATA_IS_DIRECTORY: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x7FFF_FFFF;
const DIRECTORY_HEADER_SIZE: usize = 16;
const DIRECTORY_ENTRY_SIZE: usize = 8;
const DATA_ENTRY_SIZE: usize = 16;

/// Type or name of a resource; named entries sort before numeric ones
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceId {
    /// String identifier
    Name(String),
    /// Numeric identifier
    Id(u16),
}

impl ResourceId {
    /// Numeric id, if any
    pub fn id(&self) -> Option<u16> {
        match self {
            ResourceId::Id(id) => Some(*id),
            ResourceId::Name(_) => None,
        }
    }
}

/// One resource leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Resource type
    pub kind: ResourceId,
    /// Resource name
    pub name: ResourceId,
    /// Language id
    pub lang: u16,
    /// Code page of the data entry
    pub codepage: u32,
    /// Resource bytes
    pub data: Vec<u8>,
}

/// All resources of an image as a flat list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTable {
    /// Leaves in tree order
    pub entries: Vec<ResourceEntry>,
}

impl ResourceTable {
    /// Leaves of one numeric type
    pub fn of_type(&self, kind: u16) -> impl Iterator<Item = &ResourceEntry> {
        self.entries
            .iter()
            .filter(move |e| e.kind == ResourceId::Id(kind))
    }

    /// Look up a leaf
    pub fn get(&self, kind: u16, name: &ResourceId, lang: u16) -> Option<&ResourceEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == ResourceId::Id(kind) && &e.name == name && e.lang == lang)
    }

    /// Look up a leaf for writing
    pub fn get_mut(
        &mut self,
        kind: u16,
        name: &ResourceId,
        lang: u16,
    ) -> Option<&mut ResourceEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.kind == ResourceId::Id(kind) && &e.name == name && e.lang == lang)
    }

    /// Insert or replace the leaf with the same type, name and language
    pub fn set(&mut self, entry: ResourceEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.kind == entry.kind && e.name == entry.name && e.lang == entry.lang)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Drop every leaf `keep` rejects
    pub fn retain(&mut self, keep: impl FnMut(&ResourceEntry) -> bool) {
        self.entries.retain(keep);
    }
}

struct TreeReader<'a> {
    data: &'a [u8],
    headers: &'a PeHeaders,
    /// File offset of the root directory table
    base: usize,
}

impl TreeReader<'_> {
    fn name_at(&self, raw: u32) -> Result<ResourceId> {
        if raw & NAME_IS_STRING == 0 {
            return Ok(ResourceId::Id((raw & 0xFFFF) as u16));
        }
        let offset = self.base + (raw & OFFSET_MASK) as usize;
        let len = read_u16(self.data, offset)? as usize;
        let units = (0..len)
            .map(|i| read_u16(self.data, offset + 2 + i * 2))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResourceId::Name(String::from_utf16_lossy(&units)))
    }

    fn directory(&self, offset: usize) -> Result<Vec<(u32, u32)>> {
        let at = self.base + offset;
        let count = read_u16(self.data, at + 12)? as usize + read_u16(self.data, at + 14)? as usize;
        (0..count)
            .map(|i| {
                let entry = at + DIRECTORY_HEADER_SIZE + i * DIRECTORY_ENTRY_SIZE;
                Ok((read_u32(self.data, entry)?, read_u32(self.data, entry + 4)?))
            })
            .collect()
    }

    fn subdirectory(&self, raw: u32) -> Result<usize> {
        if raw & DATA_IS_DIRECTORY == 0 {
            return Err(ProjectorError::MalformedExecutable(
                "resource leaf where a directory was expected".to_string(),
            ));
        }
        Ok((raw & OFFSET_MASK) as usize)
    }

    fn leaf(&self, raw: u32) -> Result<(u32, Vec<u8>)> {
        if raw & DATA_IS_DIRECTORY != 0 {
            return Err(ProjectorError::MalformedExecutable(
                "resource directory nested below language level".to_string(),
            ));
        }
        let at = self.base + raw as usize;
        let rva = read_u32(self.data, at)?;
        let size = read_u32(self.data, at + 4)? as usize;
        let codepage = read_u32(self.data, at + 8)?;
        let offset = self
            .headers
            .rva_to_file_offset(self.data, rva)?
            .ok_or_else(|| {
                ProjectorError::MalformedExecutable(format!("resource data RVA 0x{rva:x} unmapped"))
            })?;
        let bytes = self.data.get(offset..offset + size).ok_or_else(|| {
            ProjectorError::MalformedExecutable(format!("resource data at 0x{offset:x} truncated"))
        })?;
        Ok((codepage, bytes.to_vec()))
    }
}

/// Read the resource tree of an image; an image without one gives an empty table
pub fn read_resources(data: &[u8]) -> Result<ResourceTable> {
    let headers = PeHeaders::parse(data)?;
    let Some((rva, _)) = headers.data_directory(data, DIRECTORY_RESOURCE)? else {
        return Ok(ResourceTable::default());
    };
    let base = headers.rva_to_file_offset(data, rva)?.ok_or_else(|| {
        ProjectorError::MalformedExecutable(format!("resource directory RVA 0x{rva:x} unmapped"))
    })?;
    let reader = TreeReader {
        data,
        headers: &headers,
        base,
    };

    let mut table = ResourceTable::default();
    for (type_raw, type_target) in reader.directory(0)? {
        let kind = reader.name_at(type_raw)?;
        for (name_raw, name_target) in reader.directory(reader.subdirectory(type_target)?)? {
            let name = reader.name_at(name_raw)?;
            for (lang_raw, lang_target) in reader.directory(reader.subdirectory(name_target)?)? {
                let (codepage, bytes) = reader.leaf(lang_target)?;
                table.entries.push(ResourceEntry {
                    kind: kind.clone(),
                    name: name.clone(),
                    lang: (lang_raw & 0xFFFF) as u16,
                    codepage,
                    data: bytes,
                });
            }
        }
    }
    trace!("Read {} resource leaves", table.entries.len());
    Ok(table)
}

type LangMap<'a> = BTreeMap<u16, &'a ResourceEntry>;
type NameMap<'a> = BTreeMap<ResourceId, LangMap<'a>>;

fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn write_directory_header<'a>(
    out: &mut [u8],
    at: usize,
    ids: impl Iterator<Item = &'a ResourceId>,
) {
    let (named, numbered) = ids.fold((0u16, 0u16), |(n, i), id| match id {
        ResourceId::Name(_) => (n + 1, i),
        ResourceId::Id(_) => (n, i + 1),
    });
    write_u16(out, at + 12, named);
    write_u16(out, at + 14, numbered);
}

/// Serialize `table` as a resource section whose first byte lives at `base_rva`
pub fn build_resource_data(table: &ResourceTable, base_rva: u32) -> Result<Vec<u8>> {
    let mut tree: BTreeMap<ResourceId, NameMap<'_>> = BTreeMap::new();
    for entry in &table.entries {
        tree.entry(entry.kind.clone())
            .or_default()
            .entry(entry.name.clone())
            .or_default()
            .insert(entry.lang, entry);
    }

    // directory tables, breadth first
    let mut cursor = DIRECTORY_HEADER_SIZE + tree.len() * DIRECTORY_ENTRY_SIZE;
    let mut name_dirs = Vec::new();
    for names in tree.values() {
        name_dirs.push(cursor);
        cursor += DIRECTORY_HEADER_SIZE + names.len() * DIRECTORY_ENTRY_SIZE;
    }
    let mut lang_dirs = Vec::new();
    for names in tree.values() {
        for langs in names.values() {
            lang_dirs.push(cursor);
            cursor += DIRECTORY_HEADER_SIZE + langs.len() * DIRECTORY_ENTRY_SIZE;
        }
    }

    let leaf_count: usize = tree
        .values()
        .flat_map(|names| names.values())
        .map(|langs| langs.len())
        .sum();
    let data_entries = cursor;
    cursor += leaf_count * DATA_ENTRY_SIZE;

    let mut strings: HashMap<String, usize> = HashMap::new();
    let mut string_order = Vec::new();
    for (kind, names) in &tree {
        for id in std::iter::once(kind).chain(names.keys()) {
            if let ResourceId::Name(name) = id {
                if !strings.contains_key(name) {
                    strings.insert(name.clone(), cursor);
                    string_order.push(name.clone());
                    cursor += 2 + utf16(name).len() * 2;
                }
            }
        }
    }

    let mut blobs = Vec::with_capacity(leaf_count);
    for names in tree.values() {
        for langs in names.values() {
            for entry in langs.values() {
                cursor = align_up(cursor, 8);
                blobs.push(cursor);
                cursor += entry.data.len();
            }
        }
    }
    let total = align_up(cursor, 8);
    let mut out = vec![0u8; total];

    let id_raw = |id: &ResourceId| -> Result<u32> {
        match id {
            ResourceId::Id(id) => Ok(u32::from(*id)),
            ResourceId::Name(name) => {
                let offset = strings.get(name).copied().ok_or_else(|| {
                    ProjectorError::MalformedExecutable(format!("unplaced resource name {name}"))
                })?;
                Ok(NAME_IS_STRING | offset as u32)
            }
        }
    };

    write_directory_header(&mut out, 0, tree.keys());
    let mut lang_index = 0;
    let mut leaf_index = 0;
    for (type_index, (kind, names)) in tree.iter().enumerate() {
        let entry = DIRECTORY_HEADER_SIZE + type_index * DIRECTORY_ENTRY_SIZE;
        write_u32(&mut out, entry, id_raw(kind)?);
        write_u32(&mut out, entry + 4, DATA_IS_DIRECTORY | name_dirs[type_index] as u32);

        let name_dir = name_dirs[type_index];
        write_directory_header(&mut out, name_dir, names.keys());
        for (name_index, (name, langs)) in names.iter().enumerate() {
            let entry = name_dir + DIRECTORY_HEADER_SIZE + name_index * DIRECTORY_ENTRY_SIZE;
            write_u32(&mut out, entry, id_raw(name)?);
            write_u32(&mut out, entry + 4, DATA_IS_DIRECTORY | lang_dirs[lang_index] as u32);

            let lang_dir = lang_dirs[lang_index];
            write_u16(&mut out, lang_dir + 14, langs.len() as u16);
            for (i, (lang, leaf)) in langs.iter().enumerate() {
                let entry = lang_dir + DIRECTORY_HEADER_SIZE + i * DIRECTORY_ENTRY_SIZE;
                let data_entry = data_entries + leaf_index * DATA_ENTRY_SIZE;
                write_u32(&mut out, entry, u32::from(*lang));
                write_u32(&mut out, entry + 4, data_entry as u32);

                let blob = blobs[leaf_index];
                let size = u32::try_from(leaf.data.len()).map_err(|_| {
                    ProjectorError::MalformedExecutable("resource too large".to_string())
                })?;
                write_u32(&mut out, data_entry, base_rva + blob as u32);
                write_u32(&mut out, data_entry + 4, size);
                write_u32(&mut out, data_entry + 8, leaf.codepage);
                out[blob..blob + leaf.data.len()].copy_from_slice(&leaf.data);
                leaf_index += 1;
            }
            lang_index += 1;
        }
    }

    for name in &string_order {
        let at = strings[name];
        let units = utf16(name);
        write_u16(&mut out, at, units.len() as u16);
        for (i, unit) in units.iter().enumerate() {
            write_u16(&mut out, at + 2 + i * 2, *unit);
        }
    }

    Ok(out)
}

/// Replace the resource tree of an image.
///
/// The section holding the resource directory must be the last section of
/// the file; it is rebuilt in place and bytes after it are kept.
///
/// # Errors
/// `MalformedExecutable` when the image has no resource directory,
/// `NonFinalResourceSection` when another section follows it.
pub fn write_resources(data: &[u8], table: &ResourceTable) -> Result<Vec<u8>> {
    let headers = PeHeaders::parse(data)?;
    let (rva, _) = headers
        .data_directory(data, DIRECTORY_RESOURCE)?
        .ok_or_else(|| ProjectorError::MalformedExecutable("no resource section".to_string()))?;
    let sections = headers.sections(data)?;
    let mut section = sections
        .iter()
        .find(|s| s.contains_rva(rva))
        .cloned()
        .ok_or_else(|| ProjectorError::MalformedExecutable("no resource section".to_string()))?;

    let is_last_in_table = section.index + 1 == sections.len();
    let is_last_in_file = sections
        .iter()
        .all(|s| s.pointer_to_raw_data <= section.pointer_to_raw_data);
    if !is_last_in_table || !is_last_in_file {
        return Err(ProjectorError::NonFinalResourceSection);
    }

    let raw_start = section.pointer_to_raw_data as usize;
    let raw_end = raw_start + section.size_of_raw_data as usize;
    let prefix_len = (rva - section.virtual_address) as usize;
    if raw_end > data.len() || prefix_len > section.size_of_raw_data as usize {
        return Err(ProjectorError::MalformedExecutable(
            "resource section raw data out of bounds".to_string(),
        ));
    }

    let built = build_resource_data(table, rva)?;
    let virtual_size = prefix_len + built.len();
    let raw_size = align_up(virtual_size, headers.file_alignment as usize);

    let mut out = Vec::with_capacity(raw_start + raw_size + (data.len() - raw_end));
    out.extend_from_slice(&data[..raw_start + prefix_len]);
    out.extend_from_slice(&built);
    out.resize(raw_start + raw_size, 0);
    out.extend_from_slice(&data[raw_end..]);

    let too_large =
        || ProjectorError::MalformedExecutable("resource section too large".to_string());
    section.virtual_size = u32::try_from(virtual_size).map_err(|_| too_large())?;
    section.size_of_raw_data = u32::try_from(raw_size).map_err(|_| too_large())?;
    headers.write_section(&mut out, &section);
    headers.set_data_directory(
        &mut out,
        DIRECTORY_RESOURCE,
        rva,
        u32::try_from(built.len()).map_err(|_| too_large())?,
    )?;
    headers.update_size_fields(&mut out)?;
    headers.update_checksum(&mut out);

    debug!(
        "📦 Rebuilt {} section: {} leaves, raw 0x{:x} -> 0x{:x}",
        section.name(),
        table.entries.len(),
        raw_end - raw_start,
        raw_size
    );
    Ok(out)
}
