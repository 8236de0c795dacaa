//! ICO containers and icon group resources

use super::resource::{RT_GROUP_ICON, RT_ICON, ResourceEntry, ResourceId, ResourceTable};
use super::{read_u16, read_u32};
use crate::exceptions::{ProjectorError, Result};
use log::debug;
use std::collections::BTreeSet;

const ICO_HEADER_SIZE: usize = 6;
const ICO_ENTRY_SIZE: usize = 16;
const GROUP_ENTRY_SIZE: usize = 14;
const TYPE_ICON: u16 = 1;

/// One image of an icon, with the directory fields describing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconImage {
    /// Width in pixels, 0 meaning 256
    pub width: u8,
    /// Height in pixels, 0 meaning 256
    pub height: u8,
    /// Palette size, 0 when not paletted
    pub color_count: u8,
    /// Color planes
    pub planes: u16,
    /// Bits per pixel
    pub bit_count: u16,
    /// BMP (without file header) or PNG data
    pub data: Vec<u8>,
}

/// Parse an `.ico` file into its images
pub fn parse_ico(data: &[u8]) -> Result<Vec<IconImage>> {
    let bad = |msg: &str| ProjectorError::InvalidConfig(format!("Invalid icon data: {msg}"));
    if read_u16(data, 0).map_err(|_| bad("truncated"))? != 0
        || read_u16(data, 2).map_err(|_| bad("truncated"))? != TYPE_ICON
    {
        return Err(bad("not an icon container"));
    }
    let count = read_u16(data, 4).map_err(|_| bad("truncated"))? as usize;

    (0..count)
        .map(|i| {
            let at = ICO_HEADER_SIZE + i * ICO_ENTRY_SIZE;
            let head = data.get(at..at + ICO_ENTRY_SIZE).ok_or_else(|| bad("truncated directory"))?;
            let size = read_u32(head, 8).map_err(|_| bad("truncated directory"))? as usize;
            let offset = read_u32(head, 12).map_err(|_| bad("truncated directory"))? as usize;
            let image = data
                .get(offset..offset + size)
                .ok_or_else(|| bad("image data out of bounds"))?;
            Ok(IconImage {
                width: head[0],
                height: head[1],
                color_count: head[2],
                planes: read_u16(head, 4).map_err(|_| bad("truncated directory"))?,
                bit_count: read_u16(head, 6).map_err(|_| bad("truncated directory"))?,
                data: image.to_vec(),
            })
        })
        .collect()
}

/// Icon ids referenced by a group resource, in directory order
pub fn group_icon_ids(group: &[u8]) -> Result<Vec<u16>> {
    let count = read_u16(group, 4)? as usize;
    (0..count)
        .map(|i| read_u16(group, ICO_HEADER_SIZE + i * GROUP_ENTRY_SIZE + 12))
        .collect()
}

fn build_group(images: &[IconImage], ids: &[u16]) -> Result<Vec<u8>> {
    let count = u16::try_from(images.len())
        .map_err(|_| ProjectorError::InvalidConfig("Too many icon images".to_string()))?;
    let mut out = Vec::with_capacity(ICO_HEADER_SIZE + images.len() * GROUP_ENTRY_SIZE);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&TYPE_ICON.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    for (image, id) in images.iter().zip(ids) {
        let size = u32::try_from(image.data.len())
            .map_err(|_| ProjectorError::InvalidConfig("Icon image too large".to_string()))?;
        out.extend_from_slice(&[image.width, image.height, image.color_count, 0]);
        out.extend_from_slice(&image.planes.to_le_bytes());
        out.extend_from_slice(&image.bit_count.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&id.to_le_bytes());
    }
    Ok(out)
}

/// Replace the images of one icon group, keeping its name and language.
///
/// The group's old icon ids are reused first; further images get the lowest
/// ids no other icon resource uses.
pub fn replace_icons_for_group(
    table: &mut ResourceTable,
    group_name: &ResourceId,
    lang: u16,
    images: &[IconImage],
) -> Result<()> {
    let group = table.get(RT_GROUP_ICON, group_name, lang).ok_or_else(|| {
        ProjectorError::MalformedExecutable(format!("no icon group {group_name:?}"))
    })?;
    let codepage = group.codepage;
    let old_ids = group_icon_ids(&group.data)?;

    table.retain(|e| {
        !(e.kind == ResourceId::Id(RT_ICON)
            && e.lang == lang
            && e.name.id().is_some_and(|id| old_ids.contains(&id)))
    });

    let mut used: BTreeSet<u16> = table.of_type(RT_ICON).filter_map(|e| e.name.id()).collect();
    let mut ids = Vec::with_capacity(images.len());
    let mut reusable = old_ids.iter().copied();
    let mut next_free = 1u16;
    for _ in images {
        let id = match reusable.next() {
            Some(id) => id,
            None => {
                while used.contains(&next_free) {
                    next_free = next_free.checked_add(1).ok_or_else(|| {
                        ProjectorError::MalformedExecutable("icon ids exhausted".to_string())
                    })?;
                }
                next_free
            }
        };
        used.insert(id);
        ids.push(id);
    }

    for (image, id) in images.iter().zip(&ids) {
        table.set(ResourceEntry {
            kind: ResourceId::Id(RT_ICON),
            name: ResourceId::Id(*id),
            lang,
            codepage,
            data: image.data.clone(),
        });
    }
    table.set(ResourceEntry {
        kind: ResourceId::Id(RT_GROUP_ICON),
        name: group_name.clone(),
        lang,
        codepage,
        data: build_group(images, &ids)?,
    });
    debug!("🖼️ Icon group {group_name:?}/{lang:#x} now holds ids {ids:?}");
    Ok(())
}

#[cfg(test)]
pub(crate) fn build_ico(images: &[IconImage]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&TYPE_ICON.to_le_bytes());
    out.extend_from_slice(&(images.len() as u16).to_le_bytes());
    let mut offset = ICO_HEADER_SIZE + images.len() * ICO_ENTRY_SIZE;
    for image in images {
        out.extend_from_slice(&[image.width, image.height, image.color_count, 0]);
        out.extend_from_slice(&image.planes.to_le_bytes());
        out.extend_from_slice(&image.bit_count.to_le_bytes());
        out.extend_from_slice(&(image.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += image.data.len();
    }
    for image in images {
        out.extend_from_slice(&image.data);
    }
    out
}

#[cfg(test)]
pub(crate) fn sample_image(size: u8, fill: u8) -> IconImage {
    IconImage {
        width: size,
        height: size,
        color_count: 0,
        planes: 1,
        bit_count: 32,
        data: vec![fill; usize::from(size) * 4],
    }
}
