//! Icon and version resource replacement for projector executables

use super::icon::{group_icon_ids, parse_ico, replace_icons_for_group};
use super::resource::{
    RT_GROUP_ICON, RT_ICON, RT_VERSION, ResourceId, ResourceTable, read_resources, write_resources,
};
use super::signature::{signature_attach, signature_get, signature_strip};
use super::version::VersionInfo;
use crate::exceptions::Result;
use log::{debug, info};
use std::collections::BTreeMap;

/// Resource changes to apply to an executable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceEdits {
    /// Replacement `.ico` container for every icon group
    pub icon_data: Option<Vec<u8>>,
    /// String table values to set, in order
    pub version_strings: Option<Vec<(String, String)>>,
    /// Leave the stripped Authenticode signature off
    pub remove_signature: bool,
}

impl ResourceEdits {
    /// True when applying these edits changes nothing
    pub fn is_noop(&self) -> bool {
        self.icon_data.is_none() && self.version_strings.is_none() && !self.remove_signature
    }
}

/// Parse a dotted or comma separated version into the fixed-info
/// `[MS, LS]` pair, e.g. `"1.2.3.4"` gives `[0x0001_0002, 0x0003_0004]`.
///
/// Up to four decimal parts, each at most 0xFFFF; anything else gives `None`.
pub fn pe_version_ints(version: &str) -> Option<[u32; 2]> {
    let mut parts = [0u32; 4];
    let mut count = 0;
    for piece in version.split(['.', ',']) {
        if count == 4 || piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u32 = piece.parse().ok()?;
        if value > 0xFFFF {
            return None;
        }
        parts[count] = value;
        count += 1;
    }
    Some([(parts[0] << 16) | parts[1], (parts[2] << 16) | parts[3]])
}

fn replace_icons(table: &mut ResourceTable, icon_data: &[u8]) -> Result<()> {
    let images = parse_ico(icon_data)?;
    let groups: Vec<(ResourceId, u16)> = table
        .of_type(RT_GROUP_ICON)
        .map(|e| (e.name.clone(), e.lang))
        .collect();
    for (name, lang) in &groups {
        replace_icons_for_group(table, name, *lang, &images)?;
    }
    debug!("🖼️ Replaced {} icon image(s) in {} group(s)", images.len(), groups.len());
    Ok(())
}

fn replace_version_strings(table: &mut ResourceTable, values: &[(String, String)]) -> Result<()> {
    let lookup = |key: &str| {
        values
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| pe_version_ints(v))
    };
    let file_version = lookup("FileVersion");
    let product_version = lookup("ProductVersion");

    for entry in table.entries.iter_mut().filter(|e| e.kind == ResourceId::Id(RT_VERSION)) {
        let mut info = VersionInfo::parse(&entry.data)?;
        info.set_string_values(values);
        if let Some(version) = file_version {
            info.set_file_version(version)?;
        }
        if let Some(version) = product_version {
            info.set_product_version(version)?;
        }
        entry.data = info.to_bytes()?;
        debug!(
            "📝 Version strings set for {:?}/{:#x} ({} language(s))",
            entry.name,
            entry.lang,
            info.languages().len()
        );
    }
    Ok(())
}

/// Replace icons and version strings of a PE image.
///
/// An existing signature is stripped before editing and, unless
/// `remove_signature` is set, attached again afterwards. The reattached
/// signature no longer verifies; it is kept for tools that only check for
/// its presence. With no edits requested the input is returned untouched.
///
/// # Errors
/// `MalformedExecutable` for a bad image or missing resource section,
/// `NonFinalResourceSection` when the resources are not at the end.
pub fn replace_resources(data: Vec<u8>, edits: &ResourceEdits) -> Result<Vec<u8>> {
    if edits.is_noop() {
        return Ok(data);
    }

    let signature = signature_get(&data)?;
    let mut data = signature_strip(data)?;

    if edits.icon_data.is_some() || edits.version_strings.is_some() {
        let mut table = read_resources(&data)?;
        if let Some(icon_data) = &edits.icon_data {
            replace_icons(&mut table, icon_data)?;
        }
        if let Some(values) = &edits.version_strings {
            replace_version_strings(&mut table, values)?;
        }
        data = write_resources(&data, &table)?;
    }

    match signature {
        Some(signature) if !edits.remove_signature => {
            info!("🔏 Reattaching original signature (no longer valid)");
            signature_attach(data, &signature)
        }
        _ => Ok(data),
    }
}

/// Copy version info and the first icon group of each language (with its
/// icons) from a projector into a launcher stub.
pub fn launcher_with_resources(launcher: Vec<u8>, projector: &[u8]) -> Result<Vec<u8>> {
    let source = read_resources(&signature_strip(projector.to_vec())?)?;

    let mut first_groups: BTreeMap<u16, &ResourceId> = BTreeMap::new();
    for group in source.of_type(RT_GROUP_ICON) {
        let slot = first_groups.entry(group.lang).or_insert(&group.name);
        if lowest_first(&group.name, slot) {
            *slot = &group.name;
        }
    }

    let mut copied = ResourceTable::default();
    copied
        .entries
        .extend(source.of_type(RT_VERSION).cloned());
    for (lang, name) in &first_groups {
        let Some(group) = source.get(RT_GROUP_ICON, name, *lang) else {
            continue;
        };
        let ids = group_icon_ids(&group.data)?;
        copied.entries.push(group.clone());
        copied.entries.extend(
            source
                .of_type(RT_ICON)
                .filter(|e| e.lang == *lang && e.name.id().is_some_and(|id| ids.contains(&id)))
                .cloned(),
        );
    }

    let signature = signature_get(&launcher)?;
    let stripped = signature_strip(launcher)?;
    let mut table = read_resources(&stripped)?;
    table.retain(|e| {
        ![RT_VERSION, RT_GROUP_ICON, RT_ICON]
            .iter()
            .any(|kind| e.kind == ResourceId::Id(*kind))
    });
    table.entries.extend(copied.entries);
    let written = write_resources(&stripped, &table)?;
    debug!("🚀 Launcher resources copied from projector ({} leaves)", table.entries.len());

    match signature {
        Some(signature) => signature_attach(written, &signature),
        None => Ok(written),
    }
}

/// Numeric ids before names, lower ids first
fn lowest_first(candidate: &ResourceId, current: &ResourceId) -> bool {
    match (candidate, current) {
        (ResourceId::Id(a), ResourceId::Id(b)) => a < b,
        (ResourceId::Id(_), ResourceId::Name(_)) => true,
        (ResourceId::Name(_), ResourceId::Id(_)) => false,
        (ResourceId::Name(a), ResourceId::Name(b)) => a < b,
    }
}
