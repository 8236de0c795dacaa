//! Fixed-width byte-pattern patching
//!
//! A patch is a set of candidate templates. Every candidate is slid across the
//! whole buffer and exactly one offset, across all candidates together, must
//! match. Wildcard bytes (`--`) match anything when finding and are left alone
//! when replacing, so the buffer never changes length.

use crate::exceptions::{ProjectorError, Result};
use log::{debug, trace};

/// Name reported for the Shockwave 3D display driver buffer patch
pub const SHOCKWAVE_3D_DISPLAY_DRIVERS_SIZE: &str =
    "Windows Shockwave 3D InstalledDisplayDrivers Size";

/// File the display driver buffer patch applies to (compared lowercase)
pub const SHOCKWAVE_3D_ASSET_XTRA: &str = "shockwave 3d asset.x32";

/// One find/replace candidate; `None` marks a wildcard byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTemplate {
    find: Vec<Option<u8>>,
    replace: Vec<Option<u8>>,
}

impl PatchTemplate {
    /// Build a template from two hex strings with `--` wildcards.
    ///
    /// # Errors
    /// Fails when a token is not two hex digits or `--`, or when the
    /// find and replace sides differ in length.
    pub fn from_hex(find: &str, replace: &str) -> Result<Self> {
        let find = parse_hex_pattern(find)?;
        let replace = parse_hex_pattern(replace)?;
        if find.len() != replace.len() {
            return Err(ProjectorError::InvalidConfig(format!(
                "Patch template length mismatch: {} != {}",
                find.len(),
                replace.len()
            )));
        }
        Ok(PatchTemplate { find, replace })
    }

    /// Width of the patched region in bytes
    pub fn len(&self) -> usize {
        self.find.len()
    }

    /// True for a zero-width template
    pub fn is_empty(&self) -> bool {
        self.find.is_empty()
    }

    fn matches_at(&self, data: &[u8], offset: usize) -> bool {
        self.find
            .iter()
            .zip(&data[offset..offset + self.find.len()])
            .all(|(want, have)| want.is_none_or(|b| b == *have))
    }

    fn apply_at(&self, data: &mut [u8], offset: usize) {
        for (i, b) in self.replace.iter().enumerate() {
            if let Some(b) = b {
                data[offset + i] = *b;
            }
        }
    }
}

fn parse_hex_pattern(s: &str) -> Result<Vec<Option<u8>>> {
    let compact: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() % 2 != 0 {
        return Err(ProjectorError::InvalidConfig(format!(
            "Odd length patch pattern: {s}"
        )));
    }
    compact
        .chunks(2)
        .map(|pair| {
            let token: String = pair.iter().collect();
            if token == "--" {
                return Ok(None);
            }
            let bytes = hex::decode(&token).map_err(|e| {
                ProjectorError::InvalidConfig(format!("Bad patch token {token:?}: {e}"))
            })?;
            Ok(Some(bytes[0]))
        })
        .collect()
}

/// Apply exactly one of `candidates` to `data` in place.
///
/// # Errors
/// `NoPatchCandidates` when nothing matches, `MultiplePatchCandidates` when a
/// second offset matches under any candidate.
pub fn patch_once(data: &mut [u8], candidates: &[PatchTemplate], name: &str) -> Result<()> {
    let mut found: Option<(usize, &PatchTemplate)> = None;

    for candidate in candidates {
        if candidate.is_empty() || candidate.len() > data.len() {
            continue;
        }
        for offset in 0..=(data.len() - candidate.len()) {
            if !candidate.matches_at(data, offset) {
                continue;
            }
            if let Some((previous, _)) = found {
                debug!("🩹 {name}: second candidate at 0x{offset:x} (first at 0x{previous:x})");
                return Err(ProjectorError::MultiplePatchCandidates(name.to_string()));
            }
            trace!("🩹 {name}: candidate at 0x{offset:x}");
            found = Some((offset, candidate));
        }
    }

    let (offset, template) =
        found.ok_or_else(|| ProjectorError::NoPatchCandidates(name.to_string()))?;
    template.apply_at(data, offset);
    debug!("🩹 Applied {name} at 0x{offset:x}");
    Ok(())
}

/// Candidates enlarging the display driver name buffers of the Shockwave 3D
/// Xtra (0x104 to 0x10000 for ASCII, 0x208 to 0x20000 for wide strings).
pub fn shockwave_3d_display_drivers_size_templates() -> Result<Vec<PatchTemplate>> {
    [
        // director 8.5 to 11.0 hotfix 1: mov esi, 0x104; push esi
        (
            "FF 15 -- -- -- -- BE 04 01 00 00 56 E8 -- -- -- --",
            "FF 15 -- -- -- -- BE 00 00 01 00 56 E8 -- -- -- --",
        ),
        // director 11.0 hotfix 3 to 11.5: mov edi, 0x104; push edi
        (
            "FF 15 -- -- -- -- BF 04 01 00 00 57 E8 -- -- -- --",
            "FF 15 -- -- -- -- BF 00 00 01 00 57 E8 -- -- -- --",
        ),
        // director 11.5.8 to 11.5.9: push 0x208
        (
            "68 -- -- -- -- 57 FF D6 68 08 02 00 00 E8 -- -- -- --",
            "68 -- -- -- -- 57 FF D6 68 00 00 02 00 E8 -- -- -- --",
        ),
        // director 12: push 0x208
        (
            "68 -- -- -- -- 53 FF D7 68 08 02 00 00 E8 -- -- -- --",
            "68 -- -- -- -- 53 FF D7 68 00 00 02 00 E8 -- -- -- --",
        ),
    ]
    .iter()
    .map(|(find, replace)| PatchTemplate::from_hex(find, replace))
    .collect()
}

/// Apply the Shockwave 3D display driver size patch to an Xtra's bytes
pub fn patch_shockwave_3d_display_drivers_size(data: &mut [u8]) -> Result<()> {
    let templates = shockwave_3d_display_drivers_size_templates()?;
    patch_once(data, &templates, SHOCKWAVE_3D_DISPLAY_DRIVERS_SIZE)
}

/// Xtra-like bytes holding one match of the first display driver template
#[cfg(test)]
pub(crate) fn sample_3d_xtra() -> Vec<u8> {
    let templates = shockwave_3d_display_drivers_size_templates().unwrap();
    let mut data = vec![0x90; 64];
    data.extend(templates[0].find.iter().map(|b| b.unwrap_or(0)));
    data.extend([0x90; 64]);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_templates() -> Vec<PatchTemplate> {
        vec![
            PatchTemplate::from_hex("AA -- BB", "CC -- DD").unwrap(),
            PatchTemplate::from_hex("11 22 --", "33 -- 44").unwrap(),
        ]
    }

    #[test]
    fn test_parse_hex_pattern() {
        assert_eq!(
            parse_hex_pattern("0a -- FF").unwrap(),
            vec![Some(0x0a), None, Some(0xff)]
        );
        assert!(parse_hex_pattern("0").is_err());
        assert!(parse_hex_pattern("zz").is_err());
        assert!(PatchTemplate::from_hex("00 00", "00").is_err());
    }

    #[test]
    fn test_patch_once_mutates_only_fixed_bytes() {
        let mut data = vec![0x00, 0x11, 0x22, 0x99, 0x00];
        patch_once(&mut data, &two_templates(), "test").unwrap();
        assert_eq!(data, vec![0x00, 0x33, 0x22, 0x44, 0x00]);
    }

    #[test]
    fn test_patch_once_matches_at_end_of_buffer() {
        let mut data = vec![0x00, 0xAA, 0x05, 0xBB];
        patch_once(&mut data, &two_templates(), "test").unwrap();
        assert_eq!(data, vec![0x00, 0xCC, 0x05, 0xDD]);
    }

    #[test]
    fn test_patch_once_none_found() {
        let mut data = vec![0u8; 16];
        let err = patch_once(&mut data, &two_templates(), "test").unwrap_err();
        assert!(matches!(err, ProjectorError::NoPatchCandidates(_)));
        assert_eq!(data, vec![0u8; 16]);
    }

    #[test]
    fn test_patch_once_multiple_found_across_templates() {
        let mut data = vec![0xAA, 0x00, 0xBB, 0x11, 0x22, 0x00];
        let err = patch_once(&mut data, &two_templates(), "test").unwrap_err();
        assert!(matches!(err, ProjectorError::MultiplePatchCandidates(_)));
    }

    #[test]
    fn test_patch_once_multiple_found_same_template() {
        let mut data = vec![0xAA, 0x01, 0xBB, 0xAA, 0x02, 0xBB];
        let err = patch_once(&mut data, &two_templates(), "test").unwrap_err();
        assert!(matches!(err, ProjectorError::MultiplePatchCandidates(_)));
    }

    #[test]
    fn test_shockwave_3d_patch() {
        let mut data = vec![0x90; 8];
        data.extend_from_slice(&[
            0x68, 0x01, 0x02, 0x03, 0x04, 0x53, 0xFF, 0xD7, 0x68, 0x08, 0x02, 0x00, 0x00, 0xE8,
            0x10, 0x20, 0x30, 0x40,
        ]);
        data.extend_from_slice(&[0x90; 8]);
        patch_shockwave_3d_display_drivers_size(&mut data).unwrap();
        assert_eq!(&data[16..21], &[0x68, 0x00, 0x00, 0x02, 0x00]);
        assert_eq!(&data[9..13], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&data[22..26], &[0x10, 0x20, 0x30, 0x40]);
    }
}
