//! `VS_VERSIONINFO` resource codec
//!
//! Every block is `wLength, wValueLength, wType, szKey`, padded to 32 bits,
//! then a value and child blocks, each again 32-bit aligned. Text values
//! count their length in UTF-16 units, binary values in bytes.

use super::{align_up, read_u16, read_u32, write_u16};
use crate::exceptions::{ProjectorError, Result};

const FIXED_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const STRING_FILE_INFO: &str = "StringFileInfo";
const TYPE_BINARY: u16 = 0;
const TYPE_TEXT: u16 = 1;

/// One block of the version tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNode {
    /// Block key
    pub key: String,
    /// 1 for text, 0 for binary
    pub value_type: u16,
    /// Raw value bytes (UTF-16LE with terminator for text)
    pub value: Vec<u8>,
    /// Child blocks
    pub children: Vec<VersionNode>,
}

impl VersionNode {
    fn text(key: &str, value: &str) -> Self {
        VersionNode {
            key: key.to_string(),
            value_type: TYPE_TEXT,
            value: encode_text(value),
            children: Vec::new(),
        }
    }

    /// Text value up to the first NUL
    pub fn text_value(&self) -> String {
        let units: Vec<u16> = self
            .value
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }
}

fn encode_text(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|u| u.to_le_bytes())
        .collect()
}

fn malformed(msg: &str) -> ProjectorError {
    ProjectorError::MalformedExecutable(format!("version info: {msg}"))
}

/// Leaves have no children: `String` blocks under a string table and `Var`
/// blocks under `VarFileInfo`.
fn parse_node(
    data: &[u8],
    start: usize,
    limit: usize,
    depth: usize,
    under_strings: bool,
) -> Result<(VersionNode, usize)> {
    let length = read_u16(data, start)? as usize;
    let value_length = read_u16(data, start + 2)? as usize;
    let value_type = read_u16(data, start + 4)?;
    let end = start + length;
    if length < 6 || end > limit {
        return Err(malformed("block length out of bounds"));
    }

    let mut pos = start + 6;
    let mut key_units = Vec::new();
    loop {
        if pos + 2 > end {
            return Err(malformed("unterminated key"));
        }
        let unit = read_u16(data, pos)?;
        pos += 2;
        if unit == 0 {
            break;
        }
        key_units.push(unit);
    }
    let key = String::from_utf16_lossy(&key_units);
    pos = align_up(pos, 4).min(end);

    let value_bytes = if value_type == TYPE_TEXT {
        value_length * 2
    } else {
        value_length
    };
    let value_end = (pos + value_bytes).min(end);
    let value = data[pos..value_end].to_vec();
    pos = align_up(value_end, 4);

    let is_leaf = depth >= 3 || (depth == 2 && !under_strings);
    let mut children = Vec::new();
    while !is_leaf && pos + 6 <= end {
        let child_under_strings = if depth == 1 {
            key == STRING_FILE_INFO
        } else {
            under_strings
        };
        let (child, child_end) = parse_node(data, pos, end, depth + 1, child_under_strings)?;
        children.push(child);
        pos = align_up(child_end, 4);
    }

    Ok((
        VersionNode {
            key,
            value_type,
            value,
            children,
        },
        end,
    ))
}

fn write_node(out: &mut Vec<u8>, node: &VersionNode) -> Result<()> {
    let start = out.len();
    out.extend_from_slice(&[0u8; 6]);
    for unit in node.key.encode_utf16().chain(std::iter::once(0)) {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.resize(align_up(out.len(), 4), 0);
    out.extend_from_slice(&node.value);
    for child in &node.children {
        out.resize(align_up(out.len(), 4), 0);
        write_node(out, child)?;
    }

    let too_large = || malformed("block too large");
    let length = u16::try_from(out.len() - start).map_err(|_| too_large())?;
    let value_length = match node.value_type {
        TYPE_BINARY => node.value.len(),
        _ => node.value.len() / 2,
    };
    write_u16(out, start, length);
    write_u16(out, start + 2, u16::try_from(value_length).map_err(|_| too_large())?);
    write_u16(out, start + 4, node.value_type);
    Ok(())
}

/// Parsed `RT_VERSION` resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// The `VS_VERSION_INFO` root block
    pub root: VersionNode,
}

impl VersionInfo {
    /// Parse resource bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (root, _) = parse_node(data, 0, data.len(), 0, false)?;
        Ok(VersionInfo { root })
    }

    /// Serialize back to resource bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_node(&mut out, &self.root)?;
        Ok(out)
    }

    fn string_tables(&self) -> impl Iterator<Item = &VersionNode> {
        self.root
            .children
            .iter()
            .filter(|c| c.key == STRING_FILE_INFO)
            .flat_map(|c| c.children.iter())
    }

    /// `(language, codepage)` of every string table
    pub fn languages(&self) -> Vec<(u16, u16)> {
        self.string_tables()
            .filter_map(|t| {
                let lang = u16::from_str_radix(t.key.get(0..4)?, 16).ok()?;
                let codepage = u16::from_str_radix(t.key.get(4..8)?, 16).ok()?;
                Some((lang, codepage))
            })
            .collect()
    }

    /// Value of `key` in the table for `(lang, codepage)`
    pub fn string_value(&self, lang: u16, codepage: u16, key: &str) -> Option<String> {
        let table_key = format!("{lang:04X}{codepage:04X}");
        self.string_tables()
            .find(|t| t.key.eq_ignore_ascii_case(&table_key))?
            .children
            .iter()
            .find(|s| s.key == key)
            .map(VersionNode::text_value)
    }

    /// Set `values` in every string table; missing keys are appended
    pub fn set_string_values(&mut self, values: &[(String, String)]) {
        for info in self
            .root
            .children
            .iter_mut()
            .filter(|c| c.key == STRING_FILE_INFO)
        {
            for table in &mut info.children {
                for (key, value) in values {
                    match table.children.iter_mut().find(|s| &s.key == key) {
                        Some(existing) => {
                            existing.value_type = TYPE_TEXT;
                            existing.value = encode_text(value);
                        }
                        None => table.children.push(VersionNode::text(key, value)),
                    }
                }
            }
        }
    }

    fn fixed_field(&self, offset: usize) -> Result<u32> {
        if read_u32(&self.root.value, 0)? != FIXED_INFO_SIGNATURE {
            return Err(malformed("missing VS_FIXEDFILEINFO"));
        }
        read_u32(&self.root.value, offset)
    }

    fn set_fixed_pair(&mut self, offset: usize, pair: [u32; 2]) -> Result<()> {
        self.fixed_field(offset + 4)?;
        self.root.value[offset..offset + 4].copy_from_slice(&pair[0].to_le_bytes());
        self.root.value[offset + 4..offset + 8].copy_from_slice(&pair[1].to_le_bytes());
        Ok(())
    }

    /// `dwFileVersionMS`, `dwFileVersionLS`
    pub fn file_version(&self) -> Result<[u32; 2]> {
        Ok([self.fixed_field(8)?, self.fixed_field(12)?])
    }

    /// `dwProductVersionMS`, `dwProductVersionLS`
    pub fn product_version(&self) -> Result<[u32; 2]> {
        Ok([self.fixed_field(16)?, self.fixed_field(20)?])
    }

    /// Overwrite the numeric file version
    pub fn set_file_version(&mut self, version: [u32; 2]) -> Result<()> {
        self.set_fixed_pair(8, version)
    }

    /// Overwrite the numeric product version
    pub fn set_product_version(&mut self, version: [u32; 2]) -> Result<()> {
        self.set_fixed_pair(16, version)
    }
}

#[cfg(test)]
pub(crate) fn sample_version_info(strings: &[(&str, &str)]) -> Vec<u8> {
    let mut fixed = vec![0u8; 52];
    fixed[0..4].copy_from_slice(&FIXED_INFO_SIGNATURE.to_le_bytes());
    fixed[4..8].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    fixed[8..12].copy_from_slice(&0x0008_0005u32.to_le_bytes());

    let table = VersionNode {
        key: "040904B0".to_string(),
        value_type: TYPE_TEXT,
        value: Vec::new(),
        children: strings.iter().map(|(k, v)| VersionNode::text(k, v)).collect(),
    };
    let var = VersionNode {
        key: "Translation".to_string(),
        value_type: TYPE_BINARY,
        value: vec![0x09, 0x04, 0xB0, 0x04],
        children: Vec::new(),
    };
    let root = VersionNode {
        key: "VS_VERSION_INFO".to_string(),
        value_type: TYPE_BINARY,
        value: fixed,
        children: vec![
            VersionNode {
                key: STRING_FILE_INFO.to_string(),
                value_type: TYPE_TEXT,
                value: Vec::new(),
                children: vec![table],
            },
            VersionNode {
                key: "VarFileInfo".to_string(),
                value_type: TYPE_TEXT,
                value: Vec::new(),
                children: vec![var],
            },
        ],
    };
    VersionInfo { root }.to_bytes().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample() {
        let data = sample_version_info(&[("CompanyName", "Macromedia"), ("FileVersion", "8.5")]);
        let info = VersionInfo::parse(&data).unwrap();
        assert_eq!(info.root.key, "VS_VERSION_INFO");
        assert_eq!(info.languages(), vec![(0x0409, 0x04B0)]);
        assert_eq!(
            info.string_value(0x0409, 0x04B0, "CompanyName").as_deref(),
            Some("Macromedia")
        );
        assert_eq!(info.file_version().unwrap(), [0x0008_0005, 0]);
        assert_eq!(info.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_var_value_is_binary() {
        let info = VersionInfo::parse(&sample_version_info(&[])).unwrap();
        let var = &info.root.children[1].children[0];
        assert_eq!(var.key, "Translation");
        assert_eq!(var.value, vec![0x09, 0x04, 0xB0, 0x04]);
    }

    #[test]
    fn test_set_string_values_touches_only_given_keys() {
        let data = sample_version_info(&[("CompanyName", "Macromedia"), ("FileVersion", "8.5")]);
        let mut info = VersionInfo::parse(&data).unwrap();
        info.set_string_values(&[
            ("FileVersion".to_string(), "1.2.3.4".to_string()),
            ("LegalCopyright".to_string(), "(c) Example".to_string()),
        ]);
        let info = VersionInfo::parse(&info.to_bytes().unwrap()).unwrap();
        let get = |k: &str| info.string_value(0x0409, 0x04B0, k);
        assert_eq!(get("CompanyName").as_deref(), Some("Macromedia"));
        assert_eq!(get("FileVersion").as_deref(), Some("1.2.3.4"));
        assert_eq!(get("LegalCopyright").as_deref(), Some("(c) Example"));
    }

    #[test]
    fn test_set_fixed_versions() {
        let mut info = VersionInfo::parse(&sample_version_info(&[])).unwrap();
        info.set_file_version([0x0001_0002, 0x0003_0004]).unwrap();
        info.set_product_version([0x0005_0006, 0]).unwrap();
        assert_eq!(info.file_version().unwrap(), [0x0001_0002, 0x0003_0004]);
        assert_eq!(info.product_version().unwrap(), [0x0005_0006, 0]);
    }

    #[test]
    fn test_truncated_block_is_malformed() {
        let data = sample_version_info(&[]);
        assert!(VersionInfo::parse(&data[..data.len() / 2]).is_err());
    }
}
