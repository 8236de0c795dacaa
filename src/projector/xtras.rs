//! Xtras inclusion map
//!
//! Each mapping names a source prefix under the skeleton `xtras` root and an
//! optional destination prefix. The longest matching source prefix wins; on a
//! tie the mapping listed first is kept.

use super::config::XtraMapping;
use crate::utils::path_relative_base;

/// Name of the xtras root in skeletons and outputs
pub const XTRAS_DIR: &str = "xtras";

/// Mapping with the longest source prefix matching `path`, and the remainder
pub fn best_match<'m, 'p>(
    mappings: &'m [XtraMapping],
    path: &'p str,
) -> Option<(&'m XtraMapping, &'p str)> {
    let mut best: Option<(&XtraMapping, &str)> = None;
    for mapping in mappings {
        let relative = if mapping.src.is_empty() {
            path
        } else {
            match path_relative_base(path, &mapping.src, true) {
                Some(relative) => relative,
                None => continue,
            }
        };
        if best.is_none_or(|(current, _)| mapping.src.len() > current.src.len()) {
            best = Some((mapping, relative));
        }
    }
    best
}

/// Output path relative to the xtras directory, or `None` to exclude
///
/// An empty result stands for the xtras root itself.
pub fn destination_for(mappings: &[XtraMapping], path: &str) -> Option<String> {
    let (mapping, relative) = best_match(mappings, path)?;
    let base = mapping.dest.as_deref().unwrap_or(&mapping.src);
    Some(match (base.is_empty(), relative.is_empty()) {
        (false, false) => format!("{base}/{relative}"),
        (false, true) => base.to_string(),
        (true, _) => relative.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mappings(pairs: &[(&str, Option<&str>)]) -> Vec<XtraMapping> {
        pairs.iter().map(|(src, dest)| XtraMapping::new(*src, *dest)).collect()
    }

    #[test]
    fn test_catch_all() {
        let map = mappings(&[("", None)]);
        assert_eq!(destination_for(&map, "Net/INetURL.x32").as_deref(), Some("Net/INetURL.x32"));
        assert_eq!(destination_for(&map, "").as_deref(), Some(""));
    }

    #[test]
    fn test_no_match_excludes() {
        let map = mappings(&[("Net", None)]);
        assert_eq!(destination_for(&map, "Media/Sound.x32"), None);
        assert_eq!(destination_for(&map, "Network/a.x32"), None);
        assert_eq!(destination_for(&[], "Net/a.x32"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let map = mappings(&[
            ("", None),
            ("Net", Some("Internet")),
            ("Net/INetURL.x32", Some("url.x32")),
        ]);
        assert_eq!(destination_for(&map, "net/INetURL.x32").as_deref(), Some("url.x32"));
        assert_eq!(destination_for(&map, "Net/Other.x32").as_deref(), Some("Internet/Other.x32"));
        assert_eq!(destination_for(&map, "Net").as_deref(), Some("Internet"));
        assert_eq!(destination_for(&map, "Media.x32").as_deref(), Some("Media.x32"));
    }

    #[test]
    fn test_tie_keeps_first() {
        let map = mappings(&[("Net", Some("First")), ("NET", Some("Second"))]);
        let (mapping, relative) = best_match(&map, "Net/a.x32").unwrap();
        assert_eq!(mapping.dest.as_deref(), Some("First"));
        assert_eq!(relative, "a.x32");
    }

    #[test]
    fn test_root_rename() {
        let map = mappings(&[("Net", Some(""))]);
        assert_eq!(destination_for(&map, "Net").as_deref(), Some(""));
        assert_eq!(destination_for(&map, "Net/a.x32").as_deref(), Some("a.x32"));
    }
}
