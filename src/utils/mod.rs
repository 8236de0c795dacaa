//! Path and string helpers shared by the projector and bundle writers

use std::env;

/// Check if an environment variable is set to a truthy value
/// Accepts: "1", "true", "on", "yes", "t" (case insensitive)
pub fn is_env_true(key: &str) -> bool {
    match env::var(key) {
        Ok(val) => {
            let val_lower = val.to_lowercase();
            matches!(val_lower.as_str(), "1" | "true" | "on" | "yes" | "t")
        }
        Err(_) => false,
    }
}

/// Strip `prefix` from the front of `path`, optionally ignoring case.
///
/// Returns the remainder as a slice of the original `path`.
fn strip_prefix_nocase<'a>(path: &'a str, prefix: &str, nocase: bool) -> Option<&'a str> {
    if !nocase {
        return path.strip_prefix(prefix);
    }

    let mut rest = path.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = rest.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let offset = rest.next().map(|(i, _)| i).unwrap_or(path.len());
    Some(&path[offset..])
}

/// Path of `path` relative to the directory `start`.
///
/// # Returns
/// `Some("")` when both name the same path (a trailing `/` is ignored),
/// `Some(rest)` when `path` lies under `start/`, otherwise `None`.
pub fn path_relative_base<'a>(path: &'a str, start: &str, nocase: bool) -> Option<&'a str> {
    let rest = strip_prefix_nocase(path, start, nocase)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix('/')
}

/// Check if `path` equals or lies under `start`
pub fn path_relative_base_match(path: &str, start: &str, nocase: bool) -> bool {
    path_relative_base(path, start, nocase).is_some()
}

/// Remove `ext` from the end of `path` if present
pub fn trim_extension<'a>(path: &'a str, ext: &str, nocase: bool) -> &'a str {
    if path.len() < ext.len() || !path.is_char_boundary(path.len() - ext.len()) {
        return path;
    }
    let (head, tail) = path.split_at(path.len() - ext.len());
    let matched = if nocase {
        tail.eq_ignore_ascii_case(ext)
    } else {
        tail == ext
    };
    if matched { head } else { path }
}

/// Last component of a forward-slash volume path
pub fn volume_basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Escape text for HTML attribute and body content
pub fn html_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
