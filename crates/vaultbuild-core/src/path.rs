//! Host storage path rules.
//!
//! Host storage paths are root-relative strings separated by `/`, where `.`
//! names the storage root. These helpers never touch the real file system;
//! they operate on strings so that the same rules apply on every platform.
//!
//! # Examples
//!
//! ```
//! use vaultbuild_core::path;
//!
//! assert_eq!(path::normalize("./src//lib/../main.ts"), "src/main.ts");
//! assert_eq!(path::join("plugins/demo", "src/main.ts"), "plugins/demo/src/main.ts");
//! assert!(path::is_within("plugins/demo", "plugins/demo/dist/main.js"));
//! ```

use crate::error::{Error, Result};

/// Name of the storage root.
pub const ROOT: &str = ".";

/// Characters rejected in project paths on at least one supported platform.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Normalizes a storage path.
///
/// Backslashes become slashes, empty and `.` segments are dropped, and `..`
/// pops the previous segment. A `..` that would climb above the root is kept
/// so that containment checks can still see it. The root normalizes to `.`.
#[must_use]
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        ROOT.to_string()
    } else {
        segments.join("/")
    }
}

/// Joins two storage paths and normalizes the result.
#[must_use]
pub fn join(base: &str, child: &str) -> String {
    let base = normalize(base);
    if base == ROOT {
        normalize(child)
    } else {
        normalize(&format!("{base}/{child}"))
    }
}

/// Returns the parent directory of a path, or `.` for top-level entries.
#[must_use]
pub fn dirname(path: &str) -> String {
    let normalized = normalize(path);
    match normalized.rfind('/') {
        Some(idx) => normalized[..idx].to_string(),
        None => ROOT.to_string(),
    }
}

/// Returns the final segment of a path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Returns the lowercase extension of the final segment, without the dot.
///
/// Dotfiles such as `.env` have no extension.
#[must_use]
pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(name[idx + 1..].to_ascii_lowercase())
}

/// Returns `true` if the raw path contains a `..` segment.
#[must_use]
pub fn has_traversal(path: &str) -> bool {
    path.replace('\\', "/").split('/').any(|segment| segment == "..")
}

/// Returns `true` if the raw path looks absolute on any platform.
#[must_use]
pub fn is_absolute_like(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Validates a project-relative path.
///
/// The path must be non-empty and relative, must not traverse with `..`,
/// and must not contain control characters or characters that are invalid
/// in file names on common platforms.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming `field` when any rule is broken.
///
/// # Examples
///
/// ```
/// use vaultbuild_core::path::validate_relative;
///
/// assert!(validate_relative("entry", "src/main.ts").is_ok());
/// assert!(validate_relative("entry", "../main.ts").is_err());
/// assert!(validate_relative("entry", "/etc/passwd").is_err());
/// ```
pub fn validate_relative(field: &str, path: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(Error::Validation {
            field: field.to_string(),
            reason: format!("{reason}: '{path}'"),
        })
    };

    if path.trim().is_empty() {
        return reject("Path cannot be empty");
    }
    if is_absolute_like(path) {
        return reject("Path must be relative to the storage root");
    }
    if has_traversal(path) {
        return reject("Path must not contain '..'");
    }
    if path.chars().any(char::is_control) {
        return reject("Path contains control characters");
    }
    if path.contains(FORBIDDEN_CHARS) {
        return reject("Path contains characters that are not allowed in file names");
    }
    Ok(())
}

/// Returns `true` if `path` normalizes to `root` itself or a descendant.
///
/// Containment is decided on normalized strings with a segment boundary, so
/// `plugins/demo2` is not inside `plugins/demo`. Every path is inside the
/// storage root unless it climbs above it.
#[must_use]
pub fn is_within(root: &str, path: &str) -> bool {
    if is_absolute_like(path) {
        return false;
    }
    let root = normalize(root);
    let path = normalize(path);
    if path == ".." || path.starts_with("../") {
        return false;
    }
    if root == ROOT {
        return true;
    }
    path == root || path.starts_with(&format!("{root}/"))
}

/// Returns `path` relative to `root`, or `None` if it is outside.
#[must_use]
pub fn strip_root(root: &str, path: &str) -> Option<String> {
    if !is_within(root, path) {
        return None;
    }
    let root = normalize(root);
    let path = normalize(path);
    if root == ROOT {
        return Some(path);
    }
    if path == root {
        return Some(ROOT.to_string());
    }
    Some(path[root.len() + 1..].to_string())
}
