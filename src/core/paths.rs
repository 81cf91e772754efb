//! Object path utilities
//!
//! Object paths always use '/' as separator and are relative to their namespace.

use std::path::{Component, Path, PathBuf};

/// Namespace separator used in object paths
pub const SEPARATOR: char = '/';

/// Normalize a path to use '/' as separator
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Make a path relative to the namespace root
pub fn make_relative(path: &Path, root: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(normalize_path)
}

/// Normalize a caller-supplied prefix so it ends with '/' when non-empty
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_start_matches(SEPARATOR);
    if trimmed.is_empty() || trimmed.ends_with(SEPARATOR) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, SEPARATOR)
    }
}

/// Whether an object path is a folder marker
#[allow(dead_code)]
pub fn is_folder_marker(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Case-insensitive suffix check on the object name
pub fn has_suffix(path: &str, suffix: &str) -> bool {
    path.to_lowercase().ends_with(&suffix.to_lowercase())
}

/// Resolve an object path under `root`, refusing anything that escapes it
pub fn resolve_within(root: &Path, object_path: &str) -> Option<PathBuf> {
    let relative = Path::new(object_path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if object_path.is_empty() || escapes {
        return None;
    }
    Some(root.join(relative))
}
