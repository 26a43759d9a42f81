//! Lexical path helpers.
//!
//! Everything here is pure: classification and alias-key computation must not
//! touch the filesystem.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without filesystem access.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }
    result.iter().collect()
}

/// Resolve `input` against `dir`: absolute inputs are normalized as-is,
/// relative inputs are joined first.
#[must_use]
pub fn resolve(dir: &Path, input: &str) -> PathBuf {
    let candidate = Path::new(input);
    if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&dir.join(candidate))
    }
}

/// Append a literal suffix (`.js`, `.json`) without replacing an extension
/// the path already carries.
#[must_use]
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    if suffix.is_empty() {
        return path.to_path_buf();
    }
    let mut joined: OsString = path.as_os_str().to_os_string();
    joined.push(suffix);
    PathBuf::from(joined)
}

/// Replace platform separators with forward slashes.
#[must_use]
pub fn normalize_separators(input: &str) -> String {
    input.replace('\\', "/")
}

/// Express `path` relative to `base`, forward-slashed, for alias-table
/// lookups.
#[must_use]
pub fn relative_from(base: &Path, path: &Path) -> String {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = path.components().collect();
    let shared = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments = Vec::new();
    for _ in shared..base.len() {
        segments.push(String::from(".."));
    }
    for component in &target[shared..] {
        segments.push(component.as_os_str().to_string_lossy().into_owned());
    }
    segments.join("/")
}
