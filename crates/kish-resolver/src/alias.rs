//! Alias rewriting.
//!
//! Filenames are rewritten through the owning package's manifest tables and
//! then through the project root's. A table is any object-valued `source`,
//! `alias`, or `browser` field; within one package those are consulted in
//! that order and the first hit wins.

use crate::manifest::{AliasMap, AliasValue, ManifestField, PackageManifest};
use crate::paths;
use crate::specifier;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::trace;

/// A filename moving through the alias engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filename {
    /// Absolute path on disk.
    Path(PathBuf),
    /// Bare module name, possibly with a subpath.
    Module(String),
}

impl Filename {
    /// Classify an alias replacement: absolute strings are paths, everything
    /// else re-enters resolution as a module name.
    #[must_use]
    pub fn from_specifier(spec: &str) -> Self {
        let candidate = Path::new(spec);
        if candidate.is_absolute() {
            Self::Path(paths::normalize(candidate))
        } else {
            Self::Module(paths::normalize_separators(spec))
        }
    }
}

/// Apply one package's alias tables to `filename`. Returns `None` when no
/// alias fired.
#[must_use]
pub fn resolve_package_aliases(
    filename: &Filename,
    pkg: &PackageManifest,
    empty_shim: &Path,
) -> Option<Filename> {
    let tables = [
        pkg.source.as_ref().and_then(ManifestField::as_aliases),
        pkg.alias.as_ref(),
        pkg.browser.as_ref().and_then(ManifestField::as_aliases),
    ];

    for table in tables.into_iter().flatten() {
        if let Some(value) = get_alias(table, filename, &pkg.pkgdir) {
            trace!(?filename, ?value, pkgdir = %pkg.pkgdir.display(), "alias hit");
            return Some(apply(value, &pkg.pkgdir, empty_shim));
        }
    }
    None
}

/// Look `filename` up in a single table.
///
/// Absolute paths are keyed relative to the package directory with a `./`
/// prefix. Bare names are tried verbatim first, then by package name alone
/// with the subpath re-appended to the replacement.
fn get_alias(table: &AliasMap, filename: &Filename, pkgdir: &Path) -> Option<AliasValue> {
    match filename {
        Filename::Path(path) => {
            let relative = paths::relative_from(pkgdir, path);
            let key = if relative.starts_with('.') {
                relative
            } else {
                format!("./{relative}")
            };
            lookup(table, &key)
        }
        Filename::Module(name) => {
            if let Some(value) = lookup(table, name) {
                return Some(value);
            }
            let (package, sub_path) = specifier::split_module(name);
            if package == *name {
                return None;
            }
            match lookup(table, &package)? {
                AliasValue::Specifier(replacement) => {
                    Some(AliasValue::Specifier(format!("{replacement}/{sub_path}")))
                }
                AliasValue::Excluded => Some(AliasValue::Excluded),
            }
        }
    }
}

/// Substitute a matched alias value.
fn apply(value: AliasValue, pkgdir: &Path, empty_shim: &Path) -> Filename {
    match value {
        AliasValue::Excluded => Filename::Path(empty_shim.to_path_buf()),
        AliasValue::Specifier(spec) if spec.starts_with('.') => {
            Filename::Path(paths::resolve(pkgdir, &spec))
        }
        AliasValue::Specifier(spec) => Filename::from_specifier(&spec),
    }
}

/// Exact lookup, then glob keys in declaration order.
fn lookup(table: &AliasMap, filename: &str) -> Option<AliasValue> {
    if let Some(found) = table.get(filename) {
        return Some(found.clone());
    }
    for (key, value) in table {
        if !specifier::is_glob(key) {
            continue;
        }
        let Some(pattern) = glob_to_regex(key) else {
            continue;
        };
        if pattern.is_match(filename) {
            return Some(match value {
                AliasValue::Specifier(replacement) => AliasValue::Specifier(
                    pattern.replace(filename, replacement.as_str()).into_owned(),
                ),
                AliasValue::Excluded => AliasValue::Excluded,
            });
        }
    }
    None
}

/// Compile a glob-style alias key to an anchored regex with capture groups:
/// `*` matches within one path segment, `**` across segments, `{a,b}` is
/// alternation. Replacement strings refer to captures as `$1`, `$2`, ...
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    let mut chars = pattern.chars().peekable();
    let mut in_group = false;
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    regex.push_str("(.*)");
                } else {
                    regex.push_str("([^/]*)");
                }
            }
            '{' => {
                in_group = true;
                regex.push('(');
            }
            '}' => {
                in_group = false;
                regex.push(')');
            }
            ',' if in_group => regex.push('|'),
            '\\' | '.' | '+' | '(' | ')' | '|' | '[' | ']' | '^' | '$' | '?' => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex.push('$');
    Regex::new(&regex).ok()
}
