//! Package manifest (`package.json`) model and cache.
//!
//! Manifests arrive as untyped JSON; each honored field is narrowed to the
//! shapes the resolver understands and anything else is dropped. Alias tables
//! keep the manifest's declaration order because glob matching is
//! first-match-wins.

use crate::fs::FileSystem;
use crate::paths;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Alias replacement value: a module name or relative path, or `false` to map
/// the file to the empty shim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasValue {
    Specifier(String),
    Excluded,
}

/// Ordered alias table; iteration follows manifest declaration order.
pub type AliasMap = IndexMap<String, AliasValue>;

/// A manifest field that may be either an entry-point string or an alias
/// table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestField {
    Entry(String),
    Aliases(AliasMap),
}

impl ManifestField {
    #[must_use]
    pub fn as_entry(&self) -> Option<&str> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Aliases(_) => None,
        }
    }

    #[must_use]
    pub fn as_aliases(&self) -> Option<&AliasMap> {
        match self {
            Self::Entry(_) => None,
            Self::Aliases(map) => Some(map),
        }
    }
}

/// In-memory `package.json`, narrowed to the honored fields and augmented
/// with its own location.
#[derive(Debug, Clone)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub main: Option<String>,
    pub module: Option<String>,
    pub browser: Option<ManifestField>,
    pub source: Option<ManifestField>,
    pub alias: Option<AliasMap>,
    /// Absolute path of the manifest file itself.
    pub pkgfile: PathBuf,
    /// Directory containing the manifest.
    pub pkgdir: PathBuf,
}

impl PackageManifest {
    /// Parse manifest text. Unknown fields and unrecognized shapes of known
    /// fields are ignored; only malformed JSON is an error.
    pub fn parse(pkgfile: PathBuf, text: &str) -> serde_json::Result<Self> {
        let json: Value = serde_json::from_str(text)?;
        let pkgdir = pkgfile
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);

        Ok(Self {
            name: string_field(&json, "name"),
            main: string_field(&json, "main"),
            module: string_field(&json, "module"),
            browser: json.get("browser").and_then(field_from_value),
            source: json.get("source").and_then(field_from_value),
            alias: json
                .get("alias")
                .and_then(Value::as_object)
                .map(alias_map_from),
            pkgfile,
            pkgdir,
        })
    }

    /// Select the package entry point for web delivery.
    ///
    /// Order: `source` over `module` over `browser` over `main` —
    /// untranspiled sources for linked packages, then ES module bundles, then
    /// browser-targeted bundles, then the Node entry.
    #[must_use]
    pub fn entry_point(&self) -> PathBuf {
        let browser = match &self.browser {
            Some(ManifestField::Entry(entry)) => Some(entry.as_str()),
            // A package may re-export itself under its own name.
            Some(ManifestField::Aliases(map)) => self
                .name
                .as_deref()
                .and_then(|name| map.get(name))
                .and_then(|value| match value {
                    AliasValue::Specifier(spec) => Some(spec.as_str()),
                    AliasValue::Excluded => None,
                }),
            None => None,
        };

        let main = self
            .source
            .as_ref()
            .and_then(ManifestField::as_entry)
            .or(self.module.as_deref())
            .or(browser)
            .or(self.main.as_deref())
            .filter(|entry| *entry != "." && *entry != "./")
            .unwrap_or("index");

        paths::resolve(&self.pkgdir, main)
    }
}

fn string_field(json: &Value, key: &str) -> Option<String> {
    json.get(key).and_then(Value::as_str).map(str::to_string)
}

fn field_from_value(value: &Value) -> Option<ManifestField> {
    match value {
        Value::String(entry) => Some(ManifestField::Entry(entry.clone())),
        Value::Object(map) => Some(ManifestField::Aliases(alias_map_from(map))),
        _ => None,
    }
}

fn alias_map_from(map: &serde_json::Map<String, Value>) -> AliasMap {
    let mut aliases = AliasMap::new();
    for (key, value) in map {
        let value = match value {
            Value::String(spec) => AliasValue::Specifier(spec.clone()),
            Value::Bool(false) => AliasValue::Excluded,
            _ => continue,
        };
        aliases.insert(key.clone(), value);
    }
    aliases
}

/// Manifest cache keyed by manifest path, living as long as the resolver.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: RwLock<FxHashMap<PathBuf, Arc<PackageManifest>>>,
}

impl ManifestCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and cache the manifest at `dir`. `None` means "not a package
    /// directory": absent, unreadable, or malformed manifests all land here.
    pub fn read(&self, fs: &dyn FileSystem, dir: &Path) -> Option<Arc<PackageManifest>> {
        let pkgfile = dir.join("package.json");
        if let Some(cached) = self.entries.read().unwrap().get(&pkgfile) {
            return Some(Arc::clone(cached));
        }

        let text = fs.read_to_string(&pkgfile).ok()?;
        let mut manifest = PackageManifest::parse(pkgfile.clone(), &text).ok()?;

        // `source` applies only to symlinked (locally linked) packages; an
        // installed copy resolves to its own path.
        if manifest.source.is_some() {
            let linked = fs.realpath(&pkgfile).is_ok_and(|real| real != pkgfile);
            if !linked {
                trace!(pkgfile = %manifest.pkgfile.display(), "dropping source field");
                manifest.source = None;
            }
        }

        let manifest = Arc::new(manifest);
        self.entries
            .write()
            .unwrap()
            .insert(pkgfile, Arc::clone(&manifest));
        Some(manifest)
    }

    /// Walk upward from `dir` to the first readable manifest, stopping at the
    /// filesystem root or a `node_modules` boundary.
    pub fn find_package(&self, fs: &dyn FileSystem, dir: &Path) -> Option<Arc<PackageManifest>> {
        let mut current = dir.to_path_buf();
        loop {
            match current.file_name() {
                None => return None,
                Some(name) if name == "node_modules" => return None,
                Some(_) => {}
            }
            if let Some(manifest) = self.read(fs, &current) {
                return Some(manifest);
            }
            current = current.parent()?.to_path_buf();
        }
    }
}
