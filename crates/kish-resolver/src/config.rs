use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Extensions probed by default, in priority order.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".mjs", ".json"];

/// Resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverOptions {
    /// Project root; anchors `/`-prefixed requests, tilde walks, and the root
    /// alias table.
    pub root_dir: PathBuf,

    /// Extension candidates in probe order.
    pub extensions: Vec<String>,

    /// Bare names replaced by browser-safe shims before any walking.
    pub builtins: FxHashMap<String, PathBuf>,

    /// Module substituted when an alias maps a file to `false`.
    pub empty_shim: PathBuf,
}

impl ResolverOptions {
    /// Options rooted at `root_dir`, with the default extension list and the
    /// empty shim at `<root>/_empty.js`.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let empty_shim = root_dir.join("_empty.js");
        Self {
            root_dir,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            builtins: FxHashMap::default(),
            empty_shim,
        }
    }

    /// Replace the extension list, keeping the given order.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Register a builtin shim.
    #[must_use]
    pub fn with_builtin(mut self, name: impl Into<String>, shim: impl Into<PathBuf>) -> Self {
        self.builtins.insert(name.into(), shim.into());
        self
    }

    /// Override the empty-shim module path.
    #[must_use]
    pub fn with_empty_shim(mut self, path: impl Into<PathBuf>) -> Self {
        self.empty_shim = path.into();
        self
    }
}
