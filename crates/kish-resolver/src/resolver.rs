//! Resolution driver.
//!
//! Orchestrates classification, the load-time alias pass, the `node_modules`
//! walk, and candidate probing, and owns the per-resolver caches. Results are
//! cached by `(importing directory, request)`, so identical requests from
//! files in the same directory resolve identically for the resolver's
//! lifetime.

use crate::alias::{self, Filename};
use crate::config::ResolverOptions;
use crate::error::ResolveError;
use crate::fs::{FileSystem, OsFileSystem};
use crate::manifest::{ManifestCache, PackageManifest};
use crate::paths;
use crate::specifier::{self, Specifier};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// A successfully resolved request.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Absolute path of the module to load, or the unexpanded pattern for
    /// glob requests.
    pub path: PathBuf,
    /// Manifest of the owning package, when one was consulted.
    pub package: Option<Arc<PackageManifest>>,
}

/// Output of the locate step, feeding the loaders.
#[derive(Debug, Default)]
struct LocatedModule {
    module_name: Option<String>,
    sub_path: Option<String>,
    /// Package directory under some `node_modules`, when the walk found one.
    module_dir: Option<PathBuf>,
    /// Absolute probe target for the file loaders.
    file_path: Option<PathBuf>,
}

/// Module resolver with per-instance result and manifest caches.
#[derive(Debug)]
pub struct Resolver {
    options: ResolverOptions,
    fs: Arc<dyn FileSystem>,
    manifests: ManifestCache,
    cache: RwLock<FxHashMap<(String, String), Resolution>>,
    root_package: OnceCell<Option<Arc<PackageManifest>>>,
}

impl Resolver {
    #[must_use]
    pub fn new(options: ResolverOptions) -> Self {
        Self::with_fs(options, Arc::new(OsFileSystem))
    }

    #[must_use]
    pub fn with_fs(options: ResolverOptions, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            options,
            fs,
            manifests: ManifestCache::new(),
            cache: RwLock::new(FxHashMap::default()),
            root_package: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve `input` as requested from `parent`.
    ///
    /// # Errors
    /// Returns [`ResolveError::ModuleNotFound`] when no candidate exists on
    /// disk; filesystem and manifest failures along the way are treated as
    /// missing candidates, never surfaced.
    pub fn resolve(&self, input: &str, parent: Option<&Path>) -> Result<Resolution, ResolveError> {
        let key = (
            parent
                .and_then(Path::parent)
                .map(|d| d.to_string_lossy().into_owned())
                .unwrap_or_default(),
            input.to_string(),
        );
        if let Some(hit) = self.cache.read().unwrap().get(&key) {
            trace!(input, "cache hit");
            return Ok(hit.clone());
        }

        let dir = parent
            .and_then(Path::parent)
            .map_or_else(working_dir, Path::to_path_buf);

        // Globs pass through unexpanded; the bundler walks them later. No
        // filesystem probe happens for them.
        if let Specifier::Glob(pattern) = specifier::classify(input, &dir, &self.options.root_dir)
        {
            trace!(input, pattern = %pattern.display(), "glob pass-through");
            let resolution = Resolution {
                path: pattern,
                package: None,
            };
            self.cache.write().unwrap().insert(key, resolution.clone());
            return Ok(resolution);
        }

        let extensions = self.active_extensions(parent);
        let located = self.locate(input, &dir);

        let resolved = if located.module_dir.is_some() {
            self.load_node_modules(&located, &extensions)
        } else if let Some(file) = &located.file_path {
            self.load_relative(file, &extensions)
        } else {
            None
        };

        match resolved {
            Some(resolution) => {
                debug!(input, path = %resolution.path.display(), "resolved");
                self.cache.write().unwrap().insert(key, resolution.clone());
                Ok(resolution)
            }
            None => Err(ResolveError::ModuleNotFound {
                specifier: input.to_string(),
                from: dir,
            }),
        }
    }

    /// Classify the request, run the load-time alias pass, and locate the
    /// module directory for bare names.
    fn locate(&self, input: &str, dir: &Path) -> LocatedModule {
        let kind = specifier::classify(input, dir, &self.options.root_dir);
        trace!(input, ?kind, "classified");

        let filename = match kind {
            Specifier::Absolute(path)
            | Specifier::Tilde(path)
            | Specifier::Relative(path)
            | Specifier::Glob(path) => Filename::Path(path),
            Specifier::Bare(name) => Filename::from_specifier(&name),
        };

        // Aliases in the package owning the importing file apply before any
        // node_modules walking.
        let owner = self.manifests.find_package(self.fs.as_ref(), dir);
        let filename = self.resolve_aliases(&filename, owner.as_deref());

        match filename {
            Filename::Path(path) => LocatedModule {
                file_path: Some(path),
                ..LocatedModule::default()
            },
            Filename::Module(name) => self.find_node_module(&name, dir),
        }
    }

    /// Walk ancestor `node_modules` directories for a bare name, consulting
    /// the builtin-shim table first.
    fn find_node_module(&self, name: &str, dir: &Path) -> LocatedModule {
        if let Some(shim) = self.options.builtins.get(name) {
            debug!(name, shim = %shim.display(), "builtin shim");
            return LocatedModule {
                file_path: Some(shim.clone()),
                ..LocatedModule::default()
            };
        }

        let (package, sub_path) = specifier::split_module(name);
        let sub_path = (!sub_path.is_empty()).then_some(sub_path);

        let mut current = dir.to_path_buf();
        loop {
            // Never probe node_modules/node_modules.
            if current.file_name().is_some_and(|n| n == "node_modules") {
                match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                }
            }

            let module_dir = current.join("node_modules").join(&package);
            if self.fs.stat(&module_dir).is_ok_and(|s| s.is_dir) {
                trace!(name, module_dir = %module_dir.display(), "package located");
                return LocatedModule {
                    module_name: Some(package),
                    sub_path,
                    file_path: Some(current.join("node_modules").join(name)),
                    module_dir: Some(module_dir),
                };
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        LocatedModule {
            module_name: Some(package),
            sub_path,
            ..LocatedModule::default()
        }
    }

    /// Extension candidates in probe order: exact match first, then the
    /// parent file's own extension when it is configured, then the rest of
    /// the configured list.
    fn active_extensions(&self, parent: Option<&Path>) -> Vec<String> {
        let mut extensions = self.options.extensions.clone();
        if let Some(ext) = parent.and_then(Path::extension).and_then(|e| e.to_str()) {
            let ext = format!(".{ext}");
            if let Some(position) = extensions.iter().position(|e| *e == ext) {
                extensions.remove(position);
                extensions.insert(0, ext);
            }
        }
        extensions.insert(0, String::new());
        extensions
    }

    /// Rewrite `filename` through the owning package's tables, then the
    /// project root's.
    fn resolve_aliases(&self, filename: &Filename, pkg: Option<&PackageManifest>) -> Filename {
        let mut current = filename.clone();
        if let Some(pkg) = pkg {
            if let Some(next) =
                alias::resolve_package_aliases(&current, pkg, &self.options.empty_shim)
            {
                current = next;
            }
        }
        if let Some(root) = self.root_package() {
            if let Some(next) =
                alias::resolve_package_aliases(&current, &root, &self.options.empty_shim)
            {
                current = next;
            }
        }
        current
    }

    /// Project-root manifest, loaded lazily once per resolver.
    fn root_package(&self) -> Option<Arc<PackageManifest>> {
        self.root_package
            .get_or_init(|| {
                self.manifests
                    .find_package(self.fs.as_ref(), &self.options.root_dir)
            })
            .clone()
    }

    fn load_relative(&self, file: &Path, extensions: &[String]) -> Option<Resolution> {
        let pkg = file
            .parent()
            .and_then(|dir| self.manifests.find_package(self.fs.as_ref(), dir));
        self.load_as_file(file, extensions, pkg.clone())
            .or_else(|| self.load_directory(file, extensions, pkg, &mut Vec::new()))
    }

    fn load_node_modules(&self, module: &LocatedModule, extensions: &[String]) -> Option<Resolution> {
        let module_dir = module.module_dir.as_ref()?;
        let file_path = module.file_path.as_ref()?;
        trace!(
            module = module.module_name.as_deref().unwrap_or(""),
            sub_path = module.sub_path.as_deref().unwrap_or(""),
            "loading from node_modules"
        );

        // Subpath requests resolve as files only; a miss is terminal.
        if module.sub_path.is_some() {
            let pkg = self.manifests.read(self.fs.as_ref(), module_dir);
            return self.load_as_file(file_path, extensions, pkg);
        }

        // The directory loader reads the manifest itself.
        self.load_directory(file_path, extensions, None, &mut Vec::new())
    }

    /// Probe the expanded candidate list; the first regular file or FIFO
    /// wins.
    fn load_as_file(
        &self,
        file: &Path,
        extensions: &[String],
        pkg: Option<Arc<PackageManifest>>,
    ) -> Option<Resolution> {
        for candidate in self.expand_file(file, extensions, pkg.as_deref(), true) {
            if self.fs.stat(&candidate).is_ok_and(|s| s.is_loadable()) {
                trace!(path = %candidate.display(), "file hit");
                return Some(Resolution {
                    path: candidate,
                    package: pkg,
                });
            }
        }
        None
    }

    /// Candidate paths for `file`: for each extension, any alias target's
    /// candidates first, then the literal `file + ext`.
    fn expand_file(
        &self,
        file: &Path,
        extensions: &[String],
        pkg: Option<&PackageManifest>,
        expand_aliases: bool,
    ) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for ext in extensions {
            let literal = paths::append_suffix(file, ext);
            if expand_aliases {
                match self.resolve_aliases(&Filename::Path(literal.clone()), pkg) {
                    Filename::Path(target) if target != literal => {
                        candidates.extend(self.expand_file(&target, extensions, pkg, false));
                    }
                    Filename::Module(name) => {
                        candidates.extend(self.expand_file(Path::new(&name), extensions, pkg, false));
                    }
                    Filename::Path(_) => {}
                }
            }
            candidates.push(literal);
        }
        candidates
    }

    /// Load a directory: the manifest entry point when a manifest is
    /// present, then `index`.
    fn load_directory(
        &self,
        dir: &Path,
        extensions: &[String],
        pkg: Option<Arc<PackageManifest>>,
        visited: &mut Vec<PathBuf>,
    ) -> Option<Resolution> {
        if let Some(manifest) = self.manifests.read(self.fs.as_ref(), dir) {
            // A manifest whose entry leads back to its own directory is
            // terminal.
            if !visited.contains(&manifest.pkgfile) {
                visited.push(manifest.pkgfile.clone());
                let main = manifest.entry_point();
                if let Some(found) = self
                    .load_as_file(&main, extensions, Some(Arc::clone(&manifest)))
                    .or_else(|| {
                        self.load_directory(&main, extensions, Some(Arc::clone(&manifest)), visited)
                    })
                {
                    return Some(found);
                }
            }
            return self.load_as_file(&dir.join("index"), extensions, Some(manifest));
        }
        self.load_as_file(&dir.join("index"), extensions, pkg)
    }
}

fn working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn resolver_at(root: &Path) -> Resolver {
        Resolver::new(ResolverOptions::new(root))
    }

    #[test]
    fn test_relative_file_exists() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("dep.js"), "export {}").unwrap();
        let parent = dir.path().join("main.js");
        fs::write(&parent, "import './dep.js'").unwrap();

        let resolver = resolver_at(dir.path());
        let resolution = resolver.resolve("./dep.js", Some(&parent)).unwrap();
        assert_eq!(resolution.path, dir.path().join("dep.js"));
    }

    #[test]
    fn test_relative_extension_probing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("dep.jsx"), "export {}").unwrap();
        let parent = dir.path().join("main.js");
        fs::write(&parent, "").unwrap();

        let resolver = resolver_at(dir.path());
        let resolution = resolver.resolve("./dep", Some(&parent)).unwrap();
        assert_eq!(resolution.path, dir.path().join("dep.jsx"));
    }

    #[test]
    fn test_directory_index() {
        let dir = tempdir().unwrap();
        let utils = dir.path().join("utils");
        fs::create_dir(&utils).unwrap();
        fs::write(utils.join("index.js"), "export {}").unwrap();
        let parent = dir.path().join("main.js");
        fs::write(&parent, "").unwrap();

        let resolver = resolver_at(dir.path());
        let resolution = resolver.resolve("./utils", Some(&parent)).unwrap();
        assert_eq!(resolution.path, utils.join("index.js"));
    }

    #[test]
    fn test_not_found_carries_code_and_origin() {
        let dir = tempdir().unwrap();
        let parent = dir.path().join("src").join("main.js");
        fs::create_dir_all(parent.parent().unwrap()).unwrap();
        fs::write(&parent, "").unwrap();

        let resolver = resolver_at(dir.path());
        let err = resolver.resolve("missing-pkg", Some(&parent)).unwrap_err();
        assert_eq!(err.code(), crate::error::MODULE_NOT_FOUND);
        let message = err.to_string();
        assert!(message.contains("missing-pkg"));
        assert!(message.contains(parent.parent().unwrap().to_str().unwrap()));
    }

    #[test]
    fn test_active_extensions_prefers_parent() {
        let resolver = resolver_at(Path::new("/proj"));
        let extensions = resolver.active_extensions(Some(Path::new("/proj/src/a.jsx")));
        assert_eq!(extensions[0], "");
        assert_eq!(extensions[1], ".jsx");
        assert!(!extensions[2..].contains(&".jsx".to_string()));
    }

    #[test]
    fn test_active_extensions_without_parent() {
        let resolver = resolver_at(Path::new("/proj"));
        let extensions = resolver.active_extensions(None);
        assert_eq!(extensions[0], "");
        assert_eq!(&extensions[1..], &resolver.options.extensions[..]);
    }

    #[test]
    fn test_active_extensions_ignores_unconfigured_parent() {
        let resolver = resolver_at(Path::new("/proj"));
        let extensions = resolver.active_extensions(Some(Path::new("/proj/src/a.ts")));
        assert_eq!(extensions[0], "");
        assert!(!extensions.contains(&".ts".to_string()));
        assert_eq!(&extensions[1..], &resolver.options.extensions[..]);
    }

    #[test]
    fn test_node_modules_walk_skips_nested() {
        let dir = tempdir().unwrap();
        // Importing file lives inside node_modules/a; its dependency b is a
        // sibling, not nested under a/node_modules.
        let a = dir.path().join("node_modules").join("a");
        let b = dir.path().join("node_modules").join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(b.join("index.js"), "export {}").unwrap();
        let parent = a.join("entry.js");
        fs::write(&parent, "").unwrap();

        let resolver = resolver_at(dir.path());
        let resolution = resolver.resolve("b", Some(&parent)).unwrap();
        assert_eq!(resolution.path, b.join("index.js"));
    }

    #[test]
    fn test_package_main_directory_recursion() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules").join("widgets");
        fs::create_dir_all(pkg.join("lib")).unwrap();
        fs::write(
            pkg.join("package.json"),
            r#"{"name": "widgets", "main": "lib"}"#,
        )
        .unwrap();
        fs::write(pkg.join("lib").join("index.js"), "export {}").unwrap();
        let parent = dir.path().join("main.js");
        fs::write(&parent, "").unwrap();

        let resolver = resolver_at(dir.path());
        let resolution = resolver.resolve("widgets", Some(&parent)).unwrap();
        assert_eq!(resolution.path, pkg.join("lib").join("index.js"));
        let manifest = resolution.package.unwrap();
        assert_eq!(manifest.name.as_deref(), Some("widgets"));
    }

    #[test]
    fn test_subpath_directory_does_not_resolve() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules").join("pkg");
        fs::create_dir_all(pkg.join("extra")).unwrap();
        fs::write(
            pkg.join("package.json"),
            r#"{"name": "pkg", "main": "index.js"}"#,
        )
        .unwrap();
        fs::write(pkg.join("index.js"), "export {}").unwrap();
        fs::write(pkg.join("extra").join("index.js"), "export {}").unwrap();
        let parent = dir.path().join("main.js");
        fs::write(&parent, "").unwrap();

        let resolver = resolver_at(dir.path());
        assert!(resolver.resolve("pkg/extra", Some(&parent)).is_err());
    }

    #[test]
    fn test_self_referential_main_terminates() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules").join("loopy");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main": "./."}"#).unwrap();
        fs::write(pkg.join("index.js"), "export {}").unwrap();
        let parent = dir.path().join("main.js");
        fs::write(&parent, "").unwrap();

        let resolver = resolver_at(dir.path());
        let resolution = resolver.resolve("loopy", Some(&parent)).unwrap();
        assert_eq!(resolution.path, pkg.join("index.js"));
    }
}
