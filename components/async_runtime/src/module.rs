//! CommonJS module loader.
//!
//! `require(specifier)` resolves the specifier against the requiring
//! module's directory, loads the file once, and returns its exports from the
//! cache on every later call.
//!
//! A cache entry is inserted in the [`LoadState::Loading`] state *before*
//! the module body runs. A circular `require` therefore sees whatever the
//! partially loaded module has exported so far, read live from its
//! `module.exports`, instead of recursing. If
//! reading, compiling or running the body fails, the entry is evicted so a
//! later `require` tries again from scratch.

use crate::host::{native_fn, ScriptHost};
use core_types::ErrorKind;
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Lifecycle of a cached module.
///
/// Failed loads are evicted from the cache, so no entry is ever observed in
/// a failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// The module body is running (or the module is part of a cycle)
    Loading,
    /// The module body has returned
    Loaded,
}

/// One resolved module in the cache.
pub struct ModuleCacheEntry<V> {
    /// Absolute, normalized path of the module file
    pub resolved_path: PathBuf,
    module: V,
    exports: RefCell<V>,
    load_state: Cell<LoadState>,
}

impl<V: Clone> ModuleCacheEntry<V> {
    /// The exports recorded for the module: the initial `exports` object
    /// while loading, the final `module.exports` once loaded.
    pub fn exports(&self) -> V {
        self.exports.borrow().clone()
    }

    /// What a `require` of this module returns right now.
    ///
    /// While the body runs this reads `module.exports`, so a cycle sees a
    /// reassignment made before the circular `require`.
    pub fn current_exports(&self, host: &dyn ScriptHost<V>) -> Result<V, V> {
        match self.load_state.get() {
            LoadState::Loading => host.get(&self.module, "exports"),
            LoadState::Loaded => Ok(self.exports()),
        }
    }

    /// Whether the module has finished loading.
    pub fn load_state(&self) -> LoadState {
        self.load_state.get()
    }
}

/// How bare specifiers and extensionless paths are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Directory searched for bare specifiers, in the requiring directory
    /// and each of its ancestors
    pub dependency_dir: String,
    /// Extension appended to paths that have none
    pub default_extension: String,
    /// File loaded when a directory has no usable `package.json` main
    pub index_file: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            dependency_dir: "node_modules".to_string(),
            default_extension: "js".to_string(),
            index_file: "index.js".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    main: Option<String>,
}

/// The `require` implementation shared by every module of one runtime.
pub struct ModuleLoader<V> {
    options: ResolveOptions,
    cache: RefCell<HashMap<PathBuf, Rc<ModuleCacheEntry<V>>>>,
    builtins: RefCell<HashMap<String, V>>,
}

impl<V: Clone + 'static> ModuleLoader<V> {
    /// Creates a loader with default resolution options.
    pub fn new() -> Rc<Self> {
        Self::with_options(ResolveOptions::default())
    }

    /// Creates a loader with custom resolution options.
    pub fn with_options(options: ResolveOptions) -> Rc<Self> {
        Rc::new(Self {
            options,
            cache: RefCell::new(HashMap::new()),
            builtins: RefCell::new(HashMap::new()),
        })
    }

    /// Registers a builtin module, returned for `name` and `node:name`
    /// without touching the filesystem.
    pub fn register_builtin(&self, name: &str, exports: V) {
        self.builtins.borrow_mut().insert(name.to_string(), exports);
    }

    /// Exports of a builtin module, if one is registered under `specifier`.
    pub fn builtin(&self, specifier: &str) -> Option<V> {
        let name = specifier.strip_prefix("node:").unwrap_or(specifier);
        self.builtins.borrow().get(name).cloned()
    }

    /// Loads `specifier` as seen from `base_dir`.
    pub fn require(
        self: &Rc<Self>,
        host: &dyn ScriptHost<V>,
        base_dir: &Path,
        specifier: &str,
    ) -> Result<V, V> {
        if let Some(exports) = self.builtin(specifier) {
            trace!(module = specifier, "builtin module");
            return Ok(exports);
        }

        let resolved = self.resolve(base_dir, specifier);
        if let Some(entry) = self.entry(&resolved) {
            trace!(path = %resolved.display(), state = ?entry.load_state(), "module cache hit");
            return entry.current_exports(host);
        }
        if !resolved.is_file() {
            return Err(host.error(
                ErrorKind::Error,
                &format!("Cannot find module '{specifier}'"),
            ));
        }
        self.load(host, &resolved)
    }

    /// Loads the file at `path` as a module, whatever its extension.
    ///
    /// Used for the entry point, which is named by path rather than by
    /// specifier.
    pub fn load_path(self: &Rc<Self>, host: &dyn ScriptHost<V>, path: &Path) -> Result<V, V> {
        let path = absolute(path);
        if let Some(entry) = self.entry(&path) {
            return entry.current_exports(host);
        }
        self.load(host, &path)
    }

    /// Creates the `require` function handed to modules in `base_dir`.
    pub fn require_function(self: &Rc<Self>, host: &dyn ScriptHost<V>, base_dir: PathBuf) -> Result<V, V> {
        let loader: Weak<Self> = Rc::downgrade(self);
        let require = native_fn(move |host: &dyn ScriptHost<V>, args: Vec<V>| {
            let loader = loader
                .upgrade()
                .ok_or_else(|| host.error(ErrorKind::InternalError, "module loader is shut down"))?;
            let specifier = match args.first() {
                Some(value) if !host.is_undefined(value) => host.coerce_string(value)?,
                _ => String::new(),
            };
            if specifier.is_empty() {
                return Err(host.error(ErrorKind::TypeError, "require() expects a module name"));
            }
            loader.require(host, &base_dir, &specifier)
        });
        host.native_function("require", require)
    }

    /// Resolves `specifier` to an absolute, normalized file path.
    ///
    /// Relative and absolute specifiers resolve against `base_dir`. Bare
    /// specifiers are looked up in the dependency directory of `base_dir`
    /// and then of each ancestor. The returned path may not exist.
    pub fn resolve(&self, base_dir: &Path, specifier: &str) -> PathBuf {
        let base_dir = absolute(base_dir);
        let candidate = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".." {
            base_dir.join(specifier)
        } else {
            self.dependency_candidate(&base_dir, specifier)
        };
        self.resolve_file(&normalize(&candidate))
    }

    /// The cache entry for an already-resolved path.
    pub fn entry(&self, resolved_path: &Path) -> Option<Rc<ModuleCacheEntry<V>>> {
        self.cache.borrow().get(resolved_path).cloned()
    }

    /// Number of cached modules.
    pub fn cached_modules(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Drops every cached module and builtin.
    pub fn clear(&self) {
        let cache = std::mem::take(&mut *self.cache.borrow_mut());
        let builtins = std::mem::take(&mut *self.builtins.borrow_mut());
        drop(cache);
        drop(builtins);
    }

    fn load(self: &Rc<Self>, host: &dyn ScriptHost<V>, path: &Path) -> Result<V, V> {
        let exports = host.new_object()?;
        let module = host.new_object()?;
        host.set(&module, "exports", exports.clone())?;

        let entry = Rc::new(ModuleCacheEntry {
            resolved_path: path.to_path_buf(),
            module: module.clone(),
            exports: RefCell::new(exports.clone()),
            load_state: Cell::new(LoadState::Loading),
        });
        self.cache.borrow_mut().insert(path.to_path_buf(), entry.clone());
        debug!(path = %path.display(), "loading module");

        match self.execute(host, path, &exports, &module) {
            Ok(final_exports) => {
                *entry.exports.borrow_mut() = final_exports.clone();
                entry.load_state.set(LoadState::Loaded);
                Ok(final_exports)
            }
            Err(error) => {
                self.cache.borrow_mut().remove(path);
                debug!(path = %path.display(), "module failed to load, evicted from cache");
                Err(error)
            }
        }
    }

    fn execute(
        self: &Rc<Self>,
        host: &dyn ScriptHost<V>,
        path: &Path,
        exports: &V,
        module: &V,
    ) -> Result<V, V> {
        let source = std::fs::read_to_string(path).map_err(|err| {
            host.error(
                ErrorKind::Error,
                &format!("Error reading module {}: {err}", path.display()),
            )
        })?;

        let filename = path.to_string_lossy();
        let function = host.evaluate(&filename, &wrap_source(&source))?;
        if !host.is_callable(&function) {
            return Err(host.error(
                ErrorKind::InternalError,
                &format!("module wrapper for {filename} is not a function"),
            ));
        }

        let dirname = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let require = self.require_function(host, dirname.clone())?;
        let args = vec![
            exports.clone(),
            require,
            module.clone(),
            host.string(&filename)?,
            host.string(&dirname.to_string_lossy())?,
        ];
        host.call(&function, exports, args)?;
        host.get(module, "exports")
    }

    fn dependency_candidate(&self, base_dir: &Path, specifier: &str) -> PathBuf {
        for dir in base_dir.ancestors() {
            let candidate = dir.join(&self.options.dependency_dir).join(specifier);
            if candidate.exists() || self.with_extension(&candidate).is_file() {
                return candidate;
            }
        }
        base_dir.join(&self.options.dependency_dir).join(specifier)
    }

    fn resolve_file(&self, path: &Path) -> PathBuf {
        if path.extension().is_none() {
            let with_extension = self.with_extension(path);
            if with_extension.is_file() || !path.is_dir() {
                return with_extension;
            }
        }
        if path.is_dir() {
            if let Some(main) = package_main(path) {
                let main = normalize(&path.join(main));
                if main.is_file() {
                    return main;
                }
                let with_extension = self.with_extension(&main);
                if with_extension.is_file() {
                    return with_extension;
                }
            }
            return path.join(&self.options.index_file);
        }
        path.to_path_buf()
    }

    fn with_extension(&self, path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(&self.options.default_extension);
        PathBuf::from(name)
    }
}

impl<V> fmt::Debug for ModuleLoader<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("options", &self.options)
            .field("cached", &self.cache.borrow().keys().collect::<Vec<_>>())
            .field("builtins", &self.builtins.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Wraps a module body in the CommonJS function wrapper.
///
/// The body starts on its own line so a leading `#!` line or a trailing
/// line comment cannot swallow the wrapper.
pub fn wrap_source(source: &str) -> String {
    let body = if source.starts_with("#!") {
        source.find('\n').map_or("", |newline| &source[newline..])
    } else {
        source
    };
    format!("(function (exports, require, module, __filename, __dirname) {{\n{body}\n}})")
}

/// Lexically normalizes a path: drops `.` components and folds `..` into
/// its parent. Does not touch the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() && !path.is_absolute() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(_) => normalize(path),
    }
}

fn package_main(dir: &Path) -> Option<String> {
    let manifest = std::fs::read_to_string(dir.join("package.json")).ok()?;
    match serde_json::from_str::<PackageManifest>(&manifest) {
        Ok(PackageManifest { main: Some(main) }) if !main.trim().is_empty() => Some(main),
        Ok(_) => None,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "ignoring malformed package.json");
            None
        }
    }
}
