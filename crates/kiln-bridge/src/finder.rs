use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashMap;
use tracing::{debug, instrument, trace};

use kiln_fs::Simplified;
use kiln_static::EnvVars;

use crate::backend::{BackendHandle, BackendObject};
use crate::descriptor::{BackendDescriptor, DescriptorError};
use crate::manifest::{self, ManifestError};

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Invalid backend descriptor `{descriptor}`")]
    MalformedDescriptor {
        descriptor: String,
        #[source]
        err: DescriptorError,
    },
    #[error("Backend module `{0}` was not found")]
    ModuleNotFound(String),
    #[error("`{parent}` has no attribute `{attribute}`")]
    MissingAttribute { attribute: String, parent: String },
    #[error("Invalid backend module `{module}` at `{}`", path.user_display())]
    InvalidModule {
        module: String,
        path: PathBuf,
        #[source]
        err: ManifestError,
    },
}

type Constructor = Arc<dyn Fn() -> BackendObject + Send + Sync>;

/// Finds backend modules and caches them once imported.
///
/// Manifest modules are searched for in each search path in order, then built-in modules are
/// consulted. A module is imported at most once per finder, so resolving the same descriptor
/// twice yields the same object.
#[derive(Default)]
pub struct ModuleFinder {
    search_paths: Vec<PathBuf>,
    builtins: FxHashMap<String, Constructor>,
    modules: Mutex<FxHashMap<String, Arc<BackendObject>>>,
}

impl ModuleFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A finder that searches the build environment's site path, from `KILN_SITE_PATH`.
    pub fn from_env() -> Self {
        let site_path = std::env::var_os(EnvVars::KILN_SITE_PATH)
            .map(|value| {
                std::env::split_paths(&value)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Self::new().with_search_paths(site_path)
    }

    /// Append search paths, after the existing ones.
    #[must_use]
    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    /// Prepend search paths in the given order, so they shadow the existing ones.
    #[must_use]
    pub fn with_backend_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut search_paths: Vec<PathBuf> = paths.into_iter().collect();
        search_paths.append(&mut self.search_paths);
        self.search_paths = search_paths;
        self
    }

    /// Register a built-in module. `constructor` runs on first import.
    #[must_use]
    pub fn with_builtin(
        mut self,
        name: impl Into<String>,
        constructor: impl Fn() -> BackendObject + Send + Sync + 'static,
    ) -> Self {
        self.builtins.insert(name.into(), Arc::new(constructor));
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Import a module by its dotted name.
    pub fn import(&self, module: &str) -> Result<Arc<BackendObject>, ResolutionError> {
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(object) = modules.get(module) {
            trace!("Module `{module}` is already imported");
            return Ok(object.clone());
        }

        let object = Arc::new(self.load(module)?);
        modules.insert(module.to_string(), object.clone());
        Ok(object)
    }

    fn load(&self, module: &str) -> Result<BackendObject, ResolutionError> {
        for search_path in &self.search_paths {
            if let Some(path) = find_manifest(search_path, module) {
                debug!("Importing `{module}` from `{}`", path.user_display());
                return manifest::load(&path).map_err(|err| ResolutionError::InvalidModule {
                    module: module.to_string(),
                    path,
                    err,
                });
            }
        }
        if let Some(constructor) = self.builtins.get(module) {
            debug!("Importing built-in module `{module}`");
            return Ok(constructor());
        }
        Err(ResolutionError::ModuleNotFound(module.to_string()))
    }

    /// Resolve a descriptor: import its module, then walk the attribute chain.
    #[instrument(skip(self), fields(descriptor = %descriptor))]
    pub fn resolve(&self, descriptor: &BackendDescriptor) -> Result<BackendHandle, ResolutionError> {
        let mut object = self.import(descriptor.module_path())?;
        let mut parent = descriptor.module_path().to_string();
        for attribute in descriptor.attribute_chain() {
            let Some(child) = object.attribute(attribute) else {
                return Err(ResolutionError::MissingAttribute {
                    attribute: attribute.clone(),
                    parent,
                });
            };
            object = child.clone();
            parent = format!("{parent}.{attribute}");
        }
        Ok(BackendHandle::new(descriptor.clone(), object))
    }
}

/// Module `a.b` lives at `a/b/__init__.toml` (a package) or `a/b.toml`.
fn find_manifest(search_path: &Path, module: &str) -> Option<PathBuf> {
    let mut relative: PathBuf = module.split('.').collect();
    let package = search_path.join(&relative).join("__init__.toml");
    if package.is_file() {
        return Some(package);
    }
    relative.set_extension("toml");
    let module = search_path.join(relative);
    module.is_file().then_some(module)
}

#[cfg(test)]
mod tests;
