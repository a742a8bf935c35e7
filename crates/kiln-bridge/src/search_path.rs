use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use kiln_fs::{Simplified, is_within, resolve_path};

/// A backend search path that resolves outside of the project root.
#[derive(Debug, thiserror::Error)]
#[error(
    "Backend path `{}` resolves to `{}`, which is outside of the project root `{}`",
    path.user_display(),
    resolved.user_display(),
    root.user_display()
)]
pub struct PathEscapeError {
    pub path: PathBuf,
    pub resolved: PathBuf,
    pub root: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchPathError {
    #[error(transparent)]
    Escape(#[from] PathEscapeError),
    #[error("Failed to resolve backend path `{}`", path.user_display())]
    Resolve {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
}

/// Validate extra backend search paths against the project root.
///
/// Relative paths are interpreted against `project_root`, which must itself be canonical. Each
/// path is resolved through symlinks and `..`, and must end up at the project root or below it.
/// Paths that don't exist yet are resolved through their deepest existing ancestor. The resolved
/// paths are returned in the given order.
pub fn validate_search_paths(
    paths: &[PathBuf],
    project_root: &Path,
) -> Result<Vec<PathBuf>, SearchPathError> {
    paths
        .iter()
        .map(|path| {
            let resolved =
                resolve_path(project_root.join(path)).map_err(|err| SearchPathError::Resolve {
                    path: path.clone(),
                    err,
                })?;
            if !is_within(&resolved, project_root) {
                return Err(PathEscapeError {
                    path: path.clone(),
                    resolved,
                    root: project_root.to_path_buf(),
                }
                .into());
            }
            debug!(
                "Using backend path `{}` (`{}`)",
                path.user_display(),
                resolved.user_display()
            );
            Ok(resolved)
        })
        .collect()
}
