//! Drive one step of a build backend.
//!
//! A bridge invocation reads its request from a [`WorkDirectory`], resolves the backend named by
//! a [`BackendDescriptor`], runs the hook for one [`Goal`], and leaves the result in the work
//! directory. The outcome is reported to the host through the exit code ([`BridgeExit`]).

use std::path::Path;
use std::str::FromStr;

use tracing::{debug, instrument};

use kiln_fs::{Simplified, resolve_path};
use kiln_protocol::{Goal, WorkDirectory};

pub use crate::backend::{BackendHandle, BackendObject, HookArgs, HookFailure, HookFn};
pub use crate::descriptor::{BackendDescriptor, DescriptorError};
pub use crate::error::Error;
pub use crate::executor::{StepOutcome, execute};
pub use crate::finder::{ModuleFinder, ResolutionError};
pub use crate::manifest::ManifestError;
pub use crate::search_path::{PathEscapeError, SearchPathError, validate_search_paths};
pub use kiln_protocol::BridgeExit;

mod backend;
mod descriptor;
mod error;
mod executor;
mod finder;
mod manifest;
mod search_path;

/// Run a single bridge step, with the current directory as the project root.
pub fn run(
    work_dir: &Path,
    backend: &str,
    goal: Goal,
    finder: ModuleFinder,
) -> Result<StepOutcome, Error> {
    let project_root = std::env::current_dir()
        .and_then(resolve_path)
        .map_err(Error::ProjectRoot)?;
    run_in_project(&project_root, work_dir, backend, goal, finder)
}

/// Run a single bridge step for the project at `project_root`, which must be canonical.
///
/// Backend search paths from the request are validated before `finder` imports anything, then
/// prepended to its search path.
#[instrument(skip_all, fields(backend = backend, goal = %goal))]
pub fn run_in_project(
    project_root: &Path,
    work_dir: &Path,
    backend: &str,
    goal: Goal,
    finder: ModuleFinder,
) -> Result<StepOutcome, Error> {
    let descriptor = BackendDescriptor::from_str(backend).map_err(|err| {
        ResolutionError::MalformedDescriptor {
            descriptor: backend.to_string(),
            err,
        }
    })?;
    let work_dir = WorkDirectory::open(work_dir)?;

    let request = work_dir.read_request()?.unwrap_or_default();
    if let Some(requested) = &request.build_backend {
        if requested.trim() != descriptor.to_string() {
            return Err(Error::BackendMismatch {
                cli: descriptor.to_string(),
                request: requested.clone(),
            });
        }
    }

    let backend_paths = validate_search_paths(&request.backend_path, project_root)?;
    debug!(
        "Searching {} backend path(s) before the site path",
        backend_paths.len()
    );

    let finder = finder.with_backend_paths(backend_paths);
    let backend = finder.resolve(&descriptor)?;
    execute(goal, &backend, &work_dir)
}
