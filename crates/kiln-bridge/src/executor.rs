use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, instrument};

use kiln_fs::Simplified;
use kiln_protocol::{BridgeExit, Goal, WorkDirectory};

use crate::Error;
use crate::backend::{BackendHandle, HookArgs};

/// What a successful step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Extra build requirements, written to `extra_requirements.json`.
    Requirements(Vec<String>),
    /// The `.dist-info` directory, recorded in `metadata_result`.
    Metadata(PathBuf),
    /// The built wheel, recorded in `wheel_result`.
    Wheel(PathBuf),
    /// The backend doesn't implement the optional hook. Nothing was written.
    HookUnsupported,
}

impl StepOutcome {
    pub fn exit_status(&self) -> BridgeExit {
        match self {
            Self::HookUnsupported => BridgeExit::HookUnsupported,
            Self::Requirements(_) | Self::Metadata(_) | Self::Wheel(_) => BridgeExit::Success,
        }
    }
}

/// Run the hook for `goal` and persist its outcome in the work directory.
#[instrument(skip_all, fields(goal = %goal, backend = %backend.descriptor()))]
pub fn execute(
    goal: Goal,
    backend: &BackendHandle,
    work_dir: &WorkDirectory,
) -> Result<StepOutcome, Error> {
    match goal {
        Goal::QueryExtraRequirements => query_extra_requirements(backend, work_dir),
        Goal::PrepareMetadata => prepare_metadata(backend, work_dir),
        Goal::BuildArtifact => build_artifact(backend, work_dir),
    }
}

fn call(
    backend: &BackendHandle,
    hook: &'static str,
    args: &HookArgs,
) -> Option<Result<Value, Error>> {
    debug!("Calling `{hook}`");
    let result = backend.call_hook(hook, args)?;
    Some(result.map_err(|err| Error::Backend { hook, err }))
}

fn query_extra_requirements(
    backend: &BackendHandle,
    work_dir: &WorkDirectory,
) -> Result<StepOutcome, Error> {
    let hook = Goal::QueryExtraRequirements.hook_name();
    let requirements = match call(backend, hook, &HookArgs::default()) {
        None => {
            debug!("Backend doesn't define `{hook}`, there are no extra requirements");
            Vec::new()
        }
        Some(value) => parse_requirements(hook, value?)?,
    };
    work_dir.write_extra_requirements(&requirements)?;
    Ok(StepOutcome::Requirements(requirements))
}

fn parse_requirements(hook: &'static str, value: Value) -> Result<Vec<String>, Error> {
    let Value::Array(items) = value else {
        return Err(Error::InvalidHookResult {
            hook,
            reason: format!("expected a list of requirements, got `{value}`"),
        });
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(requirement) => Ok(requirement),
            other => Err(Error::InvalidHookResult {
                hook,
                reason: format!("expected a requirement string, got `{other}`"),
            }),
        })
        .collect()
}

fn prepare_metadata(
    backend: &BackendHandle,
    work_dir: &WorkDirectory,
) -> Result<StepOutcome, Error> {
    let hook = Goal::PrepareMetadata.hook_name();
    if !backend.has_hook(hook) {
        debug!("Backend doesn't define `{hook}`");
        return Ok(StepOutcome::HookUnsupported);
    }

    let metadata_dir = work_dir.create_metadata_dir()?;
    let args = HookArgs {
        output_directory: Some(metadata_dir.clone()),
        metadata_directory: None,
    };
    let Some(value) = call(backend, hook, &args) else {
        return Ok(StepOutcome::HookUnsupported);
    };
    let dist_info = output_entry(hook, value?, &metadata_dir, EntryKind::Directory)?;
    work_dir.write_metadata_result(&dist_info)?;
    Ok(StepOutcome::Metadata(dist_info))
}

fn build_artifact(
    backend: &BackendHandle,
    work_dir: &WorkDirectory,
) -> Result<StepOutcome, Error> {
    let hook = Goal::BuildArtifact.hook_name();
    if !backend.has_hook(hook) {
        return Err(Error::MissingMandatoryHook {
            backend: backend.descriptor().to_string(),
            hook,
        });
    }

    let metadata_directory = work_dir.existing_metadata()?;
    if let Some(metadata_directory) = &metadata_directory {
        debug!(
            "Passing metadata from `{}`",
            metadata_directory.user_display()
        );
    }
    let wheel_dir = work_dir.create_wheel_dir()?;
    let args = HookArgs {
        output_directory: Some(wheel_dir.clone()),
        metadata_directory,
    };
    let Some(value) = call(backend, hook, &args) else {
        return Err(Error::MissingMandatoryHook {
            backend: backend.descriptor().to_string(),
            hook,
        });
    };
    let wheel = output_entry(hook, value?, &wheel_dir, EntryKind::File)?;
    work_dir.write_wheel_result(&wheel)?;
    Ok(StepOutcome::Wheel(wheel))
}

#[derive(Debug, Clone, Copy)]
enum EntryKind {
    Directory,
    File,
}

/// Check that a hook returned the basename of an entry it created in `output_dir`.
fn output_entry(
    hook: &'static str,
    value: Value,
    output_dir: &Path,
    kind: EntryKind,
) -> Result<PathBuf, Error> {
    let Value::String(basename) = value else {
        return Err(Error::InvalidHookResult {
            hook,
            reason: format!("expected a file name, got `{value}`"),
        });
    };

    // Only a plain file name keeps the result inside the output directory.
    let is_basename = Path::new(&basename)
        .file_name()
        .is_some_and(|name| name == basename.as_str());
    if !is_basename {
        return Err(Error::InvalidHookResult {
            hook,
            reason: format!("expected a file name, got the path `{basename}`"),
        });
    }

    let path = output_dir.join(&basename);
    let exists = match kind {
        EntryKind::Directory => path.is_dir(),
        EntryKind::File => path.is_file(),
    };
    if !exists {
        let kind = match kind {
            EntryKind::Directory => "directory",
            EntryKind::File => "file",
        };
        return Err(Error::InvalidHookResult {
            hook,
            reason: format!("the {kind} `{}` doesn't exist", path.user_display()),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests;
