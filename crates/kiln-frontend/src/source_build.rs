use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Output;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, instrument};

use kiln_fs::Simplified;
use kiln_protocol::{BridgeExit, BuildSystemRequest, Goal, WorkDirectory};
use kiln_static::EnvVars;

use crate::Error;

/// The backend used when the request doesn't name one.
const DEFAULT_BACKEND: &str = "setuptools.build_meta:__legacy__";

/// Builds one source tree by running the bridge once per step.
///
/// All steps share a private work directory, so a wheel build sees the metadata of an earlier
/// metadata step. The work directory, including the built wheel, is removed on drop.
#[derive(Debug)]
pub struct SourceBuild {
    work_dir: WorkDirectory,
    bridge: PathBuf,
    source_tree: PathBuf,
    backend: String,
    environment: Vec<(OsString, OsString)>,
    /// Start the bridge from an empty environment instead of inheriting ours.
    clean_env: bool,
    /// Directories searched for executables before the inherited `PATH`.
    path_prepend: Vec<PathBuf>,
    /// Package id such as `foo-1.2.3`, for error reporting
    package_id: String,
    // Declared last, so the directory outlives everything pointing into it.
    _temp_dir: TempDir,
}

impl SourceBuild {
    /// Create the work directory for building `source_tree` and write the request into it.
    ///
    /// `package_id` is for error reporting only.
    pub fn setup(
        bridge: &Path,
        source_tree: &Path,
        request: &BuildSystemRequest,
        package_id: &str,
    ) -> Result<Self, Error> {
        let temp_dir = tempfile::tempdir()?;
        let work_dir = WorkDirectory::open(temp_dir.path())?;
        let backend = request
            .build_backend
            .clone()
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
        let request = BuildSystemRequest {
            build_backend: Some(backend.clone()),
            backend_path: request.backend_path.clone(),
        };
        work_dir.write_request(&request)?;
        debug!(
            "Prepared work directory `{}` for `{package_id}`",
            work_dir.root().user_display()
        );

        Ok(Self {
            work_dir,
            bridge: bridge.to_path_buf(),
            // The bridge treats its working directory as the project root.
            source_tree: std::path::absolute(source_tree)?,
            backend,
            environment: Vec::new(),
            clean_env: false,
            path_prepend: Vec::new(),
            package_id: package_id.to_string(),
            _temp_dir: temp_dir,
        })
    }

    /// Set an environment variable for every bridge invocation.
    #[must_use]
    pub fn with_env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.environment
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Don't inherit our environment: the bridge only sees the variables set on this build.
    #[must_use]
    pub fn with_clean_env(mut self) -> Self {
        self.clean_env = true;
        self
    }

    /// Search `paths` for executables before the `PATH` the bridge would otherwise get, e.g. the
    /// build environment's scripts directory.
    pub fn with_path_prepend(
        mut self,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<Self, std::env::JoinPathsError> {
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        std::env::join_paths(&paths)?;
        self.path_prepend.extend(paths);
        Ok(self)
    }

    /// Point the bridge at the build environment's manifest modules.
    pub fn with_site_path(
        self,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<Self, std::env::JoinPathsError> {
        let site_path = std::env::join_paths(paths)?;
        Ok(self.with_env(EnvVars::KILN_SITE_PATH, site_path))
    }

    pub fn work_dir(&self) -> &WorkDirectory {
        &self.work_dir
    }

    /// Ask the backend for requirements beyond `build-system.requires`.
    #[instrument(skip(self), fields(package_id = self.package_id))]
    pub async fn extra_requirements(&self) -> Result<Vec<String>, Error> {
        let goal = Goal::QueryExtraRequirements;
        let output = self.run(goal).await?;
        self.expect_success(goal, &output)?;
        self.work_dir
            .read_extra_requirements()?
            .ok_or_else(|| self.missing_result(goal, WorkDirectory::EXTRA_REQUIREMENTS))
    }

    /// Try calling `prepare_metadata_for_build_wheel` to get the metadata without executing the
    /// actual build.
    ///
    /// Returns the `.dist-info` directory, or `None` if the backend doesn't support the hook, in
    /// which case the metadata has to come from the wheel.
    #[instrument(skip(self), fields(package_id = self.package_id))]
    pub async fn metadata(&self) -> Result<Option<PathBuf>, Error> {
        let goal = Goal::PrepareMetadata;
        let output = self.run(goal).await?;
        if BridgeExit::from_code(output.status.code()) == BridgeExit::HookUnsupported {
            debug!("`{}` doesn't support `{}`", self.backend, goal.hook_name());
            return Ok(None);
        }
        self.expect_success(goal, &output)?;
        let dist_info = self
            .work_dir
            .read_metadata_result()?
            .ok_or_else(|| self.missing_result(goal, WorkDirectory::METADATA_RESULT))?;
        Ok(Some(dist_info))
    }

    /// Build the wheel, returning its path inside the work directory.
    ///
    /// The wheel must be used or moved before dropping the [`SourceBuild`].
    #[instrument(skip(self), fields(package_id = self.package_id))]
    pub async fn wheel(&self) -> Result<PathBuf, Error> {
        let goal = Goal::BuildArtifact;
        let output = self.run(goal).await?;
        self.expect_success(goal, &output)?;
        self.work_dir
            .read_wheel_result()?
            .ok_or_else(|| self.missing_result(goal, WorkDirectory::WHEEL_RESULT))
    }

    async fn run(&self, goal: Goal) -> Result<Output, Error> {
        debug!(
            "Running `{} {} {} {goal}`",
            self.bridge.user_display(),
            self.work_dir.root().user_display(),
            self.backend
        );
        let mut command = Command::new(&self.bridge);
        if self.clean_env {
            command.env_clear();
        }
        command
            .arg(self.work_dir.root())
            .arg(&self.backend)
            .arg(goal.to_string())
            .current_dir(&self.source_tree)
            .envs(self.environment.iter().map(|(key, value)| (key, value)));
        if let Some(path) = self.search_path()? {
            command.env(EnvVars::PATH, path);
        }
        command
            .output()
            .await
            .map_err(|err| Error::CommandFailed(self.bridge.clone(), err))
    }

    /// The bridge's `PATH`: the prepended directories, then the `PATH` set on this build, or else
    /// the inherited one.
    fn search_path(&self) -> Result<Option<OsString>, Error> {
        if self.path_prepend.is_empty() {
            return Ok(None);
        }
        let base = self
            .environment
            .iter()
            .rev()
            .find(|(key, _)| key == EnvVars::PATH)
            .map(|(_, value)| value.clone())
            .or_else(|| {
                if self.clean_env {
                    None
                } else {
                    std::env::var_os(EnvVars::PATH)
                }
            });
        let base = base.iter().flat_map(std::env::split_paths);
        let path = std::env::join_paths(self.path_prepend.iter().cloned().chain(base))
            .map_err(Error::SearchPath)?;
        Ok(Some(path))
    }

    fn expect_success(&self, goal: Goal, output: &Output) -> Result<(), Error> {
        let stderr = || String::from_utf8_lossy(&output.stderr).trim().to_string();
        match BridgeExit::from_code(output.status.code()) {
            BridgeExit::Success => Ok(()),
            BridgeExit::InvalidBackendPath => Err(Error::InvalidBackendPath {
                package_id: self.package_id.clone(),
                stderr: stderr(),
            }),
            BridgeExit::BackendUnavailable => Err(Error::BackendUnavailable {
                package_id: self.package_id.clone(),
                stderr: stderr(),
            }),
            BridgeExit::HookUnsupported | BridgeExit::Failure | BridgeExit::Usage => {
                Err(Error::from_command_output(
                    format!(
                        "Build backend failed to run `{}` for `{}` ({})",
                        goal.hook_name(),
                        self.package_id,
                        output.status
                    ),
                    output,
                ))
            }
        }
    }

    fn missing_result(&self, goal: Goal, result: &'static str) -> Error {
        Error::MissingResult {
            package_id: self.package_id.clone(),
            hook: goal.hook_name(),
            result,
        }
    }
}

#[cfg(all(test, unix))]
mod tests;
