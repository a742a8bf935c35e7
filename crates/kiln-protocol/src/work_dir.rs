use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use kiln_fs::{Simplified, write_atomic_sync};

use crate::BuildSystemRequest;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to parse `{}`", path.user_display())]
    Json {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },
    #[error("Result file `{}` is empty", _0.user_display())]
    EmptyResult(PathBuf),
}

/// The directory a single bridge invocation reads its request from and writes its result to.
///
/// The host creates the directory and the request. Each goal owns a fixed set of names inside
/// it; result files are written atomically so the host never observes a partial result, and
/// the per-goal output directories are created exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirectory {
    root: PathBuf,
}

impl WorkDirectory {
    pub const REQUEST: &'static str = "build-system.json";
    pub const EXTRA_REQUIREMENTS: &'static str = "extra_requirements.json";
    pub const METADATA_DIR: &'static str = "metadata";
    pub const METADATA_RESULT: &'static str = "metadata_result";
    pub const WHEEL_DIR: &'static str = "wheel";
    pub const WHEEL_RESULT: &'static str = "wheel_result";

    /// Open an existing work directory.
    ///
    /// The path is made absolute, so that the paths written to result files are absolute too.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = std::path::absolute(root.as_ref())?;
        if !fs_err::metadata(&root)?.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("Work directory is not a directory: {}", root.user_display()),
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn request_path(&self) -> PathBuf {
        self.root.join(Self::REQUEST)
    }

    pub fn extra_requirements_path(&self) -> PathBuf {
        self.root.join(Self::EXTRA_REQUIREMENTS)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(Self::METADATA_DIR)
    }

    pub fn metadata_result_path(&self) -> PathBuf {
        self.root.join(Self::METADATA_RESULT)
    }

    pub fn wheel_dir(&self) -> PathBuf {
        self.root.join(Self::WHEEL_DIR)
    }

    pub fn wheel_result_path(&self) -> PathBuf {
        self.root.join(Self::WHEEL_RESULT)
    }

    /// Read `build-system.json`, if the host wrote one.
    pub fn read_request(&self) -> Result<Option<BuildSystemRequest>, Error> {
        let path = self.request_path();
        let Some(contents) = read_if_exists(&path)? else {
            debug!("No build system request at `{}`", path.user_display());
            return Ok(None);
        };
        let request = serde_json::from_str(&contents).map_err(|err| Error::Json { path, err })?;
        Ok(Some(request))
    }

    pub fn write_request(&self, request: &BuildSystemRequest) -> Result<(), Error> {
        let path = self.request_path();
        let contents = serde_json::to_string_pretty(request).map_err(|err| Error::Json {
            path: path.clone(),
            err,
        })?;
        write_atomic_sync(path, contents)?;
        Ok(())
    }

    pub fn write_extra_requirements(&self, requirements: &[String]) -> Result<(), Error> {
        let path = self.extra_requirements_path();
        let contents = serde_json::to_string(requirements).map_err(|err| Error::Json {
            path: path.clone(),
            err,
        })?;
        write_atomic_sync(path, contents)?;
        Ok(())
    }

    /// Read `extra_requirements.json`, or `None` if the bridge didn't write it.
    pub fn read_extra_requirements(&self) -> Result<Option<Vec<String>>, Error> {
        let path = self.extra_requirements_path();
        let Some(contents) = read_if_exists(&path)? else {
            return Ok(None);
        };
        let requirements =
            serde_json::from_str(&contents).map_err(|err| Error::Json { path, err })?;
        Ok(Some(requirements))
    }

    /// Create `metadata/`. Fails if it already exists.
    pub fn create_metadata_dir(&self) -> Result<PathBuf, Error> {
        let dir = self.metadata_dir();
        fs_err::create_dir(&dir)?;
        Ok(dir)
    }

    /// Create `wheel/`. Fails if it already exists.
    pub fn create_wheel_dir(&self) -> Result<PathBuf, Error> {
        let dir = self.wheel_dir();
        fs_err::create_dir(&dir)?;
        Ok(dir)
    }

    pub fn write_metadata_result(&self, dist_info: &Path) -> Result<(), Error> {
        write_path_result(&self.metadata_result_path(), dist_info)
    }

    pub fn read_metadata_result(&self) -> Result<Option<PathBuf>, Error> {
        read_path_result(&self.metadata_result_path())
    }

    pub fn write_wheel_result(&self, wheel: &Path) -> Result<(), Error> {
        write_path_result(&self.wheel_result_path(), wheel)
    }

    pub fn read_wheel_result(&self) -> Result<Option<PathBuf>, Error> {
        read_path_result(&self.wheel_result_path())
    }

    /// The `.dist-info` directory from a previous metadata step, if `metadata_result` exists
    /// and the directory it names still exists.
    pub fn existing_metadata(&self) -> Result<Option<PathBuf>, Error> {
        let Some(dist_info) = self.read_metadata_result()? else {
            return Ok(None);
        };
        if dist_info.is_dir() {
            Ok(Some(dist_info))
        } else {
            debug!(
                "Ignoring stale metadata result, `{}` doesn't exist",
                dist_info.user_display()
            );
            Ok(None)
        }
    }
}

fn read_if_exists(path: &Path) -> Result<Option<String>, io::Error> {
    match fs_err::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn write_path_result(path: &Path, value: &Path) -> Result<(), Error> {
    write_atomic_sync(path, value.as_os_str().as_encoded_bytes())?;
    Ok(())
}

fn read_path_result(path: &Path) -> Result<Option<PathBuf>, Error> {
    let Some(contents) = read_if_exists(path)? else {
        return Ok(None);
    };
    let value = contents.trim_end_matches(['\r', '\n']);
    if value.is_empty() {
        return Err(Error::EmptyResult(path.to_path_buf()));
    }
    Ok(Some(PathBuf::from(value)))
}
