use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Output};

use itertools::Itertools;
use thiserror::Error;

use kiln_fs::Simplified;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    WorkDirectory(#[from] kiln_protocol::Error),
    #[error("Failed to run `{}`", _0.user_display())]
    CommandFailed(PathBuf, #[source] io::Error),
    #[error("Failed to assemble `PATH` for the build backend")]
    SearchPath(#[source] std::env::JoinPathsError),
    #[error("Invalid backend search path for `{package_id}`:\n{stderr}")]
    InvalidBackendPath { package_id: String, stderr: String },
    #[error("Build backend for `{package_id}` is unavailable:\n{stderr}")]
    BackendUnavailable { package_id: String, stderr: String },
    #[error("{message}:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---")]
    BuildBackend {
        message: String,
        stdout: String,
        stderr: String,
    },
    #[error("`{hook}` succeeded for `{package_id}`, but `{result}` is missing")]
    MissingResult {
        package_id: String,
        hook: &'static str,
        result: &'static str,
    },
}

impl Error {
    pub(crate) fn from_command_output(message: String, output: &Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Self::BuildBackend {
            message,
            stdout,
            stderr,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileTreeError {
    #[error("Failed to list files in `{}`", _0.user_display())]
    Walkdir(PathBuf, #[source] walkdir::Error),
    #[error("Failed to run `{}`", _0.user_display())]
    CommandFailed(PathBuf, #[source] io::Error),
    #[error("Failed to communicate with the compile pool over {device}")]
    ChildStdio {
        device: &'static str,
        #[source]
        err: io::Error,
    },
    #[error("Invalid compile record: `{line}`")]
    InvalidRecord {
        line: String,
        #[source]
        err: serde_json::Error,
    },
    #[error("The compile pool reported `{}`, which wasn't submitted", _0.user_display())]
    UnexpectedRecord(PathBuf),
    #[error(
        "The compile pool exited ({status}) before reporting {} file(s): {}\n--- stderr:\n{stderr}\n---",
        missing.len(),
        missing.iter().map(|path| format!("`{}`", path.user_display())).join(", ")
    )]
    Incomplete {
        missing: Vec<PathBuf>,
        /// How many records the pool wrote before it exited.
        reported: usize,
        status: ExitStatus,
        stderr: String,
    },
    #[error("The compile pool failed ({status}):\n{stderr}")]
    PoolFailed { status: ExitStatus, stderr: String },
}

impl CompileTreeError {
    /// Whether running the compile pool again may succeed.
    ///
    /// A pool that was killed, or that died after it started reporting, is worth another run. A
    /// pool that failed before reporting anything is misconfigured, e.g. it found no interpreter.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Incomplete {
                reported, status, ..
            } => *reported > 0 || status.code().is_none(),
            _ => false,
        }
    }
}
