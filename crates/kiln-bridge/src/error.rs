use std::io;

use kiln_protocol::BridgeExit;

use crate::backend::HookFailure;
use crate::finder::ResolutionError;
use crate::search_path::SearchPathError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    WorkDirectory(#[from] kiln_protocol::Error),
    #[error("Failed to determine the project root")]
    ProjectRoot(#[source] io::Error),
    #[error("The backend `{cli}` doesn't match `{request}` from `build-system.json`")]
    BackendMismatch { cli: String, request: String },
    #[error("Invalid backend search path")]
    SearchPath(#[from] SearchPathError),
    #[error("Failed to resolve build backend")]
    Resolution(#[from] ResolutionError),
    #[error("Build backend `{backend}` doesn't define the mandatory hook `{hook}`")]
    MissingMandatoryHook { backend: String, hook: &'static str },
    #[error("Build backend hook `{hook}` failed")]
    Backend {
        hook: &'static str,
        #[source]
        err: HookFailure,
    },
    #[error("Build backend hook `{hook}` returned an invalid result: {reason}")]
    InvalidHookResult { hook: &'static str, reason: String },
}

impl Error {
    /// The process exit status the host should see for this error.
    pub fn exit_status(&self) -> BridgeExit {
        match self {
            Self::SearchPath(_) => BridgeExit::InvalidBackendPath,
            Self::Resolution(_) | Self::MissingMandatoryHook { .. } => {
                BridgeExit::BackendUnavailable
            }
            Self::WorkDirectory(_)
            | Self::ProjectRoot(_)
            | Self::BackendMismatch { .. }
            | Self::Backend { .. }
            | Self::InvalidHookResult { .. } => BridgeExit::Failure,
        }
    }
}
