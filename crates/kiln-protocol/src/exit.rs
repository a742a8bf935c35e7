use std::process::ExitCode;

/// The exit status of a bridge invocation.
///
/// The host reads the outcome of a step from this code first, and only consults the work
/// directory after [`BridgeExit::Success`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The goal completed and its result file is present.
    Success,
    /// The backend failed, or an unexpected error occurred. Diagnostics are on stderr.
    Failure,
    /// The command line couldn't be parsed.
    Usage,
    /// The backend doesn't implement the optional hook for this goal.
    HookUnsupported,
    /// A backend search path is invalid or escapes the project root.
    InvalidBackendPath,
    /// The backend couldn't be loaded or lacks a mandatory hook.
    BackendUnavailable,
}

impl BridgeExit {
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Usage => 2,
            Self::HookUnsupported => 50,
            Self::InvalidBackendPath => 51,
            Self::BackendUnavailable => 52,
        }
    }

    /// Interpret a process exit code. Unknown codes (including signals, `None`) are failures.
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Success,
            Some(2) => Self::Usage,
            Some(50) => Self::HookUnsupported,
            Some(51) => Self::InvalidBackendPath,
            Some(52) => Self::BackendUnavailable,
            _ => Self::Failure,
        }
    }
}

impl From<BridgeExit> for ExitCode {
    fn from(exit: BridgeExit) -> Self {
        Self::from(exit.code())
    }
}
