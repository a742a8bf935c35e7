use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The `build-system.json` request the host places in the work directory.
///
/// The backend named on the command line is authoritative. `build-backend` is only carried so
/// a mismatch between the two can be detected.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSystemRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_backend: Option<String>,
    /// Extra directories to search for the backend, relative to the project root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_path: Vec<PathBuf>,
}
