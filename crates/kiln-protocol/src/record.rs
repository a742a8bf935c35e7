use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One line of compile pool output: the source file and, if compilation succeeded, the path of
/// the cached bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRecord {
    pub path: PathBuf,
    pub output_path: Option<PathBuf>,
}

impl CompileRecord {
    pub fn is_success(&self) -> bool {
        self.output_path.is_some()
    }
}
