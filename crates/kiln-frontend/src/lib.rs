//! Drive the bridge and the compile pool from the host.
//!
//! [`SourceBuild`] runs the bridge once per step against a private work directory and turns its
//! exit codes into typed errors. [`compile_tree`] streams a directory's source files to the
//! compile pool and matches the records it gets back.

pub use crate::compile::{CompileSummary, compile_tree};
pub use crate::error::{CompileTreeError, Error};
pub use crate::source_build::SourceBuild;

mod compile;
mod error;
mod source_build;
