//! A pool of bytecode compilers fed by a line-oriented stream of source paths.

pub use crate::compiler::{Compiler, CompilerFactory, PythonCompiler, PythonCompilerFactory};
pub use crate::concurrency::Concurrency;
pub use crate::error::CompileError;
pub use crate::pool::{PoolSummary, run_pool};

mod compiler;
mod concurrency;
mod error;
mod pool;
