use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Failed to read source paths from stdin")]
    ReadInput(#[source] io::Error),
    #[error("Failed to write compile results")]
    WriteOutput(#[source] io::Error),
    #[error("Failed to serialize compile result")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to start compilation worker")]
    SpawnWorker(#[source] io::Error),
    #[error("Failed to build the worker runtime")]
    Runtime(#[source] io::Error),
    #[error("The task executor is broken, did some other task panic?")]
    Join,
    #[error("The result writer exited before all results were reported")]
    WriterDisappeared,
    #[error("No Python interpreter found, use `--python` to select one")]
    PythonNotFound,
    #[error("Failed to start Python interpreter to run compile script")]
    PythonSubcommand(#[source] io::Error),
    #[error("Failed to create temporary script file")]
    TempFile(#[source] io::Error),
    #[error("Python interpreter didn't start after {0} attempts")]
    StartupFailed(usize),
    #[error(r#"Bytecode compiler sent an unexpected handshake, expected "Ready", received: "{0}""#)]
    Handshake(String),
    #[error("Failed to communicate with Python over {device}")]
    ChildStdio {
        device: &'static str,
        #[source]
        err: io::Error,
    },
    #[error("Python exited while compiling `{0}`")]
    CompilerExited(String),
}
