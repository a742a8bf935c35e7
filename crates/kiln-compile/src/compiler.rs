use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, instrument};

use kiln_fs::Simplified;
use kiln_static::EnvVars;

use crate::CompileError;

const COMPILE_WORKER_SCRIPT: &str = include_str!("compile_worker.py");

/// How often a broken interpreter start is retried before giving up.
const STARTUP_ATTEMPTS: usize = 3;

/// Compiles source files, one at a time.
pub trait Compiler {
    /// Compile `source`, returning the path of the compiled file, or `None` if the file couldn't
    /// be compiled.
    ///
    /// An `Err` means the compiler itself broke. It is dropped and a new one is started for the
    /// next file.
    fn compile(
        &mut self,
        source: &Path,
    ) -> impl Future<Output = Result<Option<PathBuf>, CompileError>>;

    /// Stop the compiler once there's no more work.
    fn shutdown(self) -> impl Future<Output = ()>
    where
        Self: Sized,
    {
        async {}
    }
}

/// Starts a [`Compiler`] for each worker.
pub trait CompilerFactory: Send + Sync + 'static {
    type Compiler: Compiler;

    fn start(&self) -> impl Future<Output = Result<Self::Compiler, CompileError>>;
}

/// Runs a persistent Python interpreter per worker, which compiles the paths it reads on stdin.
#[derive(Debug)]
pub struct PythonCompilerFactory {
    interpreter: PathBuf,
    // Running Python with an actual file produces better error messages.
    script_dir: TempDir,
}

impl PythonCompilerFactory {
    pub fn new(interpreter: PathBuf) -> Result<Self, CompileError> {
        let script_dir = tempfile::tempdir().map_err(CompileError::TempFile)?;
        fs_err::write(
            script_dir.path().join("compile_worker.py"),
            COMPILE_WORKER_SCRIPT,
        )
        .map_err(CompileError::TempFile)?;
        Ok(Self {
            interpreter,
            script_dir,
        })
    }

    /// Use the interpreter from `--python` or `KILN_PYTHON`, or else the first `python3` or
    /// `python` on `PATH`.
    pub fn find(interpreter: Option<PathBuf>) -> Result<Self, CompileError> {
        let interpreter = match interpreter {
            Some(interpreter) => interpreter,
            None => which::which("python3")
                .or_else(|_| which::which("python"))
                .map_err(|_| CompileError::PythonNotFound)?,
        };
        debug!("Compiling with `{}`", interpreter.user_display());
        Self::new(interpreter)
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    fn script(&self) -> PathBuf {
        self.script_dir.path().join("compile_worker.py")
    }
}

impl CompilerFactory for PythonCompilerFactory {
    type Compiler = PythonCompiler;

    #[instrument(skip(self), fields(interpreter = %self.interpreter.user_display()))]
    async fn start(&self) -> Result<PythonCompiler, CompileError> {
        // Sometimes, the first time we read from stdout, we get an empty string back (no newline).
        // If we try to write to stdin, it will often be a broken pipe. In this case, we have to
        // restart the child process.
        for attempt in 1..=STARTUP_ATTEMPTS {
            if let Some(compiler) = launch(&self.interpreter, &self.script()).await? {
                return Ok(compiler);
            }
            debug!("Python didn't start (attempt {attempt}/{STARTUP_ATTEMPTS}), retrying");
        }
        Err(CompileError::StartupFailed(STARTUP_ATTEMPTS))
    }
}

/// A running `compile_worker.py`.
#[derive(Debug)]
pub struct PythonCompiler {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    line: String,
}

/// Returns the compiler on a successful launch or `None` for a broken interpreter state.
async fn launch(interpreter: &Path, script: &Path) -> Result<Option<PythonCompiler>, CompileError> {
    // We input the paths through stdin and get the compiled paths returned through stdout.
    let mut child = Command::new(interpreter)
        .arg("-Wi")
        .arg("-u")
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        // Otherwise stdout is buffered and we'll wait forever for a response
        .env(EnvVars::PYTHONUNBUFFERED, "1")
        .kill_on_drop(true)
        .spawn()
        .map_err(CompileError::PythonSubcommand)?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Err(CompileError::PythonSubcommand(std::io::Error::other(
            "Python's stdio isn't piped",
        )));
    };
    let mut stdout = BufReader::new(stdout);

    // Check if the launch was successful.
    let mut line = String::new();
    stdout
        .read_line(&mut line)
        .await
        .map_err(|err| CompileError::ChildStdio {
            device: "stdout",
            err,
        })?;

    if line.trim_end() == "Ready" {
        Ok(Some(PythonCompiler {
            child,
            stdin,
            stdout,
            line,
        }))
    } else if line.is_empty() {
        // Failed to launch, try again
        Ok(None)
    } else {
        Err(CompileError::Handshake(line.trim_end().to_string()))
    }
}

impl Compiler for PythonCompiler {
    async fn compile(&mut self, source: &Path) -> Result<Option<PathBuf>, CompileError> {
        let source = source.display().to_string();
        // Luckily, LF alone works on windows too
        let request = format!("{source}\n");
        self.stdin
            .write_all(request.as_bytes())
            .await
            .map_err(|err| CompileError::ChildStdio {
                device: "stdin",
                err,
            })?;

        self.line.clear();
        let read = self
            .stdout
            .read_line(&mut self.line)
            .await
            .map_err(|err| CompileError::ChildStdio {
                device: "stdout",
                err,
            })?;
        if read == 0 {
            return Err(CompileError::CompilerExited(source));
        }

        let output = self.line.trim_end_matches(['\n', '\r']);
        if output.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(output)))
        }
    }

    async fn shutdown(mut self) {
        // Closing stdin ends the script's read loop.
        drop(self.stdin);
        if let Err(err) = self.child.wait().await {
            debug!("Failed to wait for Python: {err}");
        }
    }
}
