use std::collections::BTreeMap;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use rustc_hash::FxHashSet;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use kiln_fs::Simplified;
use kiln_protocol::CompileRecord;
use kiln_warnings::warn_user;

use crate::CompileTreeError;

/// The outcome of compiling a tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompileSummary {
    /// Source file to compiled file.
    pub compiled: BTreeMap<PathBuf, PathBuf>,
    /// Source files that couldn't be compiled.
    pub failed: Vec<PathBuf>,
}

/// Bytecode compile all `.py` files in `dir` with the compile pool at `pool`.
///
/// Compilation errors of individual files are muted and reported in [`CompileSummary::failed`].
/// If the pool exits before reporting every file, the run is [`CompileTreeError::Incomplete`],
/// carrying the pool's exit status and stderr.
#[instrument(skip(pool, python))]
pub async fn compile_tree(
    dir: &Path,
    pool: &Path,
    python: Option<&Path>,
    workers: Option<NonZeroUsize>,
) -> Result<CompileSummary, CompileTreeError> {
    let sources = source_files(dir)?;
    debug!("Compiling {} files in `{}`", sources.len(), dir.user_display());

    let mut command = Command::new(pool);
    if let Some(python) = python {
        command.arg("--python").arg(python);
    }
    if let Some(workers) = workers {
        command.arg("--workers").arg(workers.to_string());
    }
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| CompileTreeError::CommandFailed(pool.to_path_buf(), err))?;

    let (Some(stdin), Some(stdout), Some(mut stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        return Err(CompileTreeError::CommandFailed(
            pool.to_path_buf(),
            io::Error::other("The compile pool's stdio isn't piped"),
        ));
    };

    let stderr_reader = async move {
        let mut collected = Vec::new();
        stderr
            .read_to_end(&mut collected)
            .await
            .map_err(|err| CompileTreeError::ChildStdio {
                device: "stderr",
                err,
            })?;
        Ok::<_, CompileTreeError>(String::from_utf8_lossy(&collected).trim().to_string())
    };

    let (_, summary, stderr) = tokio::try_join!(
        send_paths(stdin, &sources),
        read_records(stdout, &sources),
        stderr_reader,
    )?;
    let status = child
        .wait()
        .await
        .map_err(|err| CompileTreeError::CommandFailed(pool.to_path_buf(), err))?;
    if !stderr.is_empty() {
        debug!("Compile pool stderr:\n{stderr}\n---");
    }

    let (summary, pending) = summary;
    if !pending.is_empty() {
        let mut missing: Vec<PathBuf> = pending.into_iter().collect();
        missing.sort();
        return Err(CompileTreeError::Incomplete {
            missing,
            reported: summary.compiled.len() + summary.failed.len(),
            status,
            stderr,
        });
    }
    if !status.success() {
        return Err(CompileTreeError::PoolFailed { status, stderr });
    }
    Ok(summary)
}

/// All `.py` files below `dir`, skipping `__pycache__` and paths the line protocol can't carry.
fn source_files(dir: &Path) -> Result<Vec<PathBuf>, CompileTreeError> {
    let mut sources = Vec::new();
    let walker = WalkDir::new(dir)
        .into_iter()
        // Otherwise we stumble over temporary files from the compiler.
        .filter_entry(|entry| entry.file_name() != "__pycache__");
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err
                    .io_error()
                    .is_some_and(|err| err.kind() == io::ErrorKind::NotFound)
                {
                    // The directory was removed, just ignore it
                    continue;
                }
                return Err(CompileTreeError::Walkdir(dir.to_path_buf(), err));
            }
        };
        if !entry.file_type().is_file() || entry.path().extension().is_none_or(|ext| ext != "py") {
            continue;
        }
        let Some(path) = entry.path().to_str() else {
            warn_user!(
                "Path is not valid UTF-8, skipping: {}",
                entry.path().user_display()
            );
            continue;
        };
        if path.contains(['\r', '\n']) {
            warn_user!("Path contains newline, skipping: {path:?}");
            continue;
        }
        if path.trim() != path {
            warn_user!("Path has surrounding whitespace, skipping: {path:?}");
            continue;
        }
        sources.push(entry.into_path());
    }
    Ok(sources)
}

async fn send_paths(mut stdin: ChildStdin, sources: &[PathBuf]) -> Result<(), CompileTreeError> {
    for source in sources {
        // Luckily, LF alone works on windows too
        let line = format!("{}\n", source.display());
        match stdin.write_all(line.as_bytes()).await {
            Ok(()) => {}
            // The pool exited, the missing records tell the rest.
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
            Err(err) => {
                return Err(CompileTreeError::ChildStdio {
                    device: "stdin",
                    err,
                });
            }
        }
    }
    match stdin.flush().await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(CompileTreeError::ChildStdio {
            device: "stdin",
            err,
        }),
    }
    // Dropping stdin signals the end of input.
}

async fn read_records(
    stdout: ChildStdout,
    sources: &[PathBuf],
) -> Result<(CompileSummary, FxHashSet<PathBuf>), CompileTreeError> {
    let mut pending: FxHashSet<PathBuf> = sources.iter().cloned().collect();
    let mut summary = CompileSummary::default();
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|err| CompileTreeError::ChildStdio {
            device: "stdout",
            err,
        })?
    {
        let record: CompileRecord =
            serde_json::from_str(&line).map_err(|err| CompileTreeError::InvalidRecord {
                line: line.clone(),
                err,
            })?;
        if !pending.remove(&record.path) {
            return Err(CompileTreeError::UnexpectedRecord(record.path));
        }
        match record.output_path {
            Some(output_path) => {
                summary.compiled.insert(record.path, output_path);
            }
            None => summary.failed.push(record.path),
        }
    }
    summary.failed.sort();
    Ok((summary, pending))
}
