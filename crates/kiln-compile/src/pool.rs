use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_channel::Receiver;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use kiln_protocol::CompileRecord;

use crate::{CompileError, Compiler, CompilerFactory, Concurrency};

/// Counts of what a pool run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    /// Paths read from the input.
    pub submitted: usize,
    /// Records with an output path.
    pub compiled: usize,
    /// Records without an output path.
    pub failed: usize,
}

/// Compile every path read from `input`, writing one [`CompileRecord`] per path to `output` in
/// completion order.
///
/// Input ends at EOF or at the first empty line. Each path is queued as soon as it's read, so a
/// slow compiler never blocks reading. Each worker runs on a dedicated thread and owns at most one
/// compiler, started on its first path; a compiler that breaks is replaced for the next path. All
/// records go through a single writer that flushes after each record, so the reader on the other
/// end sees complete lines as soon as they're ready.
#[instrument(skip_all, fields(workers = concurrency.workers.get()))]
pub async fn run_pool<F: CompilerFactory>(
    input: impl AsyncBufRead + Unpin,
    output: impl AsyncWrite + Unpin,
    factory: F,
    concurrency: Concurrency,
) -> Result<PoolSummary, CompileError> {
    let worker_count = concurrency.workers.get();
    let factory = Arc::new(factory);

    // Submission never waits for a free worker.
    let (sender, receiver) = async_channel::unbounded::<PathBuf>();
    let (results_tx, results_rx) = mpsc::unbounded_channel::<CompileRecord>();

    debug!("Starting {worker_count} bytecode compilation workers");
    let mut worker_handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let (tx, rx) = oneshot::channel();
        let factory = factory.clone();
        let receiver = receiver.clone();
        let results = results_tx.clone();

        // Spawn each worker on a dedicated thread.
        std::thread::Builder::new()
            .name("kiln-compile".to_owned())
            .spawn(move || {
                // Report panics back to the main thread.
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(CompileError::Runtime)?
                        .block_on(worker(&*factory, receiver, results))
                }));

                // This may fail if the main thread returned early due to an error.
                let _ = tx.send(result);
            })
            .map_err(CompileError::SpawnWorker)?;

        worker_handles.push(rx);
    }
    // Make sure the channels close when the reader and all workers are done.
    drop(receiver);
    drop(results_tx);

    let reader = async move {
        let submitted = read_paths(input, &sender).await;
        // Workers drain the queue, then exit.
        drop(sender);
        submitted
    };
    let workers = futures::future::join_all(worker_handles);
    let (submitted, written, workers) =
        tokio::join!(reader, write_records(results_rx, output), workers);

    // Report the writer first: if it failed, workers only saw a closed channel.
    let (compiled, failed) = written?;
    for result in workers {
        match result {
            // The worker thread disappeared, or the worker panicked.
            Err(_) | Ok(Err(_)) => return Err(CompileError::Join),
            // The worker reports an error.
            Ok(Ok(Err(err))) => return Err(err),
            Ok(Ok(Ok(()))) => {}
        }
    }
    let submitted = submitted?;

    debug!("Compiled {compiled} of {submitted} files ({failed} failed)");
    Ok(PoolSummary {
        submitted,
        compiled,
        failed,
    })
}

async fn read_paths(
    input: impl AsyncBufRead + Unpin,
    sender: &async_channel::Sender<PathBuf>,
) -> Result<usize, CompileError> {
    let mut lines = input.lines();
    let mut submitted = 0;
    while let Some(line) = lines.next_line().await.map_err(CompileError::ReadInput)? {
        let path = line.trim();
        if path.is_empty() {
            break;
        }
        trace!("Queueing `{path}`");
        if sender.send(PathBuf::from(path)).await.is_err() {
            // All workers are gone, their error is reported by the caller.
            break;
        }
        submitted += 1;
    }
    Ok(submitted)
}

async fn write_records(
    mut results: mpsc::UnboundedReceiver<CompileRecord>,
    mut output: impl AsyncWrite + Unpin,
) -> Result<(usize, usize), CompileError> {
    let mut compiled = 0;
    let mut failed = 0;
    while let Some(record) = results.recv().await {
        if record.is_success() {
            compiled += 1;
        } else {
            failed += 1;
        }
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        output
            .write_all(&line)
            .await
            .map_err(CompileError::WriteOutput)?;
        output.flush().await.map_err(CompileError::WriteOutput)?;
    }
    Ok((compiled, failed))
}

async fn worker<F: CompilerFactory>(
    factory: &F,
    receiver: Receiver<PathBuf>,
    results: mpsc::UnboundedSender<CompileRecord>,
) -> Result<(), CompileError> {
    let mut compiler = None;
    while let Ok(path) = receiver.recv().await {
        let output_path = compile_one(factory, &mut compiler, &path).await;
        results
            .send(CompileRecord { path, output_path })
            .map_err(|_| CompileError::WriterDisappeared)?;
    }
    if let Some(compiler) = compiler {
        compiler.shutdown().await;
    }
    Ok(())
}

/// Compile a single file, starting the compiler if necessary. Any failure is reported as `None`.
async fn compile_one<F: CompilerFactory>(
    factory: &F,
    compiler: &mut Option<F::Compiler>,
    path: &Path,
) -> Option<PathBuf> {
    if compiler.is_none() {
        match factory.start().await {
            Ok(started) => *compiler = Some(started),
            Err(err) => {
                warn!("Failed to start bytecode compiler: {err}");
                return None;
            }
        }
    }
    let active = compiler.as_mut()?;

    match active.compile(path).await {
        Ok(output_path) => output_path,
        Err(err) => {
            warn!(
                "Bytecode compiler broke on `{}`, restarting: {err}",
                path.display()
            );
            // Dropping the compiler stops it.
            *compiler = None;
            None
        }
    }
}
