use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::debug;

use kiln_compile::{Concurrency, PythonCompilerFactory, run_pool};
use kiln_logging::{Level, setup_logging};
use kiln_static::EnvVars;

/// Compile the source files named on stdin, one per line, until EOF or an empty line.
///
/// One JSON record per file is written to stdout as soon as it's compiled:
/// `{"path": "...", "output_path": "..." | null}`.
#[derive(Parser, Debug)]
#[command(name = "kiln-compile", version, about)]
struct Cli {
    /// The number of compile workers. Defaults to the number of available CPUs.
    #[arg(long, env = EnvVars::KILN_COMPILE_WORKERS)]
    workers: Option<NonZeroUsize>,

    /// The Python interpreter to compile with. Defaults to `python3` or `python` on `PATH`.
    #[arg(long, env = EnvVars::KILN_PYTHON)]
    python: Option<PathBuf>,

    /// Use verbose output. Repeat for a span tree.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let factory = PythonCompilerFactory::find(cli.python)?;
    let concurrency = Concurrency::new(cli.workers);

    let input = BufReader::new(tokio::io::stdin());
    let summary = run_pool(input, tokio::io::stdout(), factory, concurrency)
        .await
        .context("Bytecode compilation failed")?;
    debug!(
        "Compiled {} files, {} failed",
        summary.compiled, summary.failed
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    let result = setup_logging(Level::from(cli.verbose)).and_then(|()| {
        kiln_warnings::enable();
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed building the Runtime")?
            .block_on(run(cli))
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            kiln_warnings::report_error(&*err);
            ExitCode::FAILURE
        }
    }
}
