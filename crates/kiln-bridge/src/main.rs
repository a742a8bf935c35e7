use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use kiln_bridge::{BridgeExit, ModuleFinder, StepOutcome};
use kiln_logging::{Level, setup_logging};
use kiln_protocol::Goal;

/// Run one step of a build backend against a work directory.
///
/// The current directory is the project root: backend search paths from the request may not
/// leave it.
#[derive(Parser, Debug)]
#[command(name = "kiln-bridge", version, about)]
struct Cli {
    /// The work directory holding the request and receiving the result.
    work_dir: PathBuf,

    /// The build backend, as `module.path[:attribute.chain]`.
    backend: String,

    /// The step to run: `GetRequiresForBuildWheel`, `WheelMetadata`, or `Wheel`.
    goal: Goal,

    /// Use verbose output. Repeat for a span tree.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    if let Err(err) = setup_logging(Level::from(cli.verbose)) {
        kiln_warnings::report_error(&*err);
        return BridgeExit::Failure.into();
    }
    kiln_warnings::enable();

    let finder = ModuleFinder::from_env();
    match kiln_bridge::run(&cli.work_dir, &cli.backend, cli.goal, finder) {
        Ok(outcome) => {
            match &outcome {
                StepOutcome::HookUnsupported => {
                    debug!(
                        "`{}` is not supported by `{}`",
                        cli.goal.hook_name(),
                        cli.backend
                    );
                }
                outcome => debug!("Completed `{}`: {outcome:?}", cli.goal),
            }
            outcome.exit_status().into()
        }
        Err(err) => {
            kiln_warnings::report_error(&err);
            err.exit_status().into()
        }
    }
}
