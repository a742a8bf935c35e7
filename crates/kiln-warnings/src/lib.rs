//! Warnings and error reports for the user, on stderr.

use std::error::Error;
use std::fmt::{self, Write};
use std::iter;
use std::sync::atomic::{AtomicBool, Ordering};

use anstream::{eprint, eprintln};
use owo_colors::OwoColorize;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Show [`warn_user!`] messages. Off until a binary turns it on.
pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Warn the user, if warnings are enabled.
#[macro_export]
macro_rules! warn_user {
    ($($arg:tt)*) => {
        $crate::warn(format_args!($($arg)*))
    };
}

#[doc(hidden)]
pub fn warn(message: fmt::Arguments<'_>) {
    if ENABLED.load(Ordering::Relaxed) {
        let message = message.to_string();
        eprintln!("{}{} {}", "warning".yellow().bold(), ":".bold(), message.bold());
    }
}

/// Format an error with one `Caused by` line per source.
///
/// ```text
/// error: Build backend hook `build_wheel` failed
///   Caused by: Hook `build_wheel` exited with exit status: 1
/// ```
///
/// Further lines of a multi-line cause, such as captured backend output, are kept verbatim.
pub fn write_error_chain(err: &dyn Error, mut stream: impl Write) -> fmt::Result {
    writeln!(
        stream,
        "{}{} {}",
        "error".red().bold(),
        ":".bold(),
        err.to_string().trim()
    )?;

    for cause in iter::successors(err.source(), |&err| err.source()) {
        let message = cause.to_string();
        let mut lines = message.lines();
        let Some(first) = lines.next() else {
            continue;
        };
        writeln!(stream, "  {}: {}", "Caused by".red().bold(), first.trim())?;
        for line in lines {
            writeln!(stream, "{}", line.trim_end())?;
        }
    }
    Ok(())
}

/// Print `err` and its causes to stderr.
pub fn report_error(err: &dyn Error) {
    let mut message = String::new();
    if write_error_chain(err, &mut message).is_ok() {
        eprint!("{message}");
    }
}
