//! The contract shared by the bridge, the compile pool, and the host that drives them.
//!
//! Everything that crosses a process boundary lives here: the goal names passed on the command
//! line, the exit codes, the work directory layout, and the JSON records.

pub use crate::exit::BridgeExit;
pub use crate::goal::{Goal, GoalParseError};
pub use crate::record::CompileRecord;
pub use crate::request::BuildSystemRequest;
pub use crate::work_dir::{Error, WorkDirectory};

mod exit;
mod goal;
mod record;
mod request;
mod work_dir;
