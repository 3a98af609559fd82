//! CLI commands module.

mod enroll;
mod export;
mod process;
mod roster;
mod submit;
mod util;
mod worker;

pub use enroll::EnrollCommand;
pub use export::ExportCommand;
pub use process::ProcessCommand;
pub use roster::RosterCommand;
pub use submit::SubmitCommand;
pub use worker::WorkerCommand;

pub(crate) use util::*;
