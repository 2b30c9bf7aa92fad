//! What the binary can do: check a server, or list the checks.

pub mod check;
pub mod dispatcher;
pub mod list;

pub use check::{CheckCommand, CheckOptions, ClientFactory};
pub use dispatcher::{dispatch, Command, CommandResult};
pub use list::ListChecksCommand;
