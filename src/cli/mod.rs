//! Flags and the commands they select.

pub mod args;
pub mod commands;

pub use args::Cli;
pub use commands::{dispatch, CheckCommand, CheckOptions, Command, CommandResult, ListChecksCommand};
