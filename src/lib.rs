//! caldav-server-tester - check a CalDAV server for standard compliance and quirks.
//!
//! A run creates a throwaway calendar on the server, stores a fixed set of
//! events and tasks in it, and exercises searches, recurrence expansion,
//! sync tokens and principal lookups. Every observation is recorded as a
//! feature path (`search.time-range.event`, `sync-token.delete`, ...) with a
//! support level, and the result can be compared with a known profile.
//!
//! # Modules
//!
//! - [`caldav`] - The CalDAV client seam, the HTTP client and an in-memory mock
//! - [`checker`] - The run orchestrator and expectation comparison
//! - [`checks`] - Individual checks and their dependency ordering
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Servers file loading and validation
//! - [`error`] - Error types and result aliases
//! - [`features`] - Feature catalog, support levels and feature sets
//! - [`report`] - Report assembly and rendering
//! - [`ui`] - Status output and prompts
//!
//! # Example
//!
//! ```
//! use caldav_server_tester::caldav::MockDavClient;
//! use caldav_server_tester::checker::QuirkChecker;
//!
//! let mut checker = QuirkChecker::new(Box::new(MockDavClient::new()))
//!     .with_settle_delay(std::time::Duration::ZERO);
//! checker.check_one("get-current-user-principal").unwrap();
//! assert!(checker.has_run("get-current-user-principal"));
//! ```

pub mod caldav;
pub mod checker;
pub mod checks;
pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod report;
pub mod ui;

pub use checker::{DebugMode, QuirkChecker};
pub use error::{CheckerError, Result};
pub use features::{FeatureSet, Support, SupportDescriptor};
