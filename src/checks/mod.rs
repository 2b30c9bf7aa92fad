//! Checks and the engine that runs them.
//!
//! - [`base`]: the [`Check`] trait, [`CheckContext`] and contract verification
//! - [`registry`]: name to constructor mapping used by the checker
//! - [`dependency`]: graph validation and ordering
//!
//! The remaining modules hold the check bodies.

pub mod base;
pub mod calendar;
pub mod dependency;
pub mod freebusy;
pub mod objects;
pub mod principal;
pub mod principal_search;
pub mod recurrence;
pub mod registry;
pub mod search;
pub mod sync_token;

pub use base::{server_refusal, verify_contract, Check, CheckContext, FeatureScope};
pub use dependency::DependencyGraph;
pub use registry::{CheckFactory, CheckRegistry};
