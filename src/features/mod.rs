//! Feature support bookkeeping.
//!
//! - [`support`]: support levels and descriptors
//! - [`catalog`]: the static list of known feature paths
//! - [`set`]: the [`FeatureSet`] ledger checks write into

pub mod catalog;
pub mod set;
pub mod support;

pub use catalog::{FeatureInfo, FeatureType};
pub use set::FeatureSet;
pub use support::{FeatureValue, Support, SupportDescriptor};
