//! Error types for checker operations.
//!
//! This module defines [`CheckerError`], the primary error type used throughout
//! the application, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Anticipated server limitations never reach this type: check bodies catch
//!   the [`DavError`] variants they expect and record a support descriptor
//! - Contract violations and unknown feature paths are always fatal
//! - A [`DavError`] escaping a check body aborts the whole run
//! - Use `anyhow::Error` (via `CheckerError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

use crate::caldav::DavError;

/// Core error type for checker operations.
#[derive(Debug, Error)]
pub enum CheckerError {
    /// Feature path is not present in the static catalog.
    #[error("Unknown feature path: {path}")]
    UnknownFeature { path: String },

    /// A feature value was not a bool, null, string or mapping.
    #[error("Invalid value for feature '{feature}': {value}")]
    InvalidFeatureValue { feature: String, value: String },

    /// A check wrote fewer or more features than it declared.
    #[error("Check '{check}' broke its feature contract (missing: [{}], undeclared: [{}])", .missing.join(", "), .extra.join(", "))]
    ContractViolation {
        check: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// Observed support differs from the server's registered expectation.
    #[error("Feature '{feature}' expected {expected} but observed {observed}")]
    ExpectationMismatch {
        feature: String,
        expected: String,
        observed: String,
    },

    /// No check is registered under this name.
    #[error("Unknown check: {name}")]
    UnknownCheck { name: String },

    /// Check dependency cycle detected.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// A check needed shared test data that an earlier check did not provide.
    #[error("Check '{check}' needs the {fixture} fixture, which is not set up")]
    MissingFixture { check: String, fixture: String },

    /// The CalDAV collaborator failed in a way no check anticipated.
    #[error("CalDAV error: {0}")]
    Dav(#[from] DavError),

    /// Requested functionality is not available yet.
    #[error("Not implemented: {what}")]
    NotImplemented { what: String },

    /// Configuration file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse configuration file.
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Invalid configuration structure or values.
    #[error("Invalid configuration: {message}")]
    ConfigValidationError { message: String },

    /// Named server is not defined in the configuration.
    #[error("Unknown server: {name}")]
    UnknownServer { name: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for checker operations.
pub type Result<T> = std::result::Result<T, CheckerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_feature_displays_path() {
        let err = CheckerError::UnknownFeature {
            path: "search.nonsense".into(),
        };
        assert!(err.to_string().contains("search.nonsense"));
    }

    #[test]
    fn contract_violation_lists_missing_and_extra() {
        let err = CheckerError::ContractViolation {
            check: "search".into(),
            missing: vec!["search.category".into()],
            extra: vec!["sync-token".into(), "create-calendar".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("search"));
        assert!(msg.contains("missing: [search.category]"));
        assert!(msg.contains("undeclared: [sync-token, create-calendar]"));
    }

    #[test]
    fn expectation_mismatch_displays_both_sides() {
        let err = CheckerError::ExpectationMismatch {
            feature: "search.category".into(),
            expected: "full".into(),
            observed: "unsupported".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("search.category"));
        assert!(msg.contains("expected full"));
        assert!(msg.contains("observed unsupported"));
    }

    #[test]
    fn circular_dependency_displays_cycle() {
        let err = CheckerError::CircularDependency {
            cycle: "a -> b -> a".into(),
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn dav_error_converts() {
        let err: CheckerError = DavError::NotFound {
            url: "/cal/".into(),
        }
        .into();
        assert!(matches!(err, CheckerError::Dav(_)));
        assert!(err.to_string().contains("/cal/"));
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: CheckerError = io_err.into();
        assert!(matches!(err, CheckerError::Io(_)));
    }

    #[test]
    fn result_type_alias_works() {
        fn returns_error() -> Result<()> {
            Err(CheckerError::NotImplemented {
                what: "text report".into(),
            })
        }
        assert!(returns_error().is_err());
    }
}
