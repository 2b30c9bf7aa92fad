//! Configuration validation rules.
//!
//! This module validates the servers file for correctness:
//! - Server URLs must parse
//! - Profile references must name an existing profile
//! - Feature keys must be catalog paths with valid values
//! - Delays must not be negative

use crate::config::schema::{delay_from_secs, FeatureProfile, FeaturesRef, ServersFile};
use crate::error::{CheckerError, Result};
use crate::features::{catalog, FeatureValue};

/// Validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: String,
    /// Human-readable error message
    pub message: String,
    /// Server name if error is server-specific
    pub server: Option<String>,
}

impl ValidationError {
    fn new(rule: &str, message: String, server: Option<&str>) -> Self {
        Self {
            rule: rule.to_string(),
            message,
            server: server.map(str::to_string),
        }
    }
}

/// Validate a servers file and return all errors.
///
/// Collects every problem rather than stopping at the first one.
pub fn validate_servers(file: &ServersFile) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (name, profile) in &file.profiles {
        errors.extend(validate_profile(profile, &format!("profile '{}'", name), None));
    }

    for (name, server) in &file.servers {
        if let Err(e) = reqwest::Url::parse(&server.url) {
            errors.push(ValidationError::new(
                "invalid-url",
                format!("Server '{}' has an invalid url '{}': {}", name, server.url, e),
                Some(name),
            ));
        }

        match &server.features {
            Some(FeaturesRef::Profile(profile)) if !file.profiles.contains_key(profile) => {
                errors.push(ValidationError::new(
                    "unknown-profile",
                    format!("Server '{}' refers to unknown profile '{}'", name, profile),
                    Some(name),
                ));
            }
            Some(FeaturesRef::Inline(profile)) => {
                errors.extend(validate_profile(profile, &format!("server '{}'", name), Some(name)));
            }
            _ => {}
        }

        for (field, delay) in [("request_delay", server.request_delay), ("search_delay", server.search_delay)] {
            if let Some(value) = delay.filter(|d| delay_from_secs(*d).is_none()) {
                errors.push(ValidationError::new(
                    "invalid-delay",
                    format!("Server '{}' has an unusable {}: {} seconds", name, field, value),
                    Some(name),
                ));
            }
        }
    }

    errors
}

fn validate_profile(profile: &FeatureProfile, owner: &str, server: Option<&str>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (path, value) in profile {
        if !catalog::contains(path) {
            errors.push(ValidationError::new(
                "unknown-feature",
                format!("{} mentions unknown feature '{}'", owner, path),
                server,
            ));
        } else if let Err(e) = FeatureValue::from_json(path, value.clone()) {
            errors.push(ValidationError::new("invalid-feature-value", format!("{}: {}", owner, e), server));
        }
    }
    errors
}

/// Validate and fail on the first batch of errors.
pub fn validate(file: &ServersFile) -> Result<()> {
    let errors = validate_servers(file);
    if errors.is_empty() {
        return Ok(());
    }
    let message = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(CheckerError::ConfigValidationError { message })
}
