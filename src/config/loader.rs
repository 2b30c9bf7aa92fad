//! Configuration file discovery and loading.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{FeatureProfile, FeaturesRef, ServersFile};
use crate::config::validator;
use crate::error::{CheckerError, Result};
use crate::features::{FeatureSet, FeatureValue};

/// Environment variable pointing at the servers file.
pub const CONFIG_ENV: &str = "CALDAV_SERVER_TESTER_CONFIG";

/// Where to look for the servers file.
///
/// An explicit path wins, then `$CALDAV_SERVER_TESTER_CONFIG`, then
/// `servers.yml` in the user's config directory.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    default_config_path()
}

/// `~/.config/caldav-server-tester/servers.yml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("caldav-server-tester").join("servers.yml"))
}

/// Load, parse and validate a servers file.
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist,
/// `ConfigParseError` if the YAML is invalid, and
/// `ConfigValidationError` if it parses but makes no sense.
pub fn load_servers_file(path: &Path) -> Result<ServersFile> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CheckerError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CheckerError::Io(e)
        }
    })?;

    let file = parse_servers(&content, path)?;
    validator::validate(&file)?;
    Ok(file)
}

/// Parse YAML content into a [`ServersFile`].
///
/// An empty document is an empty file, not an error.
pub fn parse_servers(content: &str, source_path: &Path) -> Result<ServersFile> {
    if content.trim().is_empty() {
        return Ok(ServersFile::default());
    }
    serde_yaml::from_str(content).map_err(|e| CheckerError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Turn a raw profile into a ledger.
pub fn profile_to_features(profile: &FeatureProfile) -> Result<FeatureSet> {
    let mut features = FeatureSet::new();
    let values = profile
        .iter()
        .map(|(path, value)| Ok((path.clone(), FeatureValue::from_json(path, value.clone())?)))
        .collect::<Result<Vec<_>>>()?;
    features.record(values, false)?;
    Ok(features)
}

impl ServersFile {
    /// Look up a named profile.
    pub fn profile(&self, name: &str) -> Result<FeatureSet> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| CheckerError::ConfigValidationError {
                message: format!("Unknown feature profile '{}'", name),
            })?;
        profile_to_features(profile)
    }

    /// Resolve a server's profile reference.
    pub fn features(&self, features: Option<&FeaturesRef>) -> Result<FeatureSet> {
        match features {
            None => Ok(FeatureSet::new()),
            Some(FeaturesRef::Profile(name)) => self.profile(name),
            Some(FeaturesRef::Inline(profile)) => profile_to_features(profile),
        }
    }
}
