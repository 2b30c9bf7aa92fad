//! Picking the server to check.
//!
//! Command-line values and the servers file are combined here: explicit
//! flags override whatever the named server entry says.

use std::time::Duration;

use crate::caldav::DavClientConfig;
use crate::config::schema::{seconds, ServerConfig, ServersFile};
use crate::error::{CheckerError, Result};
use crate::features::FeatureSet;

/// What the user asked for on the command line.
#[derive(Debug, Clone, Default)]
pub struct ServerSelection {
    /// Entry in the servers file.
    pub name: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Profile name overriding the entry's own features.
    pub features: Option<String>,
    pub request_delay: Option<f64>,
    pub search_delay: Option<f64>,
}

/// A fully resolved server.
#[derive(Debug, Clone)]
pub struct ResolvedServer {
    pub name: String,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub features: FeatureSet,
    pub request_delay: Duration,
    pub search_delay: Duration,
}

impl ResolvedServer {
    /// Connection settings for the HTTP client.
    pub fn client_config(&self) -> DavClientConfig {
        let config = DavClientConfig::new(&self.url).with_server_name(&self.name);
        match (&self.username, &self.password) {
            (Some(user), password) => config.with_credentials(user, password.clone().unwrap_or_default()),
            _ => config,
        }
    }
}

/// Combine the selection with the servers file.
///
/// Without a name or URL, the first server in the file is used.
pub fn resolve_server(file: &ServersFile, selection: &ServerSelection) -> Result<ResolvedServer> {
    let (entry_name, entry) = match (&selection.name, &selection.url) {
        (Some(name), _) => {
            let entry = file
                .servers
                .get(name)
                .ok_or_else(|| CheckerError::UnknownServer { name: name.clone() })?;
            (Some(name.clone()), entry.clone())
        }
        (None, Some(_)) => (None, ServerConfig::default()),
        (None, None) => {
            let (name, entry) = file
                .servers
                .iter()
                .next()
                .ok_or_else(|| CheckerError::ConfigValidationError {
                    message: "No server given: use --name or --caldav-url, or add one to the servers file".to_string(),
                })?;
            (Some(name.clone()), entry.clone())
        }
    };

    let url = selection.url.clone().unwrap_or(entry.url.clone());
    if url.is_empty() {
        return Err(CheckerError::ConfigValidationError {
            message: format!("Server '{}' has no url", entry_name.unwrap_or_default()),
        });
    }

    let features = match &selection.features {
        Some(profile) => file.profile(profile)?,
        None => file.features(entry.features.as_ref())?,
    };

    Ok(ResolvedServer {
        name: entry_name.unwrap_or_else(|| url.clone()),
        username: selection.username.clone().or(entry.username.clone()),
        password: selection.password.clone().or(entry.password.clone()),
        url,
        features,
        request_delay: selection.request_delay.map_or_else(|| entry.request_delay(), |d| seconds(Some(d))),
        search_delay: selection.search_delay.map_or_else(|| entry.search_delay(), |d| seconds(Some(d))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Support;

    fn file() -> ServersFile {
        serde_yaml::from_str(
            r#"
profiles:
  strict:
    sync-token: true
  lax:
    sync-token: fragile
servers:
  alpha:
    url: http://alpha.test/dav/
    username: alice
    password: wonderland
    features: strict
    request_delay: 1
  beta:
    url: http://beta.test/
"#,
        )
        .unwrap()
    }

    #[test]
    fn named_server_is_used() {
        let selection = ServerSelection {
            name: Some("alpha".into()),
            ..Default::default()
        };
        let server = resolve_server(&file(), &selection).unwrap();
        assert_eq!(server.name, "alpha");
        assert_eq!(server.url, "http://alpha.test/dav/");
        assert_eq!(server.username.as_deref(), Some("alice"));
        assert_eq!(server.request_delay, Duration::from_secs(1));
        assert_eq!(server.features.support_level("sync-token").unwrap(), Support::Full);
    }

    #[test]
    fn flags_override_the_entry() {
        let selection = ServerSelection {
            name: Some("alpha".into()),
            password: Some("other".into()),
            features: Some("lax".into()),
            request_delay: Some(0.0),
            ..Default::default()
        };
        let server = resolve_server(&file(), &selection).unwrap();
        assert_eq!(server.password.as_deref(), Some("other"));
        assert_eq!(server.request_delay, Duration::ZERO);
        assert_eq!(server.features.support_level("sync-token").unwrap(), Support::Fragile);
    }

    #[test]
    fn url_without_name_is_its_own_name() {
        let selection = ServerSelection {
            url: Some("http://gamma.test/".into()),
            ..Default::default()
        };
        let server = resolve_server(&ServersFile::default(), &selection).unwrap();
        assert_eq!(server.name, "http://gamma.test/");
        assert!(server.features.is_empty());
    }

    #[test]
    fn first_server_is_the_default() {
        let server = resolve_server(&file(), &ServerSelection::default()).unwrap();
        assert_eq!(server.name, "alpha");
    }

    #[test]
    fn unknown_name_fails() {
        let selection = ServerSelection {
            name: Some("delta".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_server(&file(), &selection),
            Err(CheckerError::UnknownServer { .. })
        ));
    }

    #[test]
    fn nothing_to_check_fails() {
        assert!(resolve_server(&ServersFile::default(), &ServerSelection::default()).is_err());
    }
}
