//! Configuration schema types.
//!
//! The servers file names the CalDAV servers to check and the feature
//! profiles that describe what each one is expected to support.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raw feature profile: catalog path to loosely typed value.
///
/// Values use the same shorthands as recorded features: a bool, null, a
/// support level name or a mapping.
pub type FeatureProfile = BTreeMap<String, serde_json::Value>;

/// Root of the servers file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServersFile {
    /// Named feature profiles servers can refer to.
    #[serde(default)]
    pub profiles: BTreeMap<String, FeatureProfile>,

    /// Servers by name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

/// One server entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// CalDAV base URL.
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Expected feature profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeaturesRef>,

    /// Pause before every request, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay: Option<f64>,

    /// Extra pause before search requests, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_delay: Option<f64>,
}

impl ServerConfig {
    pub fn request_delay(&self) -> Duration {
        seconds(self.request_delay)
    }

    pub fn search_delay(&self) -> Duration {
        seconds(self.search_delay)
    }
}

/// Seconds as a duration; `None` when negative, not finite or too large.
pub fn delay_from_secs(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

/// Converts an optional number of seconds; unusable values mean no delay.
pub(crate) fn seconds(value: Option<f64>) -> Duration {
    value.and_then(delay_from_secs).unwrap_or(Duration::ZERO)
}

/// A server's feature profile: by name, or spelled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeaturesRef {
    /// Name of an entry under `profiles`.
    Profile(String),
    /// Inline profile.
    Inline(FeatureProfile),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_profile_reference_and_inline_features() {
        let yaml = r#"
profiles:
  radicale:
    search.text.case-sensitive: false
servers:
  local:
    url: http://localhost:5232/
    features: radicale
  other:
    url: http://localhost:8080/
    features:
      sync-token: fragile
    request_delay: 0.5
"#;
        let file: ServersFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            file.servers["local"].features,
            Some(FeaturesRef::Profile("radicale".into()))
        );
        match &file.servers["other"].features {
            Some(FeaturesRef::Inline(profile)) => assert_eq!(profile["sync-token"], "fragile"),
            other => panic!("expected inline profile, got {:?}", other),
        }
        assert_eq!(file.servers["other"].request_delay(), Duration::from_millis(500));
        assert_eq!(file.servers["local"].search_delay(), Duration::ZERO);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = "servers:\n  local:\n    url: http://x/\n    colour: red\n";
        assert!(serde_yaml::from_str::<ServersFile>(yaml).is_err());
    }

    #[test]
    fn negative_delays_mean_none() {
        assert_eq!(seconds(Some(-1.0)), Duration::ZERO);
        assert_eq!(seconds(None), Duration::ZERO);
        assert_eq!(seconds(Some(2.0)), Duration::from_secs(2));
        assert_eq!(seconds(Some(1e30)), Duration::ZERO);
        assert_eq!(seconds(Some(f64::NAN)), Duration::ZERO);
    }
}
