//! Support descriptors.
//!
//! Every observation a check makes about a feature ends up as a
//! [`SupportDescriptor`]. Check bodies rarely build one by hand: they pass a
//! [`FeatureValue`], which accepts the usual shorthands (`true`, `false`,
//! "unknown", a bare support level).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CheckerError, Result};

/// How well a server supports a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    /// Works as the RFC describes.
    #[default]
    Full,
    /// Not available; the server says so in an orderly way.
    Unsupported,
    /// Not established.
    Unknown,
    /// Works sometimes; results are not deterministic.
    Fragile,
    /// Not available, and the server answers with an error instead of an empty result.
    Ungraceful,
    /// Available, but with a deviation clients must work around.
    Quirk,
}

impl Support {
    /// Wire name of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Support::Full => "full",
            Support::Unsupported => "unsupported",
            Support::Unknown => "unknown",
            Support::Fragile => "fragile",
            Support::Ungraceful => "ungraceful",
            Support::Quirk => "quirk",
        }
    }

    /// Whether this level counts as "supported" in a boolean query.
    pub fn is_full(&self) -> bool {
        matches!(self, Support::Full)
    }
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Support {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Support::Full),
            "unsupported" => Ok(Support::Unsupported),
            "unknown" => Ok(Support::Unknown),
            "fragile" => Ok(Support::Fragile),
            "ungraceful" => Ok(Support::Ungraceful),
            "quirk" => Ok(Support::Quirk),
            _ => Err(format!("unknown support level: {}", s)),
        }
    }
}

/// Structured verdict on a feature.
///
/// Serializes as a flat mapping: `{"support": "quirk", "behaviour": "..."}`.
/// Keys other than the known ones (for instance the `cleanup` policy of
/// `test-calendar.compatibility-tests`) are kept in [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SupportDescriptor {
    /// Support level; a mapping without one means full support.
    #[serde(default)]
    pub support: Support,

    /// Free-text description of how the server deviates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behaviour: Option<String>,

    /// Free-text diagnostic note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Any further keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SupportDescriptor {
    /// Descriptor carrying only a support level.
    pub fn new(support: Support) -> Self {
        Self {
            support,
            ..Default::default()
        }
    }

    /// Attach a behaviour note.
    pub fn with_behaviour(mut self, behaviour: impl Into<String>) -> Self {
        self.behaviour = Some(behaviour.into());
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Copy without the free-text fields, for comparing observations.
    pub fn without_free_text(&self) -> Self {
        Self {
            support: self.support,
            behaviour: None,
            description: None,
            extra: self.extra.clone(),
        }
    }

    /// Look up an extra key.
    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }
}

impl fmt::Display for SupportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.support)?;
        if let Some(behaviour) = &self.behaviour {
            write!(f, " ({})", behaviour)?;
        }
        Ok(())
    }
}

/// A value handed to `set_feature`.
///
/// Booleans are sugar for `full`/`unsupported`, [`FeatureValue::Unknown`]
/// stands in for "no verdict".
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// `true` is full support, `false` unsupported.
    Bool(bool),
    /// Support is unknown.
    Unknown,
    /// A bare support level.
    Level(Support),
    /// A complete descriptor.
    Descriptor(SupportDescriptor),
}

impl FeatureValue {
    /// Convert a loosely typed value (from YAML or JSON) into a feature value.
    ///
    /// Only booleans, null, strings naming a support level and mappings are
    /// accepted; anything else is an [`CheckerError::InvalidFeatureValue`].
    pub fn from_json(feature: &str, value: serde_json::Value) -> Result<Self> {
        let invalid = |value: &serde_json::Value| CheckerError::InvalidFeatureValue {
            feature: feature.to_string(),
            value: value.to_string(),
        };

        match value {
            serde_json::Value::Bool(b) => Ok(FeatureValue::Bool(b)),
            serde_json::Value::Null => Ok(FeatureValue::Unknown),
            serde_json::Value::String(ref s) => s
                .parse::<Support>()
                .map(FeatureValue::Level)
                .map_err(|_| invalid(&value)),
            serde_json::Value::Object(_) => serde_json::from_value(value.clone())
                .map(FeatureValue::Descriptor)
                .map_err(|_| invalid(&value)),
            other => Err(invalid(&other)),
        }
    }

    /// Normalize into a descriptor.
    pub fn into_descriptor(self) -> SupportDescriptor {
        match self {
            FeatureValue::Bool(true) => SupportDescriptor::new(Support::Full),
            FeatureValue::Bool(false) => SupportDescriptor::new(Support::Unsupported),
            FeatureValue::Unknown => SupportDescriptor::new(Support::Unknown),
            FeatureValue::Level(support) => SupportDescriptor::new(support),
            FeatureValue::Descriptor(descriptor) => descriptor,
        }
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Bool(value)
    }
}

impl From<Option<bool>> for FeatureValue {
    fn from(value: Option<bool>) -> Self {
        value.map_or(FeatureValue::Unknown, FeatureValue::Bool)
    }
}

impl From<Support> for FeatureValue {
    fn from(value: Support) -> Self {
        FeatureValue::Level(value)
    }
}

impl From<SupportDescriptor> for FeatureValue {
    fn from(value: SupportDescriptor) -> Self {
        FeatureValue::Descriptor(value)
    }
}
