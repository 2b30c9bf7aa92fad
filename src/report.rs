//! Run reports.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::checker::Mismatch;
use crate::error::{CheckerError, Result};
use crate::features::SupportDescriptor;

/// How a report should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Pretty-printed JSON text.
    #[default]
    Json,
    /// A `serde_json::Value` mapping.
    Value,
    /// Human-readable text.
    Text,
}

/// A rendered report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutput {
    Json(String),
    Value(serde_json::Value),
}

impl ReportOutput {
    /// Text form for printing.
    pub fn to_text(&self) -> Result<String> {
        match self {
            ReportOutput::Json(text) => Ok(text.clone()),
            ReportOutput::Value(value) => Ok(serde_json::to_string_pretty(value)?),
        }
    }
}

/// Everything a run found out about a server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub tool_version: String,
    /// Unix time the report was generated.
    pub ts: f64,
    pub name: String,
    pub url: String,
    pub features: BTreeMap<String, SupportDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks_run: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatches: Option<Vec<Mismatch>>,
}

impl Report {
    pub fn render(&self, format: ReportFormat) -> Result<ReportOutput> {
        match format {
            ReportFormat::Json => self.to_json().map(ReportOutput::Json),
            ReportFormat::Value => Ok(ReportOutput::Value(serde_json::to_value(self)?)),
            ReportFormat::Text => Err(CheckerError::NotImplemented {
                what: "text report rendering".to_string(),
            }),
        }
    }

    /// JSON with four-space indentation.
    fn to_json(&self) -> Result<String> {
        let mut out = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut ser)?;
        String::from_utf8(out).map_err(|e| CheckerError::Other(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Support;

    fn sample(verbose: bool) -> Report {
        let mut features = BTreeMap::new();
        features.insert("sync-token".to_string(), SupportDescriptor::new(Support::Full));
        features.insert(
            "search.text.substring".to_string(),
            SupportDescriptor::new(Support::Unsupported).with_behaviour("exact matches only"),
        );
        Report {
            tool_version: "0.1.0".into(),
            ts: 946_684_800.0,
            name: "local".into(),
            url: "http://localhost:5232/".into(),
            features,
            checks_run: verbose.then(|| vec!["sync-token".to_string()]),
            mismatches: verbose.then(Vec::new),
        }
    }

    #[test]
    fn json_uses_four_space_indent() {
        let ReportOutput::Json(text) = sample(false).render(ReportFormat::Json).unwrap() else {
            panic!("expected JSON text");
        };
        assert!(text.contains("\n    \"tool_version\": \"0.1.0\""));
        assert!(!text.contains("checks_run"));
    }

    #[test]
    fn value_carries_verbose_fields() {
        let ReportOutput::Value(value) = sample(true).render(ReportFormat::Value).unwrap() else {
            panic!("expected a value");
        };
        assert_eq!(value["checks_run"][0], "sync-token");
        assert_eq!(value["features"]["search.text.substring"]["support"], "unsupported");
        assert_eq!(value["features"]["sync-token"], serde_json::json!({"support": "full"}));
    }

    #[test]
    fn text_is_not_implemented() {
        assert!(matches!(
            sample(false).render(ReportFormat::Text),
            Err(CheckerError::NotImplemented { .. })
        ));
    }
}
