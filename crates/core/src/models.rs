//! Input states and the evaluation output envelope.
//!
//! These types are the serialized contract of the engine: a caller submits
//! [`State`] snapshots and receives a [`Results`] document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Object;

pub const RESULTS_FORMAT: &str = "results";
pub const RESULTS_FORMAT_VERSION: &str = "1.0.0";
pub const STATE_FORMAT: &str = "state";
pub const STATE_FORMAT_VERSION: &str = "1.0.0";

// ── Input ──────────────────────────────────────────────────────

/// One resource inside an input state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub resource_type: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub meta: Object,
    #[serde(default)]
    pub attributes: Object,
}

/// One snapshot of infrastructure configuration submitted for evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default = "default_state_format")]
    pub format: String,
    #[serde(default = "default_state_format_version")]
    pub format_version: String,
    pub input_type: String,
    #[serde(default)]
    pub environment_provider: String,
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub meta: Object,
    /// Resources keyed by type, then by id.
    #[serde(default)]
    pub resources: BTreeMap<String, BTreeMap<String, ResourceState>>,
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub scope: Object,
}

fn default_state_format() -> String {
    STATE_FORMAT.to_string()
}

fn default_state_format_version() -> String {
    STATE_FORMAT_VERSION.to_string()
}

impl State {
    pub fn new(input_type: impl Into<String>) -> Self {
        Self {
            format: default_state_format(),
            format_version: default_state_format_version(),
            input_type: input_type.into(),
            environment_provider: String::new(),
            meta: Object::new(),
            resources: BTreeMap::new(),
            scope: Object::new(),
        }
    }

    pub fn with_resource(mut self, resource: ResourceState) -> Self {
        self.resources
            .entry(resource.resource_type.clone())
            .or_default()
            .insert(resource.id.clone(), resource);
        self
    }

    pub fn resource_count(&self) -> usize {
        self.resources.values().map(BTreeMap::len).sum()
    }
}

// ── Provenance ─────────────────────────────────────────────────

/// Identity of the rule source a result came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleBundle {
    pub name: String,
    /// `bundle_archive`, `bundle_directory` or `data`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl RuleBundle {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }
}

impl std::fmt::Display for RuleBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.source)?;
        if let Some(sum) = &self.checksum {
            write!(f, " sha256:{sum}")?;
        }
        Ok(())
    }
}

/// Per-bundle status in the output, including construction failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleBundleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_bundle: Option<RuleBundle>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// ── Output ─────────────────────────────────────────────────────

/// A single finding about one resource (or the whole input).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub passed: bool,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remediation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Object>,
}

/// A reference link attached to a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
}

/// Every result produced by one policy for one input state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleResults {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platform: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_group: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<String>,
    pub results: Vec<RuleResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_bundle: Option<RuleBundle>,
}

/// Results for one input state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResults {
    pub input: State,
    pub rule_results: Vec<RuleResults>,
}

/// The complete output of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub format: String,
    pub format_version: String,
    pub results: Vec<StateResults>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_bundles: Vec<RuleBundleInfo>,
}

impl Default for Results {
    fn default() -> Self {
        Self {
            format: RESULTS_FORMAT.to_string(),
            format_version: RESULTS_FORMAT_VERSION.to_string(),
            results: Vec::new(),
            rule_bundles: Vec::new(),
        }
    }
}

impl Results {
    /// All rule results across every state.
    pub fn rule_results(&self) -> impl Iterator<Item = &RuleResults> {
        self.results.iter().flat_map(|r| r.rule_results.iter())
    }
}

/// Flatten a controls document into `family_version_section` identifiers.
///
/// Accepts either a plain list of strings or the nested
/// `{family: {version: [section]}}` form.
pub fn parse_controls(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| "control should be string".to_string())
            })
            .collect(),
        Value::Object(families) => {
            // serde_json maps iterate in key order.
            let mut out = Vec::new();
            for (family, versions) in families {
                let versions = versions
                    .as_object()
                    .ok_or_else(|| "controls family should contain object".to_string())?;
                for (version, sections) in versions {
                    let sections = sections
                        .as_array()
                        .ok_or_else(|| "controls version should contain array".to_string())?;
                    for section in sections {
                        let section = section
                            .as_str()
                            .ok_or_else(|| "controls section should be string".to_string())?;
                        out.push(format!("{family}_{version}_{section}"));
                    }
                }
            }
            Ok(out)
        }
        _ => Err("controls should contain array or object".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_defaults_fill_format() {
        let state: State = serde_json::from_value(json!({
            "input_type": "tf",
            "resources": {
                "aws_s3_bucket": {
                    "b1": {"id": "b1", "resource_type": "aws_s3_bucket", "attributes": {}}
                }
            }
        }))
        .unwrap();
        assert_eq!(state.format, "state");
        assert_eq!(state.resource_count(), 1);
    }

    #[test]
    fn results_envelope_shape() {
        let results = Results {
            rule_bundles: vec![RuleBundleInfo {
                rule_bundle: Some(RuleBundle::new("b", "bundle_archive")),
                errors: vec!["boom".into()],
            }],
            ..Results::default()
        };
        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value["format"], "results");
        assert_eq!(value["format_version"], "1.0.0");
        assert_eq!(value["rule_bundles"][0]["errors"][0], "boom");
        assert!(value["rule_bundles"][0]["rule_bundle"].get("checksum").is_none());
    }

    #[test]
    fn controls_nested_form_is_flattened_in_order() {
        let controls = parse_controls(&json!({
            "NIST": {"v1": ["b", "a"]},
            "CIS": {"1.2": ["3.1"], "1.1": ["2"]}
        }))
        .unwrap();
        assert_eq!(controls, vec!["CIS_1.1_2", "CIS_1.2_3.1", "NIST_v1_b", "NIST_v1_a"]);
    }

    #[test]
    fn controls_reject_bad_shapes() {
        assert!(parse_controls(&json!("x")).is_err());
        assert!(parse_controls(&json!({"CIS": ["a"]})).is_err());
        assert_eq!(parse_controls(&json!(["a"])).unwrap(), vec!["a"]);
    }
}
