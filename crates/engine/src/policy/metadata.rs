//! Static metadata attached to a policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use tenet_core::models::parse_controls;
use tenet_core::{Reference, RuleResults};

use crate::input::InputType;

/// Name of the conventional metadata rule.
pub const METADATA_RULE: &str = "metadata";
/// Name of the legacy metadata document rule.
pub const METADOC_RULE: &str = "__rego__metadoc__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platform: Vec<String>,
    /// Remediation text keyed by input family (`terraform`, `k8s`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remediation: BTreeMap<String, String>,
    /// Reference links keyed by input family, plus `general`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, Vec<Reference>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_group: String,
    #[serde(
        default,
        deserialize_with = "deserialize_controls",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub controls: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product: Vec<String>,
}

fn deserialize_controls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_controls(&value).map_err(serde::de::Error::custom)
}

#[derive(Deserialize, Default)]
struct Metadoc {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    custom: MetadocCustom,
}

#[derive(Deserialize, Default)]
struct MetadocCustom {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    controls: Value,
}

impl Metadata {
    /// Decode the value of a metadata rule. `rule` selects the layout.
    pub fn from_rule_value(rule: &str, value: Value) -> Result<Self, String> {
        if rule == METADOC_RULE {
            let doc: Metadoc = serde_json::from_value(value).map_err(|e| e.to_string())?;
            return Ok(Self {
                id: doc.id,
                title: doc.title,
                description: doc.description,
                severity: doc.custom.severity,
                controls: parse_controls(&doc.custom.controls)?,
                ..Default::default()
            });
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    /// Remediation for states of `input_type`, empty when none applies.
    pub fn remediation_for(&self, input_type: &str) -> String {
        InputType::remediation_key(input_type)
            .and_then(|key| self.remediation.get(key))
            .cloned()
            .unwrap_or_default()
    }

    /// General references followed by the ones specific to `input_type`.
    pub fn references_for(&self, input_type: &str) -> Vec<Reference> {
        let mut out: Vec<Reference> = self.references.get("general").cloned().unwrap_or_default();
        if let Some(refs) = InputType::remediation_key(input_type).and_then(|k| self.references.get(k)) {
            out.extend(refs.iter().cloned());
        }
        out
    }

    /// Copy the static fields onto a policy's output.
    pub fn copy_to(&self, input_type: &str, output: &mut RuleResults) {
        output.id = self.id.clone();
        output.title = self.title.clone();
        output.description = self.description.clone();
        output.platform = self.platform.clone();
        output.category = self.category.clone();
        output.labels = self.labels.clone();
        output.service_group = self.service_group.clone();
        output.controls = self.controls.clone();
        output.references = self.references_for(input_type);
    }
}

/// Metadata listing entry for one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataResult {
    pub package: String,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Metadata {
        Metadata::from_rule_value(
            METADATA_RULE,
            json!({
                "id": "TN-001",
                "title": "Buckets are encrypted",
                "severity": "high",
                "remediation": {"terraform": "Set sse", "console": "Enable in console"},
                "references": {
                    "general": [{"url": "https://docs/general"}],
                    "terraform": [{"url": "https://docs/tf", "title": "TF"}]
                },
                "controls": {"CIS-AWS": {"v1.4.0": ["2.1.1", "2.1.2"]}}
            }),
        )
        .unwrap()
    }

    #[test]
    fn decodes_metadata_rule() {
        let m = sample();
        assert_eq!(m.id, "TN-001");
        assert_eq!(m.controls, vec!["CIS-AWS_v1.4.0_2.1.1", "CIS-AWS_v1.4.0_2.1.2"]);
    }

    #[test]
    fn remediation_depends_on_input_type() {
        let m = sample();
        assert_eq!(m.remediation_for("tf_plan"), "Set sse");
        assert_eq!(m.remediation_for("cloud_scan"), "Enable in console");
        assert_eq!(m.remediation_for("k8s"), "");
    }

    #[test]
    fn general_references_come_first() {
        let m = sample();
        let urls: Vec<String> = m.references_for("tf_hcl").into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://docs/general", "https://docs/tf"]);
        assert_eq!(m.references_for("arm").len(), 1);
    }

    #[test]
    fn decodes_metadoc_layout() {
        let m = Metadata::from_rule_value(
            METADOC_RULE,
            json!({"id": "FG_R00001", "title": "t", "custom": {"severity": "Low"}}),
        )
        .unwrap();
        assert_eq!(m.id, "FG_R00001");
        assert_eq!(m.severity, "Low");
    }

    #[test]
    fn malformed_controls_are_rejected() {
        let err = Metadata::from_rule_value(METADATA_RULE, json!({"controls": {"CIS": ["x"]}}))
            .unwrap_err();
        assert!(err.contains("controls family should contain object"));
    }
}
