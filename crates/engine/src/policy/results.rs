//! Turning judgement values into [`RuleResult`]s.
//!
//! Judgement rules come in three shapes:
//!
//! - `allow`: a boolean, or a set of messages (non-empty means allowed)
//! - `deny`: a boolean, or a set of messages / finding objects, one failure
//!   per element
//! - `policy`: a set of objects each carrying `valid` and the resource
//!
//! An undefined judgement is read as "nothing to report": `deny` passes and
//! `allow` fails.

use serde::Deserialize;
use serde_json::Value;

use tenet_core::document::kind_name;
use tenet_core::{Object, ResourceState, RuleResult};

use super::metadata::Metadata;

/// Which judgement rule a policy declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgement {
    Allow,
    Deny,
    Policy,
}

impl Judgement {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            "policy" => Some(Self::Policy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Policy => "policy",
        }
    }
}

/// Identity of the resource a finding is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub(crate) struct ResourceKey {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "_type")]
    pub resource_type: String,
    #[serde(default, rename = "_namespace")]
    pub namespace: String,
}

impl ResourceKey {
    fn of(resource: &ResourceState) -> Self {
        Self {
            id: resource.id.clone(),
            resource_type: resource.resource_type.clone(),
            namespace: resource.namespace.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Finding {
    #[serde(default)]
    message: String,
    #[serde(default)]
    resource: Option<ResourceKey>,
    #[serde(default)]
    resource_type: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    remediation: String,
    #[serde(default)]
    context: Option<Object>,
}

#[derive(Debug, Deserialize)]
struct FugueFinding {
    valid: bool,
    #[serde(default)]
    id: String,
    #[serde(default, rename = "type")]
    resource_type: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    message: String,
}

fn finding(item: &Value) -> Result<Finding, String> {
    match item {
        Value::String(message) => Ok(Finding {
            message: message.clone(),
            ..Default::default()
        }),
        Value::Object(_) => {
            serde_json::from_value(item.clone()).map_err(|e| format!("invalid finding: {e}"))
        }
        other => Err(format!("unexpected {} in judgement set", kind_name(other))),
    }
}

fn items(judgement: Judgement, value: &Value) -> Result<&[Value], String> {
    value.as_array().map(Vec::as_slice).ok_or_else(|| {
        format!(
            "unexpected {} value for {}",
            kind_name(value),
            judgement.name()
        )
    })
}

/// Defaults applied to every result of one policy evaluation.
pub(crate) struct Defaults<'a> {
    pub metadata: &'a Metadata,
    pub remediation: &'a str,
}

impl Defaults<'_> {
    fn result(&self, key: &ResourceKey, passed: bool) -> RuleResult {
        RuleResult {
            passed,
            resource_id: key.id.clone(),
            resource_type: key.resource_type.clone(),
            resource_namespace: key.namespace.clone(),
            severity: self.metadata.severity.clone(),
            ..Default::default()
        }
    }

    fn failure(&self, key: &ResourceKey, finding: Finding) -> RuleResult {
        let mut result = self.result(key, false);
        result.message = finding.message;
        if !finding.severity.is_empty() {
            result.severity = finding.severity;
        }
        result.remediation = if finding.remediation.is_empty() {
            self.remediation.to_string()
        } else {
            finding.remediation
        };
        result.context = finding.context;
        result
    }
}

/// Results of a judgement evaluated with one resource as input.
pub(crate) fn single_resource(
    judgement: Judgement,
    value: Option<&Value>,
    resource: &ResourceState,
    defaults: &Defaults<'_>,
) -> Result<Vec<RuleResult>, String> {
    let key = ResourceKey::of(resource);
    match (judgement, value) {
        (Judgement::Allow, value) => Ok(vec![allow(value, &key, defaults)?]),
        (Judgement::Deny, None) => Ok(vec![defaults.result(&key, true)]),
        (Judgement::Deny, Some(Value::Bool(deny))) => {
            let mut result = defaults.result(&key, !deny);
            if *deny {
                result.remediation = defaults.remediation.to_string();
            }
            Ok(vec![result])
        }
        (Judgement::Deny, Some(value)) => {
            let mut results = Vec::new();
            for item in items(judgement, value)? {
                results.push(defaults.failure(&key, finding(item)?));
            }
            if results.is_empty() {
                results.push(defaults.result(&key, true));
            }
            Ok(results)
        }
        (Judgement::Policy, _) => Err("policy judgements are evaluated against the whole input".into()),
    }
}

fn allow(value: Option<&Value>, key: &ResourceKey, defaults: &Defaults<'_>) -> Result<RuleResult, String> {
    match value {
        None | Some(Value::Bool(false)) => Ok(defaults.result(key, false)),
        Some(Value::Bool(true)) => Ok(defaults.result(key, true)),
        Some(value) => {
            let messages = items(Judgement::Allow, value)?;
            let mut result = defaults.result(key, !messages.is_empty());
            if let Some(first) = messages.first() {
                result.message = first
                    .as_str()
                    .ok_or_else(|| format!("unexpected {} in allow set", kind_name(first)))?
                    .to_string();
            }
            Ok(result)
        }
    }
}

/// Results of a judgement evaluated against the whole input state.
///
/// `resources` holds the value of the policy's `resources` rule, if it has
/// one: every listed resource without a failure gets a passing result.
pub(crate) fn multi_resource(
    judgement: Judgement,
    value: Option<&Value>,
    resources: Option<&Value>,
    defaults: &Defaults<'_>,
) -> Result<Vec<RuleResult>, String> {
    match judgement {
        Judgement::Allow => Ok(vec![allow(value, &ResourceKey::default(), defaults)?]),
        Judgement::Policy => fugue(value, defaults),
        Judgement::Deny => {
            let mut failed = Vec::new();
            let mut results = Vec::new();
            match value {
                None | Some(Value::Bool(false)) => {}
                Some(Value::Bool(true)) => {
                    results.push(defaults.failure(&ResourceKey::default(), Finding::default()));
                }
                Some(value) => {
                    for item in items(judgement, value)? {
                        let mut f = finding(item)?;
                        let mut key = f.resource.take().unwrap_or_default();
                        if key.resource_type.is_empty() {
                            key.resource_type = std::mem::take(&mut f.resource_type);
                        }
                        failed.push(key.clone());
                        results.push(defaults.failure(&key, f));
                    }
                }
            }

            let mut passing = Vec::new();
            if let Some(resources) = resources {
                for item in items(judgement, resources)? {
                    let f = finding(item)?;
                    let key = match f.resource {
                        Some(key) => key,
                        None => serde_json::from_value(item.clone())
                            .map_err(|e| format!("invalid resource: {e}"))?,
                    };
                    if !failed.contains(&key) && !passing.contains(&key) {
                        passing.push(key);
                    }
                }
            }
            results.extend(passing.iter().map(|key| defaults.result(key, true)));

            if results.is_empty() {
                results.push(defaults.result(&ResourceKey::default(), true));
            }
            Ok(results)
        }
    }
}

fn fugue(value: Option<&Value>, defaults: &Defaults<'_>) -> Result<Vec<RuleResult>, String> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let mut results = Vec::new();
    for item in items(Judgement::Policy, value)? {
        let f: FugueFinding =
            serde_json::from_value(item.clone()).map_err(|e| format!("invalid policy result: {e}"))?;
        let key = ResourceKey {
            id: f.id,
            resource_type: f.resource_type,
            namespace: f.namespace,
        };
        let mut result = defaults.result(&key, f.valid);
        result.message = f.message;
        if !f.valid {
            result.remediation = defaults.remediation.to_string();
        }
        results.push(result);
    }
    Ok(results)
}
