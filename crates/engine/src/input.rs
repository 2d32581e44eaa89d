//! Input types and the documents policies are queried with.

use std::borrow::Cow;
use std::fmt;

use serde_json::{json, Map, Value};

use tenet_core::{ResourceState, State};

// ── Input types ────────────────────────────────────────────────

/// The kind of configuration a state was loaded from, e.g. `tf_plan`.
///
/// Types form a small hierarchy: `tf` matches `tf_hcl`, `tf_plan` and
/// `cloud_scan`, and `any` matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputType {
    name: Cow<'static, str>,
    aliases: &'static [&'static str],
    children: &'static [&'static str],
}

const fn builtin(
    name: &'static str,
    aliases: &'static [&'static str],
    children: &'static [&'static str],
) -> InputType {
    InputType {
        name: Cow::Borrowed(name),
        aliases,
        children,
    }
}

pub const ARM: InputType = builtin("arm", &[], &[]);
pub const CFN: InputType = builtin("cfn", &["cloudformation"], &[]);
pub const CLOUD_SCAN: InputType = builtin("cloud_scan", &["cloud-scan"], &[]);
pub const K8S: InputType = builtin("k8s", &["kubernetes"], &[]);
pub const TF_HCL: InputType = builtin("tf_hcl", &[], &[]);
pub const TF_PLAN: InputType = builtin("tf_plan", &[], &[]);
pub const TF: InputType = builtin("tf", &["terraform"], &["tf_hcl", "tf_plan", "cloud_scan"]);
pub const ANY: InputType = builtin("any", &[], &[]);

static BUILTIN: &[InputType] = &[ARM, CFN, CLOUD_SCAN, K8S, TF_HCL, TF_PLAN, TF, ANY];

impl InputType {
    /// Resolve a name or alias to a built-in type.
    pub fn lookup(name: &str) -> Option<InputType> {
        BUILTIN
            .iter()
            .find(|t| t.name == name || t.aliases.iter().any(|a| *a == name))
            .cloned()
    }

    /// Built-in type for `name`, or an ad-hoc type matching only `name`.
    pub fn from_name(name: &str) -> InputType {
        Self::lookup(name).unwrap_or_else(|| InputType {
            name: Cow::Owned(name.to_string()),
            aliases: &[],
            children: &[],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a state with input type `other` is covered by this type.
    pub fn matches(&self, other: &str) -> bool {
        let named = self.name == other || self.aliases.iter().any(|a| *a == other);
        if named || self.name == ANY.name {
            return true;
        }
        self.children
            .iter()
            .filter_map(|c| Self::lookup(c))
            .any(|child| child.matches(other))
    }

    /// Key under which metadata stores remediation and references for
    /// this input type.
    pub fn remediation_key(name: &str) -> Option<&'static str> {
        let canonical = Self::lookup(name)?;
        match canonical.name() {
            "arm" => Some("arm"),
            "cfn" => Some("cloudformation"),
            "cloud_scan" => Some("console"),
            "k8s" => Some("k8s"),
            "tf_hcl" | "tf_plan" => Some("terraform"),
            _ => None,
        }
    }
}

impl Default for InputType {
    fn default() -> Self {
        ANY
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ── Query documents ────────────────────────────────────────────

/// The document a single-resource policy sees as `input`.
///
/// Attributes sit at the top level next to `_id`, `_type`, `_namespace` and
/// `_meta`. `id` is the logical id unless the attributes carry a non-blank
/// string `id` of their own.
pub fn resource_input(resource: &ResourceState) -> Value {
    let mut obj = Map::new();
    obj.insert("id".into(), Value::String(resource.id.clone()));
    obj.insert("_id".into(), Value::String(resource.id.clone()));
    obj.insert("_type".into(), Value::String(resource.resource_type.clone()));
    obj.insert("_namespace".into(), Value::String(resource.namespace.clone()));
    obj.insert("_meta".into(), Value::Object(resource.meta.clone()));
    for (k, v) in &resource.attributes {
        if k == "id" && !v.as_str().is_some_and(|s| !s.is_empty()) {
            continue;
        }
        obj.insert(k.clone(), v.clone());
    }
    Value::Object(obj)
}

/// The document a multi-resource policy sees as `input`.
pub fn state_input(state: &State) -> Value {
    let resources: Map<String, Value> = state
        .resources
        .iter()
        .map(|(rt, by_id)| {
            let by_id: Map<String, Value> = by_id
                .iter()
                .map(|(id, r)| (id.clone(), resource_input(r)))
                .collect();
            (rt.clone(), Value::Object(by_id))
        })
        .collect();
    json!({
        "input_type": state.input_type,
        "environment_provider": state.environment_provider,
        "meta": state.meta,
        "scope": state.scope,
        "resources": resources,
    })
}
