//! Discovering policies among loaded modules.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use tenet_core::{Module, PackagePath, RuleDecl};

/// Root of the namespace subtree that holds policies.
pub const RULES_ROOT: &str = "rules";

/// Every module declaring one package.
#[derive(Debug, Clone)]
pub struct ModuleSet<'a> {
    pub package: PackagePath,
    pub modules: Vec<&'a Module>,
}

/// Group the modules below `data.rules` by package, sorted by package.
pub fn module_sets<'a, I>(modules: I) -> Vec<ModuleSet<'a>>
where
    I: IntoIterator<Item = &'a Module>,
{
    let mut by_package: BTreeMap<PackagePath, Vec<&'a Module>> = BTreeMap::new();
    for module in modules {
        if module.package.starts_with(&[RULES_ROOT]) {
            by_package.entry(module.package.clone()).or_default().push(module);
        }
    }
    by_package
        .into_iter()
        .map(|(package, modules)| ModuleSet { package, modules })
        .collect()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{package}: {message}")]
pub struct ExtractError {
    pub package: String,
    pub message: String,
}

/// One group of interchangeable rule names (e.g. `deny`/`allow`/`policy`).
///
/// A package may declare a rule of the group several times (incremental
/// rule definitions), but only under one name and, for constants, with one
/// value.
#[derive(Debug, Default)]
pub(crate) struct RuleInfo {
    pub name: Option<String>,
    pub constant: Option<Value>,
}

impl RuleInfo {
    fn add(&mut self, decl: &RuleDecl) -> Result<(), String> {
        match &self.name {
            Some(existing) if existing != &decl.name => {
                return Err(format!(
                    "mismatched rule names: {existing} and {}",
                    decl.name
                ));
            }
            Some(_) => {}
            None => self.name = Some(decl.name.clone()),
        }
        if let Some(value) = &decl.constant {
            match &self.constant {
                Some(existing) if existing != value => {
                    return Err(format!("conflicting values for rule {}", decl.name));
                }
                _ => self.constant = Some(value.clone()),
            }
        }
        Ok(())
    }

    /// The constant of this rule as a string, if the rule is declared.
    pub fn string_constant(&self) -> Result<Option<String>, String> {
        let Some(name) = &self.name else {
            return Ok(None);
        };
        match &self.constant {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            _ => Err(format!("{name} must be a string constant")),
        }
    }
}

/// Recognised rule heads of one package.
#[derive(Debug, Default)]
pub(crate) struct PolicyRules {
    pub judgement: RuleInfo,
    pub metadata: RuleInfo,
    pub resources: RuleInfo,
    pub input_type: RuleInfo,
    pub resource_type: RuleInfo,
}

impl PolicyRules {
    pub fn collect(set: &ModuleSet<'_>) -> Result<Self, ExtractError> {
        let mut rules = Self::default();
        for decl in set.modules.iter().flat_map(|m| m.rules.iter()) {
            let group = match decl.name.as_str() {
                "deny" | "allow" | "policy" => &mut rules.judgement,
                "metadata" | "__rego__metadoc__" => &mut rules.metadata,
                "resources" => &mut rules.resources,
                "input_type" => &mut rules.input_type,
                "resource_type" => &mut rules.resource_type,
                _ => continue,
            };
            group.add(decl).map_err(|message| ExtractError {
                package: set.package.to_string(),
                message,
            })?;
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn module(path: &str, package: &str, rules: Vec<RuleDecl>) -> Module {
        Module {
            path: path.to_string(),
            package: PackagePath::parse(package),
            rules,
            source: Arc::from(""),
        }
    }

    #[test]
    fn groups_only_rules_subtree() {
        let modules = vec![
            module("rules/b.rego", "rules.b", vec![]),
            module("rules/a1.rego", "rules.a", vec![]),
            module("lib/x.rego", "lib.x", vec![]),
            module("rules/a2.rego", "rules.a", vec![]),
            module("rules.rego", "rules", vec![]),
        ];
        let sets = module_sets(&modules);
        let packages: Vec<String> = sets.iter().map(|s| s.package.to_string()).collect();
        assert_eq!(packages, vec!["data.rules", "data.rules.a", "data.rules.b"]);
        assert_eq!(sets[1].modules.len(), 2);
    }

    #[test]
    fn mismatched_judgement_names_fail() {
        let modules = vec![
            module("a.rego", "rules.a", vec![RuleDecl::new("deny")]),
            module("b.rego", "rules.a", vec![RuleDecl::new("allow")]),
        ];
        let sets = module_sets(&modules);
        let err = PolicyRules::collect(&sets[0]).unwrap_err();
        assert_eq!(err.message, "mismatched rule names: deny and allow");
    }

    #[test]
    fn incremental_definitions_are_fine() {
        let modules = vec![module(
            "a.rego",
            "rules.a",
            vec![RuleDecl::new("deny"), RuleDecl::new("deny")],
        )];
        let rules = PolicyRules::collect(&module_sets(&modules)[0]).unwrap();
        assert_eq!(rules.judgement.name.as_deref(), Some("deny"));
    }

    #[test]
    fn conflicting_constants_fail() {
        let modules = vec![
            module("a.rego", "rules.a", vec![RuleDecl::constant("input_type", json!("tf"))]),
            module("b.rego", "rules.a", vec![RuleDecl::constant("input_type", json!("k8s"))]),
        ];
        let err = PolicyRules::collect(&module_sets(&modules)[0]).unwrap_err();
        assert!(err.message.contains("conflicting values"));
    }

    #[test]
    fn computed_input_type_is_rejected() {
        let mut info = RuleInfo::default();
        info.add(&RuleDecl::new("input_type")).unwrap();
        assert!(info.string_constant().is_err());
        assert_eq!(RuleInfo::default().string_constant(), Ok(None));
    }
}
