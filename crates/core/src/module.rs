//! Parsed rule modules as seen by the orchestration layer.
//!
//! The rule language itself is opaque here: a [`Module`] only records what
//! the engine needs to enumerate policies (the package namespace and the
//! rule heads it declares) plus the original source for packaging.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root of every document path in the rule language.
pub const DATA_ROOT: &str = "data";

/// Extension of rule module source files.
pub const MODULE_EXTENSION: &str = "rego";

pub fn is_module_path(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|ext| ext == MODULE_EXTENSION)
}

/// Dotted namespace of a module below the `data` root, e.g. `rules.aws.s3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackagePath(Vec<String>);

impl PackagePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse `rules.aws.s3` or `data.rules.aws.s3`.
    pub fn parse(dotted: &str) -> Self {
        let trimmed = dotted.trim();
        let trimmed = trimmed
            .strip_prefix("data.")
            .unwrap_or(if trimmed == DATA_ROOT { "" } else { trimmed });
        Self::new(trimmed.split('.').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.0.len() >= prefix.len() && self.0.iter().zip(prefix).all(|(a, b)| a == b)
    }

    /// Query expression addressing a rule inside this package.
    pub fn rule_ref(&self, rule: &str) -> String {
        format!("{self}.{rule}")
    }
}

impl fmt::Display for PackagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(DATA_ROOT)?;
        for segment in &self.0 {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

/// A rule head declared by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDecl {
    pub name: String,
    /// Value of the rule when it is a statically known constant
    /// (`input_type := "tf"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,
}

impl RuleDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constant: None,
        }
    }

    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            constant: Some(value),
        }
    }
}

/// A parsed rule module.
#[derive(Debug, Clone)]
pub struct Module {
    /// Path of the file the module was read from.
    pub path: String,
    pub package: PackagePath,
    pub rules: Vec<RuleDecl>,
    pub source: Arc<str>,
}

impl Module {
    pub fn rules_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RuleDecl> + 'a {
        self.rules.iter().filter(move |r| r.name == name)
    }
}
