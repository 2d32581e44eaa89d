//! The rule-language collaborator seam.
//!
//! The engine never interprets rules itself. A [`RuleLanguage`] parses module
//! sources and compiles a complete module set plus its data document into a
//! [`CompiledSet`], which answers queries. Implementations are expected to
//! poll the [`Cancellation`] passed to [`CompiledSet::query`]; the engine
//! cannot interrupt a query that ignores it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Object;
use crate::error::{CompileErrors, ParseError, RuntimeError};
use crate::module::Module;
use crate::timeout::Cancellation;

/// Turns module source text into a [`Module`].
pub trait ModuleParser: Send + Sync {
    fn parse_module(&self, path: &str, source: &str) -> Result<Module, ParseError>;
}

/// A rule language able to compile a whole module set.
pub trait RuleLanguage: ModuleParser {
    fn compile(
        &self,
        modules: &BTreeMap<String, Module>,
        data: &Object,
    ) -> Result<Arc<dyn CompiledSet>, CompileErrors>;
}

/// A compiled, query-able module set. Shared read-only across workers.
pub trait CompiledSet: Send + Sync {
    /// Evaluate `query.expr` and return every bound value.
    ///
    /// An undefined result is an empty vector, not an error.
    fn query(&self, query: &Query, cancel: &Cancellation) -> Result<Vec<Value>, RuntimeError>;
}

/// Precomputed forward and backward resource relationships for one input state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relations {
    pub forward: Value,
    pub backward: Value,
}

/// A query against a [`CompiledSet`].
#[derive(Debug, Clone)]
pub struct Query {
    pub expr: String,
    pub input: Option<Arc<Value>>,
    pub relations: Option<Arc<Relations>>,
}

impl Query {
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            input: None,
            relations: None,
        }
    }

    pub fn with_input(mut self, input: Arc<Value>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_relations(mut self, relations: Arc<Relations>) -> Self {
        self.relations = Some(relations);
        self
    }
}
