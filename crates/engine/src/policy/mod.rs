//! Policies: evaluable rules extracted from rule packages.

pub mod extract;
pub mod metadata;
pub mod results;

use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tracing::debug;

use tenet_core::{Cancellation, CompiledSet, PackagePath, Query, Relations, RuleResults, State};

use crate::error::PolicyError;
use crate::input::{resource_input, InputType};

pub use extract::{module_sets, ExtractError, ModuleSet, RULES_ROOT};
pub use metadata::{Metadata, MetadataResult};
pub use results::Judgement;

use extract::PolicyRules;
use results::Defaults;

/// `resource_type` of a policy that sees the whole input at once.
pub const MULTIPLE: &str = "MULTIPLE";

/// Everything a policy is evaluated against for one input state.
///
/// Shared read-only by every policy of one evaluation batch.
pub struct EvalContext {
    pub compiled: Arc<dyn CompiledSet>,
    pub state: Arc<State>,
    /// `state` rendered as a query document.
    pub input: Arc<Value>,
    pub relations: Arc<Relations>,
}

/// A failed evaluation together with whatever it produced before failing.
///
/// `partial.errors` already carries the rendered error.
#[derive(Debug)]
pub struct PolicyFailure {
    pub partial: RuleResults,
    pub error: PolicyError,
}

impl PolicyFailure {
    fn new(mut partial: RuleResults, error: PolicyError) -> Self {
        partial.errors.push(error.to_string());
        Self { partial, error }
    }
}

#[derive(Debug)]
pub struct Policy {
    package: PackagePath,
    judgement: Judgement,
    metadata_rule: Option<String>,
    has_resources_rule: bool,
    input_type: InputType,
    /// `None` for multi-resource policies.
    resource_type: Option<String>,
    metadata: OnceLock<Metadata>,
}

impl Policy {
    /// Build a policy from the modules of one package.
    ///
    /// `Ok(None)` means the package declares no judgement rule and is not a
    /// policy (a helper library below `rules`, for example).
    pub fn from_module_set(set: &ModuleSet<'_>) -> Result<Option<Policy>, ExtractError> {
        let rules = PolicyRules::collect(set)?;
        let err = |message: String| ExtractError {
            package: set.package.to_string(),
            message,
        };

        let Some(judgement) = rules.judgement.name.as_deref().and_then(Judgement::from_name) else {
            debug!(package = %set.package, "no judgement rule, not a policy");
            return Ok(None);
        };
        let input_type = rules
            .input_type
            .string_constant()
            .map_err(err)?
            .map(|name| InputType::from_name(&name))
            .unwrap_or_default();
        let resource_type = rules
            .resource_type
            .string_constant()
            .map_err(err)?
            .filter(|rt| rt != MULTIPLE);

        Ok(Some(Policy {
            package: set.package.clone(),
            judgement,
            metadata_rule: rules.metadata.name,
            has_resources_rule: rules.resources.name.is_some(),
            input_type,
            resource_type,
            metadata: OnceLock::new(),
        }))
    }

    pub fn package(&self) -> &PackagePath {
        &self.package
    }

    pub fn judgement(&self) -> Judgement {
        self.judgement
    }

    pub fn input_type(&self) -> &InputType {
        &self.input_type
    }

    pub fn resource_type(&self) -> &str {
        self.resource_type.as_deref().unwrap_or(MULTIPLE)
    }

    pub fn input_type_matches(&self, input_type: &str) -> bool {
        self.input_type.matches(input_type)
    }

    /// Query (once) and return the policy's metadata.
    ///
    /// A policy without a metadata rule has empty metadata.
    pub fn metadata(
        &self,
        compiled: &dyn CompiledSet,
        cancel: &Cancellation,
    ) -> Result<Metadata, PolicyError> {
        if let Some(cached) = self.metadata.get() {
            return Ok(cached.clone());
        }
        let metadata = match &self.metadata_rule {
            None => Metadata::default(),
            Some(rule) => {
                let query = Query::new(self.package.rule_ref(rule));
                let value = compiled
                    .query(&query, cancel)
                    .map_err(PolicyError::Metadata)?
                    .into_iter()
                    .next();
                match value {
                    None => Metadata::default(),
                    Some(value) => Metadata::from_rule_value(rule, value)
                        .map_err(PolicyError::InvalidMetadata)?,
                }
            }
        };
        // A concurrent caller may have won the race; both values are equal.
        let _ = self.metadata.set(metadata.clone());
        Ok(metadata)
    }

    /// The policy's rule ID. Missing or empty IDs are errors.
    pub fn id(&self, compiled: &dyn CompiledSet, cancel: &Cancellation) -> Result<String, PolicyError> {
        let metadata = self.metadata(compiled, cancel)?;
        if metadata.id.is_empty() {
            return Err(PolicyError::MissingId);
        }
        Ok(metadata.id)
    }

    /// Evaluate the policy against one input state.
    pub fn eval(&self, ctx: &EvalContext, cancel: &Cancellation) -> Result<RuleResults, PolicyFailure> {
        let mut output = RuleResults {
            package: self.package.to_string(),
            ..Default::default()
        };
        let metadata = match self.metadata(ctx.compiled.as_ref(), cancel) {
            Ok(m) => m,
            Err(e) => return Err(PolicyFailure::new(output, e)),
        };
        let input_type = ctx.state.input_type.as_str();
        metadata.copy_to(input_type, &mut output);
        let remediation = metadata.remediation_for(input_type);
        let defaults = Defaults {
            metadata: &metadata,
            remediation: &remediation,
        };

        let outcome = match (&self.resource_type, self.judgement) {
            (Some(rt), judgement) if judgement != Judgement::Policy => {
                output.resource_types = vec![rt.clone()];
                self.eval_single(ctx, cancel, rt, &defaults, &mut output)
            }
            _ => self.eval_multi(ctx, cancel, &defaults, &mut output),
        };
        match outcome {
            Ok(()) => Ok(output),
            Err(e) => Err(PolicyFailure::new(output, e)),
        }
    }

    fn judgement_query(&self, ctx: &EvalContext, input: Arc<Value>) -> Query {
        Query::new(self.package.rule_ref(self.judgement.name()))
            .with_input(input)
            .with_relations(Arc::clone(&ctx.relations))
    }

    fn eval_single(
        &self,
        ctx: &EvalContext,
        cancel: &Cancellation,
        resource_type: &str,
        defaults: &Defaults<'_>,
        output: &mut RuleResults,
    ) -> Result<(), PolicyError> {
        let Some(resources) = ctx.state.resources.get(resource_type) else {
            return Ok(());
        };
        for resource in resources.values() {
            let query = self.judgement_query(ctx, Arc::new(resource_input(resource)));
            let values = ctx
                .compiled
                .query(&query, cancel)
                .map_err(|source| PolicyError::EvaluateResource {
                    resource: resource.id.clone(),
                    source,
                })?;
            let results = results::single_resource(self.judgement, values.first(), resource, defaults)
                .map_err(PolicyError::Results)?;
            output.results.extend(results);
        }
        Ok(())
    }

    fn eval_multi(
        &self,
        ctx: &EvalContext,
        cancel: &Cancellation,
        defaults: &Defaults<'_>,
        output: &mut RuleResults,
    ) -> Result<(), PolicyError> {
        let query = self.judgement_query(ctx, Arc::clone(&ctx.input));
        let values = ctx
            .compiled
            .query(&query, cancel)
            .map_err(PolicyError::Evaluate)?;

        let resources = if self.has_resources_rule && self.judgement == Judgement::Deny {
            let query = Query::new(self.package.rule_ref("resources"))
                .with_input(Arc::clone(&ctx.input))
                .with_relations(Arc::clone(&ctx.relations));
            ctx.compiled
                .query(&query, cancel)
                .map_err(PolicyError::Evaluate)?
                .into_iter()
                .next()
        } else {
            None
        };

        let results = results::multi_resource(self.judgement, values.first(), resources.as_ref(), defaults)
            .map_err(PolicyError::Results)?;
        let mut types: Vec<String> = results
            .iter()
            .map(|r| r.resource_type.clone())
            .filter(|t| !t.is_empty())
            .collect();
        types.sort();
        types.dedup();
        output.resource_types = types;
        output.results = results;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
