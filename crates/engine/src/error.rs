use std::time::Duration;

use thiserror::Error;

use tenet_core::{CompileErrors, DeadlineError, ProviderError, RuleBundle, RuleBundleInfo, RuntimeError};

/// Fatal failures while building a policy set.
#[derive(Error, Debug)]
pub enum PolicySetError {
    #[error("failed to load the standard library: {0}")]
    StandardLibrary(#[source] ProviderError),

    #[error("failed to load rules: {}", join(.0))]
    Providers(Vec<ProviderError>),

    #[error("failed to compile rules: {0}")]
    Compile(#[from] CompileErrors),

    #[error("initialization timed out after {}ms", .0.as_millis())]
    InitTimedOut(Duration),

    #[error("initialization failed: {0}")]
    Interrupted(DeadlineError),
}

fn join(errors: &[ProviderError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A [`PolicySetError`] attributed to the rule source it came from.
#[derive(Error, Debug)]
#[error("{rule_bundle}: {source}")]
pub struct RuleBundleError {
    pub rule_bundle: RuleBundle,
    #[source]
    pub source: PolicySetError,
}

impl RuleBundleError {
    /// Output entry reporting this failure.
    pub fn to_info(&self) -> RuleBundleInfo {
        RuleBundleInfo {
            rule_bundle: Some(self.rule_bundle.clone()),
            errors: vec![self.source.to_string()],
        }
    }
}

/// Failures that stop a policy set from evaluating one input state.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error("query timed out after {}ms", .0.as_millis())]
    QueryTimedOut(Duration),

    #[error("failed to precompute relations: {0}")]
    Relations(String),

    #[error("failed to select policies: {0}")]
    Selection(String),

    #[error("failed to start evaluation workers: {0}")]
    Workers(String),
}

impl EvalError {
    /// Map a deadline failure of a bounded phase; anything but an elapsed
    /// deadline is reported through `otherwise`.
    pub(crate) fn from_deadline(
        err: DeadlineError,
        timeout: Duration,
        otherwise: fn(String) -> Self,
    ) -> Self {
        match err {
            DeadlineError::Elapsed(_) => Self::QueryTimedOut(timeout),
            other => otherwise(other.to_string()),
        }
    }
}

/// Failure of a single policy evaluation. Siblings are unaffected.
#[derive(Error, Debug, Clone)]
pub enum PolicyError {
    #[error("failed to query metadata: {0}")]
    Metadata(RuntimeError),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("policy has no id")]
    MissingId,

    #[error("failed to evaluate rule: {0}")]
    Evaluate(RuntimeError),

    #[error("failed to evaluate rule for resource '{resource}': {source}")]
    EvaluateResource {
        resource: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to process results: {0}")]
    Results(String),

    #[error("query timed out after {}ms", .0.as_millis())]
    QueryTimedOut(Duration),

    #[error("evaluation aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, PolicySetError>;
