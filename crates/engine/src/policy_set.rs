//! One compiled rule source and the policies extracted from it.
//!
//! Construction runs the whole pipeline (standard library, providers,
//! policy extraction, compile) under the init timeout. Evaluation selects
//! the policies that apply to one input state, precomputes relations once,
//! then evaluates the selection on a bounded worker pool. Each of selection,
//! relations and every single policy evaluation is bounded by the query
//! timeout.

use std::collections::BTreeSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use tenet_core::config::{resolve_workers, DEFAULT_INIT_TIMEOUT_SECS, DEFAULT_QUERY_TIMEOUT_SECS};
use tenet_core::{
    run_with_timeout, Cancellation, CompiledSet, Config, DeadlineError, Provider, Relations,
    RuleBundle, RuleLanguage, RuleResults, State,
};

use crate::consumer::PolicyConsumer;
use crate::error::{EvalError, PolicyError, PolicySetError, RuleBundleError};
use crate::input::state_input;
use crate::instrumentation::{Instrumentation, Verbosity};
use crate::metrics::labels;
use crate::policy::{module_sets, EvalContext, MetadataResult, Policy};
use crate::relations;
use crate::stdlib::StandardLibrary;

pub const POLICIES_EVALUATED: &str = "policies_evaluated";
pub const POLICY_EVALUATION_ERRORS: &str = "policy_evaluation_errors";
pub const RESULTS_PRODUCED: &str = "results_produced";
pub const MODULES_LOADED: &str = "modules_loaded";
pub const DATA_DOCUMENTS_LOADED: &str = "data_documents_loaded";
pub const POLICIES_LOADED: &str = "policies_loaded";

/// Deadlines for construction and for each bounded query phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub init: Duration,
    pub query: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            init: Duration::from_secs(DEFAULT_INIT_TIMEOUT_SECS),
            query: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

impl Timeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            init: config.init_timeout(),
            query: config.query_timeout(),
        }
    }
}

pub struct PolicySetOptions {
    pub name: String,
    /// `data`, `bundle_archive` or `bundle_directory`.
    pub source: String,
    pub checksum: Option<String>,
    pub providers: Vec<Box<dyn Provider>>,
    pub language: Arc<dyn RuleLanguage>,
    pub timeouts: Timeouts,
    pub instrumentation: Instrumentation,
}

/// Per-call evaluation settings.
#[derive(Debug, Clone, Default)]
pub struct PolicySetEvalOptions {
    /// Worker count; 0 means processors + 1.
    pub workers: usize,
    /// When set and non-empty, only policies whose ID is listed are
    /// evaluated. An empty set runs everything.
    pub rule_ids: Option<Arc<BTreeSet<String>>>,
}

pub struct PolicySet {
    rule_bundle: RuleBundle,
    compiled: Arc<dyn CompiledSet>,
    policies: Arc<[Arc<Policy>]>,
    timeouts: Timeouts,
    instrumentation: Instrumentation,
}

struct Built {
    compiled: Arc<dyn CompiledSet>,
    policies: Vec<Arc<Policy>>,
}

impl PolicySet {
    /// Build a policy set from its providers.
    ///
    /// Provider failures are fatal: every provider is still consumed and all
    /// of their errors are reported together. A package that cannot be
    /// turned into a policy is only a warning; its modules stay loaded and
    /// remain reachable as data from other rules.
    pub fn new(options: PolicySetOptions) -> Result<Self, RuleBundleError> {
        let rule_bundle = RuleBundle::new(&options.name, &options.source)
            .with_checksum(options.checksum.clone());
        let instrumentation = options.instrumentation.child(
            labels([("bundle", options.name.as_str()), ("source", options.source.as_str())]),
            Verbosity::Info,
        );
        let timeouts = options.timeouts;

        let language = options.language;
        let providers = options.providers;
        let inst = instrumentation.clone();
        let outcome = run_with_timeout(timeouts.init, move |cancel| {
            build(&inst, language, &providers, &cancel, timeouts.init)
        });
        let built = match outcome {
            Ok(Ok(built)) => built,
            Ok(Err(source)) => return Err(RuleBundleError { rule_bundle, source }),
            Err(DeadlineError::Elapsed(_)) => {
                return Err(RuleBundleError {
                    rule_bundle,
                    source: PolicySetError::InitTimedOut(timeouts.init),
                })
            }
            Err(other) => {
                return Err(RuleBundleError {
                    rule_bundle,
                    source: PolicySetError::Interrupted(other),
                })
            }
        };

        Ok(Self {
            rule_bundle,
            compiled: built.compiled,
            policies: built.policies.into(),
            timeouts,
            instrumentation,
        })
    }

    pub fn rule_bundle(&self) -> &RuleBundle {
        &self.rule_bundle
    }

    pub fn policies(&self) -> &[Arc<Policy>] {
        &self.policies
    }

    /// Evaluate every applicable policy against `state`.
    ///
    /// Results come back in completion order. A failing policy contributes
    /// its partial results and its error message; it never stops the batch.
    pub fn eval(
        &self,
        state: Arc<State>,
        options: &PolicySetEvalOptions,
    ) -> Result<Vec<RuleResults>, EvalError> {
        let workers = resolve_workers(options.workers);
        let mut phase = self.instrumentation.start_phase("evaluate_policy_set");
        phase.field("workers", workers);

        let input = Arc::new(state_input(&state));
        let selected = self.select(&state.input_type, options.rule_ids.clone())?;
        let relations = self.precompute_relations(&input)?;
        let ctx = Arc::new(EvalContext {
            compiled: Arc::clone(&self.compiled),
            state,
            input,
            relations: Arc::new(relations),
        });

        let results = self.fan_out(ctx, selected, workers)?;
        phase.field("rule_results", results.len());
        phase.finish();
        Ok(results)
    }

    /// Metadata of every policy, sorted by package.
    ///
    /// Each metadata query is bounded by the query timeout on its own.
    pub fn metadata(&self) -> Vec<MetadataResult> {
        let timeout = self.timeouts.query;
        let mut out: Vec<MetadataResult> = self
            .policies
            .iter()
            .map(|policy| {
                let package = policy.package().to_string();
                let compiled = Arc::clone(&self.compiled);
                let p = Arc::clone(policy);
                let outcome = run_with_timeout(timeout, move |cancel| {
                    p.metadata(compiled.as_ref(), &cancel)
                });
                let result = match outcome {
                    Ok(result) => result,
                    Err(DeadlineError::Elapsed(_)) => Err(PolicyError::QueryTimedOut(timeout)),
                    Err(other) => Err(PolicyError::Aborted(other.to_string())),
                };
                match result {
                    Ok(metadata) => MetadataResult {
                        package,
                        metadata,
                        error: None,
                    },
                    Err(e) => {
                        warn!(package = %package, error = %e, "failed to query metadata");
                        MetadataResult {
                            package,
                            metadata: Default::default(),
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();
        out.sort_by(|a, b| a.package.cmp(&b.package));
        out
    }

    fn select(
        &self,
        input_type: &str,
        rule_ids: Option<Arc<BTreeSet<String>>>,
    ) -> Result<Vec<Arc<Policy>>, EvalError> {
        let mut phase = self.instrumentation.start_phase("policy_selection");
        let policies = Arc::clone(&self.policies);
        let compiled = Arc::clone(&self.compiled);
        let input_type = input_type.to_string();
        let timeout = self.timeouts.query;

        let selected = run_with_timeout(timeout, move |cancel| {
            select_policies(&policies, compiled.as_ref(), &input_type, rule_ids.as_deref(), &cancel)
        })
        .map_err(|e| EvalError::from_deadline(e, timeout, EvalError::Selection))?;

        phase.field("policies", selected.len());
        phase.finish();
        Ok(selected)
    }

    fn precompute_relations(
        &self,
        input: &Arc<Value>,
    ) -> Result<Relations, EvalError> {
        let phase = self.instrumentation.start_phase("relations_precompute");
        let compiled = Arc::clone(&self.compiled);
        let input = Arc::clone(input);
        let timeout = self.timeouts.query;

        let relations = run_with_timeout(timeout, move |cancel| {
            relations::precompute(compiled.as_ref(), &input, &cancel)
        })
        .map_err(|e| EvalError::from_deadline(e, timeout, EvalError::Relations))??;

        phase.finish();
        Ok(relations)
    }

    /// Evaluate `selected` on `workers` threads and collect every result.
    fn fan_out(
        &self,
        ctx: Arc<EvalContext>,
        selected: Vec<Arc<Policy>>,
        workers: usize,
    ) -> Result<Vec<RuleResults>, EvalError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tenet-eval-{i}"))
            .build()
            .map_err(|e| EvalError::Workers(e.to_string()))?;

        let (tx, rx) = mpsc::channel();
        pool.scope(|scope| {
            for policy in selected {
                let tx = tx.clone();
                let ctx = Arc::clone(&ctx);
                scope.spawn(move |_| {
                    // The receiver outlives the scope.
                    let _ = tx.send(self.eval_policy(ctx, policy));
                });
            }
        });
        drop(tx);
        Ok(rx.into_iter().collect())
    }

    fn eval_policy(&self, ctx: Arc<EvalContext>, policy: Arc<Policy>) -> RuleResults {
        let package = policy.package().to_string();
        let inst = self
            .instrumentation
            .child(labels([("package", package.as_str())]), Verbosity::Debug);
        let mut phase = inst.start_phase("evaluate_policy");
        let timeout = self.timeouts.query;

        let outcome = run_with_timeout(timeout, move |cancel| policy.eval(&ctx, &cancel));
        let mut results = match outcome {
            Ok(Ok(results)) => results,
            Ok(Err(failure)) => {
                warn!(package = %package, error = %failure.error, "policy evaluation failed");
                self.instrumentation.inc_counter(POLICY_EVALUATION_ERRORS);
                failure.partial
            }
            Err(e) => {
                let error = match e {
                    DeadlineError::Elapsed(_) => PolicyError::QueryTimedOut(timeout),
                    other => PolicyError::Aborted(other.to_string()),
                };
                warn!(package = %package, error = %error, "policy evaluation failed");
                self.instrumentation.inc_counter(POLICY_EVALUATION_ERRORS);
                RuleResults {
                    package,
                    errors: vec![error.to_string()],
                    ..Default::default()
                }
            }
        };

        self.instrumentation.inc_counter(POLICIES_EVALUATED);
        self.instrumentation
            .add_counter(RESULTS_PRODUCED, results.results.len() as u64);
        results.rule_bundle = Some(self.rule_bundle.clone());
        phase.field("results", results.results.len());
        phase.finish();
        results
    }
}

fn build(
    inst: &Instrumentation,
    language: Arc<dyn RuleLanguage>,
    providers: &[Box<dyn Provider>],
    cancel: &Cancellation,
    init_timeout: Duration,
) -> Result<Built, PolicySetError> {
    let phase = inst.start_phase("initialize_policy_set");
    let mut consumer = PolicyConsumer::default();

    let step = inst.start_phase("load_standard_library");
    StandardLibrary::new(Arc::clone(&language))
        .provide(&mut consumer)
        .map_err(PolicySetError::StandardLibrary)?;
    step.finish();

    let mut step = inst.start_phase("consume_providers");
    let mut errors = Vec::new();
    for provider in providers {
        if cancel.is_cancelled() {
            return Err(PolicySetError::InitTimedOut(init_timeout));
        }
        if let Err(e) = provider.provide(&mut consumer) {
            warn!(provider = provider.name(), error = %e, "provider failed");
            errors.push(e);
        }
    }
    step.field("providers", providers.len());
    step.finish();
    if !errors.is_empty() {
        return Err(PolicySetError::Providers(errors));
    }

    let mut step = inst.start_phase("extract_policies");
    let mut policies = Vec::new();
    for set in module_sets(consumer.modules().values()) {
        match Policy::from_module_set(&set) {
            Ok(Some(policy)) => policies.push(Arc::new(policy)),
            Ok(None) => {}
            Err(e) => warn!(
                package = %set.package,
                error = %e,
                "failed to extract policy, its modules stay loaded as data"
            ),
        }
    }
    step.field("policies", policies.len());
    step.finish();

    if cancel.is_cancelled() {
        return Err(PolicySetError::InitTimedOut(init_timeout));
    }
    let step = inst.start_phase("compile");
    let compiled = language.compile(consumer.modules(), consumer.document())?;
    step.finish();

    let modules = consumer.modules().len();
    let documents = consumer.num_documents();
    inst.add_counter(MODULES_LOADED, modules as u64);
    inst.add_counter(DATA_DOCUMENTS_LOADED, documents as u64);
    inst.add_counter(POLICIES_LOADED, policies.len() as u64);
    info!(
        modules_loaded = modules,
        data_documents_loaded = documents,
        policies_loaded = policies.len(),
        "policy set initialized"
    );
    phase.finish();
    Ok(Built { compiled, policies })
}

fn select_policies(
    policies: &[Arc<Policy>],
    compiled: &dyn CompiledSet,
    input_type: &str,
    rule_ids: Option<&BTreeSet<String>>,
    cancel: &Cancellation,
) -> Vec<Arc<Policy>> {
    policies
        .iter()
        .filter(|p| p.input_type_matches(input_type))
        .filter(|p| {
            let Some(ids) = rule_ids.filter(|ids| !ids.is_empty()) else {
                return true;
            };
            match p.id(compiled, cancel) {
                Ok(id) => ids.contains(&id),
                Err(e) => {
                    warn!(package = %p.package(), error = %e, "failed to extract rule id, excluding policy");
                    false
                }
            }
        })
        .cloned()
        .collect()
}
