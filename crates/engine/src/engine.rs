//! Evaluating input states against many independent rule sources.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{error, info};

use tenet_bundle::Bundle;
use tenet_core::{
    Config, Provider, Results, RuleBundle, RuleBundleInfo, RuleLanguage, State, StateResults,
};

use crate::instrumentation::Instrumentation;
use crate::metrics::{LocalMetrics, Metrics};
use crate::policy::MetadataResult;
use crate::policy_set::{PolicySet, PolicySetEvalOptions, PolicySetOptions, Timeouts};

/// Source name used for ad-hoc provider lists.
pub const DATA_SOURCE: &str = "data";

/// One rule source, compiled into its own policy set.
pub enum RuleSource {
    /// Loose modules and documents from arbitrary providers.
    Providers {
        name: String,
        providers: Vec<Box<dyn Provider>>,
    },
    Bundle(Bundle),
    /// A bundle that could not be read. Reported in the output, never
    /// evaluated.
    Unreadable {
        name: String,
        source: String,
        error: String,
    },
}

impl RuleSource {
    pub fn providers(name: impl Into<String>, providers: Vec<Box<dyn Provider>>) -> Self {
        Self::Providers {
            name: name.into(),
            providers,
        }
    }

    pub fn unreadable(
        name: impl Into<String>,
        source: impl Into<String>,
        error: impl ToString,
    ) -> Self {
        Self::Unreadable {
            name: name.into(),
            source: source.into(),
            error: error.to_string(),
        }
    }
}

pub struct EngineOptions {
    pub sources: Vec<RuleSource>,
    pub language: Arc<dyn RuleLanguage>,
    pub timeouts: Timeouts,
    /// Default worker count per policy set; 0 means processors + 1.
    pub workers: usize,
    pub metrics: Arc<dyn Metrics>,
}

impl EngineOptions {
    pub fn new(language: Arc<dyn RuleLanguage>) -> Self {
        Self {
            sources: Vec::new(),
            language,
            timeouts: Timeouts::default(),
            workers: 0,
            metrics: Arc::new(LocalMetrics::new()),
        }
    }

    pub fn from_config(config: &Config, language: Arc<dyn RuleLanguage>) -> Self {
        Self {
            timeouts: Timeouts::from_config(config),
            workers: config.workers,
            ..Self::new(language)
        }
    }

    pub fn with_source(mut self, source: RuleSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// What to evaluate.
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    pub states: Vec<State>,
    /// When set and non-empty, only policies with these IDs run. An empty
    /// set is the same as no allow-list.
    pub rule_ids: Option<BTreeSet<String>>,
    /// Overrides the engine's worker count when non-zero.
    pub workers: usize,
}

enum Slot {
    Loaded(PolicySet),
    Failed(RuleBundleInfo),
}

pub struct Engine {
    slots: Vec<Slot>,
    workers: usize,
}

impl Engine {
    /// Build one policy set per source.
    ///
    /// A source that fails to build is kept as an error entry so it shows up
    /// in every [`Results`] instead of disappearing.
    pub fn new(options: EngineOptions) -> Self {
        let instrumentation = Instrumentation::new("engine", options.metrics);
        let mut slots = Vec::with_capacity(options.sources.len());

        for source in options.sources {
            let (rule_bundle, providers) = match source {
                RuleSource::Providers { name, providers } => {
                    (RuleBundle::new(name, DATA_SOURCE), providers)
                }
                RuleSource::Bundle(bundle) => {
                    let rule_bundle = bundle.rule_bundle();
                    let providers: Vec<Box<dyn Provider>> = vec![Box::new(bundle)];
                    (rule_bundle, providers)
                }
                RuleSource::Unreadable {
                    name,
                    source,
                    error,
                } => {
                    error!(bundle = %name, error = %error, "rule source unreadable");
                    slots.push(Slot::Failed(RuleBundleInfo {
                        rule_bundle: Some(RuleBundle::new(name, source)),
                        errors: vec![error],
                    }));
                    continue;
                }
            };

            let built = PolicySet::new(PolicySetOptions {
                name: rule_bundle.name,
                source: rule_bundle.source,
                checksum: rule_bundle.checksum,
                providers,
                language: Arc::clone(&options.language),
                timeouts: options.timeouts,
                instrumentation: instrumentation.clone(),
            });
            match built {
                Ok(set) => {
                    info!(bundle = %set.rule_bundle(), policies = set.policies().len(), "policy set loaded");
                    slots.push(Slot::Loaded(set));
                }
                Err(e) => {
                    error!(error = %e, "failed to initialize policy set");
                    slots.push(Slot::Failed(e.to_info()));
                }
            }
        }

        Self {
            slots,
            workers: options.workers,
        }
    }

    pub fn policy_sets(&self) -> impl Iterator<Item = &PolicySet> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Loaded(set) => Some(set),
            Slot::Failed(_) => None,
        })
    }

    /// Sources that failed to load, with their errors.
    pub fn init_errors(&self) -> impl Iterator<Item = &RuleBundleInfo> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Failed(info) => Some(info),
            Slot::Loaded(_) => None,
        })
    }

    /// Evaluate every state against every policy set.
    ///
    /// Each state's rule results are sorted by package. A policy set that
    /// cannot evaluate a state adds no results for it; the error is
    /// recorded on that set's `rule_bundles` entry.
    pub fn eval(&self, options: &EvalOptions) -> Results {
        let set_options = PolicySetEvalOptions {
            workers: if options.workers > 0 {
                options.workers
            } else {
                self.workers
            },
            rule_ids: options
                .rule_ids
                .clone()
                .filter(|ids| !ids.is_empty())
                .map(Arc::new),
        };

        let mut bundle_infos: Vec<RuleBundleInfo> = self
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Loaded(set) => RuleBundleInfo {
                    rule_bundle: Some(set.rule_bundle().clone()),
                    errors: Vec::new(),
                },
                Slot::Failed(info) => info.clone(),
            })
            .collect();

        let mut results = Vec::with_capacity(options.states.len());
        for state in &options.states {
            let shared = Arc::new(state.clone());
            let mut rule_results = Vec::new();
            for (slot, info) in self.slots.iter().zip(bundle_infos.iter_mut()) {
                let Slot::Loaded(set) = slot else {
                    continue;
                };
                match set.eval(Arc::clone(&shared), &set_options) {
                    Ok(rr) => rule_results.extend(rr),
                    Err(e) => {
                        error!(bundle = %set.rule_bundle(), error = %e, "failed to evaluate policy set");
                        info.errors.push(e.to_string());
                    }
                }
            }
            rule_results.sort_by(|a, b| a.package.cmp(&b.package));
            results.push(StateResults {
                input: state.clone(),
                rule_results,
            });
        }

        Results {
            results,
            rule_bundles: bundle_infos,
            ..Default::default()
        }
    }

    /// Metadata of every policy across every set, sorted by package.
    pub fn metadata(&self) -> Vec<MetadataResult> {
        let mut out: Vec<MetadataResult> = self.policy_sets().flat_map(|s| s.metadata()).collect();
        out.sort_by(|a, b| a.package.cmp(&b.package));
        out
    }
}
