//! Policy-set construction and concurrent evaluation.
//!
//! An [`Engine`] owns one [`PolicySet`] per rule source (a bundle or an
//! ad-hoc list of providers) and runs every input state through all of
//! them. The rule language itself is a collaborator supplied through
//! [`tenet_core::RuleLanguage`].
//!
//! - [`policy_set`]: construction pipeline, selection, relations, worker pool
//! - [`policy`]: policy extraction, metadata and result building
//! - [`instrumentation`] / [`metrics`]: phase logs, timers and counters
//! - [`input`]: input-type hierarchy and query documents

pub mod consumer;
pub mod engine;
pub mod error;
pub mod input;
pub mod instrumentation;
pub mod metrics;
pub mod policy;
pub mod policy_set;
pub mod relations;
pub mod stdlib;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{Engine, EngineOptions, EvalOptions, RuleSource};
pub use error::{EvalError, PolicyError, PolicySetError, Result, RuleBundleError};
pub use input::InputType;
pub use instrumentation::{Instrumentation, Verbosity};
pub use metrics::{Counter, Labels, LocalMetrics, Metrics, Timer};
pub use policy::{Metadata, MetadataResult, Policy};
pub use policy_set::{PolicySet, PolicySetEvalOptions, PolicySetOptions, Timeouts};
pub use stdlib::StandardLibrary;
