//! Shared building blocks for the tenet policy engine.
//!
//! - [`document`]: JSON-shaped data documents and their merge rules
//! - [`module`]: parsed rule modules and package paths
//! - [`runtime`]: the rule-language collaborator seam (parse, compile, query)
//! - [`provider`]: sources of modules and data documents
//! - [`scan`]: a header-only module scanner for tooling
//! - [`timeout`]: cooperative cancellation and the deadline helper
//! - [`models`]: input states and evaluation results

pub mod config;
pub mod document;
pub mod error;
pub mod models;
pub mod module;
pub mod provider;
pub mod runtime;
pub mod scan;
pub mod timeout;

pub use config::Config;
pub use document::{DocumentError, Object};
pub use error::*;
pub use module::{Module, PackagePath, RuleDecl};
pub use provider::{Consumer, Provider, ProviderError};
pub use runtime::{CompiledSet, ModuleParser, Query, Relations, RuleLanguage};
pub use scan::HeaderScanner;
pub use timeout::{run_with_cancellation, run_with_timeout, Cancellation, DeadlineError};
pub use models::{
    Reference, ResourceState, Results, RuleBundle, RuleBundleInfo, RuleResult, RuleResults,
    State, StateResults,
};
