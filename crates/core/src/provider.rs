//! Sources of rule modules and data documents.
//!
//! A [`Provider`] pushes everything it knows into a [`Consumer`]. Bundles,
//! local directories and the embedded standard library all implement the
//! same contract, so a policy set can consume them uniformly.

use crate::document::{DocumentError, Object};
use crate::error::ParseError;
use crate::module::Module;

/// Sink receiving modules and data documents from providers.
pub trait Consumer {
    fn module(&mut self, path: &str, module: Module) -> Result<(), ProviderError>;

    fn data_document(&mut self, path: &str, document: Object) -> Result<(), ProviderError>;
}

/// A pluggable source of modules and data.
pub trait Provider: Send {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    fn provide(&self, consumer: &mut dyn Consumer) -> Result<(), ProviderError>;
}

/// Errors raised while a provider feeds a consumer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{provider}: {message}")]
    Failed { provider: String, message: String },
}

impl ProviderError {
    pub fn failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Closure-backed provider.
pub struct FnProvider<F> {
    name: String,
    func: F,
}

impl<F> Provider for FnProvider<F>
where
    F: Fn(&mut dyn Consumer) -> Result<(), ProviderError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn provide(&self, consumer: &mut dyn Consumer) -> Result<(), ProviderError> {
        (self.func)(consumer)
    }
}

/// Wrap a callback as a [`Provider`].
pub fn provider_fn<F>(name: impl Into<String>, func: F) -> FnProvider<F>
where
    F: Fn(&mut dyn Consumer) -> Result<(), ProviderError> + Send,
{
    FnProvider {
        name: name.into(),
        func,
    }
}
