//! Phase timing, logging and metrics for the evaluation pipeline.
//!
//! An [`Instrumentation`] carries a component name, a label set and a log
//! verbosity. [`Instrumentation::child`] derives a new context with extra
//! labels, leaving the parent untouched, so per-policy contexts can be
//! created freely from a shared policy-set context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::metrics::{Labels, LocalMetrics, Metrics};

/// Level used for phase boundary logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Info,
    Debug,
    Trace,
}

macro_rules! log_at {
    ($verbosity:expr, $($arg:tt)+) => {
        match $verbosity {
            Verbosity::Info => info!($($arg)+),
            Verbosity::Debug => debug!($($arg)+),
            Verbosity::Trace => trace!($($arg)+),
        }
    };
}

#[derive(Clone)]
pub struct Instrumentation {
    component: String,
    verbosity: Verbosity,
    labels: Labels,
    metrics: Arc<dyn Metrics>,
}

impl Instrumentation {
    pub fn new(component: impl Into<String>, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            component: component.into(),
            verbosity: Verbosity::Info,
            labels: Labels::new(),
            metrics,
        }
    }

    /// A context with extra labels and its own verbosity.
    pub fn child(&self, labels: Labels, verbosity: Verbosity) -> Self {
        let mut merged = self.labels.clone();
        merged.extend(labels);
        Self {
            component: self.component.clone(),
            verbosity,
            labels: merged,
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn metrics(&self) -> &Arc<dyn Metrics> {
        &self.metrics
    }

    /// Log the start of `name` and return a guard that finishes it.
    pub fn start_phase(&self, name: &'static str) -> Phase<'_> {
        log_at!(
            self.verbosity,
            component = %self.component,
            labels = %render(&self.labels),
            phase = name,
            "phase started"
        );
        Phase {
            instrumentation: self,
            name,
            started: Instant::now(),
            fields: Vec::new(),
            finished: false,
        }
    }

    pub fn inc_counter(&self, name: &str) {
        self.metrics.counter(name, &self.labels).inc();
    }

    pub fn add_counter(&self, name: &str, n: u64) {
        self.metrics.counter(name, &self.labels).add(n);
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new("tenet", Arc::new(LocalMetrics::new()))
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("component", &self.component)
            .field("verbosity", &self.verbosity)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

/// An open phase. It is logged and its timer recorded exactly once: by
/// [`Phase::finish`], or on drop when an early return skips the call.
pub struct Phase<'a> {
    instrumentation: &'a Instrumentation,
    name: &'static str,
    started: Instant,
    fields: Vec<(&'static str, String)>,
    finished: bool,
}

impl Phase<'_> {
    /// Attach a field to the "phase finished" log line.
    pub fn field(&mut self, key: &'static str, value: impl ToString) {
        self.fields.push((key, value.to_string()));
    }

    pub fn finish(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        self.finished = true;
        let elapsed = self.started.elapsed();
        let inst = self.instrumentation;
        let fields = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        log_at!(
            inst.verbosity,
            component = %inst.component,
            labels = %render(&inst.labels),
            phase = self.name,
            duration_ms = elapsed.as_millis() as u64,
            fields = %fields,
            "phase finished"
        );
        inst.metrics
            .timer(&format!("{}_time", self.name), &inst.labels)
            .record(elapsed);
        elapsed
    }
}

impl Drop for Phase<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.record();
        }
    }
}

fn render(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
