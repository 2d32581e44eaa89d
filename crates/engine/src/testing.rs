//! A scripted rule language for tests.
//!
//! Modules are parsed with [`HeaderScanner`]. The compiled set answers a
//! query from, in order: a scripted answer for the exact expression, the
//! literal constant a module declared for that rule, and `{}` for the two
//! relations queries. Anything else is undefined. Every query is counted
//! and the number of queries running at once is tracked.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

use tenet_core::provider::provider_fn;
use tenet_core::{
    Cancellation, CompileError, CompileErrors, CompiledSet, HeaderScanner, Module, ModuleParser,
    Object, ParseError, Provider, Query, RuleLanguage, RuntimeError,
};

use crate::relations::{BACKWARD_QUERY, FORWARD_QUERY};

pub(crate) type Answer =
    Arc<dyn Fn(&Query, &Cancellation) -> Result<Vec<Value>, RuntimeError> + Send + Sync>;

#[derive(Default)]
pub(crate) struct Script {
    answers: Mutex<HashMap<String, Answer>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    compile_error: Mutex<Option<String>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer<F>(&self, expr: &str, f: F)
    where
        F: Fn(&Query, &Cancellation) -> Result<Vec<Value>, RuntimeError> + Send + Sync + 'static,
    {
        self.answers
            .lock()
            .unwrap()
            .insert(expr.to_string(), Arc::new(f));
    }

    pub fn value(&self, expr: &str, value: Value) {
        self.answer(expr, move |_, _| Ok(vec![value.clone()]));
    }

    pub fn undefined(&self, expr: &str) {
        self.answer(expr, |_, _| Ok(Vec::new()));
    }

    pub fn fail(&self, expr: &str, message: &str) {
        let message = message.to_string();
        self.answer(expr, move |_, _| Err(RuntimeError::Evaluation(message.clone())));
    }

    /// Answer `value` after sleeping, polling cancellation meanwhile.
    pub fn slow(&self, expr: &str, delay: Duration, value: Value) {
        self.answer(expr, move |_, cancel| {
            let step = Duration::from_millis(5);
            let mut waited = Duration::ZERO;
            while waited < delay {
                if cancel.is_cancelled() {
                    return Err(RuntimeError::Cancelled);
                }
                thread::sleep(step);
                waited += step;
            }
            Ok(vec![value.clone()])
        });
    }

    pub fn fail_compile(&self, message: &str) {
        *self.compile_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self, expr: &str) -> usize {
        self.calls.lock().unwrap().get(expr).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub(crate) struct ScriptedLanguage {
    script: Arc<Script>,
}

impl ScriptedLanguage {
    pub fn new(script: &Arc<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::clone(script),
        })
    }
}

impl ModuleParser for ScriptedLanguage {
    fn parse_module(&self, path: &str, source: &str) -> Result<Module, ParseError> {
        HeaderScanner.parse_module(path, source)
    }
}

impl RuleLanguage for ScriptedLanguage {
    fn compile(
        &self,
        modules: &BTreeMap<String, Module>,
        _data: &Object,
    ) -> Result<Arc<dyn CompiledSet>, CompileErrors> {
        if let Some(message) = self.script.compile_error.lock().unwrap().clone() {
            return Err(CompileErrors(vec![CompileError {
                path: None,
                message,
            }]));
        }
        let mut constants = HashMap::new();
        for module in modules.values() {
            for rule in &module.rules {
                if let Some(value) = &rule.constant {
                    constants.insert(module.package.rule_ref(&rule.name), value.clone());
                }
            }
        }
        Ok(Arc::new(ScriptedSet {
            script: Arc::clone(&self.script),
            constants,
        }))
    }
}

struct ScriptedSet {
    script: Arc<Script>,
    constants: HashMap<String, Value>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CompiledSet for ScriptedSet {
    fn query(&self, query: &Query, cancel: &Cancellation) -> Result<Vec<Value>, RuntimeError> {
        *self
            .script
            .calls
            .lock()
            .unwrap()
            .entry(query.expr.clone())
            .or_default() += 1;

        let now = self.script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.script.in_flight);

        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        let answer = self.script.answers.lock().unwrap().get(&query.expr).cloned();
        if let Some(answer) = answer {
            return answer(query, cancel);
        }
        if let Some(value) = self.constants.get(&query.expr) {
            return Ok(vec![value.clone()]);
        }
        if query.expr == FORWARD_QUERY || query.expr == BACKWARD_QUERY {
            return Ok(vec![json!({})]);
        }
        Ok(Vec::new())
    }
}

/// Source of a `deny` policy in package `rules.<name>` with metadata `id`.
pub(crate) fn policy_source(name: &str, id: &str, input_type: &str) -> String {
    format!(
        "package rules.{name}\n\ninput_type := \"{input_type}\"\n\nmetadata := {{\"id\": \"{id}\", \"title\": \"{name}\", \"severity\": \"high\"}}\n\ndeny[msg] {{\n  msg := \"bad\"\n}}\n"
    )
}

/// A provider feeding `files` (path, source) through the header scanner.
pub(crate) fn modules_provider(name: &str, files: Vec<(String, String)>) -> Box<dyn Provider> {
    Box::new(provider_fn(name, move |consumer| {
        for (path, source) in &files {
            consumer.module(path, HeaderScanner.parse_module(path, source)?)?;
        }
        Ok(())
    }))
}
