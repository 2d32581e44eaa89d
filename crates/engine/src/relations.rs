//! Precomputing resource relationships for one input state.

use std::sync::Arc;

use serde_json::Value;

use tenet_core::{Cancellation, CompiledSet, Query, Relations};

use crate::error::EvalError;

pub const FORWARD_QUERY: &str = "data.tenet.internal.relations.forward";
pub const BACKWARD_QUERY: &str = "data.tenet.internal.relations.backward";

/// Run both relations queries against `input`.
///
/// Each query must produce a value; an undefined result is an error.
pub fn precompute(
    compiled: &dyn CompiledSet,
    input: &Arc<Value>,
    cancel: &Cancellation,
) -> Result<Relations, EvalError> {
    Ok(Relations {
        forward: run(compiled, FORWARD_QUERY, input, cancel)?,
        backward: run(compiled, BACKWARD_QUERY, input, cancel)?,
    })
}

fn run(
    compiled: &dyn CompiledSet,
    expr: &str,
    input: &Arc<Value>,
    cancel: &Cancellation,
) -> Result<Value, EvalError> {
    let query = Query::new(expr).with_input(Arc::clone(input));
    compiled
        .query(&query, cancel)
        .map_err(|e| EvalError::Relations(format!("{expr}: {e}")))?
        .into_iter()
        .next()
        .ok_or_else(|| EvalError::Relations(format!("{expr} returned no result")))
}
