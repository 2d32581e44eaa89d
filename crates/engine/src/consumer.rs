//! Collects everything providers feed into a policy set.

use std::collections::BTreeMap;

use tenet_core::document::merge_objects;
use tenet_core::{Consumer, Module, Object, ProviderError};

/// Accumulates modules by path and merges data documents into one tree.
#[derive(Debug, Default)]
pub struct PolicyConsumer {
    modules: BTreeMap<String, Module>,
    document: Object,
    num_documents: usize,
}

impl PolicyConsumer {
    pub fn modules(&self) -> &BTreeMap<String, Module> {
        &self.modules
    }

    pub fn document(&self) -> &Object {
        &self.document
    }

    pub fn num_documents(&self) -> usize {
        self.num_documents
    }
}

impl Consumer for PolicyConsumer {
    fn module(&mut self, path: &str, module: Module) -> Result<(), ProviderError> {
        self.modules.insert(path.to_string(), module);
        Ok(())
    }

    fn data_document(&mut self, _path: &str, document: Object) -> Result<(), ProviderError> {
        merge_objects(&mut self.document, document);
        self.num_documents += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn obj(v: Value) -> Object {
        match v {
            Value::Object(o) => o,
            _ => unreachable!(),
        }
    }

    #[test]
    fn documents_merge_and_are_counted() {
        let mut c = PolicyConsumer::default();
        c.data_document("a.json", obj(json!({"rules": {"a": {"x": 1}}}))).unwrap();
        c.data_document("b.json", obj(json!({"rules": {"b": {"y": 2}}}))).unwrap();
        assert_eq!(c.num_documents(), 2);
        assert_eq!(
            Value::Object(c.document().clone()),
            json!({"rules": {"a": {"x": 1}, "b": {"y": 2}}})
        );
    }
}
