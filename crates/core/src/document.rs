//! Data documents: parsing, nesting under a directory prefix, and merging.
//!
//! Documents use `serde_json::Value` as the tagged value model
//! (Null | Bool | Number | String | Array | Object). Every merge and nesting
//! decision matches exhaustively on that enum.

use serde_json::{Map, Value};

/// A JSON object: the only shape allowed at the root of the data tree.
pub type Object = Map<String, Value>;

/// Errors raised while turning raw bytes into a nested data document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to parse data document {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("root data document needs to be an object, not {kind}: {path}")]
    NotAnObject { path: String, kind: &'static str },
}

/// File extensions parsed as data documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

pub fn is_document_path(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext))
}

/// Human-readable name of a value's variant, used in diagnostics.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a `.json`, `.yaml` or `.yml` file into a value.
///
/// JSON is a subset of YAML, so one parser covers all three extensions.
pub fn parse_document(path: &str, raw: &[u8]) -> Result<Value, DocumentError> {
    serde_yaml::from_slice::<Value>(raw).map_err(|source| DocumentError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Directory segments of a slash-separated file path, skipping empty and `.` parts.
pub fn directory_prefix(path: &str) -> Vec<String> {
    let mut segments: Vec<&str> = path.split('/').collect();
    segments.pop();
    segments
        .into_iter()
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}

/// Nest `document` under the directory prefix of `path`.
///
/// `rules/aws/data.json` containing `{"a": 1}` becomes
/// `{"rules": {"aws": {"a": 1}}}`. Wrapping is applied innermost-first.
/// The result must be an object.
pub fn nest_document(path: &str, document: Value) -> Result<Object, DocumentError> {
    let nested = directory_prefix(path)
        .into_iter()
        .rev()
        .fold(document, |inner, key| {
            let mut wrapper = Map::new();
            wrapper.insert(key, inner);
            Value::Object(wrapper)
        });

    match nested {
        Value::Object(obj) => Ok(obj),
        other => Err(DocumentError::NotAnObject {
            path: path.to_string(),
            kind: kind_name(&other),
        }),
    }
}

/// Parse and nest in one step.
pub fn load_document(path: &str, raw: &[u8]) -> Result<Object, DocumentError> {
    let document = parse_document(path, raw)?;
    nest_document(path, document)
}

/// Merge two values. Objects merge key by key, arrays merge element-wise,
/// and for any other pairing the right-hand value wins.
pub fn merge(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Object(mut l), Value::Object(r)) => {
            merge_objects(&mut l, r);
            Value::Object(l)
        }
        (Value::Array(l), Value::Array(r)) => {
            let len = l.len().max(r.len());
            let mut left_items = l.into_iter();
            let mut right_items = r.into_iter();
            let mut merged = Vec::with_capacity(len);
            for _ in 0..len {
                let item = match (left_items.next(), right_items.next()) {
                    (Some(lv), Some(rv)) => merge(lv, rv),
                    (Some(lv), None) => lv,
                    (None, Some(rv)) => rv,
                    (None, None) => Value::Null,
                };
                merged.push(item);
            }
            Value::Array(merged)
        }
        (_, right) => right,
    }
}

/// Merge `right` into `left` in place.
pub fn merge_objects(left: &mut Object, right: Object) {
    for (key, rv) in right {
        let merged = match left.remove(&key) {
            Some(lv) => merge(lv, rv),
            None => rv,
        };
        left.insert(key, merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nest_under_directory_prefix() {
        let nested = nest_document("rules/aws/s3/data.yaml", json!({"a": 1})).unwrap();
        assert_eq!(Value::Object(nested), json!({"rules": {"aws": {"s3": {"a": 1}}}}));
    }

    #[test]
    fn root_document_is_not_nested() {
        let nested = nest_document("data.json", json!({"k": true})).unwrap();
        assert_eq!(Value::Object(nested), json!({"k": true}));
    }

    #[test]
    fn dot_segments_are_ignored() {
        assert_eq!(directory_prefix("./lib//x/file.json"), vec!["lib", "x"]);
    }

    #[test]
    fn non_object_root_is_rejected() {
        let err = nest_document("data.json", json!([1, 2])).unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject { kind: "array", .. }));
    }

    #[test]
    fn array_under_prefix_is_accepted() {
        let nested = nest_document("lib/list.json", json!([1, 2])).unwrap();
        assert_eq!(Value::Object(nested), json!({"lib": [1, 2]}));
    }

    #[test]
    fn merge_objects_recursively() {
        let mut left = json!({"a": {"x": 1}, "b": 1}).as_object().cloned().unwrap();
        let right = json!({"a": {"y": 2}, "b": 2}).as_object().cloned().unwrap();
        merge_objects(&mut left, right);
        assert_eq!(Value::Object(left), json!({"a": {"x": 1, "y": 2}, "b": 2}));
    }

    #[test]
    fn merge_arrays_elementwise() {
        let merged = merge(json!([{"a": 1}, 2, 3]), json!([{"b": 2}, 5]));
        assert_eq!(merged, json!([{"a": 1, "b": 2}, 5, 3]));
    }

    #[test]
    fn mismatched_kinds_take_right() {
        assert_eq!(merge(json!({"a": 1}), json!("s")), json!("s"));
        assert_eq!(merge(json!(1), json!(null)), json!(null));
    }

    #[test]
    fn document_extensions() {
        assert!(is_document_path("rules/aws/data.yml"));
        assert!(is_document_path("data.json"));
        assert!(!is_document_path("rules/aws/s3.rego"));
        assert!(!is_document_path("json"));
    }

    #[test]
    fn parse_json_and_yaml() {
        let from_json = parse_document("a.json", br#"{"k": [1, 2]}"#).unwrap();
        let from_yaml = parse_document("a.yaml", b"k:\n  - 1\n  - 2\n").unwrap();
        assert_eq!(from_json, from_yaml);
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = parse_document("rules/bad.yaml", b"k: [unclosed").unwrap_err();
        assert!(err.to_string().contains("rules/bad.yaml"));
    }
}
