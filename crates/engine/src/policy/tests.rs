//! Tests for policy extraction and single-policy evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use tenet_core::{Cancellation, HeaderScanner, Module, ModuleParser, Relations, ResourceState, RuleLanguage, State};

use super::*;
use crate::error::PolicyError;
use crate::input::{state_input, TF};
use crate::testing::{Script, ScriptedLanguage};

fn parse(path: &str, source: &str) -> Module {
    HeaderScanner.parse_module(path, source).unwrap()
}

fn extract(modules: &[Module]) -> Option<Policy> {
    let sets = module_sets(modules);
    assert_eq!(sets.len(), 1);
    Policy::from_module_set(&sets[0]).unwrap()
}

const SINGLE: &str = r#"package rules.s3_encryption

input_type := "tf"
resource_type := "aws_s3_bucket"

metadata := {
  "id": "TN_S3_001",
  "title": "Buckets are encrypted",
  "severity": "high",
  "remediation": {"terraform": "Add server_side_encryption_configuration"}
}

deny[info] {
  not input.server_side_encryption_configuration
  info := {"message": "bucket is not encrypted"}
}
"#;

const MULTI: &str = r#"package rules.public_buckets

metadata := {"id": "TN_S3_002", "severity": "critical"}

resources[info] {
  bucket := input.resources.aws_s3_bucket[_]
  info := {"resource": bucket}
}

deny[info] {
  bucket := input.resources.aws_s3_bucket[_]
  bucket.acl == "public-read"
  info := {"resource": bucket, "message": "public"}
}
"#;

fn state() -> State {
    let bucket = |id: &str, acl: &str| {
        let mut r = ResourceState {
            id: id.into(),
            resource_type: "aws_s3_bucket".into(),
            namespace: "main.tf".into(),
            ..Default::default()
        };
        r.attributes.insert("acl".into(), json!(acl));
        r
    };
    State::new("tf_plan")
        .with_resource(bucket("aws_s3_bucket.a", "private"))
        .with_resource(bucket("aws_s3_bucket.b", "public-read"))
}

fn context(script: &Arc<Script>, modules: &[Module], state: State) -> EvalContext {
    let by_path: BTreeMap<String, Module> =
        modules.iter().map(|m| (m.path.clone(), m.clone())).collect();
    let compiled = ScriptedLanguage::new(script)
        .compile(&by_path, &Default::default())
        .unwrap();
    EvalContext {
        compiled,
        input: Arc::new(state_input(&state)),
        state: Arc::new(state),
        relations: Arc::new(Relations::default()),
    }
}

#[test]
fn extracts_single_resource_policy() {
    let policy = extract(&[parse("rules/s3.rego", SINGLE)]).unwrap();
    assert_eq!(policy.package().to_string(), "data.rules.s3_encryption");
    assert_eq!(policy.judgement(), Judgement::Deny);
    assert_eq!(policy.input_type(), &TF);
    assert_eq!(policy.resource_type(), "aws_s3_bucket");
    assert!(policy.input_type_matches("tf_plan"));
    assert!(!policy.input_type_matches("k8s"));
}

#[test]
fn missing_declarations_mean_multiple_and_any() {
    let policy = extract(&[parse("rules/p.rego", MULTI)]).unwrap();
    assert_eq!(policy.resource_type(), MULTIPLE);
    assert!(policy.input_type_matches("k8s"));
}

#[test]
fn package_without_judgement_is_not_a_policy() {
    let helper = parse("rules/helpers.rego", "package rules.helpers\n\nis_public(b) {\n  b.acl == \"public-read\"\n}\n");
    assert!(extract(&[helper]).is_none());
}

#[test]
fn computed_resource_type_is_an_extraction_error() {
    let module = parse(
        "rules/x.rego",
        "package rules.x\n\nresource_type := concat(\"_\", [\"aws\", \"s3\"])\n\ndeny {\n  true\n}\n",
    );
    let sets = module_sets(std::slice::from_ref(&module));
    let err = Policy::from_module_set(&sets[0]).unwrap_err();
    assert_eq!(err.package, "data.rules.x");
    assert!(err.message.contains("resource_type must be a string constant"));
}

#[test]
fn metadata_is_queried_once() {
    let script = Script::new();
    let modules = [parse("rules/s3.rego", SINGLE)];
    let ctx = context(&script, &modules, state());
    let policy = extract(&modules).unwrap();
    let cancel = Cancellation::new();

    assert_eq!(policy.id(ctx.compiled.as_ref(), &cancel).unwrap(), "TN_S3_001");
    policy.metadata(ctx.compiled.as_ref(), &cancel).unwrap();
    assert_eq!(script.calls("data.rules.s3_encryption.metadata"), 1);
}

#[test]
fn missing_id_is_an_error() {
    let script = Script::new();
    let source = "package rules.noid\n\nmetadata := {\"title\": \"t\"}\n\ndeny {\n  true\n}\n";
    let modules = [parse("rules/noid.rego", source)];
    let ctx = context(&script, &modules, state());
    let policy = extract(&modules).unwrap();
    assert!(matches!(
        policy.id(ctx.compiled.as_ref(), &Cancellation::new()),
        Err(PolicyError::MissingId)
    ));
}

#[test]
fn single_resource_policy_runs_per_resource() {
    let script = Script::new();
    let modules = [parse("rules/s3.rego", SINGLE)];
    let ctx = context(&script, &modules, state());
    script.answer("data.rules.s3_encryption.deny", |query, _| {
        let input = query.input.as_ref().unwrap();
        if input["acl"] == "public-read" {
            Ok(vec![json!([{"message": "bucket is not encrypted"}])])
        } else {
            Ok(vec![json!([])])
        }
    });

    let policy = extract(&modules).unwrap();
    let out = policy.eval(&ctx, &Cancellation::new()).unwrap();

    assert_eq!(script.calls("data.rules.s3_encryption.deny"), 2);
    assert_eq!(out.id, "TN_S3_001");
    assert_eq!(out.package, "data.rules.s3_encryption");
    assert_eq!(out.resource_types, vec!["aws_s3_bucket"]);
    assert_eq!(out.results.len(), 2);
    assert!(out.results[0].passed);
    assert_eq!(out.results[0].resource_id, "aws_s3_bucket.a");
    assert!(!out.results[1].passed);
    assert_eq!(out.results[1].severity, "high");
    assert_eq!(out.results[1].remediation, "Add server_side_encryption_configuration");
}

#[test]
fn failure_keeps_partial_results() {
    let script = Script::new();
    let modules = [parse("rules/s3.rego", SINGLE)];
    let ctx = context(&script, &modules, state());
    script.answer("data.rules.s3_encryption.deny", |query, _| {
        let input = query.input.as_ref().unwrap();
        if input["_id"] == "aws_s3_bucket.b" {
            Err(tenet_core::RuntimeError::Evaluation("division by zero".into()))
        } else {
            Ok(vec![json!([])])
        }
    });

    let policy = extract(&modules).unwrap();
    let failure = policy.eval(&ctx, &Cancellation::new()).unwrap_err();
    assert!(matches!(
        failure.error,
        PolicyError::EvaluateResource { ref resource, .. } if resource == "aws_s3_bucket.b"
    ));
    assert_eq!(failure.partial.results.len(), 1);
    assert_eq!(failure.partial.errors.len(), 1);
    assert!(failure.partial.errors[0].contains("division by zero"));
}

#[test]
fn multi_resource_policy_sees_whole_state() {
    let script = Script::new();
    let modules = [parse("rules/public.rego", MULTI)];
    let ctx = context(&script, &modules, state());
    let resource = |id: &str| json!({"id": id, "_type": "aws_s3_bucket", "_namespace": "main.tf"});
    script.value(
        "data.rules.public_buckets.deny",
        json!([{"resource": resource("aws_s3_bucket.b"), "message": "public"}]),
    );
    script.value(
        "data.rules.public_buckets.resources",
        json!([{"resource": resource("aws_s3_bucket.a")}, {"resource": resource("aws_s3_bucket.b")}]),
    );

    let policy = extract(&modules).unwrap();
    let out = policy.eval(&ctx, &Cancellation::new()).unwrap();

    assert_eq!(out.results.len(), 2);
    assert!(!out.results[0].passed);
    assert_eq!(out.results[0].resource_id, "aws_s3_bucket.b");
    assert_eq!(out.results[0].severity, "critical");
    assert!(out.results[1].passed);
    assert_eq!(out.resource_types, vec!["aws_s3_bucket"]);
}

#[test]
fn unexpected_judgement_shape_is_reported() {
    let script = Script::new();
    let modules = [parse("rules/public.rego", MULTI)];
    let ctx = context(&script, &modules, state());
    script.value("data.rules.public_buckets.deny", json!("oops"));

    let policy = extract(&modules).unwrap();
    let failure = policy.eval(&ctx, &Cancellation::new()).unwrap_err();
    assert!(matches!(failure.error, PolicyError::Results(_)));
    assert_eq!(failure.partial.id, "TN_S3_002");
}
