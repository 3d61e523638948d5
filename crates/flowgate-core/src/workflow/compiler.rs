//! Workflow compiler: validation, canonicalization, and hashing.
//!
//! `compile` accepts an arbitrary JSON value, validates every step (nested
//! branches included), assigns ids to steps that lack one, deep-sorts object
//! keys, and hashes the canonical form. Errors are collected across the whole
//! tree; if any exist the compile fails as a unit and nothing partial is
//! returned.

use flowgate_types::workflow::{
    BRANCH_KEYS, CompileIssue, CompileResult, NormalizedWorkflowDefinition,
    NormalizedWorkflowStep, StepKind,
};
use serde_json::{Map, Value};

use super::canonical::{content_hash, sort_keys_deep};
use super::ordering::{BranchOrdering, nested_steps};

/// Minimum accepted `await_timeout_ms` for `agent_message` steps.
pub const MIN_AWAIT_TIMEOUT_MS: f64 = 1000.0;

/// Compile a raw, loosely-typed definition into its normalized form.
pub fn compile(raw: &Value) -> CompileResult {
    let Some(root) = raw.as_object() else {
        return CompileResult::failed(vec![CompileIssue::new(
            "workflow definition must be an object",
            None,
        )]);
    };
    let Some(raw_steps) = root.get("steps").and_then(Value::as_array) else {
        return CompileResult::failed(vec![CompileIssue::new(
            "workflow definition must include a \"steps\" array",
            Some("steps".to_string()),
        )]);
    };

    let mut errors = Vec::new();
    let steps = normalize_steps(raw_steps, "steps", "step", &mut errors);
    if !errors.is_empty() {
        tracing::debug!(errors = errors.len(), "workflow definition rejected");
        return CompileResult::failed(errors);
    }

    let mut fields = root.clone();
    fields.insert("steps".to_string(), Value::Array(steps));
    let canonical = sort_keys_deep(&Value::Object(fields));

    let workflow_hash = match content_hash(&canonical) {
        Ok(hash) => hash,
        Err(e) => {
            return CompileResult::failed(vec![CompileIssue::new(
                format!("failed to serialize definition: {e}"),
                None,
            )]);
        }
    };

    let workflow: NormalizedWorkflowDefinition = match serde_json::from_value(canonical) {
        Ok(def) => def,
        Err(e) => {
            return CompileResult::failed(vec![CompileIssue::new(
                format!("failed to build normalized definition: {e}"),
                None,
            )]);
        }
    };

    let step_order = step_order(&workflow);
    tracing::debug!(
        hash = workflow_hash.as_str(),
        steps = step_order.len(),
        "workflow definition compiled"
    );

    CompileResult {
        ok: true,
        workflow: Some(workflow),
        workflow_hash: Some(workflow_hash),
        step_order,
        errors: Vec::new(),
    }
}

/// Recompute the hash of an already-normalized definition.
///
/// Equal to the `workflow_hash` `compile` returned for it.
pub fn hash_definition(
    workflow: &NormalizedWorkflowDefinition,
) -> Result<String, serde_json::Error> {
    content_hash(&serde_json::to_value(workflow)?)
}

/// Flattened pre-order step ids: top level in authored order, every nested
/// branch array sorted by id. Reporting only; this is not execution order.
pub fn step_order(workflow: &NormalizedWorkflowDefinition) -> Vec<String> {
    let mut order = Vec::new();
    let mut top = workflow.steps.clone();
    BranchOrdering::Authored.apply(&mut top);
    for step in &top {
        push_step_order(step, &mut order);
    }
    order
}

fn push_step_order(step: &NormalizedWorkflowStep, order: &mut Vec<String>) {
    order.push(step.id.clone());
    for key in BRANCH_KEYS {
        for child in nested_steps(step, key) {
            push_step_order(&child, order);
        }
    }
}

// ---------------------------------------------------------------------------
// Step normalization
// ---------------------------------------------------------------------------

fn normalize_steps(
    items: &[Value],
    path: &str,
    id_base: &str,
    errors: &mut Vec<CompileIssue>,
) -> Vec<Value> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            normalize_step(
                item,
                &format!("{path}[{index}]"),
                &format!("{id_base}_{index}"),
                errors,
            )
        })
        .collect()
}

fn normalize_step(
    raw: &Value,
    path: &str,
    default_id: &str,
    errors: &mut Vec<CompileIssue>,
) -> Option<Value> {
    let Some(obj) = raw.as_object() else {
        errors.push(CompileIssue::new("Step must be an object", Some(path.to_string())));
        return None;
    };

    let type_name = match obj.get("type").and_then(Value::as_str) {
        Some(t) => t,
        None => {
            errors.push(CompileIssue::new(
                "Step type must be a string",
                Some(format!("{path}.type")),
            ));
            return None;
        }
    };
    let kind = match type_name.parse::<StepKind>() {
        Ok(kind) => kind,
        Err(e) => {
            errors.push(CompileIssue::new(e.to_string(), Some(format!("{path}.type"))));
            return None;
        }
    };

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_id)
        .to_string();

    check_kind_fields(kind, obj, path, errors);

    let mut normalized = obj.clone();
    normalized.insert("id".to_string(), Value::String(id));
    normalized.insert("type".to_string(), Value::String(kind.as_str().to_string()));

    for key in BRANCH_KEYS {
        match obj.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Array(children)) => {
                let nested = normalize_steps(
                    children,
                    &format!("{path}.{key}"),
                    &format!("{default_id}_{key}"),
                    errors,
                );
                normalized.insert(key.to_string(), Value::Array(nested));
            }
            Some(_) => errors.push(CompileIssue::new(
                format!("\"{key}\" must be an array of steps"),
                Some(format!("{path}.{key}")),
            )),
        }
    }

    Some(sort_keys_deep(&Value::Object(normalized)))
}

/// Type-specific required fields. Accumulates; never short-circuits.
fn check_kind_fields(
    kind: StepKind,
    obj: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<CompileIssue>,
) {
    let at = |field: &str| Some(format!("{path}.{field}"));

    match kind {
        StepKind::Bash => {
            if non_empty_str(obj, "command").is_none() {
                errors.push(CompileIssue::new(
                    "bash step requires a non-empty \"command\"",
                    at("command"),
                ));
            }
        }
        StepKind::Tool => {
            if non_empty_str(obj, "tool").is_none() {
                errors.push(CompileIssue::new(
                    "tool step requires a non-empty \"tool\"",
                    at("tool"),
                ));
            }
        }
        StepKind::AgentMessage => {
            let has_body = ["content", "message", "goal"]
                .iter()
                .any(|key| non_empty_str(obj, key).is_some());
            if !has_body {
                errors.push(CompileIssue::new(
                    "agent_message step requires a non-empty \"content\", \"message\", or \"goal\"",
                    Some(path.to_string()),
                ));
            }
            for key in ["interrupt", "await_response", "awaitResponse"] {
                if let Some(value) = present(obj, key) {
                    if !value.is_boolean() {
                        errors.push(CompileIssue::new(
                            format!("\"{key}\" must be a boolean"),
                            at(key),
                        ));
                    }
                }
            }
            for key in ["await_timeout_ms", "awaitTimeoutMs"] {
                if let Some(value) = present(obj, key) {
                    let valid = value.as_f64().is_some_and(|ms| ms >= MIN_AWAIT_TIMEOUT_MS);
                    if !valid {
                        errors.push(CompileIssue::new(
                            format!("\"{key}\" must be a number >= 1000"),
                            at(key),
                        ));
                    }
                }
            }
        }
        StepKind::Agent
        | StepKind::Conditional
        | StepKind::Loop
        | StepKind::Parallel
        | StepKind::Subworkflow
        | StepKind::Approval => {}
    }
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
