//! Condition evaluation for `conditional` steps.
//!
//! A condition is either a literal boolean or a variable reference
//! `{ "variable": name, "equals"?: value }`. The variable is looked up in the
//! run's variables first, then in published step outputs. With `equals`
//! present the result is strict equality; without it, the resolved value's
//! truthiness. Any other shape is false.

use serde_json::Value;

use super::context::ExecutionContext;

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Literal(bool),
    Variable {
        name: String,
        /// `None` when the `equals` key is absent; `Some(Value::Null)` when it is
        /// present and null.
        equals: Option<Value>,
    },
    /// Any shape that is neither of the above.
    Unsupported,
}

impl Condition {
    pub fn parse(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::Bool(b)) => Condition::Literal(*b),
            Some(Value::Object(map)) => match map.get("variable").and_then(Value::as_str) {
                Some(name) => Condition::Variable {
                    name: name.to_string(),
                    equals: map.get("equals").cloned(),
                },
                None => Condition::Unsupported,
            },
            _ => Condition::Unsupported,
        }
    }

    pub fn evaluate(&self, ctx: &ExecutionContext) -> bool {
        match self {
            Condition::Literal(b) => *b,
            Condition::Variable { name, equals } => {
                let resolved = ctx.lookup(name);
                match equals {
                    Some(expected) => resolved.is_some_and(|value| strict_equals(value, expected)),
                    None => resolved.is_some_and(is_truthy),
                }
            }
            Condition::Unsupported => false,
        }
    }
}

/// Equality where numbers compare by value, so `1` equals `1.0`.
fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// JavaScript-style truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn ctx_with(vars: Value, outputs: Value) -> ExecutionContext {
        let variables: Map<String, Value> = serde_json::from_value(vars).unwrap();
        let mut ctx = ExecutionContext::new("exec", 1, variables, 50);
        if let Value::Object(map) = outputs {
            for (k, v) in map {
                ctx.publish_output(&k, v);
            }
        }
        ctx
    }

    #[test]
    fn literal_conditions() {
        let ctx = ctx_with(json!({}), json!({}));
        assert!(Condition::parse(Some(&json!(true))).evaluate(&ctx));
        assert!(!Condition::parse(Some(&json!(false))).evaluate(&ctx));
    }

    #[test]
    fn equals_uses_strict_equality() {
        let ctx = ctx_with(json!({ "deploy": true, "count": "1" }), json!({}));
        let cond = Condition::parse(Some(&json!({ "variable": "deploy", "equals": true })));
        assert!(cond.evaluate(&ctx));

        let cond = Condition::parse(Some(&json!({ "variable": "count", "equals": 1 })));
        assert!(!cond.evaluate(&ctx));
    }

    #[test]
    fn equals_compares_numbers_by_value() {
        let ctx = ctx_with(json!({ "n": 1.0, "ratio": 0.5 }), json!({ "retries": 3 }));
        let check = |raw: Value| Condition::parse(Some(&raw)).evaluate(&ctx);
        assert!(check(json!({ "variable": "n", "equals": 1 })));
        assert!(check(json!({ "variable": "ratio", "equals": 0.5 })));
        assert!(check(json!({ "variable": "retries", "equals": 3.0 })));
        assert!(!check(json!({ "variable": "n", "equals": 2 })));
        assert!(!check(json!({ "variable": "n", "equals": "1" })));
    }

    #[test]
    fn equals_null_does_not_match_missing_variable() {
        let ctx = ctx_with(json!({}), json!({}));
        let cond = Condition::parse(Some(&json!({ "variable": "ghost", "equals": null })));
        assert!(!cond.evaluate(&ctx));
    }

    #[test]
    fn truthiness_without_equals() {
        let ctx = ctx_with(
            json!({ "empty": "", "zero": 0, "list": [] }),
            json!({ "result": "ok" }),
        );
        let check = |name: &str| {
            Condition::parse(Some(&json!({ "variable": name }))).evaluate(&ctx)
        };
        assert!(!check("empty"));
        assert!(!check("zero"));
        assert!(check("list"));
        assert!(check("result"));
        assert!(!check("missing"));
    }

    #[test]
    fn variables_shadow_outputs() {
        let ctx = ctx_with(json!({ "flag": false }), json!({ "flag": true }));
        let cond = Condition::parse(Some(&json!({ "variable": "flag" })));
        assert!(!cond.evaluate(&ctx));
    }

    #[test]
    fn other_shapes_are_false() {
        let ctx = ctx_with(json!({ "x": true }), json!({}));
        for raw in [json!("x"), json!(1), json!({ "var": "x" }), json!(null)] {
            assert!(!Condition::parse(Some(&raw)).evaluate(&ctx), "raw: {raw}");
        }
        assert!(!Condition::parse(None).evaluate(&ctx));
    }
}
