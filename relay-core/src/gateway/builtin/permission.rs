//! Permission middleware (§4.4.2): evaluates a list of rules loaded from a
//! JSON asset against each request's params plus an injected function
//! wrapper.
//!
//! Rule expressions are a small `key OP value` predicate language rather
//! than a general embedded expression interpreter — no expression-evaluator
//! crate appears anywhere in the corpus this framework is built from, so a
//! full language would be an ungrounded dependency. The predicate shape
//! below covers the rule contract (`If` gates whether a rule applies;
//! `Condition` gates whether the request is allowed) without inventing one.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{sentinel, RelayError};
use crate::gateway::middleware::{InOutcome, Middleware, MiddlewareType};
use crate::types::Map;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PermissionRule {
    pub version: String,
    /// Comma-separated API name list.
    pub api: String,
    #[serde(default)]
    pub r#if: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// A caller-supplied function evaluated against the merged environment
/// (request params plus any other registered functions), e.g. `isAdmin`.
pub type PermissionFn = Arc<dyn Fn(&Map) -> bool + Send + Sync>;

/// Parses and evaluates `key==value` / `key!=value` predicates, or a bare
/// function name registered in the function wrapper, against `env`.
fn eval(expr: &str, env: &Map, functions: &HashMap<String, PermissionFn>) -> bool {
    let expr = expr.trim();
    if expr.is_empty() {
        return true;
    }
    if let Some(f) = functions.get(expr) {
        return f(env);
    }
    if let Some((lhs, rhs)) = expr.split_once("==") {
        return field_eq(env, lhs.trim(), rhs.trim());
    }
    if let Some((lhs, rhs)) = expr.split_once("!=") {
        return !field_eq(env, lhs.trim(), rhs.trim());
    }
    false
}

fn field_eq(env: &Map, field: &str, literal: &str) -> bool {
    let literal = literal.trim_matches('"');
    match env.get(field) {
        Some(Value::String(s)) => s == literal,
        Some(Value::Bool(b)) => literal.parse::<bool>().map(|l| *b == l).unwrap_or(false),
        Some(Value::Number(n)) => literal.parse::<f64>().ok().and_then(|l| n.as_f64().map(|v| v == l)).unwrap_or(false),
        _ => false,
    }
}

pub struct PermissionMiddleware {
    rules: Vec<PermissionRule>,
    functions: HashMap<String, PermissionFn>,
}

impl PermissionMiddleware {
    pub fn new(rules: Vec<PermissionRule>) -> Self {
        PermissionMiddleware { rules, functions: HashMap::new() }
    }

    pub fn with_function(mut self, name: impl Into<String>, f: PermissionFn) -> Self {
        self.functions.insert(name.into(), f);
        self
    }

    fn matches(rule: &PermissionRule, version: &str, api: &str) -> bool {
        !rule.disabled && rule.version == version && rule.api.split(',').map(str::trim).any(|a| a == api)
    }
}

#[async_trait::async_trait]
impl Middleware for PermissionMiddleware {
    fn name(&self) -> &str {
        "permission"
    }

    fn kind(&self) -> MiddlewareType {
        MiddlewareType::In
    }

    async fn handle_in(&self, _seq: u64, version: &str, api: &str, params: &mut Map) -> Result<InOutcome, RelayError> {
        for rule in &self.rules {
            if !Self::matches(rule, version, api) {
                continue;
            }
            let applies = rule.r#if.as_deref().map(|e| eval(e, params, &self.functions)).unwrap_or(true);
            if !applies {
                continue;
            }
            let allowed = rule.condition.as_deref().map(|e| eval(e, params, &self.functions)).unwrap_or(true);
            if !allowed {
                return Err(sentinel::caller_unauthorized_access(format!("{version}/{api} denied by permission rule")));
            }
        }
        Ok(InOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_with_false_condition_denies() {
        let mw = PermissionMiddleware::new(vec![PermissionRule {
            version: "v1".to_string(),
            api: "Admin,AdminTwo".to_string(),
            r#if: None,
            condition: Some("Role==\"admin\"".to_string()),
            disabled: false,
        }]);
        let mut params = Map::new();
        params.insert("Role".to_string(), Value::from("user"));
        let err = mw.handle_in(1, "v1", "Admin", &mut params).await.unwrap_err();
        assert_eq!(err.code, crate::error::Code::CallerUnauthorizedAccess);
    }

    #[tokio::test]
    async fn matching_condition_allows() {
        let mw = PermissionMiddleware::new(vec![PermissionRule {
            version: "v1".to_string(),
            api: "Admin".to_string(),
            r#if: None,
            condition: Some("Role==\"admin\"".to_string()),
            disabled: false,
        }]);
        let mut params = Map::new();
        params.insert("Role".to_string(), Value::from("admin"));
        let outcome = mw.handle_in(1, "v1", "Admin", &mut params).await.unwrap();
        assert!(matches!(outcome, InOutcome::Continue));
    }

    #[tokio::test]
    async fn disabled_rule_is_ignored() {
        let mw = PermissionMiddleware::new(vec![PermissionRule {
            version: "v1".to_string(),
            api: "Admin".to_string(),
            r#if: None,
            condition: Some("Role==\"admin\"".to_string()),
            disabled: true,
        }]);
        let mut params = Map::new();
        params.insert("Role".to_string(), Value::from("user"));
        let outcome = mw.handle_in(1, "v1", "Admin", &mut params).await.unwrap();
        assert!(matches!(outcome, InOutcome::Continue));
    }

    #[tokio::test]
    async fn unmatched_rule_does_not_apply() {
        let mw = PermissionMiddleware::new(vec![PermissionRule {
            version: "v1".to_string(),
            api: "Other".to_string(),
            r#if: None,
            condition: Some("Role==\"admin\"".to_string()),
            disabled: false,
        }]);
        let mut params = Map::new();
        let outcome = mw.handle_in(1, "v1", "Admin", &mut params).await.unwrap();
        assert!(matches!(outcome, InOutcome::Continue));
    }
}
