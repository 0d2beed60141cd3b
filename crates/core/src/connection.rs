//! Connection trait: the abstraction over agent backends.
//!
//! A connection is a named backend (an LLM API, a social platform, a web
//! scraper) exposing a set of actions. Every action declares its parameters
//! up front so requests can be validated before anything touches the network.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ActionFailure, ConnectionError, Result};

/// Arguments passed to an action, keyed by parameter name.
pub type ActionArgs = serde_json::Map<String, Value>;

/// The concrete implementation behind one action of connection `C`.
pub type ActionHandler<C> =
    for<'a> fn(&'a C, ActionArgs) -> BoxFuture<'a, std::result::Result<Value, ActionFailure>>;

/// Semantic type tag of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
    List,
    Object,
}

impl ParamType {
    /// Check `value` against this type, coercing where a lossless path exists
    /// (numeric strings to numbers, "true"/"false" to booleans).
    ///
    /// Strings are never produced from other types.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::String, Value::String(_)) => Some(value.clone()),

            (Self::Int, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Some(value.clone())
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| Value::from(f as i64))
                }
            }
            (Self::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

            (Self::Float, Value::Number(n)) => n.as_f64().map(Value::from),
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from),

            (Self::Bool, Value::Bool(_)) => Some(value.clone()),
            (Self::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },

            (Self::List, Value::Array(_)) => Some(value.clone()),
            (Self::Object, Value::Object(_)) => Some(value.clone()),
            _ => None,
        }
    }

    fn json_schema_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::List => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// One declared parameter of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
}

impl ActionParameter {
    pub fn required(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            kind,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind,
            description: description.into(),
        }
    }
}

/// Descriptor of a single named, parameter-validated operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub parameters: Vec<ActionParameter>,
    pub description: String,
}

impl Action {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ActionParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            description: description.into(),
        }
    }

    /// Validate `params` against the declared parameters.
    ///
    /// Returns the coerced arguments, or every violation found. Parameters
    /// the action does not declare are passed through untouched; explicit
    /// `null` counts as absent.
    pub fn validate(&self, mut params: ActionArgs) -> std::result::Result<ActionArgs, Vec<String>> {
        let mut violations = Vec::new();

        for param in &self.parameters {
            let value = params.remove(&param.name).filter(|v| !v.is_null());
            match value {
                None if param.required => {
                    violations.push(format!("Missing required parameter: {}", param.name));
                }
                None => {}
                Some(value) => match param.kind.coerce(&value) {
                    Some(coerced) => {
                        params.insert(param.name.clone(), coerced);
                    }
                    None => violations.push(format!(
                        "Invalid type for {}: expected {}, got {}",
                        param.name,
                        param.kind,
                        json_kind(&value)
                    )),
                },
            }
        }

        if violations.is_empty() {
            Ok(params)
        } else {
            Err(violations)
        }
    }

    /// JSON Schema describing this action's parameters.
    pub fn parameters_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({
                        "type": p.kind.json_schema_type(),
                        "description": p.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

struct ActionEntry<C> {
    action: Action,
    handler: ActionHandler<C>,
}

/// Name-indexed dispatch table from action name to its descriptor and handler.
///
/// Built once in a connection's constructor and never mutated afterwards.
pub struct ActionTable<C> {
    entries: HashMap<String, ActionEntry<C>>,
}

impl<C> ActionTable<C> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register an action and the function implementing it.
    ///
    /// # Panics
    /// If the action name is already registered or the action declares the
    /// same parameter name twice. Both are programming errors in the
    /// connection's constructor.
    pub fn register(&mut self, action: Action, handler: ActionHandler<C>) {
        let mut seen = std::collections::HashSet::new();
        for param in &action.parameters {
            assert!(
                seen.insert(param.name.as_str()),
                "action '{}' declares parameter '{}' twice",
                action.name,
                param.name
            );
        }
        assert!(
            !self.entries.contains_key(&action.name),
            "action '{}' registered twice",
            action.name
        );
        self.entries
            .insert(action.name.clone(), ActionEntry { action, handler });
    }

    /// Get an action descriptor by name.
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.entries.get(name).map(|e| &e.action)
    }

    /// All action descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<&Action> {
        let mut actions: Vec<&Action> = self.entries.values().map(|e| &e.action).collect();
        actions.sort_by(|a, b| a.name.cmp(&b.name));
        actions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Route an already-validated call to the registered handler.
    pub async fn invoke(
        &self,
        connection: &C,
        name: &str,
        args: ActionArgs,
    ) -> std::result::Result<Value, ActionFailure> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ActionFailure::Other(format!("No handler registered for '{name}'")))?;
        (entry.handler)(connection, args).await
    }
}

impl<C> Default for ActionTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// The core Connection trait.
///
/// Each backend implements the descriptor lookups, `is_configured` and
/// `invoke`; the provided `perform_action` is the single dispatch entry point
/// and owns lookup, readiness and parameter validation.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The unique name of this connection (e.g., "twitter", "openai").
    fn name(&self) -> &str;

    /// Whether this connection can generate text for the agent.
    fn is_llm_provider(&self) -> bool {
        false
    }

    /// Look up an action descriptor.
    fn action(&self, name: &str) -> Option<&Action>;

    /// All registered action descriptors.
    fn actions(&self) -> Vec<&Action>;

    /// Best-effort check that credentials needed to operate are present.
    ///
    /// Must not fail; when `verbose`, logs what is missing.
    async fn is_configured(&self, verbose: bool) -> bool;

    /// Run the concrete implementation of a validated action.
    async fn invoke(&self, action: &str, args: ActionArgs) -> std::result::Result<Value, ActionFailure>;

    /// Validate and execute an action.
    async fn perform_action(&self, action_name: &str, params: ActionArgs) -> Result<Value> {
        let action = self
            .action(action_name)
            .ok_or_else(|| ConnectionError::UnknownAction {
                connection: self.name().to_string(),
                action: action_name.to_string(),
            })?;

        if !self.is_configured(true).await {
            return Err(ConnectionError::NotConfigured(self.name().to_string()));
        }

        let args = action
            .validate(params)
            .map_err(|violations| ConnectionError::Validation {
                connection: self.name().to_string(),
                action: action_name.to_string(),
                violations,
            })?;

        debug!(connection = %self.name(), action = %action_name, "Performing action");

        self.invoke(action_name, args)
            .await
            .map_err(|source| ConnectionError::Execution {
                connection: self.name().to_string(),
                action: action_name.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A simple test connection for unit tests.
    struct EchoConnection {
        actions: ActionTable<Self>,
        configured: bool,
        calls: AtomicUsize,
    }

    impl EchoConnection {
        fn new(configured: bool) -> Self {
            let mut actions = ActionTable::new();
            actions.register(
                Action::new(
                    "echo",
                    "Echoes back the message",
                    vec![ActionParameter::required("msg", ParamType::String, "Text to echo")],
                ),
                Self::echo,
            );
            actions.register(
                Action::new(
                    "triple",
                    "Needs three parameters",
                    vec![
                        ActionParameter::required("a", ParamType::String, "first"),
                        ActionParameter::required("b", ParamType::Int, "second"),
                        ActionParameter::required("c", ParamType::Bool, "third"),
                    ],
                ),
                Self::echo,
            );
            actions.register(Action::new("explode", "Always fails", vec![]), Self::explode);
            Self {
                actions,
                configured,
                calls: AtomicUsize::new(0),
            }
        }

        fn echo(&self, args: ActionArgs) -> BoxFuture<'_, std::result::Result<Value, ActionFailure>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(args.get("msg").cloned().unwrap_or(Value::Object(args)))
            })
        }

        fn explode(&self, _args: ActionArgs) -> BoxFuture<'_, std::result::Result<Value, ActionFailure>> {
            Box::pin(async move { Err(ActionFailure::Network("connection reset".into())) })
        }
    }

    #[async_trait]
    impl Connection for EchoConnection {
        fn name(&self) -> &str {
            "alpha"
        }
        fn action(&self, name: &str) -> Option<&Action> {
            self.actions.get(name)
        }
        fn actions(&self) -> Vec<&Action> {
            self.actions.descriptors()
        }
        async fn is_configured(&self, _verbose: bool) -> bool {
            self.configured
        }
        async fn invoke(&self, action: &str, args: ActionArgs) -> std::result::Result<Value, ActionFailure> {
            self.actions.invoke(self, action, args).await
        }
    }

    fn args(value: Value) -> ActionArgs {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn perform_action_round_trip() {
        let conn = EchoConnection::new(true);
        let out = conn.perform_action("echo", args(json!({"msg": "hi"}))).await.unwrap();
        assert_eq!(out, json!("hi"));
    }

    #[tokio::test]
    async fn wrong_type_is_rejected_without_executing() {
        let conn = EchoConnection::new(true);
        let err = conn.perform_action("echo", args(json!({"msg": 5}))).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Validation { .. }));
        assert_eq!(conn.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validation_lists_every_missing_parameter() {
        let conn = EchoConnection::new(true);
        let err = conn.perform_action("triple", args(json!({"a": "x"}))).await.unwrap_err();
        match err {
            ConnectionError::Validation { violations, .. } => {
                assert_eq!(violations.len(), 2);
                assert!(violations.iter().any(|v| v.ends_with(": b")));
                assert!(violations.iter().any(|v| v.ends_with(": c")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[tokio::test]
    async fn numeric_and_boolean_strings_are_coerced() {
        let conn = EchoConnection::new(true);
        let out = conn
            .perform_action("triple", args(json!({"a": "x", "b": "42", "c": "true"})))
            .await
            .unwrap();
        assert_eq!(out["b"], json!(42));
        assert_eq!(out["c"], json!(true));
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let conn = EchoConnection::new(true);
        let err = conn.perform_action("nope", ActionArgs::new()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::UnknownAction { .. }));
    }

    #[tokio::test]
    async fn unconfigured_connection_rejects_dispatch() {
        let conn = EchoConnection::new(false);
        let err = conn.perform_action("echo", args(json!({"msg": "hi"}))).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NotConfigured(name) if name == "alpha"));
        assert_eq!(conn.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn execution_failure_is_wrapped() {
        let conn = EchoConnection::new(true);
        let err = conn.perform_action("explode", ActionArgs::new()).await.unwrap_err();
        match err {
            ConnectionError::Execution { action, source, .. } => {
                assert_eq!(action, "explode");
                assert!(source.to_string().contains("connection reset"));
            }
            other => panic!("expected execution error, got {other}"),
        }
    }

    #[test]
    fn null_counts_as_absent() {
        let action = Action::new(
            "a",
            "",
            vec![ActionParameter::optional("count", ParamType::Int, "")],
        );
        let out = action.validate(args(json!({"count": null}))).unwrap();
        assert!(!out.contains_key("count"));
    }

    #[test]
    fn float_parameter_accepts_integers() {
        assert_eq!(ParamType::Float.coerce(&json!(3)), Some(json!(3.0)));
        assert_eq!(ParamType::Int.coerce(&json!(2.0)), Some(json!(2)));
        assert_eq!(ParamType::Int.coerce(&json!(2.5)), None);
        assert_eq!(ParamType::String.coerce(&json!(true)), None);
    }

    #[test]
    fn schema_lists_required_parameters() {
        let conn = EchoConnection::new(true);
        let schema = conn.action("triple").unwrap().parameters_schema();
        assert_eq!(schema["required"], json!(["a", "b", "c"]));
        assert_eq!(schema["properties"]["b"]["type"], "integer");
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn duplicate_parameter_names_panic() {
        let mut table: ActionTable<EchoConnection> = ActionTable::new();
        table.register(
            Action::new(
                "dup",
                "",
                vec![
                    ActionParameter::required("x", ParamType::String, ""),
                    ActionParameter::optional("x", ParamType::Int, ""),
                ],
            ),
            EchoConnection::echo,
        );
    }

    #[test]
    fn descriptors_are_sorted() {
        let conn = EchoConnection::new(true);
        let names: Vec<&str> = conn.actions().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "explode", "triple"]);
    }
}
