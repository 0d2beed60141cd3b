//! Shared test helpers for handler and loop tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use murmur_config::AgentDefinition;
use murmur_core::{
    Action, ActionArgs, ActionFailure, AgentState, Connection, ConnectionRegistry,
};
use serde_json::{Value, json};

use crate::handlers::TaskContext;

/// A connection whose actions return scripted values and record every call.
///
/// Each action has a default response; `fail_next` queues one-shot failures
/// that take precedence over it.
pub struct ScriptedConnection {
    name: String,
    llm: bool,
    actions: HashMap<String, Action>,
    defaults: Mutex<HashMap<String, Value>>,
    queued: Mutex<HashMap<String, VecDeque<Result<Value, ActionFailure>>>>,
    calls: Mutex<Vec<(String, ActionArgs)>>,
}

impl ScriptedConnection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            llm: false,
            actions: HashMap::new(),
            defaults: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A model provider answering `generate-text`.
    pub fn llm(name: &str) -> Self {
        let mut connection = Self::new(name)
            .with_response("generate-text", json!("generated text"))
            .with_response("check-model", json!(true));
        connection.llm = true;
        connection
    }

    pub fn twitter(name: &str) -> Self {
        Self::new(name)
            .with_response("read-timeline", json!([]))
            .with_response("post-tweet", json!({"id": "t1"}))
            .with_response("reply-to-tweet", json!({"id": "r1"}))
            .with_response("like-tweet", json!({"liked": true}))
            .with_response("get-tweet-replies", json!([]))
            .with_response("get-latest-tweets-from-user", json!([]))
    }

    pub fn echochambers(name: &str) -> Self {
        Self::new(name)
            .with_response(
                "get-room-info",
                json!({"id": "general", "name": "General", "topic": "anything", "tags": []}),
            )
            .with_response("get-room-history", json!([]))
            .with_response("send-message", json!({"id": "m1"}))
    }

    /// Declare `action` and set its default response.
    pub fn with_response(mut self, action: &str, value: Value) -> Self {
        self.actions
            .insert(action.to_string(), Action::new(action, "scripted", vec![]));
        self.respond(action, value);
        self
    }

    /// Replace the default response of an already declared action.
    pub fn respond(&self, action: &str, value: Value) {
        self.defaults
            .lock()
            .unwrap()
            .insert(action.to_string(), value);
    }

    /// Make the next call to `action` fail.
    pub fn fail_next(&self, action: &str, failure: ActionFailure) {
        self.queued
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(Err(failure));
    }

    pub fn calls_to(&self, action: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == action)
            .count()
    }

    pub fn last_call(&self, action: &str) -> Option<ActionArgs> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == action)
            .map(|(_, args)| args.clone())
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_llm_provider(&self) -> bool {
        self.llm
    }

    fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    fn actions(&self) -> Vec<&Action> {
        self.actions.values().collect()
    }

    async fn is_configured(&self, _verbose: bool) -> bool {
        true
    }

    async fn invoke(&self, action: &str, args: ActionArgs) -> Result<Value, ActionFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), args));

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(action)
            .and_then(VecDeque::pop_front);
        if let Some(result) = queued {
            return result;
        }

        self.defaults
            .lock()
            .unwrap()
            .get(action)
            .cloned()
            .ok_or_else(|| ActionFailure::Other(format!("no scripted response for '{action}'")))
    }
}

/// A valid definition with `overrides` merged over the top-level fields.
pub fn definition(overrides: Value) -> AgentDefinition {
    let mut base = json!({
        "name": "Murmur",
        "bio": ["You are Murmur, a quiet observer of the internet."],
        "traits": ["Curious"],
        "examples": [],
        "loop_delay": 900,
        "config": [],
        "tasks": []
    });
    if let (Some(base), Some(overrides)) = (base.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }
    AgentDefinition::from_value(base).unwrap()
}

/// Everything a [`TaskContext`] borrows, owned in one place.
pub struct Fixture {
    pub registry: ConnectionRegistry,
    pub connections: HashMap<String, Arc<ScriptedConnection>>,
    pub state: AgentState,
    pub definition: AgentDefinition,
    pub model_provider: String,
    pub system_prompt: String,
    pub username: Option<String>,
    pub now: DateTime<Utc>,
}

impl Fixture {
    /// `config` becomes the definition's connection entries.
    pub fn new(config: Value, connections: Vec<ScriptedConnection>) -> Self {
        let mut registry = ConnectionRegistry::new();
        let mut by_name = HashMap::new();
        let mut model_provider = None;
        for connection in connections {
            let connection = Arc::new(connection);
            if connection.llm && model_provider.is_none() {
                model_provider = Some(connection.name.clone());
            }
            registry.register(connection.clone()).unwrap();
            by_name.insert(connection.name.clone(), connection);
        }

        Self {
            registry,
            connections: by_name,
            state: AgentState::new(),
            definition: definition(json!({ "config": config })),
            model_provider: model_provider.unwrap_or_else(|| "openai".into()),
            system_prompt: "You are Murmur.".into(),
            username: Some("murmur_bot".into()),
            now: DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    pub fn context(&mut self) -> TaskContext<'_> {
        TaskContext {
            registry: &self.registry,
            state: &mut self.state,
            definition: &self.definition,
            model_provider: &self.model_provider,
            system_prompt: &self.system_prompt,
            username: self.username.as_deref(),
            now: self.now,
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += TimeDelta::from_std(by).unwrap();
    }

    pub fn connection(&self, name: &str) -> &ScriptedConnection {
        &self.connections[name]
    }
}
