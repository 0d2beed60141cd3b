//! Connection registry holding every configured connection by name.
//!
//! Resolves action requests to the right connection and keeps registration
//! order for introspection and provider selection.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::connection::{ActionArgs, Connection};
use crate::error::{ConnectionError, Result};
use crate::request::ActionRequest;

/// Process-wide collection of instantiated connections, keyed by name.
pub struct ConnectionRegistry {
    connections: Vec<Arc<dyn Connection>>,
    index: HashMap<String, usize>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a connection. Names must be unique.
    pub fn register(&mut self, connection: Arc<dyn Connection>) -> Result<()> {
        let name = connection.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ConnectionError::DuplicateConnection(name));
        }
        info!(connection = %name, actions = connection.actions().len(), "Registered connection");
        self.index.insert(name, self.connections.len());
        self.connections.push(connection);
        Ok(())
    }

    /// Get a connection by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Connection>> {
        self.index.get(name).map(|&i| &self.connections[i])
    }

    /// Whether a connection with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered connection names, in registration order.
    pub fn list_connections(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.name()).collect()
    }

    /// Names of every language-model provider, in registration order.
    pub fn get_model_providers(&self) -> Vec<&str> {
        self.connections
            .iter()
            .filter(|c| c.is_llm_provider())
            .map(|c| c.name())
            .collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Perform an action on a named connection.
    pub async fn perform_action(
        &self,
        connection_name: &str,
        action_name: &str,
        params: ActionArgs,
    ) -> Result<Value> {
        let connection = self
            .get(connection_name)
            .ok_or_else(|| ConnectionError::UnknownConnection(connection_name.to_string()))?;
        connection.perform_action(action_name, params).await
    }

    /// Perform an action described by an inbound request.
    pub async fn dispatch(&self, request: ActionRequest) -> Result<Value> {
        self.perform_action(&request.connection, &request.action, request.args)
            .await
    }

    /// Run readiness checks on all connections.
    pub async fn check_all(&self, verbose: bool) -> Vec<(String, bool)> {
        let mut results = Vec::with_capacity(self.connections.len());
        for connection in &self.connections {
            let ready = connection.is_configured(verbose).await;
            results.push((connection.name().to_string(), ready));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Action, ActionParameter, ActionTable, ParamType};
    use crate::error::ActionFailure;
    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use serde_json::json;

    struct MockConnection {
        name: String,
        llm: bool,
        actions: ActionTable<Self>,
    }

    impl MockConnection {
        fn new(name: &str, llm: bool) -> Self {
            let mut actions = ActionTable::new();
            actions.register(
                Action::new(
                    "echo",
                    "Echo a message",
                    vec![ActionParameter::required("msg", ParamType::String, "Message")],
                ),
                Self::echo,
            );
            Self {
                name: name.into(),
                llm,
                actions,
            }
        }

        fn echo(&self, args: ActionArgs) -> BoxFuture<'_, std::result::Result<Value, ActionFailure>> {
            Box::pin(async move { Ok(args.get("msg").cloned().unwrap_or(Value::Null)) })
        }
    }

    #[async_trait]
    impl Connection for MockConnection {
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
            self.actions.descriptors()
        }

        async fn is_configured(&self, _verbose: bool) -> bool {
            true
        }

        async fn invoke(
            &self,
            action: &str,
            args: ActionArgs,
        ) -> std::result::Result<Value, ActionFailure> {
            self.actions.invoke(self, action, args).await
        }
    }

    fn registry() -> ConnectionRegistry {
        let mut reg = ConnectionRegistry::new();
        reg.register(Arc::new(MockConnection::new("alpha", false))).unwrap();
        reg.register(Arc::new(MockConnection::new("beta", true))).unwrap();
        reg
    }

    #[test]
    fn empty_registry() {
        let reg = ConnectionRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
        assert!(reg.get_model_providers().is_empty());
    }

    #[test]
    fn list_keeps_registration_order() {
        let reg = registry();
        assert_eq!(reg.list_connections(), vec!["alpha", "beta"]);
        assert_eq!(reg.get_model_providers(), vec!["beta"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut reg = registry();
        let err = reg
            .register(Arc::new(MockConnection::new("alpha", false)))
            .unwrap_err();
        assert!(matches!(err, ConnectionError::DuplicateConnection(name) if name == "alpha"));
        assert_eq!(reg.len(), 2);
    }

    #[tokio::test]
    async fn round_trip_through_registry() {
        let reg = registry();
        let params = json!({"msg": "hi"}).as_object().cloned().unwrap();
        let out = reg.perform_action("alpha", "echo", params).await.unwrap();
        assert_eq!(out, json!("hi"));

        let params = json!({"msg": 5}).as_object().cloned().unwrap();
        let err = reg.perform_action("alpha", "echo", params).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Validation { .. }));
    }

    #[tokio::test]
    async fn unknown_connection_is_rejected() {
        let reg = registry();
        let err = reg.perform_action("nope", "x", ActionArgs::new()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::UnknownConnection(name) if name == "nope"));
    }

    #[tokio::test]
    async fn dispatch_request() {
        let reg = registry();
        let request = ActionRequest::from_value(json!({
            "connection": "beta",
            "action": "echo",
            "args": {"msg": "queued"}
        }))
        .unwrap();
        assert_eq!(reg.dispatch(request).await.unwrap(), json!("queued"));
    }

    #[tokio::test]
    async fn check_all_reports_each_connection() {
        let reg = registry();
        let results = reg.check_all(false).await;
        assert_eq!(results, vec![("alpha".to_string(), true), ("beta".to_string(), true)]);
    }
}
