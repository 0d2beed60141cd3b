//! EchoChambers chat room connection.

use async_trait::async_trait;
use futures::future::BoxFuture;
use murmur_config::defaults;
use murmur_core::{
    Action, ActionArgs, ActionFailure, ActionParameter, ActionTable, Connection,
    ConnectionSettings, ParamType, Result,
};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::ActionResult;
use crate::http::{self, Credential};

const DEFAULT_BASE_URL: &str = "https://echochambers.ai";
const DEFAULT_API_KEY_ENV: &str = "ECHOCHAMBERS_API_KEY";
const DEFAULT_SENDER_USERNAME: &str = "murmur";
const DEFAULT_SENDER_MODEL: &str = "unknown";

pub struct EchoChambersConnection {
    name: String,
    base_url: String,
    room: String,
    sender_username: String,
    sender_model: String,
    history_read_count: u64,
    api_key: Credential,
    timeout_secs: u64,
    client: reqwest::Client,
    actions: ActionTable<Self>,
}

impl EchoChambersConnection {
    pub fn from_settings(name: &str, settings: &Map<String, Value>) -> Result<Self> {
        let mut reader = ConnectionSettings::new(name, settings);
        let room = reader.required_str("room");
        let base_url = reader.str_or("base_url", DEFAULT_BASE_URL);
        let sender_username = reader.str_or("sender_username", DEFAULT_SENDER_USERNAME);
        let sender_model = reader.str_or("sender_model", DEFAULT_SENDER_MODEL);
        reader.u64_or("message_interval", defaults::MESSAGE_INTERVAL);
        let history_read_count = reader.u64_or("history_read_count", defaults::HISTORY_READ_COUNT);
        let api_key_env = reader.str_or("api_key_env", DEFAULT_API_KEY_ENV);
        let timeout_secs = reader.u64_or("timeout_secs", http::DEFAULT_TIMEOUT_SECS);
        reader.finish()?;

        let mut actions = ActionTable::new();
        actions.register(
            Action::new("get-room-info", "Get the configured room's topic and tags", vec![]),
            Self::get_room_info,
        );
        actions.register(
            Action::new(
                "get-room-history",
                "Get recent messages in the room",
                vec![ActionParameter::optional("count", ParamType::Int, "Number of messages")],
            ),
            Self::get_room_history,
        );
        actions.register(
            Action::new(
                "send-message",
                "Send a message to the room",
                vec![ActionParameter::required("content", ParamType::String, "Message text")],
            ),
            Self::send_message,
        );

        Ok(Self {
            name: name.to_string(),
            base_url: http::trim_base(&base_url),
            room,
            sender_username,
            sender_model,
            history_read_count,
            api_key: Credential::new(api_key_env),
            timeout_secs,
            client: http::build_client(timeout_secs),
            actions,
        })
    }

    fn get_room_info(&self, _args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let response = self
                .client
                .get(format!("{}/api/rooms", self.base_url))
                .send()
                .await
                .map_err(|e| http::send_error(e, self.timeout_secs))?;
            let payload = http::read_json(response).await?;

            payload["rooms"]
                .as_array()
                .and_then(|rooms| rooms.iter().find(|r| r["id"] == self.room.as_str()))
                .map(|room| {
                    json!({
                        "id": room["id"],
                        "name": room["name"],
                        "topic": room["topic"],
                        "tags": room["tags"],
                    })
                })
                .ok_or_else(|| ActionFailure::InvalidResponse(format!("Room '{}' not found", self.room)))
        })
    }

    fn get_room_history(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let count = http::u64_arg(&args, "count", self.history_read_count) as usize;
            let response = self
                .client
                .get(format!("{}/api/rooms/{}/history", self.base_url, self.room))
                .send()
                .await
                .map_err(|e| http::send_error(e, self.timeout_secs))?;
            let payload = http::read_json(response).await?;

            let messages: Vec<Value> = payload["messages"]
                .as_array()
                .map(|messages| messages.iter().take(count).cloned().collect())
                .unwrap_or_default();
            Ok(Value::Array(messages))
        })
    }

    fn send_message(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let content = http::str_arg(&args, "content")?;
            let api_key = self.api_key.require()?;
            let body = json!({
                "content": content,
                "sender": {
                    "username": self.sender_username,
                    "model": self.sender_model,
                },
            });
            let response = self
                .client
                .post(format!("{}/api/rooms/{}/message", self.base_url, self.room))
                .header("x-api-key", api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| http::send_error(e, self.timeout_secs))?;
            let payload = http::read_json(response).await?;
            info!(connection = %self.name, room = %self.room, "Sent room message");
            Ok(payload)
        })
    }
}

#[async_trait]
impl Connection for EchoChambersConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    fn actions(&self) -> Vec<&Action> {
        self.actions.descriptors()
    }

    async fn is_configured(&self, verbose: bool) -> bool {
        self.api_key.check(&self.name, verbose)
    }

    async fn invoke(&self, action: &str, args: ActionArgs) -> ActionResult {
        self.actions.invoke(self, action, args).await
    }
}
