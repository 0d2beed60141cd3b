//! Anthropic Messages API connection.
//!
//! Anthropic uses its own format, distinct from OpenAI: the system prompt is
//! a top-level field and `max_tokens` is mandatory.

use async_trait::async_trait;
use futures::future::BoxFuture;
use murmur_core::{
    Action, ActionArgs, ActionFailure, ActionParameter, ActionTable, Connection,
    ConnectionSettings, ParamType, Result,
};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::ActionResult;
use crate::http::{self, Credential};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const DEFAULT_MAX_TOKENS: u64 = 1024;
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicConnection {
    name: String,
    model: String,
    base_url: String,
    api_key: Credential,
    max_tokens: u64,
    timeout_secs: u64,
    client: reqwest::Client,
    actions: ActionTable<Self>,
}

impl AnthropicConnection {
    pub fn from_settings(name: &str, settings: &Map<String, Value>) -> Result<Self> {
        let mut reader = ConnectionSettings::new(name, settings);
        let model = reader.required_str("model");
        let base_url = reader.str_or("base_url", DEFAULT_BASE_URL);
        let api_key_env = reader.str_or("api_key_env", DEFAULT_API_KEY_ENV);
        let max_tokens = reader.u64_or("max_tokens", DEFAULT_MAX_TOKENS);
        let timeout_secs = reader.u64_or("timeout_secs", http::DEFAULT_TIMEOUT_SECS);
        if max_tokens == 0 {
            reader.problem("'max_tokens' must be greater than zero");
        }
        reader.finish()?;

        let mut actions = ActionTable::new();
        actions.register(
            Action::new(
                "generate-text",
                "Generate text using the configured Claude model",
                vec![
                    ActionParameter::required("prompt", ParamType::String, "The input prompt"),
                    ActionParameter::required(
                        "system_prompt",
                        ParamType::String,
                        "System prompt to steer the model",
                    ),
                ],
            ),
            Self::generate_text,
        );
        actions.register(
            Action::new(
                "check-model",
                "Check that the configured model is available",
                vec![],
            ),
            Self::check_model,
        );

        Ok(Self {
            name: name.to_string(),
            model,
            base_url: http::trim_base(&base_url),
            api_key: Credential::new(api_key_env),
            max_tokens,
            timeout_secs,
            client: http::build_client(timeout_secs),
            actions,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> std::result::Result<reqwest::RequestBuilder, ActionFailure> {
        Ok(builder
            .header("x-api-key", self.api_key.require()?)
            .header("anthropic-version", API_VERSION))
    }

    fn generate_text(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let prompt = http::str_arg(&args, "prompt")?;
            let system_prompt = http::str_arg(&args, "system_prompt")?;

            let body = json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "system": system_prompt,
                "messages": [{"role": "user", "content": prompt}],
            });

            debug!(connection = %self.name, model = %self.model, "Sending Anthropic request");

            let response = self
                .request(self.client.post(format!("{}/v1/messages", self.base_url)))?
                .json(&body)
                .send()
                .await
                .map_err(|e| http::send_error(e, self.timeout_secs))?;
            let payload = http::read_json(response).await?;

            let text: String = payload["content"]
                .as_array()
                .ok_or_else(|| ActionFailure::InvalidResponse("Missing 'content' in response".into()))?
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect();
            Ok(Value::String(text.trim().to_string()))
        })
    }

    fn check_model(&self, _args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let response = self
                .request(
                    self.client
                        .get(format!("{}/v1/models/{}", self.base_url, self.model)),
                )?
                .send()
                .await
                .map_err(|e| http::send_error(e, self.timeout_secs))?;
            http::read_json(response).await?;
            Ok(json!({"model": self.model, "available": true}))
        })
    }
}

#[async_trait]
impl Connection for AnthropicConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_llm_provider(&self) -> bool {
        true
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

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::ConnectionError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection(base_url: &str, key_env: &str) -> AnthropicConnection {
        let settings = json!({
            "model": "claude-3-5-haiku-latest",
            "base_url": base_url,
            "api_key_env": key_env,
        });
        AnthropicConnection::from_settings("anthropic", settings.as_object().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn generate_text_joins_text_blocks() {
        unsafe { std::env::set_var("MURMUR_TEST_ANTHROPIC_KEY_GEN", "ak-test") };
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({"system": "persona", "max_tokens": 1024})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Hello "},
                    {"type": "text", "text": "there"}
                ]
            })))
            .mount(&server)
            .await;

        let conn = connection(&server.uri(), "MURMUR_TEST_ANTHROPIC_KEY_GEN");
        let args = json!({"prompt": "greet", "system_prompt": "persona"})
            .as_object()
            .cloned()
            .unwrap();
        let out = conn.perform_action("generate-text", args).await.unwrap();
        assert_eq!(out, json!("Hello there"));
    }

    #[tokio::test]
    async fn unknown_model_fails_check() {
        unsafe { std::env::set_var("MURMUR_TEST_ANTHROPIC_KEY_CHECK", "ak-test") };
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models/claude-3-5-haiku-latest"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not_found_error"))
            .mount(&server)
            .await;

        let conn = connection(&server.uri(), "MURMUR_TEST_ANTHROPIC_KEY_CHECK");
        let err = conn
            .perform_action("check-model", ActionArgs::new())
            .await
            .unwrap_err();
        match err.failure() {
            Some(ActionFailure::Api { status, .. }) => assert_eq!(*status, 404),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let settings = json!({"model": "claude", "max_tokens": 0});
        let err = AnthropicConnection::from_settings("anthropic", settings.as_object().unwrap())
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::Configuration { .. }));
    }
}
