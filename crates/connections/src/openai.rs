//! OpenAI-compatible language model connection.
//!
//! Works with OpenAI and any endpoint exposing `/chat/completions` and
//! `/models` (OpenRouter, Ollama, vLLM); point `base_url` elsewhere and give
//! the entry its own `name` with `kind = "openai"`.

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiConnection {
    name: String,
    model: String,
    base_url: String,
    api_key: Credential,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
    timeout_secs: u64,
    client: reqwest::Client,
    actions: ActionTable<Self>,
}

impl OpenAiConnection {
    /// Build from a connection entry's settings, reporting every problem.
    pub fn from_settings(name: &str, settings: &Map<String, Value>) -> Result<Self> {
        let mut reader = ConnectionSettings::new(name, settings);
        let model = reader.required_str("model");
        let base_url = reader.str_or("base_url", DEFAULT_BASE_URL);
        let api_key_env = reader.str_or("api_key_env", DEFAULT_API_KEY_ENV);
        let temperature = reader.optional_f64("temperature");
        let max_tokens = reader.optional_u64("max_tokens");
        let timeout_secs = reader.u64_or("timeout_secs", http::DEFAULT_TIMEOUT_SECS);
        if let Some(t) = temperature {
            if !(0.0..=2.0).contains(&t) {
                reader.problem(format!("'temperature' must be between 0 and 2, got {t}"));
            }
        }
        reader.finish()?;

        Ok(Self {
            name: name.to_string(),
            model,
            base_url: http::trim_base(&base_url),
            api_key: Credential::new(api_key_env),
            temperature,
            max_tokens,
            timeout_secs,
            client: http::build_client(timeout_secs),
            actions: Self::action_table(),
        })
    }

    fn action_table() -> ActionTable<Self> {
        let mut actions = ActionTable::new();
        actions.register(
            Action::new(
                "generate-text",
                "Generate text using the configured model",
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
        actions.register(
            Action::new("list-models", "List the models the endpoint serves", vec![]),
            Self::list_models,
        );
        actions
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_text(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let prompt = http::str_arg(&args, "prompt")?;
            let system_prompt = http::str_arg(&args, "system_prompt")?;
            let api_key = self.api_key.require()?;

            let mut body = json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": prompt},
                ],
            });
            if let Some(temperature) = self.temperature {
                body["temperature"] = json!(temperature);
            }
            if let Some(max_tokens) = self.max_tokens {
                body["max_tokens"] = json!(max_tokens);
            }

            debug!(connection = %self.name, model = %self.model, "Sending completion request");

            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| http::send_error(e, self.timeout_secs))?;
            let payload = http::read_json(response).await?;

            payload["choices"][0]["message"]["content"]
                .as_str()
                .map(|text| Value::String(text.trim().to_string()))
                .ok_or_else(|| ActionFailure::InvalidResponse("No choices in response".into()))
        })
    }

    async fn fetch_models(&self) -> std::result::Result<Vec<String>, ActionFailure> {
        let api_key = self.api_key.require()?;
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout_secs))?;
        let payload = http::read_json(response).await?;

        let models = payload["data"]
            .as_array()
            .ok_or_else(|| ActionFailure::InvalidResponse("Missing 'data' in model list".into()))?
            .iter()
            .filter_map(|m| m["id"].as_str().map(String::from))
            .collect();
        Ok(models)
    }

    fn check_model(&self, _args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let models = self.fetch_models().await?;
            if models.iter().any(|m| m == &self.model) {
                Ok(json!({"model": self.model, "available": true}))
            } else {
                Err(ActionFailure::Other(format!(
                    "Model '{}' is not served by {}",
                    self.model, self.base_url
                )))
            }
        })
    }

    fn list_models(&self, _args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move { Ok(json!(self.fetch_models().await?)) })
    }
}

#[async_trait]
impl Connection for OpenAiConnection {
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

    fn connection(base_url: &str, key_env: &str) -> OpenAiConnection {
        let settings = json!({
            "model": "gpt-4o-mini",
            "base_url": base_url,
            "api_key_env": key_env,
            "temperature": 0.7,
        });
        OpenAiConnection::from_settings("openai", settings.as_object().unwrap()).unwrap()
    }

    fn args(value: Value) -> ActionArgs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_model_is_a_configuration_error() {
        let settings = json!({"temperature": 5.0});
        let err = OpenAiConnection::from_settings("openai", settings.as_object().unwrap())
            .err()
            .unwrap();
        match err {
            ConnectionError::Configuration { problems, .. } => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn generate_text_sends_both_prompts() {
        unsafe { std::env::set_var("MURMUR_TEST_OPENAI_KEY_GEN", "sk-test") };
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "say hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": " hi \n"}}]
            })))
            .mount(&server)
            .await;

        let conn = connection(&server.uri(), "MURMUR_TEST_OPENAI_KEY_GEN");
        let out = conn
            .perform_action(
                "generate-text",
                args(json!({"prompt": "say hi", "system_prompt": "be brief"})),
            )
            .await
            .unwrap();
        assert_eq!(out, json!("hi"));
    }

    #[tokio::test]
    async fn missing_key_means_not_configured() {
        let conn = connection("http://127.0.0.1:1", "MURMUR_TEST_OPENAI_KEY_UNSET");
        assert!(!conn.is_configured(false).await);
        let err = conn
            .perform_action("list-models", ActionArgs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn check_model_looks_for_configured_model() {
        unsafe { std::env::set_var("MURMUR_TEST_OPENAI_KEY_MODELS", "sk-test") };
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "gpt-4o"}, {"id": "gpt-4o-mini"}]
            })))
            .mount(&server)
            .await;

        let conn = connection(&server.uri(), "MURMUR_TEST_OPENAI_KEY_MODELS");
        let models = conn
            .perform_action("list-models", ActionArgs::new())
            .await
            .unwrap();
        assert_eq!(models, json!(["gpt-4o", "gpt-4o-mini"]));

        let status = conn
            .perform_action("check-model", ActionArgs::new())
            .await
            .unwrap();
        assert_eq!(status["available"], json!(true));
    }

    #[tokio::test]
    async fn rate_limit_surfaces_as_execution_error() {
        unsafe { std::env::set_var("MURMUR_TEST_OPENAI_KEY_429", "sk-test") };
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let conn = connection(&server.uri(), "MURMUR_TEST_OPENAI_KEY_429");
        let err = conn
            .perform_action(
                "generate-text",
                args(json!({"prompt": "x", "system_prompt": "y"})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(7));
    }

    #[test]
    fn declares_itself_a_model_provider() {
        let conn = connection("http://localhost", "MURMUR_TEST_OPENAI_KEY_UNSET");
        assert!(conn.is_llm_provider());
        let names: Vec<&str> = conn.actions().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["check-model", "generate-text", "list-models"]);
    }
}
