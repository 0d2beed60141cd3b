//! Firecrawl web scraping connection.

use async_trait::async_trait;
use futures::future::BoxFuture;
use murmur_core::{
    Action, ActionArgs, ActionFailure, ActionParameter, ActionTable, Connection,
    ConnectionSettings, ParamType, Result,
};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::ActionResult;
use crate::http::{self, Credential};

const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";
const DEFAULT_API_KEY_ENV: &str = "FIRECRAWL_API_KEY";

pub struct FirecrawlConnection {
    name: String,
    base_url: String,
    api_key: Credential,
    timeout_secs: u64,
    client: reqwest::Client,
    actions: ActionTable<Self>,
}

impl FirecrawlConnection {
    pub fn from_settings(name: &str, settings: &Map<String, Value>) -> Result<Self> {
        let mut reader = ConnectionSettings::new(name, settings);
        let base_url = reader.str_or("base_url", DEFAULT_BASE_URL);
        let api_key_env = reader.str_or("api_key_env", DEFAULT_API_KEY_ENV);
        let timeout_secs = reader.u64_or("timeout_secs", http::DEFAULT_TIMEOUT_SECS);
        reader.finish()?;

        let mut actions = ActionTable::new();
        actions.register(
            Action::new(
                "scrape-page",
                "Scrape a web page and return its content as markdown",
                vec![ActionParameter::required("url", ParamType::String, "The URL of the page to scrape")],
            ),
            Self::scrape_page,
        );

        Ok(Self {
            name: name.to_string(),
            base_url: http::trim_base(&base_url),
            api_key: Credential::new(api_key_env),
            timeout_secs,
            client: http::build_client(timeout_secs),
            actions,
        })
    }

    fn scrape_page(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let url = http::str_arg(&args, "url")?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ActionFailure::Other(format!("Not an http(s) URL: {url}")));
            }
            let api_key = self.api_key.require()?;

            let response = self
                .client
                .post(format!("{}/v1/scrape", self.base_url))
                .bearer_auth(api_key)
                .json(&json!({"url": url, "formats": ["markdown"]}))
                .send()
                .await
                .map_err(|e| http::send_error(e, self.timeout_secs))?;
            let payload = http::read_json(response).await?;

            if payload["success"] == false {
                return Err(ActionFailure::InvalidResponse(
                    payload["error"].as_str().unwrap_or("scrape failed").to_string(),
                ));
            }
            let markdown = payload["data"]["markdown"].as_str().ok_or_else(|| {
                ActionFailure::InvalidResponse("No markdown in scrape response".into())
            })?;
            info!(connection = %self.name, url = %url, "Scraped page");
            Ok(json!({
                "url": url,
                "markdown": markdown,
                "metadata": payload["data"]["metadata"],
            }))
        })
    }
}

#[async_trait]
impl Connection for FirecrawlConnection {
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection(base_url: &str, key_env: &str) -> FirecrawlConnection {
        unsafe { std::env::set_var(key_env, "fc-key") };
        let settings = json!({"base_url": base_url, "api_key_env": key_env});
        FirecrawlConnection::from_settings("firecrawl", settings.as_object().unwrap()).unwrap()
    }

    fn url_args(url: &str) -> ActionArgs {
        json!({"url": url}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn scrape_returns_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(body_partial_json(json!({"url": "https://example.com", "formats": ["markdown"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"markdown": "# Example", "metadata": {"title": "Example"}}
            })))
            .mount(&server)
            .await;

        let conn = connection(&server.uri(), "MURMUR_TEST_FIRECRAWL_KEY_OK");
        let out = conn
            .perform_action("scrape-page", url_args("https://example.com"))
            .await
            .unwrap();
        assert_eq!(out["markdown"], "# Example");
        assert_eq!(out["metadata"]["title"], "Example");
    }

    #[tokio::test]
    async fn unsuccessful_scrape_is_an_execution_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "blocked by robots.txt"
            })))
            .mount(&server)
            .await;

        let conn = connection(&server.uri(), "MURMUR_TEST_FIRECRAWL_KEY_FAIL");
        let err = conn
            .perform_action("scrape-page", url_args("https://example.com"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("robots.txt"));
    }

    #[tokio::test]
    async fn non_http_urls_are_refused() {
        let conn = connection("http://127.0.0.1:1", "MURMUR_TEST_FIRECRAWL_KEY_SCHEME");
        let err = conn
            .perform_action("scrape-page", url_args("file:///etc/passwd"))
            .await
            .unwrap_err();
        assert!(err.failure().is_some());
    }
}
