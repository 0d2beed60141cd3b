//! Twitter (X) API v2 connection.
//!
//! Authenticates with an OAuth 2.0 user-context bearer token. Tweets are
//! returned in a flattened shape shared by every read action:
//! `{id, text, author_id, author_username, created_at}`.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::BoxFuture;
use murmur_config::defaults;
use murmur_core::{
    Action, ActionArgs, ActionFailure, ActionParameter, ActionTable, Connection,
    ConnectionSettings, ParamType, Result,
};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::ActionResult;
use crate::http::{self, Credential};

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
const DEFAULT_ACCESS_TOKEN_ENV: &str = "TWITTER_ACCESS_TOKEN";
const DEFAULT_USER_ID_ENV: &str = "TWITTER_USER_ID";

/// The API only accepts page sizes in this range.
const MIN_RESULTS: u64 = 5;
const MAX_RESULTS: u64 = 100;

const TWEET_FIELDS: &str = "author_id,created_at,conversation_id";

pub struct TwitterConnection {
    name: String,
    base_url: String,
    access_token: Credential,
    user_id: Credential,
    timeline_read_count: u64,
    timeout_secs: u64,
    client: reqwest::Client,
    actions: ActionTable<Self>,
}

impl TwitterConnection {
    pub fn from_settings(name: &str, settings: &Map<String, Value>) -> Result<Self> {
        let mut reader = ConnectionSettings::new(name, settings);
        let tweet_interval = reader.u64_or("tweet_interval", defaults::TWEET_INTERVAL);
        reader.u64_or("own_tweet_replies_count", defaults::OWN_TWEET_REPLIES_COUNT);
        let timeline_read_count =
            reader.u64_or("timeline_read_count", defaults::TIMELINE_READ_COUNT);
        let base_url = reader.str_or("base_url", DEFAULT_BASE_URL);
        let access_token_env = reader.str_or("access_token_env", DEFAULT_ACCESS_TOKEN_ENV);
        let user_id_env = reader.str_or("user_id_env", DEFAULT_USER_ID_ENV);
        let timeout_secs = reader.u64_or("timeout_secs", http::DEFAULT_TIMEOUT_SECS);
        if timeline_read_count == 0 {
            reader.problem("'timeline_read_count' must be greater than zero");
        }
        reader.finish()?;

        debug!(connection = %name, tweet_interval, "Twitter connection configured");

        Ok(Self {
            name: name.to_string(),
            base_url: http::trim_base(&base_url),
            access_token: Credential::new(access_token_env),
            user_id: Credential::new(user_id_env),
            timeline_read_count,
            timeout_secs,
            client: http::build_client(timeout_secs),
            actions: Self::action_table(),
        })
    }

    fn action_table() -> ActionTable<Self> {
        let mut actions = ActionTable::new();
        actions.register(
            Action::new(
                "read-timeline",
                "Read the authenticated user's home timeline",
                vec![ActionParameter::optional("count", ParamType::Int, "Number of tweets to read")],
            ),
            Self::read_timeline,
        );
        actions.register(
            Action::new(
                "post-tweet",
                "Post a new tweet",
                vec![ActionParameter::required("message", ParamType::String, "Text of the tweet")],
            ),
            Self::post_tweet,
        );
        actions.register(
            Action::new(
                "reply-to-tweet",
                "Reply to an existing tweet",
                vec![
                    ActionParameter::required("tweet_id", ParamType::String, "ID of the tweet to reply to"),
                    ActionParameter::required("message", ParamType::String, "Text of the reply"),
                ],
            ),
            Self::reply_to_tweet,
        );
        actions.register(
            Action::new(
                "like-tweet",
                "Like a tweet",
                vec![ActionParameter::required("tweet_id", ParamType::String, "ID of the tweet to like")],
            ),
            Self::like_tweet,
        );
        actions.register(
            Action::new(
                "get-tweet-replies",
                "Fetch recent replies to a tweet",
                vec![
                    ActionParameter::required("tweet_id", ParamType::String, "ID of the tweet"),
                    ActionParameter::optional("count", ParamType::Int, "Number of replies to fetch"),
                ],
            ),
            Self::get_tweet_replies,
        );
        actions.register(
            Action::new(
                "get-latest-tweets-from-user",
                "Fetch the latest tweets posted by a user",
                vec![
                    ActionParameter::required("username", ParamType::String, "Username without '@'"),
                    ActionParameter::optional("count", ParamType::Int, "Number of tweets to fetch"),
                ],
            ),
            Self::get_latest_tweets_from_user,
        );
        actions
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> std::result::Result<Value, ActionFailure> {
        let token = self.access_token.require()?;
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout_secs))?;
        http::read_json(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> std::result::Result<Value, ActionFailure> {
        let token = self.access_token.require()?;
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout_secs))?;
        http::read_json(response).await
    }

    fn read_timeline(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let count = http::u64_arg(&args, "count", self.timeline_read_count);
            let user_id = self.user_id.require()?;
            let payload = self
                .get(
                    &format!("/2/users/{user_id}/timelines/reverse_chronological"),
                    &page_query(count),
                )
                .await?;
            let tweets = flatten_tweets(&payload, count);
            info!(connection = %self.name, count = tweets.len(), "Read timeline");
            Ok(Value::Array(tweets))
        })
    }

    fn post_tweet(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let message = http::str_arg(&args, "message")?;
            let payload = self.post("/2/tweets", &json!({"text": message})).await?;
            let id = created_id(&payload)?;
            info!(connection = %self.name, tweet_id = %id, "Posted tweet");
            Ok(json!({"id": id}))
        })
    }

    fn reply_to_tweet(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let tweet_id = http::str_arg(&args, "tweet_id")?;
            let message = http::str_arg(&args, "message")?;
            let body = json!({
                "text": message,
                "reply": {"in_reply_to_tweet_id": tweet_id},
            });
            let payload = self.post("/2/tweets", &body).await?;
            let id = created_id(&payload)?;
            info!(connection = %self.name, tweet_id = %id, in_reply_to = %tweet_id, "Posted reply");
            Ok(json!({"id": id, "in_reply_to": tweet_id}))
        })
    }

    fn like_tweet(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let tweet_id = http::str_arg(&args, "tweet_id")?;
            let user_id = self.user_id.require()?;
            let payload = self
                .post(&format!("/2/users/{user_id}/likes"), &json!({"tweet_id": tweet_id}))
                .await?;
            let liked = payload["data"]["liked"].as_bool().unwrap_or(false);
            Ok(json!({"tweet_id": tweet_id, "liked": liked}))
        })
    }

    fn get_tweet_replies(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let tweet_id = http::str_arg(&args, "tweet_id")?;
            let count = http::u64_arg(&args, "count", defaults::OWN_TWEET_REPLIES_COUNT);
            let mut query = page_query(count);
            query.push(("query", format!("conversation_id:{tweet_id} is:reply")));
            let payload = self.get("/2/tweets/search/recent", &query).await?;
            Ok(Value::Array(flatten_tweets(&payload, count)))
        })
    }

    fn get_latest_tweets_from_user(&self, args: ActionArgs) -> BoxFuture<'_, ActionResult> {
        Box::pin(async move {
            let username = http::str_arg(&args, "username")?.trim_start_matches('@');
            let count = http::u64_arg(&args, "count", self.timeline_read_count);

            let user = self.get(&format!("/2/users/by/username/{username}"), &[]).await?;
            let user_id = user["data"]["id"].as_str().ok_or_else(|| {
                ActionFailure::InvalidResponse(format!("No user id returned for '{username}'"))
            })?;

            let payload = self
                .get(&format!("/2/users/{user_id}/tweets"), &page_query(count))
                .await?;
            let mut tweets = flatten_tweets(&payload, count);
            for tweet in &mut tweets {
                if tweet["author_username"].is_null() {
                    tweet["author_username"] = json!(username);
                }
            }
            Ok(Value::Array(tweets))
        })
    }
}

fn page_query(count: u64) -> Vec<(&'static str, String)> {
    vec![
        ("max_results", count.clamp(MIN_RESULTS, MAX_RESULTS).to_string()),
        ("tweet.fields", TWEET_FIELDS.to_string()),
        ("expansions", "author_id".to_string()),
        ("user.fields", "username".to_string()),
    ]
}

/// Flatten a v2 list response, joining authors from `includes.users`.
fn flatten_tweets(payload: &Value, limit: u64) -> Vec<Value> {
    let usernames: HashMap<&str, &str> = payload["includes"]["users"]
        .as_array()
        .map(|users| {
            users
                .iter()
                .filter_map(|u| Some((u["id"].as_str()?, u["username"].as_str()?)))
                .collect()
        })
        .unwrap_or_default();

    payload["data"]
        .as_array()
        .map(|tweets| {
            tweets
                .iter()
                .take(limit as usize)
                .map(|tweet| {
                    let author_id = tweet["author_id"].as_str();
                    json!({
                        "id": tweet["id"],
                        "text": tweet["text"],
                        "author_id": author_id,
                        "author_username": author_id.and_then(|id| usernames.get(id)),
                        "created_at": tweet["created_at"],
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn created_id(payload: &Value) -> std::result::Result<String, ActionFailure> {
    payload["data"]["id"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| ActionFailure::InvalidResponse("No tweet id in response".into()))
}

#[async_trait]
impl Connection for TwitterConnection {
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
        let token = self.access_token.check(&self.name, verbose);
        let user = self.user_id.check(&self.name, verbose);
        token && user
    }

    async fn invoke(&self, action: &str, args: ActionArgs) -> ActionResult {
        self.actions.invoke(self, action, args).await
    }
}
