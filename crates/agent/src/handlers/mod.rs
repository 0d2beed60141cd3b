//! Task handlers: what the agent does once a task has been drawn.
//!
//! Every task name is bound to exactly one handler when the agent is built:
//! a task with an `action` binding goes to [`DispatchHandler`], known names
//! go to a built-in handler, anything else is a configuration error.

mod dispatch;
mod echochambers;
mod twitter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use murmur_config::{AgentDefinition, ConfigError};
use murmur_core::{ActionArgs, AgentState, ConnectionRegistry};
use serde_json::Value;
use tracing::warn;

use crate::error::AgentError;

pub use dispatch::DispatchHandler;
pub use echochambers::PostRoomMessage;
pub use twitter::{LikeTweet, PostTweet, ReplyToTweet};

/// Connection names the built-in handlers talk to.
pub const TWITTER: &str = "twitter";
pub const ECHOCHAMBERS: &str = "echochambers";

/// How a task ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The task did its work.
    Completed,
    /// Nothing to do (empty queue, posting suspended).
    Idle { reason: String },
    /// The task's minimum interval has not elapsed.
    CoolingDown { remaining: Duration },
}

impl TaskOutcome {
    pub fn idle(reason: impl Into<String>) -> Self {
        Self::Idle {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Everything a handler may read or change during one iteration.
pub struct TaskContext<'a> {
    pub registry: &'a ConnectionRegistry,
    pub state: &'a mut AgentState,
    pub definition: &'a AgentDefinition,
    /// Name of the connection used for text generation.
    pub model_provider: &'a str,
    pub system_prompt: &'a str,
    /// The agent's own username; `None` in degraded mode.
    pub username: Option<&'a str>,
    pub now: DateTime<Utc>,
}

impl TaskContext<'_> {
    /// Perform an action, logging the attempted parameters on failure.
    pub async fn perform(
        &self,
        connection: &str,
        action: &str,
        args: ActionArgs,
    ) -> Result<Value, AgentError> {
        let attempted = args.clone();
        self.registry
            .perform_action(connection, action, args)
            .await
            .map_err(|e| {
                warn!(
                    connection = %connection,
                    action = %action,
                    params = %serde_json::Value::Object(attempted),
                    error = %e,
                    "Action failed"
                );
                AgentError::from(e)
            })
    }

    /// Generate text with the model provider under the agent's system prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String, AgentError> {
        let mut args = ActionArgs::new();
        args.insert("prompt".into(), Value::from(prompt));
        args.insert("system_prompt".into(), Value::from(self.system_prompt));
        let output = self.perform(self.model_provider, "generate-text", args).await?;
        Ok(output.as_str().unwrap_or_default().trim().to_string())
    }

    /// An integer setting from a connection's configuration entry.
    pub fn setting_u64(&self, connection: &str, key: &str, default: u64) -> u64 {
        self.definition
            .connection(connection)
            .and_then(|entry| entry.settings.get(key))
            .and_then(Value::as_u64)
            .unwrap_or(default)
    }

    /// Time left before `interval` has passed since the instant stored at
    /// `key`, if any.
    pub fn cooldown_remaining(&self, key: &str, interval: Duration) -> Option<Duration> {
        let last = self.state.timestamp(key)?;
        let elapsed = (self.now - last).to_std().unwrap_or_default();
        interval.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Whether a timeline item was written by the agent itself.
    pub fn is_own(&self, item: &Value) -> bool {
        match (self.username, item["author_username"].as_str()) {
            (Some(me), Some(author)) => me.eq_ignore_ascii_case(author),
            _ => false,
        }
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, cx: &mut TaskContext<'_>) -> Result<TaskOutcome, AgentError>;
}

/// Bind every configured task to its handler.
pub fn bind_handlers(
    definition: &AgentDefinition,
    registry: &ConnectionRegistry,
) -> Result<HashMap<String, Arc<dyn TaskHandler>>, AgentError> {
    let mut handlers: HashMap<String, Arc<dyn TaskHandler>> = HashMap::new();
    let mut problems = Vec::new();

    for task in &definition.tasks {
        let (handler, connection): (Arc<dyn TaskHandler>, &str) = match (&task.action, task.name.as_str()) {
            (Some(binding), _) => (
                Arc::new(DispatchHandler::new(binding.clone())),
                binding.connection.as_str(),
            ),
            (None, "post-tweet") => (Arc::new(PostTweet), TWITTER),
            (None, "reply-to-tweet") => (Arc::new(ReplyToTweet), TWITTER),
            (None, "like-tweet") => (Arc::new(LikeTweet), TWITTER),
            (None, "echochambers-post-message") => (Arc::new(PostRoomMessage), ECHOCHAMBERS),
            (None, other) => {
                problems.push(format!(
                    "task '{other}' has no built-in handler and no action binding"
                ));
                continue;
            }
        };
        if !registry.contains(connection) {
            warn!(task = %task.name, connection = %connection, "Task uses a connection that is not registered");
        }
        handlers.insert(task.name.clone(), handler);
    }

    if problems.is_empty() {
        Ok(handlers)
    } else {
        Err(ConfigError::ValidationError(problems).into())
    }
}

/// Put the replies to one of the agent's own tweets at the back of the
/// timeline queue.
pub(crate) async fn queue_own_replies(
    cx: &mut TaskContext<'_>,
    tweet_id: &str,
) -> Result<usize, AgentError> {
    let count = cx.setting_u64(
        TWITTER,
        "own_tweet_replies_count",
        murmur_config::defaults::OWN_TWEET_REPLIES_COUNT,
    );
    let mut args = ActionArgs::new();
    args.insert("tweet_id".into(), Value::from(tweet_id));
    args.insert("count".into(), Value::from(count));

    let replies = cx.perform(TWITTER, "get-tweet-replies", args).await?;
    let replies: Vec<Value> = replies
        .as_array()
        .map(|items| items.iter().filter(|r| !cx.is_own(r)).cloned().collect())
        .unwrap_or_default();
    let queued = replies.len();
    cx.state
        .extend(murmur_core::state::keys::TIMELINE_TWEETS, replies);
    Ok(queued)
}
