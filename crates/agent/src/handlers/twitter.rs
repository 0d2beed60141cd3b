use std::time::Duration;

use async_trait::async_trait;
use murmur_config::defaults;
use murmur_core::ActionArgs;
use murmur_core::state::keys;
use serde_json::Value;
use tracing::{info, warn};

use super::{TWITTER, TaskContext, TaskHandler, TaskOutcome, queue_own_replies};
use crate::error::AgentError;

const TWEET_PROMPT: &str = "Generate an engaging tweet. Don't include any hashtags, links or emojis. \
Keep it under 280 characters. The tweet should be pure commentary. \
Do not repeat any of the tweets that were given as examples.";

/// Compose and post a tweet, at most once per `tweet_interval`.
pub struct PostTweet;

#[async_trait]
impl TaskHandler for PostTweet {
    async fn run(&self, cx: &mut TaskContext<'_>) -> Result<TaskOutcome, AgentError> {
        if let Some(reset) = cx.state.timestamp(keys::TWEET_LIMIT_RESET) {
            if reset > cx.now {
                return Ok(TaskOutcome::idle(format!(
                    "posting rate limited until {}",
                    reset.format("%H:%M:%S")
                )));
            }
            cx.state.remove(keys::TWEET_LIMIT_RESET);
            info!("Posting rate limit lifted");
        }

        let interval = cx.setting_u64(TWITTER, "tweet_interval", defaults::TWEET_INTERVAL);
        if let Some(remaining) =
            cx.cooldown_remaining(keys::LAST_TWEET_TIME, Duration::from_secs(interval))
        {
            return Ok(TaskOutcome::CoolingDown { remaining });
        }

        let text = cx.generate(TWEET_PROMPT).await?;
        if text.is_empty() {
            return Ok(TaskOutcome::idle("model returned no text"));
        }

        let mut args = ActionArgs::new();
        args.insert("message".into(), Value::from(text));
        match cx.perform(TWITTER, "post-tweet", args).await {
            Ok(_) => {
                cx.state.set_timestamp(keys::LAST_TWEET_TIME, cx.now);
                Ok(TaskOutcome::Completed)
            }
            Err(e) => match e.retry_after() {
                Some(secs) => {
                    cx.state.set_deadline(keys::TWEET_LIMIT_RESET, cx.now, secs);
                    warn!(retry_after_secs = secs, "Posting rate limited, switching to likes only");
                    Ok(TaskOutcome::idle("posting rate limited"))
                }
                None => Err(e),
            },
        }
    }
}

/// Reply to the next tweet in the timeline queue.
pub struct ReplyToTweet;

#[async_trait]
impl TaskHandler for ReplyToTweet {
    async fn run(&self, cx: &mut TaskContext<'_>) -> Result<TaskOutcome, AgentError> {
        let Some(tweet) = cx.state.pop_front(keys::TIMELINE_TWEETS) else {
            return Ok(TaskOutcome::idle("no timeline tweets queued"));
        };
        let Some(tweet_id) = tweet["id"].as_str().map(String::from) else {
            return Ok(TaskOutcome::idle("timeline item has no id"));
        };

        if cx.is_own(&tweet) {
            let queued = queue_own_replies(cx, &tweet_id).await?;
            info!(tweet_id = %tweet_id, queued, "Queued replies to own tweet");
            return Ok(TaskOutcome::Completed);
        }

        let text = tweet["text"].as_str().unwrap_or_default();
        let prompt = format!(
            "Generate a friendly, engaging reply to this tweet: {text}. \
             Keep it under 280 characters. Don't include any usernames, hashtags, links or emojis."
        );
        let reply = cx.generate(&prompt).await?;
        if reply.is_empty() {
            return Ok(TaskOutcome::idle("model returned no text"));
        }

        let mut args = ActionArgs::new();
        args.insert("tweet_id".into(), Value::from(tweet_id.as_str()));
        args.insert("message".into(), Value::from(reply));
        cx.perform(TWITTER, "reply-to-tweet", args).await?;
        info!(tweet_id = %tweet_id, "Replied to tweet");
        Ok(TaskOutcome::Completed)
    }
}

/// Like the next tweet in the timeline queue.
pub struct LikeTweet;

#[async_trait]
impl TaskHandler for LikeTweet {
    async fn run(&self, cx: &mut TaskContext<'_>) -> Result<TaskOutcome, AgentError> {
        let Some(tweet) = cx.state.pop_front(keys::TIMELINE_TWEETS) else {
            return Ok(TaskOutcome::idle("no timeline tweets queued"));
        };
        let Some(tweet_id) = tweet["id"].as_str().map(String::from) else {
            return Ok(TaskOutcome::idle("timeline item has no id"));
        };

        if cx.is_own(&tweet) {
            let queued = queue_own_replies(cx, &tweet_id).await?;
            info!(tweet_id = %tweet_id, queued, "Queued replies to own tweet");
            return Ok(TaskOutcome::Completed);
        }

        let mut args = ActionArgs::new();
        args.insert("tweet_id".into(), Value::from(tweet_id.as_str()));
        cx.perform(TWITTER, "like-tweet", args).await?;
        info!(tweet_id = %tweet_id, "Liked tweet");
        Ok(TaskOutcome::Completed)
    }
}
