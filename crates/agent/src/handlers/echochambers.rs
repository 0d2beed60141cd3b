use std::time::Duration;

use async_trait::async_trait;
use murmur_config::defaults;
use murmur_core::ActionArgs;
use murmur_core::state::keys;
use serde_json::Value;
use tracing::info;

use super::{ECHOCHAMBERS, TaskContext, TaskHandler, TaskOutcome};
use crate::error::AgentError;

/// Post a message on the cached room topic, at most once per
/// `message_interval`.
pub struct PostRoomMessage;

#[async_trait]
impl TaskHandler for PostRoomMessage {
    async fn run(&self, cx: &mut TaskContext<'_>) -> Result<TaskOutcome, AgentError> {
        let interval = cx.setting_u64(ECHOCHAMBERS, "message_interval", defaults::MESSAGE_INTERVAL);
        if let Some(remaining) =
            cx.cooldown_remaining(keys::LAST_ROOM_MESSAGE_TIME, Duration::from_secs(interval))
        {
            return Ok(TaskOutcome::CoolingDown { remaining });
        }

        if cx.state.is_vacant(keys::ROOM_INFO) {
            return Ok(TaskOutcome::idle("room info not available"));
        }
        let room = cx.state.get(keys::ROOM_INFO).cloned().unwrap_or_default();
        let topic = room["topic"].as_str().unwrap_or("anything");
        let tags = room["tags"]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        let prompt = format!(
            "You are in a chat room about: {topic}. Tags: {tags}. \
             Write one short, thoughtful message that moves the conversation forward. \
             Keep it under 500 characters and do not introduce yourself."
        );
        let content = cx.generate(&prompt).await?;
        if content.is_empty() {
            return Ok(TaskOutcome::idle("model returned no text"));
        }

        let mut args = ActionArgs::new();
        args.insert("content".into(), Value::from(content));
        cx.perform(ECHOCHAMBERS, "send-message", args).await?;
        cx.state.set_timestamp(keys::LAST_ROOM_MESSAGE_TIME, cx.now);
        info!(topic = %topic, "Posted room message");
        Ok(TaskOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Fixture, ScriptedConnection};
    use serde_json::json;

    fn fixture() -> Fixture {
        Fixture::new(
            json!([{"name": "echochambers", "room": "philosophy", "message_interval": 120}]),
            vec![
                ScriptedConnection::llm("openai").with_response("generate-text", json!("What is a good life?")),
                ScriptedConnection::echochambers("echochambers"),
            ],
        )
    }

    #[tokio::test]
    async fn posts_on_cached_topic() {
        let mut fx = fixture();
        fx.state.set(keys::ROOM_INFO, json!({"topic": "ethics", "tags": ["ai", "virtue"]}));

        let outcome = PostRoomMessage.run(&mut fx.context()).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        let prompt = fx.connection("openai").last_call("generate-text").unwrap();
        assert!(prompt["prompt"].as_str().unwrap().contains("ethics"));
        let sent = fx.connection("echochambers").last_call("send-message").unwrap();
        assert_eq!(sent["content"], "What is a good life?");
    }

    #[tokio::test]
    async fn cooldown_gates_second_message() {
        let mut fx = fixture();
        fx.state.set(keys::ROOM_INFO, json!({"topic": "ethics"}));
        PostRoomMessage.run(&mut fx.context()).await.unwrap();

        fx.advance(Duration::from_secs(60));
        let outcome = PostRoomMessage.run(&mut fx.context()).await.unwrap();
        match outcome {
            TaskOutcome::CoolingDown { remaining } => assert_eq!(remaining, Duration::from_secs(60)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(fx.connection("echochambers").calls_to("send-message"), 1);
    }

    #[tokio::test]
    async fn missing_room_info_is_idle() {
        let mut fx = fixture();
        let outcome = PostRoomMessage.run(&mut fx.context()).await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Idle { .. }));
        assert_eq!(fx.connection("openai").calls_to("generate-text"), 0);
    }
}
