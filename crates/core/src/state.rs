//! Agent state, the loop's only cross-iteration memory.
//!
//! A string-keyed map of JSON values. The loop fills caches (timeline,
//! room info) and task handlers consume them, alongside the timestamps used
//! for cooldowns and rate-limit windows.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MAX_RETRY_AFTER_SECS;

/// Well-known state keys used by the built-in handlers.
pub mod keys {
    /// Cached timeline items waiting to be replied to or liked.
    pub const TIMELINE_TWEETS: &str = "timeline_tweets";
    /// Cached chat room description.
    pub const ROOM_INFO: &str = "room_info";
    /// When the agent last posted a tweet.
    pub const LAST_TWEET_TIME: &str = "last_tweet_time";
    /// When the agent last sent a room message.
    pub const LAST_ROOM_MESSAGE_TIME: &str = "last_room_message_time";
    /// Posting is rate limited until this instant.
    pub const TWEET_LIMIT_RESET: &str = "tweet_limit_reset";
    /// Timeline reads are rate limited until this instant.
    pub const TIMELINE_LIMIT_RESET: &str = "timeline_limit_reset";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    entries: HashMap<String, Value>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// True when the entry is absent, null, or an empty list/object/string.
    pub fn is_vacant(&self, key: &str) -> bool {
        match self.entries.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    /// Length of a list entry; zero for anything else.
    pub fn list_len(&self, key: &str) -> usize {
        match self.entries.get(key) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }

    /// Remove and return the first item of a list entry.
    pub fn pop_front(&mut self, key: &str) -> Option<Value> {
        match self.entries.get_mut(key) {
            Some(Value::Array(items)) if !items.is_empty() => Some(items.remove(0)),
            _ => None,
        }
    }

    /// Append items to a list entry, creating it (or replacing a non-list)
    /// as needed.
    pub fn extend(&mut self, key: &str, items: impl IntoIterator<Item = Value>) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(list) = entry {
            list.extend(items);
        }
    }

    /// Store an instant (as Unix milliseconds).
    pub fn set_timestamp(&mut self, key: impl Into<String>, at: DateTime<Utc>) {
        self.entries
            .insert(key.into(), Value::from(at.timestamp_millis()));
    }

    /// Read an instant stored with [`AgentState::set_timestamp`].
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Store the instant `secs` after `now` and return it.
    ///
    /// Waits longer than [`MAX_RETRY_AFTER_SECS`] are capped; an instant
    /// past the end of the calendar falls back to `now`.
    pub fn set_deadline(
        &mut self,
        key: impl Into<String>,
        now: DateTime<Utc>,
        secs: u64,
    ) -> DateTime<Utc> {
        let at = i64::try_from(secs.min(MAX_RETRY_AFTER_SECS))
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|wait| now.checked_add_signed(wait))
            .unwrap_or(now);
        self.set_timestamp(key, at);
        at
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
