//! Inbound action requests.
//!
//! External collaborators (a message queue consumer, the CLI) hand the agent
//! a JSON object with `connection`, `action` and `args`. Requests missing any
//! of the three are rejected before anything is dispatched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::ActionArgs;
use crate::error::{ConnectionError, Result};

const REQUIRED_FIELDS: [&str; 3] = ["connection", "action", "args"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub connection: String,
    pub action: String,
    pub args: ActionArgs,
}

impl ActionRequest {
    pub fn new(connection: impl Into<String>, action: impl Into<String>, args: ActionArgs) -> Self {
        Self {
            connection: connection.into(),
            action: action.into(),
            args,
        }
    }

    /// Build a request from a raw JSON document.
    ///
    /// Every absent or mistyped top-level field is reported together.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(ConnectionError::MalformedRequest {
                missing: REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            });
        };

        let mut missing = Vec::new();
        let connection = take_string(&mut map, "connection", &mut missing);
        let action = take_string(&mut map, "action", &mut missing);
        let args = match map.remove("args") {
            Some(Value::Object(args)) => args,
            Some(_) => {
                missing.push("args (expected an object)".to_string());
                ActionArgs::new()
            }
            None => {
                missing.push("args".to_string());
                ActionArgs::new()
            }
        };

        if !missing.is_empty() {
            return Err(ConnectionError::MalformedRequest { missing });
        }

        Ok(Self {
            connection,
            action,
            args,
        })
    }
}

fn take_string(map: &mut ActionArgs, key: &str, missing: &mut Vec<String>) -> String {
    match map.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::String(_)) | None => {
            missing.push(key.to_string());
            String::new()
        }
        Some(_) => {
            missing.push(format!("{key} (expected a string)"));
            String::new()
        }
    }
}
