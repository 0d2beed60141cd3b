//! Connection settings reader that collects every problem before failing.
//!
//! Connection constructors pull their fields through a [`ConnectionSettings`]
//! and call [`ConnectionSettings::finish`] once; the resulting
//! `ConnectionError::Configuration` names every missing or mistyped field.

use serde_json::{Map, Value};

use crate::error::{ConnectionError, Result};

pub struct ConnectionSettings<'a> {
    connection: &'a str,
    settings: &'a Map<String, Value>,
    problems: Vec<String>,
}

impl<'a> ConnectionSettings<'a> {
    pub fn new(connection: &'a str, settings: &'a Map<String, Value>) -> Self {
        Self {
            connection,
            settings,
            problems: Vec::new(),
        }
    }

    /// A required string field. Records a problem and returns an empty
    /// string when missing or not a string.
    pub fn required_str(&mut self, key: &str) -> String {
        match self.settings.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::String(_)) => {
                self.problems.push(format!("'{key}' must not be empty"));
                String::new()
            }
            Some(other) => {
                self.problems
                    .push(format!("'{key}' must be a string, got {other}"));
                String::new()
            }
            None => {
                self.problems.push(format!("missing required field '{key}'"));
                String::new()
            }
        }
    }

    pub fn optional_str(&mut self, key: &str) -> Option<String> {
        match self.settings.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.problems
                    .push(format!("'{key}' must be a string, got {other}"));
                None
            }
        }
    }

    pub fn str_or(&mut self, key: &str, default: &str) -> String {
        self.optional_str(key).unwrap_or_else(|| default.to_string())
    }

    pub fn u64_or(&mut self, key: &str, default: u64) -> u64 {
        match self.settings.get(key) {
            None | Some(Value::Null) => default,
            Some(value) => match value.as_u64() {
                Some(n) => n,
                None => {
                    self.problems
                        .push(format!("'{key}' must be a non-negative integer, got {value}"));
                    default
                }
            },
        }
    }

    pub fn optional_f64(&mut self, key: &str) -> Option<f64> {
        match self.settings.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_f64() {
                Some(n) => Some(n),
                None => {
                    self.problems
                        .push(format!("'{key}' must be a number, got {value}"));
                    None
                }
            },
        }
    }

    pub fn optional_u64(&mut self, key: &str) -> Option<u64> {
        match self.settings.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = value.as_u64();
                if parsed.is_none() {
                    self.problems
                        .push(format!("'{key}' must be a non-negative integer, got {value}"));
                }
                parsed
            }
        }
    }

    /// Record a problem found by connection-specific checks.
    pub fn problem(&mut self, message: impl Into<String>) {
        self.problems.push(message.into());
    }

    /// Fail with every recorded problem, if any.
    pub fn finish(self) -> Result<()> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(ConnectionError::Configuration {
                connection: self.connection.to_string(),
                problems: self.problems,
            })
        }
    }
}
