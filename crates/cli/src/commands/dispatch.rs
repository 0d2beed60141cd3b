//! `murmur dispatch`: serve action requests over stdin/stdout.
//!
//! Each input line is one JSON request `{connection, action, args}`; each
//! output line is `{"ok": true, "result": ...}` or
//! `{"ok": false, "error": "..."}`. A bad line never stops the server.

use murmur_core::{ActionRequest, ConnectionRegistry};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::Context;

pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let definition = ctx.definition()?;
    let registry = ctx.registry(&definition)?;
    info!(agent = %definition.name, "Serving action requests from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut served = 0u64;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&registry, &line).await;
        println!("{response}");
        served += 1;
    }

    info!(served, "Input closed");
    Ok(())
}

/// Parse and perform one request line.
pub async fn handle_line(registry: &ConnectionRegistry, line: &str) -> Value {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return json!({"ok": false, "error": format!("Invalid JSON: {e}")}),
    };
    let request = match ActionRequest::from_value(value) {
        Ok(request) => request,
        Err(e) => return json!({"ok": false, "error": e.to_string()}),
    };

    let (connection, action) = (request.connection.clone(), request.action.clone());
    match registry.dispatch(request).await {
        Ok(result) => json!({"ok": true, "result": result}),
        Err(e) => {
            warn!(connection = %connection, action = %action, error = %e, "Request failed");
            json!({"ok": false, "error": e.to_string()})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_json_is_reported() {
        let registry = ConnectionRegistry::new();
        let response = handle_line(&registry, "{not json").await;
        assert_eq!(response["ok"], false);
        assert!(response["error"].as_str().unwrap().starts_with("Invalid JSON"));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_before_dispatch() {
        let registry = ConnectionRegistry::new();
        let response = handle_line(&registry, r#"{"connection": "twitter"}"#).await;
        assert_eq!(response["ok"], false);
        let error = response["error"].as_str().unwrap();
        assert!(error.contains("action"));
        assert!(error.contains("args"));
    }

    #[tokio::test]
    async fn unknown_connection_is_an_error_line() {
        let registry = ConnectionRegistry::new();
        let response = handle_line(
            &registry,
            r#"{"connection": "ghost", "action": "haunt", "args": {}}"#,
        )
        .await;
        assert_eq!(response["ok"], false);
        assert!(response["error"].as_str().unwrap().contains("ghost"));
    }
}
