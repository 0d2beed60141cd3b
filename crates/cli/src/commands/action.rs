//! `murmur action`: perform a single connection action.

use anyhow::{Context as _, bail};
use murmur_core::ActionArgs;
use serde_json::Value;

use super::Context;

pub async fn run(
    ctx: &Context,
    connection: &str,
    action: &str,
    params: &[String],
) -> anyhow::Result<()> {
    let definition = ctx.definition()?;
    let registry = ctx.registry(&definition)?;
    let args = parse_params(params)?;

    let result = registry
        .perform_action(connection, action, args)
        .await
        .with_context(|| format!("{connection}.{action} failed"))?;

    match result {
        Value::String(text) => println!("{text}"),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

/// Parse `key=value` pairs. JSON arrays and objects are kept structured;
/// everything else is passed as a string and coerced by the action.
pub fn parse_params(params: &[String]) -> anyhow::Result<ActionArgs> {
    let mut args = ActionArgs::new();
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            bail!("Invalid parameter '{param}', expected key=value");
        };
        if key.is_empty() {
            bail!("Invalid parameter '{param}', empty key");
        }
        let value = match serde_json::from_str::<Value>(value) {
            Ok(structured @ (Value::Array(_) | Value::Object(_))) => structured,
            _ => Value::from(value),
        };
        args.insert(key.to_string(), value);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn key_value_pairs_become_strings() {
        let args = parse_params(&params(&["message=hello=world", "count=5"])).unwrap();
        assert_eq!(args["message"], "hello=world");
        assert_eq!(args["count"], "5");
    }

    #[test]
    fn json_collections_stay_structured() {
        let args = parse_params(&params(&["tags=[\"a\",\"b\"]", "meta={\"k\":1}"])).unwrap();
        assert_eq!(args["tags"], json!(["a", "b"]));
        assert_eq!(args["meta"], json!({"k": 1}));
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert!(parse_params(&params(&["oops"])).is_err());
        assert!(parse_params(&params(&["=value"])).is_err());
    }
}
