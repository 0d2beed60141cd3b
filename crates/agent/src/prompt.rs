//! System prompt construction from the agent's persona.

use murmur_config::AgentDefinition;
use murmur_core::{ActionArgs, ConnectionRegistry};
use serde_json::Value;
use tracing::warn;

use crate::handlers::TWITTER;

/// Persona prompt: bio lines, traits, then style examples.
pub fn build_system_prompt(definition: &AgentDefinition, account_examples: &[String]) -> String {
    let mut parts: Vec<String> = definition.bio.clone();

    if !definition.traits.is_empty() {
        parts.push("\nYour key traits are:".to_string());
        parts.extend(definition.traits.iter().map(|t| format!("- {t}")));
    }

    if !definition.examples.is_empty() || !account_examples.is_empty() {
        parts.push(
            "\nHere are some examples of your style (Please avoid repeating any of these):"
                .to_string(),
        );
        parts.extend(definition.examples.iter().map(|e| format!("- {e}")));
        parts.extend(account_examples.iter().map(|e| format!("- {e}")));
    }

    parts.join("\n")
}

/// Recent tweet texts from every `example_accounts` entry.
///
/// Accounts that cannot be fetched are logged and left out.
pub async fn fetch_account_examples(
    definition: &AgentDefinition,
    registry: &ConnectionRegistry,
) -> Vec<String> {
    let mut examples = Vec::new();
    if definition.example_accounts.is_empty() || !registry.contains(TWITTER) {
        return examples;
    }

    for account in &definition.example_accounts {
        let mut args = ActionArgs::new();
        args.insert("username".into(), Value::from(account.as_str()));
        match registry
            .perform_action(TWITTER, "get-latest-tweets-from-user", args)
            .await
        {
            Ok(Value::Array(tweets)) => examples.extend(
                tweets
                    .iter()
                    .filter_map(|t| t["text"].as_str())
                    .map(String::from),
            ),
            Ok(_) => {}
            Err(e) => warn!(account = %account, error = %e, "Could not fetch example tweets"),
        }
    }
    examples
}
