//! `murmur list-connections`, `murmur list-actions`, `murmur check`.

use anyhow::anyhow;
use murmur_core::Action;
use serde_json::{Map, Value};

use super::Context;

pub async fn list(ctx: &Context) -> anyhow::Result<()> {
    let definition = ctx.definition()?;
    let registry = ctx.registry(&definition)?;

    println!("Connections for '{}':", definition.name);
    for (name, ready) in registry.check_all(false).await {
        let status = if ready { "configured" } else { "not configured" };
        let role = match registry.get(&name) {
            Some(connection) if connection.is_llm_provider() => " [model provider]",
            _ => "",
        };
        println!("  - {name}{role}: {status}");
    }
    Ok(())
}

pub fn list_actions(ctx: &Context, connection: &str, schema: bool) -> anyhow::Result<()> {
    let definition = ctx.definition()?;
    let registry = ctx.registry(&definition)?;
    let connection = registry
        .get(connection)
        .ok_or_else(|| anyhow!("Unknown connection '{connection}'"))?;

    if schema {
        let schemas = action_schemas(connection.actions());
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }

    println!("Actions for '{}':", connection.name());
    for action in connection.actions() {
        println!("  {}: {}", action.name, action.description);
        for param in &action.parameters {
            let required = if param.required { "required" } else { "optional" };
            println!("      {} ({}, {required}): {}", param.name, param.kind, param.description);
        }
    }
    Ok(())
}

/// Parameter schemas keyed by action name.
fn action_schemas<'a>(actions: impl IntoIterator<Item = &'a Action>) -> Value {
    let schemas: Map<String, Value> = actions
        .into_iter()
        .map(|action| (action.name.clone(), action.parameters_schema()))
        .collect();
    Value::Object(schemas)
}

pub async fn check(ctx: &Context) -> anyhow::Result<()> {
    let definition = ctx.definition()?;
    let registry = ctx.registry(&definition)?;

    let results = registry.check_all(true).await;
    let mut issues = 0;
    for (name, ready) in &results {
        if *ready {
            println!("  ✅ {name}");
        } else {
            println!("  ❌ {name} is not configured");
            issues += 1;
        }
    }
    if registry.get_model_providers().is_empty() {
        println!("  ❌ No model provider configured");
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  All {} connection(s) ready.", results.len());
        Ok(())
    } else {
        Err(anyhow!("{issues} issue(s) found"))
    }
}
