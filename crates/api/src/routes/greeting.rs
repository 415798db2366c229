use serde_json::Value;
use triage_core::error::RouteError;
use triage_core::route_config::RouteConfig;

use crate::descriptor::{handler_fn, AllowAll, RouteDefinition};
use crate::request::{Reply, RouteRequest};
use crate::Verb;

const DEFAULT_GREETING: &str = "Hello";

/// Factory: the greeting word comes from the route's `greeting` key.
pub fn definition(config: &RouteConfig) -> RouteDefinition {
    let greeting = config
        .get("greeting")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_GREETING)
        .to_string();

    RouteDefinition::new()
        .verb(Verb::Get)
        .path("/greeting/{name}")
        .template("greeting")
        .authorization(AllowAll)
        .set_params(display_name)
        .handler(handler_fn(move |req, _res| {
            let mut payload = serde_json::Map::new();
            payload.insert("greeting".into(), Value::String(greeting.clone()));
            if let Some(name) = req.derived.get("display_name") {
                payload.insert("name".into(), name.clone());
            }
            Ok(Reply::Payload(payload))
        }))
}

fn display_name(req: &mut RouteRequest) -> Result<(), RouteError> {
    let name = req
        .param("name")
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| RouteError::validation("\"name\" is required"))?;

    let mut chars = name.trim().chars();
    let display: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    req.derived
        .insert("display_name".into(), Value::String(display));
    Ok(())
}
