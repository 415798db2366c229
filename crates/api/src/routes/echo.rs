use serde_json::json;
use triage_core::validation::{FieldRule, Rule, RuleSchema, ValueType};

use crate::descriptor::{handler_fn, AllowAll, RouteDefinition};
use crate::request::Reply;
use crate::Verb;

/// `{ "message": string (1..=280), "repeat": integer 1..=5, default 1 }`
pub fn schema() -> RuleSchema {
    RuleSchema::default()
        .rule(FieldRule::new("repeat", Rule::Default { value: json!(1) }))
        .rule(FieldRule::new("message", Rule::Required))
        .rule(FieldRule::new(
            "message",
            Rule::TypeCheck {
                expected: ValueType::String,
            },
        ))
        .rule(FieldRule::new("message", Rule::MinLength { min: 1 }))
        .rule(FieldRule::new("message", Rule::MaxLength { max: 280 }))
        .rule(FieldRule::new(
            "repeat",
            Rule::TypeCheck {
                expected: ValueType::Integer,
            },
        ))
        .rule(FieldRule::new("repeat", Rule::MinValue { min: 1.0 }))
        .rule(FieldRule::new("repeat", Rule::MaxValue { max: 5.0 }))
}

pub fn definition() -> RouteDefinition {
    RouteDefinition::new()
        .method(Verb::Post)
        .path("/echo")
        .validation(schema())
        .authorization(AllowAll)
        .enable_cors(true)
        .handler(handler_fn(|req, _res| {
            let message = req.body["message"].as_str().unwrap_or_default();
            let repeat = req.body["repeat"].as_u64().unwrap_or(1) as usize;
            Reply::payload(json!({
                "echo": vec![message; repeat].join(" "),
                "repeat": repeat,
            }))
        }))
}
