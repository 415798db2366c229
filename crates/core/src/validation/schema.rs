//! [`Schema`] implementations.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use validator::Validate;

use super::evaluator::{apply_defaults, evaluate_rules};
use super::rules::FieldRule;
use super::Schema;
use crate::error::RouteError;

/// Declarative schema over a JSON object body.
///
/// An empty body validates as `{}`. `default` rules are applied before the
/// other rules run, and the filled-in object is returned as the normalized
/// body. The first violation becomes the validation error message.
#[derive(Debug, Clone, Default)]
pub struct RuleSchema {
    rules: Vec<FieldRule>,
}

impl RuleSchema {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }
}

#[async_trait]
impl Schema for RuleSchema {
    async fn validate(&self, body: &Value) -> Result<Value, RouteError> {
        let mut data = match body {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => return Err(RouteError::validation("\"value\" must be an object")),
        };

        apply_defaults(&self.rules, &mut data);

        let result = evaluate_rules(&self.rules, &data);
        match result.violations.into_iter().next() {
            Some(violation) => Err(RouteError::validation(violation.message)),
            None => Ok(Value::Object(data)),
        }
    }
}

/// Validates by deserializing into `T` and running its `validator` rules.
///
/// The normalized body is `T` serialized back, so serde defaults and renames
/// are reflected in what the handler sees.
pub struct ValidatorSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValidatorSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ValidatorSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Schema for ValidatorSchema<T>
where
    T: DeserializeOwned + Serialize + Validate + 'static,
{
    async fn validate(&self, body: &Value) -> Result<Value, RouteError> {
        let typed: T = serde_json::from_value(body.clone())
            .map_err(|e| RouteError::validation(e.to_string()))?;
        typed
            .validate()
            .map_err(|e| RouteError::validation(e.to_string()))?;
        serde_json::to_value(&typed).map_err(|e| RouteError::validation(e.to_string()))
    }
}
