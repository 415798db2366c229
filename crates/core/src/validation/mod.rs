//! Request-body validation.
//!
//! [`Schema`] is the seam the pipeline calls before authorization. Two
//! implementations ship here: [`RuleSchema`], a declarative field-rule list
//! evaluated by pure logic, and [`ValidatorSchema`], which deserializes the
//! body into a `validator::Validate` type.

pub mod evaluator;
pub mod rules;
pub mod schema;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RouteError;

pub use rules::{FieldRule, FieldViolation, Rule, ValidationResult, ValueType};
pub use schema::{RuleSchema, ValidatorSchema};

/// Validates a request body, returning the normalized body on success.
///
/// Failures should be [`RouteError::Validation`]; any error returned here is
/// reported through the pipeline's terminal stage.
#[async_trait]
pub trait Schema: Send + Sync + 'static {
    async fn validate(&self, body: &Value) -> Result<Value, RouteError>;
}
