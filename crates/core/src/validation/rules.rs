//! Validation rule and result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rule applied to one field of the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    #[serde(flatten)]
    pub rule: Rule,
    /// Overrides the generated violation message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, rule: Rule) -> Self {
        Self {
            field: field.into(),
            rule,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    Required,
    TypeCheck {
        #[serde(rename = "type")]
        expected: ValueType,
    },
    MinLength {
        min: usize,
    },
    MaxLength {
        max: usize,
    },
    MinValue {
        min: f64,
    },
    MaxValue {
        max: f64,
    },
    EnumValues {
        values: Vec<Value>,
    },
    RegexPattern {
        pattern: String,
    },
    /// Fills the field when absent or null. Never a violation.
    Default {
        value: Value,
    },
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Required => "required",
            Rule::TypeCheck { .. } => "type_check",
            Rule::MinLength { .. } => "min_length",
            Rule::MaxLength { .. } => "max_length",
            Rule::MinValue { .. } => "min_value",
            Rule::MaxValue { .. } => "max_value",
            Rule::EnumValues { .. } => "enum_values",
            Rule::RegexPattern { .. } => "regex_pattern",
            Rule::Default { .. } => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ValueType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }
}

/// Aggregated result of evaluating all rules against one body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<FieldViolation>,
}

/// A single field-level rule violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub rule_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}
