//! Rule evaluator — pure logic, no I/O.

use regex::Regex;
use serde_json::{Map, Value};

use super::rules::{FieldRule, FieldViolation, Rule, ValidationResult};

/// Evaluate all rules against a single body object.
pub fn evaluate_rules(rules: &[FieldRule], data: &Map<String, Value>) -> ValidationResult {
    let violations: Vec<FieldViolation> = rules
        .iter()
        .filter_map(|rule| evaluate_single_rule(rule, data))
        .collect();

    ValidationResult {
        is_valid: violations.is_empty(),
        violations,
    }
}

/// Fill fields that carry a `default` rule and are absent or null.
pub fn apply_defaults(rules: &[FieldRule], data: &mut Map<String, Value>) {
    for rule in rules {
        if let Rule::Default { value } = &rule.rule {
            let missing = data.get(&rule.field).map_or(true, Value::is_null);
            if missing {
                data.insert(rule.field.clone(), value.clone());
            }
        }
    }
}

fn evaluate_single_rule(rule: &FieldRule, data: &Map<String, Value>) -> Option<FieldViolation> {
    let value = data.get(&rule.field);

    let failed = match &rule.rule {
        Rule::Required => match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            _ => false,
        },
        // The remaining rules do not enforce presence.
        Rule::TypeCheck { expected } => present(value).is_some_and(|v| !expected.matches(v)),
        Rule::MinLength { min } => length_of(value).is_some_and(|len| len < *min),
        Rule::MaxLength { max } => length_of(value).is_some_and(|len| len > *max),
        Rule::MinValue { min } => value.and_then(Value::as_f64).is_some_and(|n| n < *min),
        Rule::MaxValue { max } => value.and_then(Value::as_f64).is_some_and(|n| n > *max),
        Rule::EnumValues { values } => present(value).is_some_and(|v| !values.contains(v)),
        Rule::RegexPattern { pattern } => match (value.and_then(Value::as_str), Regex::new(pattern)) {
            (Some(s), Ok(re)) => !re.is_match(s),
            // Invalid patterns and non-string values pass.
            _ => false,
        },
        Rule::Default { .. } => false,
    };

    failed.then(|| FieldViolation {
        field: rule.field.clone(),
        rule_type: rule.rule.name().to_string(),
        message: rule
            .message
            .clone()
            .unwrap_or_else(|| default_message(rule)),
        value: value.cloned(),
    })
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Character count for strings, element count for arrays.
fn length_of(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn default_message(rule: &FieldRule) -> String {
    let field = &rule.field;
    match &rule.rule {
        Rule::Required => format!("\"{field}\" is required"),
        Rule::TypeCheck { expected } => format!("\"{field}\" must be a {}", expected.as_str()),
        Rule::MinLength { min } => format!("\"{field}\" length must be at least {min}"),
        Rule::MaxLength { max } => {
            format!("\"{field}\" length must be less than or equal to {max}")
        }
        Rule::MinValue { min } => format!("\"{field}\" must be larger than or equal to {min}"),
        Rule::MaxValue { max } => format!("\"{field}\" must be less than or equal to {max}"),
        Rule::EnumValues { .. } => format!("\"{field}\" must be one of the allowed values"),
        Rule::RegexPattern { pattern } => {
            format!("\"{field}\" fails to match the required pattern: {pattern}")
        }
        Rule::Default { .. } => format!("\"{field}\" is invalid"),
    }
}
