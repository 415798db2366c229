//! Pipeline contract switches chosen explicitly by configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether every route must declare an authorization function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationMode {
    /// A route without `authorization` fails to load.
    #[default]
    Required,
    /// A route without `authorization` loads; each request logs a warning
    /// and proceeds as authorized.
    Lenient,
}

/// Where declared static locals end up when a template renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalsPolicy {
    /// Merged into the render payload; the declared value wins on collision.
    #[default]
    MergeIntoPayload,
    /// Written onto the response locals, leaving the payload untouched.
    ApplyToResponseLocals,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value `{value}`, expected one of: {expected}")]
pub struct UnknownPolicy {
    pub value: String,
    pub expected: &'static str,
}

impl FromStr for AuthorizationMode {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "lenient" => Ok(Self::Lenient),
            _ => Err(UnknownPolicy {
                value: s.to_string(),
                expected: "required, lenient",
            }),
        }
    }
}

impl FromStr for LocalsPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge_into_payload" | "merge" => Ok(Self::MergeIntoPayload),
            "apply_to_response_locals" | "response" => Ok(Self::ApplyToResponseLocals),
            _ => Err(UnknownPolicy {
                value: s.to_string(),
                expected: "merge_into_payload, apply_to_response_locals",
            }),
        }
    }
}
