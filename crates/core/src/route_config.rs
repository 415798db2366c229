//! Per-route configuration overrides handed to factory route modules.
//!
//! The map is keyed by route name (the source file stem, e.g.
//! `GET-require-initialization`). The `*` entry supplies defaults shared by
//! every route; a name-specific entry overrides it key by key.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::LoadError;

/// Key of the entry merged into every route's configuration.
pub const WILDCARD: &str = "*";

/// Configuration object passed to one factory module.
pub type RouteConfig = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RouteConfigMap(HashMap<String, RouteConfig>);

impl RouteConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, config: RouteConfig) -> Self {
        self.insert(name, config);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, config: RouteConfig) {
        self.0.insert(name.into(), config);
    }

    /// Parse a JSON object of `{ "<route name>": { ... } }`.
    pub fn from_json_str(raw: &str) -> Result<Self, LoadError> {
        serde_json::from_str(raw).map_err(|e| LoadError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Wildcard defaults overlaid with the entry for `name`.
    pub fn config_for(&self, name: &str) -> RouteConfig {
        let mut merged = self.0.get(WILDCARD).cloned().unwrap_or_default();
        if let Some(specific) = self.0.get(name) {
            for (key, value) in specific {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
