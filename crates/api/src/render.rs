//! Template rendering seam.

use axum::http::HeaderValue;
use serde_json::{json, Map, Value};
use triage_core::error::RouteError;

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content_type: HeaderValue,
    pub body: String,
}

impl Rendered {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            content_type: HeaderValue::from_static("text/html; charset=utf-8"),
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            content_type: HeaderValue::from_static("application/json"),
            body: body.into(),
        }
    }
}

/// Host-provided view engine.
///
/// `payload` is the handler's data (with defaults and, depending on policy,
/// static locals merged in); `locals` are the response locals.
pub trait TemplateRenderer: Send + Sync + 'static {
    fn render(
        &self,
        template: &str,
        payload: &Map<String, Value>,
        locals: &Map<String, Value>,
    ) -> Result<Rendered, RouteError>;
}

/// Renders every view as a JSON document naming the template.
///
/// Used by the bundled binary where no view engine is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonViewRenderer;

impl TemplateRenderer for JsonViewRenderer {
    fn render(
        &self,
        template: &str,
        payload: &Map<String, Value>,
        locals: &Map<String, Value>,
    ) -> Result<Rendered, RouteError> {
        let view = json!({
            "template": template,
            "data": payload,
            "locals": locals,
        });
        serde_json::to_string(&view)
            .map(Rendered::json)
            .map_err(|e| RouteError::render(e.to_string()))
    }
}
