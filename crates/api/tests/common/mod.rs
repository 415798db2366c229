#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::{Extension, Router};
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use tower::ServiceExt;

use triage_api::config::{PipelineSettings, ServerConfig};
use triage_api::descriptor::RouteDefinition;
use triage_api::registrar::Registrar;
use triage_api::render::{Rendered, TemplateRenderer};
use triage_api::request::Session;
use triage_api::RouteError;

/// One call made to [`RecordingRenderer`].
#[derive(Debug, Clone)]
pub struct RenderCall {
    pub template: String,
    pub payload: Map<String, Value>,
    pub locals: Map<String, Value>,
}

/// Renderer that records every call and renders `rendered <template>`.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    calls: Arc<Mutex<Vec<RenderCall>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl TemplateRenderer for RecordingRenderer {
    fn render(
        &self,
        template: &str,
        payload: &Map<String, Value>,
        locals: &Map<String, Value>,
    ) -> Result<Rendered, RouteError> {
        self.calls.lock().unwrap().push(RenderCall {
            template: template.to_string(),
            payload: payload.clone(),
            locals: locals.clone(),
        });
        Ok(Rendered::html(format!("rendered {template}")))
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        routes_dir: PathBuf::from("routes"),
        route_config: None,
        pipeline: PipelineSettings::default(),
    }
}

/// Register `definitions` in order and build the router.
pub fn build_routes(
    renderer: &RecordingRenderer,
    settings: PipelineSettings,
    definitions: Vec<RouteDefinition>,
) -> Router {
    let mut registrar = Registrar::new(Arc::new(renderer.clone()), settings);
    for (index, definition) in definitions.into_iter().enumerate() {
        registrar
            .register_definition(definition, &format!("tests/route-{index}"))
            .unwrap();
    }
    registrar.into_router()
}

/// Attach `session` to every request the router sees.
pub fn with_session(router: Router, session: &Session) -> Router {
    router.layer(Extension(session.clone()))
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
