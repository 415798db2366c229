//! The per-request stage machine wrapped around every registered handler.
//!
//! Stages run strictly in order and each one is optional:
//!
//! 1. Parameter setup
//! 2. Input validation (replaces the body with the normalized value)
//! 3. Authorization
//! 4. Handler invocation
//! 5. Render
//!
//! The first failing stage short-circuits into [`Pipeline::fail`], the
//! single terminal error stage, which runs exactly once per failed request.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Request;
use axum::response::{IntoResponse, Redirect, Response};
use serde_json::{Map, Value};
use triage_core::encoding::encode_uri_component;
use triage_core::error::RouteError;
use triage_core::locals::{default_from_session, merge_static_locals};
use triage_core::policy::LocalsPolicy;

use crate::config::PipelineSettings;
use crate::descriptor::RouteDescriptor;
use crate::error::AppError;
use crate::render::TemplateRenderer;
use crate::request::{Reply, RouteRequest, RouteResponse, REDIRECT_TO_KEY};

/// One route's pipeline. Cheap to clone; everything is shared behind `Arc`.
#[derive(Clone)]
pub struct Pipeline {
    descriptor: Arc<RouteDescriptor>,
    renderer: Arc<dyn TemplateRenderer>,
    settings: Arc<PipelineSettings>,
    param_aliases: Arc<Vec<(String, String)>>,
}

impl Pipeline {
    pub fn new(
        descriptor: Arc<RouteDescriptor>,
        renderer: Arc<dyn TemplateRenderer>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            descriptor,
            renderer,
            settings,
            param_aliases: Arc::default(),
        }
    }

    /// Serve under another route's path, renaming its capture names
    /// (`bound`) to the ones this route declared.
    pub(crate) fn with_param_aliases(mut self, aliases: Vec<(String, String)>) -> Self {
        self.param_aliases = Arc::new(aliases);
        self
    }

    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    /// Serve one axum request.
    pub async fn run(&self, req: Request) -> Response {
        let (parts, body) = req.into_parts();
        let mut request = RouteRequest::from_parts(parts).await;
        request.rename_params(&self.param_aliases);

        if let Err(err) = request.read_body(body, self.settings.body_limit_bytes).await {
            return self.fail(&request, err);
        }
        self.respond(request).await
    }

    /// Run the stages for an already-built request and produce the response.
    pub async fn respond(&self, mut request: RouteRequest) -> Response {
        let mut response = RouteResponse::new();
        match self.execute(&mut request, &mut response).await {
            Ok(()) => response.into_http(),
            Err(err) => self.fail(&request, err),
        }
    }

    /// Stages 1 through 5. The response is left as the stages built it.
    pub async fn execute(
        &self,
        req: &mut RouteRequest,
        res: &mut RouteResponse,
    ) -> Result<(), RouteError> {
        let route = &*self.descriptor;

        if let Some(set_params) = &route.set_params {
            set_params(req)?;
        }

        if let Some(schema) = &route.validation {
            req.body = schema.validate(&req.body).await?;
        }

        match &route.authorization {
            Some(authorize) => authorize
                .authorize(req)
                .await
                .map_err(|e| RouteError::unauthorized(e.to_string()))?,
            None => tracing::warn!(
                verb = %route.verb,
                path = %route.path,
                origin = %route.origin,
                "Route has no authorization function, treating request as authorized"
            ),
        }

        let reply = route.handler.handle(req, res).await?;
        if reply == Reply::Handled || res.is_redirected() {
            return Ok(());
        }

        match &route.template {
            Some(template) => self.render(template, reply, req, res),
            None => match reply {
                Reply::Payload(payload) if !res.has_body() => res.json(&payload),
                _ => Ok(()),
            },
        }
    }

    fn render(
        &self,
        template: &str,
        reply: Reply,
        req: &RouteRequest,
        res: &mut RouteResponse,
    ) -> Result<(), RouteError> {
        let route = &*self.descriptor;
        let mut payload = match reply {
            Reply::Payload(payload) => payload,
            Reply::Empty | Reply::Handled => Map::new(),
        };

        if let Some(session) = req.session() {
            default_from_session(
                &mut payload,
                &session.snapshot(),
                &self.settings.session_defaults,
            );
        }

        if !route.locals.is_empty() {
            match self.settings.locals_policy {
                LocalsPolicy::MergeIntoPayload => {
                    for key in merge_static_locals(&mut payload, &route.locals) {
                        tracing::warn!(
                            path = %route.path,
                            key = %key,
                            "Static local overrides a payload value of the same name"
                        );
                    }
                }
                LocalsPolicy::ApplyToResponseLocals => {
                    merge_static_locals(res.locals_mut(), &route.locals);
                }
            }
        }

        let rendered = self.renderer.render(template, &payload, res.locals())?;
        res.set_body(rendered.content_type, Bytes::from(rendered.body));
        Ok(())
    }

    /// Terminal error stage.
    ///
    /// Unauthorized requests are sent to sign-in with their URL remembered
    /// in the session; everything else becomes the JSON error envelope.
    pub fn fail(&self, req: &RouteRequest, err: RouteError) -> Response {
        let route = &*self.descriptor;

        if err.is_unauthorized() {
            let target = encode_uri_component(req.url());
            match req.session() {
                Some(session) => {
                    session.insert(REDIRECT_TO_KEY, Value::String(target));
                }
                None => tracing::warn!(
                    url = %req.url(),
                    "No session attached, sign-in redirect target dropped"
                ),
            }
            tracing::debug!(
                url = %req.url(),
                signin = %self.settings.signin_path,
                reason = %err,
                "Redirecting unauthorized request"
            );
            return Redirect::temporary(&self.settings.signin_path).into_response();
        }

        tracing::error!(
            verb = %route.verb,
            path = %route.path,
            url = %req.url(),
            status = err.status_code(),
            code = err.code(),
            error = %err,
            "Request failed"
        );
        AppError::Route(err).into_response()
    }
}
