//! Route definitions and the validated descriptors built from them.
//!
//! A [`RouteDefinition`] is what route authors write: every field optional,
//! set through builder methods named after the descriptor fields (`verb` /
//! `method`, `path`, `handler`, `validation`, `authorization`, `template`,
//! `locals`, `cors` / `enable_cors`). Resolving it checks the required
//! fields and yields an immutable [`RouteDescriptor`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use triage_core::error::{LoadError, RouteError};
use triage_core::policy::AuthorizationMode;
use triage_core::validation::Schema;
use triage_core::verb::Verb;

use crate::request::{Reply, RouteRequest, RouteResponse};

/// The endpoint's own logic.
#[async_trait]
pub trait RouteHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        req: &mut RouteRequest,
        res: &mut RouteResponse,
    ) -> Result<Reply, RouteError>;
}

/// Decides whether the request may reach the handler. Any `Err` is treated
/// as "unauthorized".
#[async_trait]
pub trait Authorize: Send + Sync + 'static {
    async fn authorize(&self, req: &RouteRequest) -> Result<(), RouteError>;
}

/// Parameter-setup step run before every other stage.
pub type SetParams = Arc<dyn Fn(&mut RouteRequest) -> Result<(), RouteError> + Send + Sync>;

/// Adapter for synchronous handler closures.
pub struct HandlerFn<F>(F);

pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut RouteRequest, &mut RouteResponse) -> Result<Reply, RouteError>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F> RouteHandler for HandlerFn<F>
where
    F: Fn(&mut RouteRequest, &mut RouteResponse) -> Result<Reply, RouteError>
        + Send
        + Sync
        + 'static,
{
    async fn handle(
        &self,
        req: &mut RouteRequest,
        res: &mut RouteResponse,
    ) -> Result<Reply, RouteError> {
        (self.0)(req, res)
    }
}

/// Adapter for synchronous authorization closures.
pub struct AuthorizeFn<F>(F);

pub fn authorize_fn<F>(f: F) -> AuthorizeFn<F>
where
    F: Fn(&RouteRequest) -> Result<(), RouteError> + Send + Sync + 'static,
{
    AuthorizeFn(f)
}

#[async_trait]
impl<F> Authorize for AuthorizeFn<F>
where
    F: Fn(&RouteRequest) -> Result<(), RouteError> + Send + Sync + 'static,
{
    async fn authorize(&self, req: &RouteRequest) -> Result<(), RouteError> {
        (self.0)(req)
    }
}

/// Lets every request through.
pub struct AllowAll;

#[async_trait]
impl Authorize for AllowAll {
    async fn authorize(&self, _req: &RouteRequest) -> Result<(), RouteError> {
        Ok(())
    }
}

/// Explicit CORS configuration for one route.
///
/// Empty lists fall back to the permissive defaults: any origin, the
/// `GET, HEAD, PUT, PATCH, POST, DELETE` methods, and request headers
/// mirrored back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsOptions {
    /// Allowed origins. One entry is always sent as-is; several are matched
    /// against the request's `Origin`.
    pub origin: Vec<String>,
    pub methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub credentials: bool,
    pub max_age_secs: Option<u64>,
}

impl CorsOptions {
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin.push(origin.into());
        self
    }
}

/// Authoring form of a route. Resolve with [`RouteDefinition::resolve`].
#[derive(Clone, Default)]
pub struct RouteDefinition {
    verb: Option<Verb>,
    path: Option<String>,
    handler: Option<Arc<dyn RouteHandler>>,
    set_params: Option<SetParams>,
    validation: Option<Arc<dyn Schema>>,
    authorization: Option<Arc<dyn Authorize>>,
    template: Option<String>,
    locals: Map<String, Value>,
    cors: Option<CorsOptions>,
}

impl RouteDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verb = Some(verb);
        self
    }

    /// Alias of [`RouteDefinition::verb`].
    pub fn method(self, verb: Verb) -> Self {
        self.verb(verb)
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn handler(mut self, handler: impl RouteHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn set_params<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RouteRequest) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.set_params = Some(Arc::new(f));
        self
    }

    pub fn validation(mut self, schema: impl Schema) -> Self {
        self.validation = Some(Arc::new(schema));
        self
    }

    pub fn authorization(mut self, authorize: impl Authorize) -> Self {
        self.authorization = Some(Arc::new(authorize));
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn locals(mut self, locals: Map<String, Value>) -> Self {
        self.locals = locals;
        self
    }

    pub fn local(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.locals.insert(key.into(), value.into());
        self
    }

    /// `true` enables CORS with default options; `false` disables it.
    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled.then(CorsOptions::default);
        self
    }

    /// Alias of [`RouteDefinition::cors`].
    pub fn enable_cors(self, enabled: bool) -> Self {
        self.cors(enabled)
    }

    pub fn cors_options(mut self, options: CorsOptions) -> Self {
        self.cors = Some(options);
        self
    }

    /// Check required fields and freeze the definition.
    ///
    /// `origin` names the source in errors. Fields are checked in the order
    /// `verb`, `path`, `handler`, then `authorization` under
    /// [`AuthorizationMode::Required`].
    pub fn resolve(
        self,
        origin: &str,
        mode: AuthorizationMode,
    ) -> Result<RouteDescriptor, LoadError> {
        let missing = |field| LoadError::MissingField {
            field,
            origin: origin.to_string(),
        };

        let verb = self.verb.ok_or_else(|| missing("verb"))?;
        let path = self
            .path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| missing("path"))?;
        if !path.starts_with('/') {
            return Err(LoadError::InvalidPath {
                path,
                origin: origin.to_string(),
                reason: "paths must start with `/`".into(),
            });
        }
        let legacy_capture = path
            .split('/')
            .find(|s| s.starts_with(':') || s.starts_with('*'))
            .map(str::to_string);
        if let Some(segment) = legacy_capture {
            return Err(LoadError::InvalidPath {
                reason: format!("segment `{segment}` must use `{{name}}` or `{{*name}}` captures"),
                path,
                origin: origin.to_string(),
            });
        }
        let handler = self.handler.ok_or_else(|| missing("handler"))?;
        if mode == AuthorizationMode::Required && self.authorization.is_none() {
            return Err(missing("authorization"));
        }

        Ok(RouteDescriptor {
            verb,
            path,
            handler,
            set_params: self.set_params,
            validation: self.validation,
            authorization: self.authorization,
            template: self.template,
            locals: self.locals,
            cors: self.cors,
            origin: origin.to_string(),
        })
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("template", &self.template)
            .field("cors", &self.cors)
            .finish_non_exhaustive()
    }
}

/// A validated, immutable route binding.
#[derive(Clone)]
pub struct RouteDescriptor {
    pub verb: Verb,
    pub path: String,
    pub handler: Arc<dyn RouteHandler>,
    pub set_params: Option<SetParams>,
    pub validation: Option<Arc<dyn Schema>>,
    pub authorization: Option<Arc<dyn Authorize>>,
    pub template: Option<String>,
    pub locals: Map<String, Value>,
    pub cors: Option<CorsOptions>,
    /// Where the definition came from (module name or source path).
    pub origin: String,
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("template", &self.template)
            .field("locals", &self.locals)
            .field("cors", &self.cors)
            .field("has_validation", &self.validation.is_some())
            .field("has_authorization", &self.authorization.is_some())
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
