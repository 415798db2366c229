//! Binds resolved routes onto an axum router.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use tower_http::cors::CorsLayer;
use triage_core::error::LoadError;
use triage_core::verb::Verb;

use crate::config::PipelineSettings;
use crate::cors::{answer_preflight, build_cors_layer, is_preflight};
use crate::descriptor::{RouteDefinition, RouteDescriptor};
use crate::pipeline::Pipeline;
use crate::render::TemplateRenderer;

/// One registered (verb, path) binding.
#[derive(Clone)]
pub struct Binding {
    pipeline: Pipeline,
    cors: Option<CorsLayer>,
    route_path: String,
}

impl Binding {
    pub fn verb(&self) -> Verb {
        self.pipeline.descriptor().verb
    }

    pub fn path(&self) -> &str {
        &self.pipeline.descriptor().path
    }

    /// The path this binding is served under. Differs from [`path`](Self::path)
    /// when an earlier route has the same shape with other capture names.
    pub fn route_path(&self) -> &str {
        &self.route_path
    }

    pub fn descriptor(&self) -> &RouteDescriptor {
        self.pipeline.descriptor()
    }

    pub fn has_cors(&self) -> bool {
        self.cors.is_some()
    }
}

/// Collects route bindings and turns them into a [`Router`].
pub struct Registrar {
    renderer: Arc<dyn TemplateRenderer>,
    settings: Arc<PipelineSettings>,
    bindings: Vec<Binding>,
    matcher: matchit::Router<()>,
    // shape -> (first path with that shape, its capture names)
    shapes: HashMap<String, (String, Vec<String>)>,
}

impl Registrar {
    pub fn new(renderer: Arc<dyn TemplateRenderer>, settings: PipelineSettings) -> Self {
        Self {
            renderer,
            settings: Arc::new(settings),
            bindings: Vec::new(),
            matcher: matchit::Router::new(),
            shapes: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Add one binding. On error nothing is added.
    ///
    /// Paths are checked against the router's matching rules here, so a
    /// path axum would refuse fails registration instead of router
    /// construction. A path with the same shape as an earlier one but other
    /// capture names is served under the earlier path, and its params are
    /// renamed back to the declared names.
    pub fn register(&mut self, descriptor: RouteDescriptor) -> Result<(), LoadError> {
        let cors = descriptor
            .cors
            .as_ref()
            .map(|options| build_cors_layer(options, &descriptor.origin))
            .transpose()?;

        let invalid = |reason: String| LoadError::InvalidPath {
            path: descriptor.path.clone(),
            origin: descriptor.origin.clone(),
            reason,
        };
        let (shape, names) = path_shape(&descriptor.path).map_err(invalid)?;

        let (route_path, aliases) = match self.shapes.get(&shape) {
            Some((canonical, bound_names)) => {
                let aliases: Vec<(String, String)> = bound_names
                    .iter()
                    .zip(&names)
                    .filter(|(bound, declared)| bound != declared)
                    .map(|(bound, declared)| (bound.clone(), declared.clone()))
                    .collect();
                (canonical.clone(), aliases)
            }
            None => {
                let mut matcher = self.matcher.clone();
                matcher
                    .insert(descriptor.path.as_str(), ())
                    .map_err(|e| invalid(e.to_string()))?;
                self.matcher = matcher;
                self.shapes.insert(shape, (descriptor.path.clone(), names));
                (descriptor.path.clone(), Vec::new())
            }
        };

        tracing::debug!(
            verb = %descriptor.verb,
            path = %descriptor.path,
            route_path = %route_path,
            origin = %descriptor.origin,
            cors = cors.is_some(),
            "Registered route"
        );

        let pipeline = Pipeline::new(
            Arc::new(descriptor),
            Arc::clone(&self.renderer),
            Arc::clone(&self.settings),
        )
        .with_param_aliases(aliases);
        self.bindings.push(Binding {
            pipeline,
            cors,
            route_path,
        });
        Ok(())
    }

    /// Resolve `definition` under the configured authorization mode, then
    /// register it.
    pub fn register_definition(
        &mut self,
        definition: RouteDefinition,
        origin: &str,
    ) -> Result<(), LoadError> {
        let descriptor = definition.resolve(origin, self.settings.authorization_mode)?;
        self.register(descriptor)
    }

    /// Register in order, stopping at the first failure.
    pub fn register_all(
        &mut self,
        descriptors: impl IntoIterator<Item = RouteDescriptor>,
    ) -> Result<(), LoadError> {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Build the router. For each (verb, path) the first binding serves;
    /// later duplicates are logged and left out.
    ///
    /// `OPTIONS` on a path with any CORS route answers preflights through
    /// the first such route's layer. Other `OPTIONS` requests go to the
    /// path's own `OPTIONS` binding when there is one.
    pub fn into_router<S>(self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let mut order: Vec<String> = Vec::new();
        let mut by_path: HashMap<String, PathRoutes<S>> = HashMap::new();
        let mut bound: HashSet<(Verb, String)> = HashSet::new();

        for binding in self.bindings {
            let verb = binding.verb();
            let path = binding.route_path;

            if !bound.insert((verb, path.clone())) {
                tracing::warn!(
                    verb = %verb,
                    path = %binding.pipeline.descriptor().path,
                    origin = %binding.pipeline.descriptor().origin,
                    "Route already bound, duplicate is shadowed"
                );
                continue;
            }

            let entry = by_path.entry(path.clone()).or_insert_with(|| {
                order.push(path);
                PathRoutes::default()
            });
            if entry.cors.is_none() {
                entry.cors.clone_from(&binding.cors);
            }

            if verb == Verb::Options {
                entry.options = Some(binding.pipeline);
                continue;
            }

            let mut method_router = endpoint(verb, binding.pipeline);
            if let Some(cors) = binding.cors {
                method_router = method_router.layer(cors);
            }
            entry.add(method_router);
        }

        order.into_iter().fold(Router::new(), |router, path| {
            match by_path.remove(&path).and_then(PathRoutes::finish) {
                Some(method_router) => router.route(&path, method_router),
                None => router,
            }
        })
    }
}

struct PathRoutes<S> {
    router: Option<MethodRouter<S>>,
    cors: Option<CorsLayer>,
    options: Option<Pipeline>,
}

impl<S> Default for PathRoutes<S> {
    fn default() -> Self {
        Self {
            router: None,
            cors: None,
            options: None,
        }
    }
}

impl<S> PathRoutes<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn add(&mut self, method_router: MethodRouter<S>) {
        self.router = Some(match self.router.take() {
            Some(existing) => existing.merge(method_router),
            None => method_router,
        });
    }

    fn finish(mut self) -> Option<MethodRouter<S>> {
        let options = match (self.cors.take(), self.options.take()) {
            (None, None) => None,
            (None, Some(pipeline)) => Some(endpoint(Verb::Options, pipeline)),
            (Some(cors), pipeline) => Some(on(MethodFilter::OPTIONS, move |req: Request| {
                let cors = cors.clone();
                let pipeline = pipeline.clone();
                async move {
                    if is_preflight(&req) {
                        return answer_preflight(cors, req).await;
                    }
                    match pipeline {
                        Some(pipeline) => pipeline.run(req).await,
                        None => StatusCode::NO_CONTENT.into_response(),
                    }
                }
            })),
        };
        if let Some(options) = options {
            self.add(options);
        }
        self.router
    }
}

fn endpoint<S>(verb: Verb, pipeline: Pipeline) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    on(method_filter(verb), move |req: Request| {
        let pipeline = pipeline.clone();
        async move { pipeline.run(req).await }
    })
}

/// Reduce a path to its matching shape, collecting capture names in order.
///
/// `{name}` becomes `{}` and `{*name}` becomes `{*}`; `{{` and `}}` are
/// literal braces.
fn path_shape(path: &str) -> Result<(String, Vec<String>), String> {
    let mut shape = String::with_capacity(path.len());
    let mut names = Vec::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                shape.push_str("{{");
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                shape.push_str("}}");
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(format!("unclosed `{{` capture in `{path}`")),
                    }
                }
                let (catch_all, bare) = match name.strip_prefix('*') {
                    Some(rest) => (true, rest),
                    None => (false, name.as_str()),
                };
                if bare.is_empty() {
                    return Err(format!("capture without a name in `{path}`"));
                }
                shape.push_str(if catch_all { "{*}" } else { "{}" });
                names.push(bare.to_string());
            }
            '}' => return Err(format!("unmatched `}}` in `{path}`")),
            c => shape.push(c),
        }
    }
    Ok((shape, names))
}

fn method_filter(verb: Verb) -> MethodFilter {
    match verb {
        Verb::Get => MethodFilter::GET,
        Verb::Post => MethodFilter::POST,
        Verb::Put => MethodFilter::PUT,
        Verb::Patch => MethodFilter::PATCH,
        Verb::Delete => MethodFilter::DELETE,
        Verb::Options => MethodFilter::OPTIONS,
        Verb::Head => MethodFilter::HEAD,
    }
}
