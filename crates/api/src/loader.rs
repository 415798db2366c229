//! Route discovery and resolution.
//!
//! A [`Discover`] source reports route modules under a root. Each module is
//! either a static [`RouteDefinition`] or a factory invoked with that
//! route's merged configuration. [`RouteLoader::load`] turns the modules
//! into validated [`RouteDescriptor`]s in discovery order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use triage_core::error::LoadError;
use triage_core::policy::AuthorizationMode;
use triage_core::route_config::{RouteConfig, RouteConfigMap};

use crate::config::PipelineSettings;
use crate::descriptor::{RouteDefinition, RouteDescriptor};

/// Builds a definition from the route's configuration.
pub type RouteFactory = Arc<dyn Fn(&RouteConfig) -> RouteDefinition + Send + Sync>;

/// The two shapes a route module can take.
#[derive(Clone)]
pub enum RouteModule {
    Static(RouteDefinition),
    Factory(RouteFactory),
}

impl RouteModule {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&RouteConfig) -> RouteDefinition + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    /// Produce the definition. Factories receive `config`; static modules
    /// ignore it.
    pub fn instantiate(&self, config: &RouteConfig) -> RouteDefinition {
        match self {
            Self::Static(definition) => definition.clone(),
            Self::Factory(factory) => factory(config),
        }
    }
}

impl fmt::Debug for RouteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(definition) => f.debug_tuple("Static").field(definition).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// A module reported by a [`Discover`] source.
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    /// Route name, used as the configuration key.
    pub name: String,
    pub source_path: PathBuf,
    pub module: RouteModule,
}

/// Enumerates the route modules found under `root`.
pub trait Discover {
    fn discover(&self, root: &Path) -> Result<Vec<DiscoveredModule>, LoadError>;
}

/// In-process module registry. Modules are reported at `root/<name>` in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: Vec<(String, RouteModule)>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: impl Into<String>, module: RouteModule) -> Self {
        self.modules.push((name.into(), module));
        self
    }

    pub fn with_static(self, name: impl Into<String>, definition: RouteDefinition) -> Self {
        self.with_module(name, RouteModule::Static(definition))
    }

    pub fn with_factory<F>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&RouteConfig) -> RouteDefinition + Send + Sync + 'static,
    {
        self.with_module(name, RouteModule::factory(factory))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Discover for ModuleCatalog {
    fn discover(&self, root: &Path) -> Result<Vec<DiscoveredModule>, LoadError> {
        Ok(self
            .modules
            .iter()
            .map(|(name, module)| DiscoveredModule {
                name: name.clone(),
                source_path: root.join(name),
                module: module.clone(),
            })
            .collect())
    }
}

/// Resolves discovered modules into descriptors.
#[derive(Debug, Clone, Copy)]
pub struct RouteLoader {
    mode: AuthorizationMode,
    strict: bool,
}

impl Default for RouteLoader {
    fn default() -> Self {
        Self {
            mode: AuthorizationMode::default(),
            strict: true,
        }
    }
}

impl RouteLoader {
    pub fn new(mode: AuthorizationMode, strict: bool) -> Self {
        Self { mode, strict }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.authorization_mode, settings.strict_load)
    }

    /// Load every module `source` reports under `root`.
    ///
    /// Strict loading returns the first resolution error. Otherwise the
    /// error is logged and only that route is skipped.
    pub fn load(
        &self,
        source: &dyn Discover,
        root: &Path,
        config: &RouteConfigMap,
    ) -> Result<Vec<RouteDescriptor>, LoadError> {
        let modules = source.discover(root)?;
        let mut descriptors = Vec::with_capacity(modules.len());

        for discovered in modules {
            let origin = discovered.source_path.display().to_string();
            let definition = discovered
                .module
                .instantiate(&config.config_for(&discovered.name));

            match definition.resolve(&origin, self.mode) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(err) if self.strict => return Err(err),
                Err(err) => {
                    tracing::error!(origin = %origin, error = %err, "Skipping invalid route definition");
                }
            }
        }

        tracing::info!(
            root = %root.display(),
            count = descriptors.len(),
            "Loaded route definitions"
        );
        Ok(descriptors)
    }
}
