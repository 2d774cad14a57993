use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::{ConfigSource, RunnerConfig};
use crate::models::{CoreError, CoreErrorKind, CoreResult};
use crate::runners::Runner;

pub const RUNNERS_NAMESPACE: &str = "dispatch.runners";

pub type RunnerFactory =
    Arc<dyn Fn(&RunnerConfig) -> CoreResult<Box<dyn Runner>> + Send + Sync>;

/// Startup-time table of runner implementations, keyed by namespace and then
/// by exact name. Every resolve builds a fresh instance.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    namespaces: HashMap<String, BTreeMap<String, RunnerFactory>>,
    config: Option<Arc<dyn ConfigSource>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config = Some(source);
        self
    }

    pub fn register<F>(&mut self, namespace: &str, name: &str, factory: F) -> CoreResult<()>
    where
        F: Fn(&RunnerConfig) -> CoreResult<Box<dyn Runner>> + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("extension name in namespace '{namespace}' must not be empty"),
            ));
        }

        let entries = self.namespaces.entry(namespace.to_string()).or_default();
        if entries.contains_key(name) {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("duplicate extension registration for '{name}' in namespace '{namespace}'"),
            )
            .with_runner(name));
        }
        entries.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn list_available(&self, namespace: &str) -> BTreeSet<String> {
        self.namespaces
            .get(namespace)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|entries| entries.contains_key(name))
    }

    /// Builds the implementation registered under exactly `name`, handing it
    /// `config` as constructor arguments.
    pub fn resolve(
        &self,
        namespace: &str,
        name: &str,
        config: &RunnerConfig,
    ) -> CoreResult<Box<dyn Runner>> {
        let factory = self.factory(namespace, name)?;
        factory(config).map_err(|error| error.attribute(Some(name), None, None))
    }

    /// Like [`resolve`](Self::resolve), reading the constructor arguments from
    /// the registry's configuration source.
    pub fn instantiate(&self, namespace: &str, name: &str) -> CoreResult<Box<dyn Runner>> {
        let factory = self.factory(namespace, name)?;
        let config = match &self.config {
            Some(source) => RunnerConfig::load(source.as_ref(), namespace, name)?,
            None => RunnerConfig::new(),
        };
        factory(&config).map_err(|error| error.attribute(Some(name), None, None))
    }

    fn factory(&self, namespace: &str, name: &str) -> CoreResult<RunnerFactory> {
        self.namespaces
            .get(namespace)
            .and_then(|entries| entries.get(name))
            .cloned()
            .ok_or_else(|| {
                tracing::warn!(
                    namespace,
                    runner = name,
                    "no extension registered under requested name"
                );
                CoreError::new(
                    CoreErrorKind::UnknownExtension,
                    format!("invalid runner specified: '{name}' is not registered in namespace '{namespace}'"),
                )
                .with_runner(name)
            })
    }
}
