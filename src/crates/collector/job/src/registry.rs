//! Explicit module registry: module name to constructor and defaults.

use crate::config::{JobConfig, ModuleDefaults, ResolvedJobConfig};
use crate::job::Job;
use crate::module::Module;
use collector_error::{CollectorError, Result};
use collector_protocol::OutputSink;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Builds a fresh module instance for one job.
pub type CreateFn = Arc<dyn Fn(&ResolvedJobConfig) -> Box<dyn Module> + Send + Sync>;

/// How to build a module, and the defaults its jobs start from.
#[derive(Clone)]
pub struct Creator {
    pub defaults: ModuleDefaults,
    pub create: CreateFn,
}

impl Creator {
    pub fn new<F, M>(defaults: ModuleDefaults, create: F) -> Self
    where
        F: Fn(&ResolvedJobConfig) -> M + Send + Sync + 'static,
        M: Module,
    {
        Self {
            defaults,
            create: Arc::new(move |config: &ResolvedJobConfig| -> Box<dyn Module> {
                Box::new(create(config))
            }),
        }
    }
}

impl std::fmt::Debug for Creator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Creator")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// Registry of the modules a plugin can run, populated explicitly at startup.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    creators: HashMap<String, Creator>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `creator` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, creator: Creator) {
        let name = name.into();
        if self.creators.insert(name.clone(), creator).is_some() {
            warn!(module = %name, "module registered twice, keeping the last registration");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Creator> {
        self.creators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.creators.contains_key(name)
    }

    /// Registered module names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.creators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.creators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }

    /// Resolve `config` against its module's defaults and build the job.
    pub fn build_job(&self, config: JobConfig, sink: OutputSink) -> Result<Job> {
        let creator = self
            .get(&config.module)
            .ok_or_else(|| CollectorError::UnknownModule {
                name: config.module.clone(),
            })?;
        let resolved = config.resolve(&creator.defaults)?;
        let module = (creator.create)(&resolved);
        Ok(Job::new(resolved, module, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleContext;
    use async_trait::async_trait;
    use collector_charts::{ChartHandle, Charts, Metrics};
    use collector_protocol::MemoryWriter;

    struct Noop;

    #[async_trait]
    impl Module for Noop {
        async fn init(&mut self, _ctx: &ModuleContext) -> bool {
            true
        }

        async fn check(&mut self) -> bool {
            true
        }

        fn charts(&self) -> Option<ChartHandle<Charts>> {
            Some(ChartHandle::default())
        }

        async fn collect(&mut self) -> Metrics {
            Metrics::new()
        }

        async fn cleanup(&mut self) {}
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            "noop",
            Creator::new(
                ModuleDefaults {
                    update_every: 5,
                    ..ModuleDefaults::default()
                },
                |_| Noop,
            ),
        );
        registry.register("other", Creator::new(ModuleDefaults::default(), |_| Noop));
        registry
    }

    #[test]
    fn test_lookup() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("noop"));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.names(), ["noop", "other"]);
        assert_eq!(registry.get("noop").unwrap().defaults.update_every, 5);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = registry();
        registry.register("noop", Creator::new(ModuleDefaults::default(), |_| Noop));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("noop").unwrap().defaults.update_every, 1);
    }

    #[test]
    fn test_build_job_applies_module_defaults() {
        let registry = registry();
        let mut config = JobConfig::new("noop");
        config.name = "local".to_string();

        let job = registry.build_job(config, OutputSink::new(MemoryWriter::new())).unwrap();
        assert_eq!(job.full_name(), "noop_local");
        assert_eq!(job.update_every(), 5);
    }

    #[test]
    fn test_build_job_unknown_module() {
        let err = registry()
            .build_job(JobConfig::new("missing"), OutputSink::new(MemoryWriter::new()))
            .err().unwrap();
        assert!(matches!(err, CollectorError::UnknownModule { name } if name == "missing"));
    }
}
