//! Plugin registry and loader.
//!
//! Packages are discovered on disk, but their code is linked in: every
//! loadable module is registered by name in a [`PluginRegistry`]. The module
//! name is derived from the package by convention (`<evaluation>` for
//! evaluations, `<evaluation>_<implementation>` with `-` mapped to `_` in the
//! implementation part), so a package directory and its registered module are
//! matched the same way an import path would be.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::config::TorahBenchConfig;
use crate::discovery::Discovery;
use crate::error::{DiscoveryError, DiscoveryResult, PackageKind};
use crate::module::{EvaluationModule, Implementation};

/// What a factory gets to build its module.
pub struct PluginContext<'a> {
    pub config: &'a TorahBenchConfig,
    /// Root directory of the package being loaded
    pub package_dir: &'a Path,
}

pub type EvaluationFactory =
    Box<dyn Fn(&PluginContext<'_>) -> Result<Arc<dyn EvaluationModule>> + Send + Sync>;
pub type ImplementationFactory =
    Box<dyn Fn(&PluginContext<'_>) -> Result<Arc<dyn Implementation>> + Send + Sync>;

/// An evaluation's module is named after the evaluation itself.
pub fn evaluation_module_name(evaluation: &str) -> String {
    evaluation.to_string()
}

/// Only the implementation half is normalized.
pub fn implementation_module_name(evaluation: &str, implementation: &str) -> String {
    format!("{evaluation}_{}", implementation.replace('-', "_"))
}

/// Explicit table of loadable modules, keyed by module name.
#[derive(Default)]
pub struct PluginRegistry {
    evaluations: HashMap<String, EvaluationFactory>,
    implementations: HashMap<String, ImplementationFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every bundled package.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::packages::register_builtin(&mut registry);
        registry
    }

    pub fn register_evaluation<F>(&mut self, evaluation: &str, factory: F) -> &mut Self
    where
        F: Fn(&PluginContext<'_>) -> Result<Arc<dyn EvaluationModule>> + Send + Sync + 'static,
    {
        self.evaluations
            .insert(evaluation_module_name(evaluation), Box::new(factory));
        self
    }

    pub fn register_implementation<F>(&mut self, evaluation: &str, implementation: &str, factory: F) -> &mut Self
    where
        F: Fn(&PluginContext<'_>) -> Result<Arc<dyn Implementation>> + Send + Sync + 'static,
    {
        self.implementations.insert(
            implementation_module_name(evaluation, implementation),
            Box::new(factory),
        );
        self
    }

    /// Registered module names, sorted.
    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .evaluations
            .keys()
            .chain(self.implementations.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Loads modules for discovered packages and caches the handles.
///
/// Owned by the entry point and passed around explicitly; nothing here is
/// process-global. Loading takes `&mut self`, so a loader is used by one
/// caller at a time.
pub struct PluginLoader {
    discovery: Discovery,
    registry: PluginRegistry,
    config: TorahBenchConfig,
    source_roots: Vec<PathBuf>,
    evaluations: HashMap<String, Arc<dyn EvaluationModule>>,
    implementations: HashMap<String, Arc<dyn Implementation>>,
}

impl PluginLoader {
    pub fn new(discovery: Discovery, registry: PluginRegistry, config: TorahBenchConfig) -> Self {
        Self {
            discovery,
            registry,
            config,
            source_roots: Vec::new(),
            evaluations: HashMap::new(),
            implementations: HashMap::new(),
        }
    }

    /// Loader over `config.packages_root` with the bundled packages registered.
    pub fn from_config(config: TorahBenchConfig) -> Self {
        let discovery = Discovery::new(config.packages_root.clone())
            .with_descriptor_files(config.descriptor_files.clone());
        Self::new(discovery, PluginRegistry::builtin(), config)
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    pub fn config(&self) -> &TorahBenchConfig {
        &self.config
    }

    /// Source roots of every package loaded so far, in first-load order.
    pub fn source_roots(&self) -> &[PathBuf] {
        &self.source_roots
    }

    pub fn load_evaluation_module(&mut self, evaluation: &str) -> DiscoveryResult<Arc<dyn EvaluationModule>> {
        let package_dir = self.discovery.evaluation_dir(evaluation);
        if !package_dir.is_dir() {
            return Err(DiscoveryError::NotFound {
                kind: PackageKind::Evaluation,
                name: evaluation.to_string(),
            });
        }
        self.register_source_root(&package_dir);

        let module = evaluation_module_name(evaluation);
        if let Some(handle) = self.evaluations.get(&module) {
            return Ok(handle.clone());
        }

        let target = format!("evaluation '{evaluation}'");
        let factory = self
            .registry
            .evaluations
            .get(&module)
            .ok_or_else(|| DiscoveryError::load_failed(&target, anyhow!("no module registered as `{module}`")))?;
        let ctx = PluginContext {
            config: &self.config,
            package_dir: &package_dir,
        };
        let handle = factory(&ctx).map_err(|e| DiscoveryError::load_failed(&target, e))?;

        debug!("loaded module `{}` from {}", module, package_dir.display());
        self.evaluations.insert(module, handle.clone());
        Ok(handle)
    }

    pub fn load_implementation_module(
        &mut self,
        evaluation: &str,
        implementation: &str,
    ) -> DiscoveryResult<Arc<dyn Implementation>> {
        let package_dir = self.discovery.implementation_dir(evaluation, implementation);
        if !package_dir.is_dir() {
            return Err(DiscoveryError::NotFound {
                kind: PackageKind::Implementation,
                name: format!("{implementation}' for '{evaluation}"),
            });
        }
        self.register_source_root(&package_dir);

        let module = implementation_module_name(evaluation, implementation);
        if let Some(handle) = self.implementations.get(&module) {
            return Ok(handle.clone());
        }

        let target = format!("implementation '{implementation}' for '{evaluation}'");
        let factory = self
            .registry
            .implementations
            .get(&module)
            .ok_or_else(|| DiscoveryError::load_failed(&target, anyhow!("no module registered as `{module}`")))?;
        let ctx = PluginContext {
            config: &self.config,
            package_dir: &package_dir,
        };
        let handle = factory(&ctx).map_err(|e| DiscoveryError::load_failed(&target, e))?;

        debug!("loaded module `{}` from {}", module, package_dir.display());
        self.implementations.insert(module, handle.clone());
        Ok(handle)
    }

    fn register_source_root(&mut self, package_dir: &Path) {
        let src = package_dir.join("src");
        if !self.source_roots.contains(&src) {
            self.source_roots.push(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::VecDataSource;
    use crate::task::from_async_fn;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use torahbench_types::TorahEvalOutput;

    struct Fixed;

    impl EvaluationModule for Fixed {
        fn name(&self) -> &str {
            "sample"
        }

        fn dataset(&self) -> Arc<dyn crate::datasource::DataSource> {
            Arc::new(VecDataSource::new(Vec::new()))
        }
    }

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        for dir in [
            "evals/sample",
            "evals/unregistered",
            "implementations/acme-labs/sample",
            "implementations/broken/sample",
        ] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
            fs::write(tmp.path().join(dir).join("package.toml"), "").unwrap();
        }
        tmp
    }

    fn loader(root: &Path, builds: Arc<AtomicUsize>) -> PluginLoader {
        let mut registry = PluginRegistry::new();
        registry.register_evaluation("sample", |_| Ok(Arc::new(Fixed) as Arc<dyn EvaluationModule>));
        registry.register_implementation("sample", "acme-labs", move |ctx| {
            builds.fetch_add(1, Ordering::SeqCst);
            assert!(ctx.package_dir.ends_with("implementations/acme-labs/sample"));
            Ok(from_async_fn("acme-labs", |input| {
                let input = input.clone();
                async move { Ok(TorahEvalOutput::answer_for(&input, "42", 1.0)) }
            }))
        });
        registry.register_implementation("sample", "broken", |_| Err(anyhow!("missing API key")));
        PluginLoader::new(Discovery::new(root), registry, TorahBenchConfig::default())
    }

    #[test]
    fn module_names_follow_convention() {
        assert_eq!(evaluation_module_name("toraheval"), "toraheval");
        assert_eq!(implementation_module_name("toraheval", "sofer-ai"), "toraheval_sofer_ai");
        assert_eq!(evaluation_module_name("my-eval"), "my-eval");
        assert_eq!(implementation_module_name("my-eval", "acme-labs"), "my-eval_acme_labs");
    }

    struct Named(&'static str);

    impl EvaluationModule for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn dataset(&self) -> Arc<dyn crate::datasource::DataSource> {
            Arc::new(VecDataSource::new(Vec::new()))
        }
    }

    #[test]
    fn hyphenated_and_underscored_evaluations_stay_distinct() {
        let tmp = TempDir::new().unwrap();
        for dir in ["evals/my-eval", "evals/my_eval"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        let mut registry = PluginRegistry::new();
        registry
            .register_evaluation("my-eval", |_| Ok(Arc::new(Named("my-eval")) as Arc<dyn EvaluationModule>))
            .register_evaluation("my_eval", |_| Ok(Arc::new(Named("my_eval")) as Arc<dyn EvaluationModule>));

        let names = registry.module_names();
        assert!(names.contains(&"my-eval".to_string()));
        assert!(names.contains(&"my_eval".to_string()));

        let mut loader = PluginLoader::new(Discovery::new(tmp.path()), registry, TorahBenchConfig::default());
        assert_eq!(loader.load_evaluation_module("my-eval").unwrap().name(), "my-eval");
        assert_eq!(loader.load_evaluation_module("my_eval").unwrap().name(), "my_eval");
    }

    #[test]
    fn loading_twice_returns_the_same_handle() {
        let tmp = tree();
        let builds = Arc::new(AtomicUsize::new(0));
        let mut loader = loader(tmp.path(), builds.clone());

        let first = loader.load_implementation_module("sample", "acme-labs").unwrap();
        let second = loader.load_implementation_module("sample", "acme-labs").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.implementation_name(), second.implementation_name());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(loader.source_roots().len(), 1);
    }

    #[test]
    fn source_roots_are_ordered_and_deduplicated() {
        let tmp = tree();
        let mut loader = loader(tmp.path(), Arc::new(AtomicUsize::new(0)));
        loader.load_evaluation_module("sample").unwrap();
        loader.load_implementation_module("sample", "acme-labs").unwrap();
        loader.load_evaluation_module("sample").unwrap();
        assert_eq!(
            loader.source_roots(),
            &[
                tmp.path().join("evals/sample/src"),
                tmp.path().join("implementations/acme-labs/sample/src"),
            ]
        );
    }

    #[test]
    fn missing_package_is_not_found() {
        let tmp = tree();
        let mut loader = loader(tmp.path(), Arc::new(AtomicUsize::new(0)));
        let err = loader.load_implementation_module("sample", "nobody").err().unwrap();
        assert!(err.is_not_found());
        let err = loader.load_evaluation_module("nothing").err().unwrap();
        assert!(err.is_not_found());
        assert!(loader.source_roots().is_empty());
    }

    #[test]
    fn unregistered_module_fails_to_load() {
        let tmp = tree();
        let mut loader = loader(tmp.path(), Arc::new(AtomicUsize::new(0)));
        let err = loader.load_evaluation_module("unregistered").err().unwrap();
        assert!(matches!(err, DiscoveryError::LoadFailed { .. }));
        assert!(err.to_string().contains("`unregistered`"));
    }

    #[test]
    fn factory_error_is_wrapped_with_its_cause() {
        let tmp = tree();
        let mut loader = loader(tmp.path(), Arc::new(AtomicUsize::new(0)));
        let err = loader.load_implementation_module("sample", "broken").err().unwrap();
        let message = err.to_string();
        assert!(message.contains("implementation 'broken' for 'sample'"));
        assert!(message.contains("missing API key"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn builtin_registry_has_bundled_modules() {
        let names = PluginRegistry::builtin().module_names();
        for expected in ["toraheval", "toraheval_sofer_ai", "toraheval_dicta", "toraheval_anthropic_api"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }
}
