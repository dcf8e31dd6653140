// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The module registry of one test file.
//!
//! A [`Runtime`] resolves module names, decides between real modules and
//! mocks, and executes every module file at most once per registry lifetime.
//! Modules are registered before their body runs, so circular requires see
//! the partially built exports of the module that is still executing.

mod controls;
mod lifecycle;
mod require;

pub use controls::ModuleControls;
pub use lifecycle::{run_test_file, TestFileResult, TestFileRunner};

use crate::config::Config;
use crate::coverage::{should_collect_coverage, CoverageCollector, CoverageCollectorFactory, COVERAGE_STORE_NAME};
use crate::environment::{wrap_module_source, Environment};
use crate::error::{Result, RuntimeError};
use crate::module_system::policy::MockPolicy;
use crate::module_system::{
    is_core_module, MockDecision, ModuleIdentity, ModuleMap, ModuleRecord, Registries, Resolver,
    MOCKS_DIRECTORY, NODE_MODULES,
};
use crate::transform::Transformer;
use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use spacey_mock::{MockMetadata, ModuleMocker};
use spacey_value::{js_object, Exception, Object, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Builder for [`Runtime`]
pub struct RuntimeBuilder {
    config: Arc<Config>,
    environment: Arc<dyn Environment>,
    module_map: Arc<ModuleMap>,
    transformer: Option<Arc<dyn Transformer>>,
    coverage: Option<Arc<dyn CoverageCollectorFactory>>,
}

impl RuntimeBuilder {
    /// Preprocess module source before evaluation
    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Instrument modules for coverage with collectors from `factory`
    pub fn coverage_collector(mut self, factory: Arc<dyn CoverageCollectorFactory>) -> Self {
        self.coverage = Some(factory);
        self
    }

    /// Build the runtime
    pub fn build(self) -> Result<Runtime> {
        let config = self.config;
        let resolver = Resolver::new(&config, Arc::clone(&self.module_map))?;
        let unmock = config.unmock_regex()?;
        let mocker = self.environment.module_mocker().unwrap_or_default();

        let mut policy = MockPolicy::new(config.automock);
        for setup_file in config.setup_env_script_file.iter().chain(&config.setup_files) {
            if setup_file.components().any(|c| c.as_os_str() == NODE_MODULES) {
                policy.mark_transitively_unmocked(ModuleIdentity::for_path(setup_file));
            }
        }

        if config.collect_coverage && self.coverage.is_none() {
            tracing::warn!("collectCoverage is set but no coverage collector was provided");
        }

        Ok(Runtime {
            inner: Arc::new(RuntimeInner {
                environment: self.environment,
                module_map: self.module_map,
                resolver,
                mocker,
                unmock,
                transformer: self.transformer,
                coverage_factory: self.coverage,
                registries: Mutex::new(Registries::default()),
                policy: Mutex::new(policy),
                factories: Mutex::new(HashMap::new()),
                metadata: Mutex::new(HashMap::new()),
                collectors: Mutex::new(IndexMap::new()),
                executing: Mutex::new(Vec::new()),
                core_modules: Mutex::new(HashMap::new()),
                mock_parent: js_object! {
                    "id" => "mockParent",
                    "exports" => Object::new(),
                },
                config,
            }),
        })
    }
}

struct RuntimeInner {
    config: Arc<Config>,
    environment: Arc<dyn Environment>,
    module_map: Arc<ModuleMap>,
    resolver: Resolver,
    mocker: ModuleMocker,
    unmock: Option<Regex>,
    transformer: Option<Arc<dyn Transformer>>,
    coverage_factory: Option<Arc<dyn CoverageCollectorFactory>>,
    registries: Mutex<Registries>,
    policy: Mutex<MockPolicy>,
    factories: Mutex<HashMap<ModuleIdentity, Value>>,
    /// Automock metadata per resolved path, kept across registry resets
    metadata: Mutex<HashMap<PathBuf, MockMetadata>>,
    collectors: Mutex<IndexMap<PathBuf, Box<dyn CoverageCollector>>>,
    /// Module files whose bodies are currently running, innermost last
    executing: Mutex<Vec<PathBuf>>,
    /// Stand-in exports for built-ins the environment does not provide
    core_modules: Mutex<HashMap<String, Value>>,
    /// Shared `module.parent` of every module
    mock_parent: Object,
}

/// Module registry bound to one environment
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning handle held by `require` functions and control objects
#[derive(Clone)]
pub(crate) struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (modules, mocks) = {
            let registries = self.inner.registries.lock();
            (registries.modules.len(), registries.mocks.len())
        };
        f.debug_struct("Runtime")
            .field("root_dir", &self.inner.config.root_dir)
            .field("modules", &modules)
            .field("mocks", &mocks)
            .finish()
    }
}

impl Runtime {
    /// Start building a runtime
    pub fn builder(
        config: Arc<Config>,
        environment: Arc<dyn Environment>,
        module_map: Arc<ModuleMap>,
    ) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            environment,
            module_map,
            transformer: None,
            coverage: None,
        }
    }

    /// Create a runtime without preprocessing or coverage
    pub fn new(
        config: Arc<Config>,
        environment: Arc<dyn Environment>,
        module_map: Arc<ModuleMap>,
    ) -> Result<Self> {
        Self::builder(config, environment, module_map).build()
    }

    /// The runtime configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The environment modules execute in
    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.inner.environment
    }

    /// The module map used for Haste lookups
    pub fn module_map(&self) -> &ModuleMap {
        &self.inner.module_map
    }

    /// The mocker that owns every mock function of this runtime
    pub fn mocker(&self) -> &ModuleMocker {
        &self.inner.mocker
    }

    /// Control API bound to the requiring file `from`
    pub fn controls(&self, from: impl Into<PathBuf>) -> ModuleControls {
        ModuleControls::new(self.clone(), from.into())
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Resolve `name` as required from `from`
    pub fn resolve_module(&self, from: &Path, name: &str) -> Result<PathBuf> {
        self.inner.resolver.resolve_module(from, name)
    }

    /// Identity of `name` as required from `from`
    pub fn module_identity(&self, from: &Path, name: &str) -> Result<ModuleIdentity> {
        self.inner.resolver.module_identity(from, name)
    }

    /// Record of a module in the current registry
    pub fn module_record(&self, path: &Path) -> Option<ModuleRecord> {
        self.inner.registries.lock().modules.get(path).cloned()
    }

    /// Serve the real module.
    ///
    /// Each file executes once per registry lifetime; later requires return
    /// the current exports, even while the module is still executing.
    pub fn require_module(&self, from: &Path, name: &str) -> Result<Value> {
        if is_core_module(name) {
            return Ok(self.core_module(name));
        }

        let path = match self.manual_mock_stand_in(from, name)? {
            Some(mock_path) => mock_path,
            None => self.inner.resolver.resolve_module(from, name)?,
        };
        self.load_module(Some(from), &path)
    }

    /// Serve the mock: a registered factory, a manual mock, or an automock
    pub fn require_mock(&self, from: &Path, name: &str) -> Result<Value> {
        let identity = self.module_identity(from, name)?;
        let cached = self.inner.registries.lock().mocks.get(&identity).cloned();
        if let Some(mock) = cached {
            return Ok(mock);
        }

        let factory = self.inner.factories.lock().get(&identity).cloned();
        let mock = match factory {
            Some(factory) => {
                debug!("Calling mock factory for {}", identity);
                factory.call(Value::Undefined, &[])?
            }
            None => match self.manual_mock_path(from, name)? {
                Some(mock_path) => {
                    debug!("Using manual mock {}", mock_path.display());
                    self.exec_manual_mock(&mock_path)?
                }
                None => self.generate_mock(from, name)?,
            },
        };

        self.inner
            .registries
            .lock()
            .mocks
            .insert(identity, mock.clone());
        Ok(mock)
    }

    /// Serve the mock or the real module, whichever the mock policy picks
    pub fn require_module_or_mock(&self, from: &Path, name: &str) -> Result<Value> {
        let decision = self.explain(from, name)?;
        if decision.mock {
            self.require_mock(from, name)
        } else {
            self.require_module(from, name)
        }
    }

    /// Whether `require(name)` from `from` serves a mock
    pub fn should_mock(&self, from: &Path, name: &str) -> Result<bool> {
        Ok(self.explain(from, name)?.mock)
    }

    /// The mock policy decision for `name` required from `from`
    pub fn explain(&self, from: &Path, name: &str) -> Result<MockDecision> {
        let decision = self.inner.policy.lock().decide(
            &self.inner.resolver,
            self.inner.unmock.as_ref(),
            from,
            name,
        )?;
        debug!(
            "Mock decision for '{}' from {}: {} ({})",
            name,
            from.display(),
            decision.mock,
            decision.reason
        );
        Ok(decision)
    }

    /// Forget every loaded module and mock.
    ///
    /// Mock call logs and pending fake timers are cleared too. Explicit
    /// `mock`/`unmock` overrides, mock factories and cached automock
    /// metadata survive.
    pub fn reset_module_registry(&self) {
        self.inner.registries.lock().clear();
        self.inner.mocker.clear_all_mocks();
        if let Some(timers) = self.inner.environment.fake_timers() {
            timers.clear_all_timers();
        }
        debug!("Module registry reset");
    }

    /// Drain the coverage recorded by every collector
    pub fn get_all_coverage_info(&self) -> IndexMap<PathBuf, serde_json::Value> {
        let collectors = std::mem::take(&mut *self.inner.collectors.lock());
        collectors
            .into_iter()
            .map(|(path, collector)| (path, collector.extract_runtime_coverage_info()))
            .collect()
    }

    pub(crate) fn set_automock(&self, automock: bool) {
        self.inner.policy.lock().set_automock(automock);
    }

    /// Whether modules without an explicit override are automocked
    pub fn automock(&self) -> bool {
        self.inner.policy.lock().automock()
    }

    pub(crate) fn set_explicit_mock(&self, from: &Path, name: &str, mock: bool) -> Result<()> {
        let identity = self.module_identity(from, name)?;
        self.inner.policy.lock().set_explicit(identity, mock);
        Ok(())
    }

    pub(crate) fn set_mock_factory(&self, from: &Path, name: &str, factory: Value) -> Result<()> {
        let identity = self.module_identity(from, name)?;
        self.inner.policy.lock().set_explicit(identity.clone(), true);
        self.inner.factories.lock().insert(identity, factory);
        Ok(())
    }

    /// Legacy stand-in: a module that only exists as a manual mock is served
    /// from the mock file even through `require_module`.
    ///
    /// Applies when the name is not a Haste module, a manual mock is
    /// registered for it, the name does not resolve to a real file, the mock
    /// is not the module currently executing, and the identity was not
    /// explicitly unmocked.
    fn manual_mock_stand_in(&self, from: &Path, name: &str) -> Result<Option<PathBuf>> {
        let map = &self.inner.module_map;
        if map.lookup(name).is_some() {
            return Ok(None);
        }
        let Some(mock_path) = map.lookup_mock(name) else {
            return Ok(None);
        };
        if self.inner.executing.lock().last().is_some_and(|p| p == mock_path) {
            return Ok(None);
        }
        let identity = self.module_identity(from, name)?;
        if self.inner.policy.lock().explicit(&identity) == Some(false) {
            return Ok(None);
        }
        if self.inner.resolver.resolve_module(from, name).is_ok() {
            return Ok(None);
        }
        debug!("Serving manual mock {} for '{}'", mock_path.display(), name);
        Ok(Some(mock_path.to_path_buf()))
    }

    /// Manual mock for `name`: registered by name, or a `__mocks__` file
    /// next to the resolved real module
    fn manual_mock_path(&self, from: &Path, name: &str) -> Result<Option<PathBuf>> {
        if let Some(mock_path) = self.inner.module_map.lookup_mock(name) {
            return Ok(Some(mock_path.to_path_buf()));
        }
        if is_core_module(name) {
            return Ok(None);
        }

        let real_path = self.inner.resolver.resolve_module(from, name)?;
        let sibling = match (real_path.parent(), real_path.file_name()) {
            (Some(dir), Some(file_name)) => dir.join(MOCKS_DIRECTORY).join(file_name),
            _ => return Ok(None),
        };
        Ok(sibling.is_file().then_some(sibling))
    }

    fn load_module(&self, parent: Option<&Path>, path: &Path) -> Result<Value> {
        let module = {
            let mut registries = self.inner.registries.lock();
            if let Some(exports) = registries.module_exports(path) {
                return Ok(exports);
            }
            let module = self.module_object(path);
            registries.modules.insert(
                path.to_path_buf(),
                ModuleRecord::new(path.to_path_buf(), module.clone()),
            );
            if let Some(parent) = parent {
                registries.add_child(parent, path);
            }
            module
        };

        debug!("Loading module {}", path.display());
        self.run_module(&module, path)?;
        Ok(module.get("exports"))
    }

    fn exec_manual_mock(&self, path: &Path) -> Result<Value> {
        let module = self.module_object(path);
        self.run_module(&module, path)?;
        Ok(module.get("exports"))
    }

    fn run_module(&self, module: &Object, path: &Path) -> Result<()> {
        if is_json(path) {
            let content = read_source(path)?;
            let json: serde_json::Value =
                serde_json::from_str(&content).map_err(|source| RuntimeError::InvalidJson {
                    path: path.to_path_buf(),
                    source,
                })?;
            module.set("exports", Value::from_json(&json));
        } else {
            self.exec_module(module, path)?;
        }
        module.set("loaded", true);
        Ok(())
    }

    fn exec_module(&self, module: &Object, path: &Path) -> Result<()> {
        let Some(global) = self.inner.environment.global() else {
            debug!("Environment disposed, not executing {}", path.display());
            return Ok(());
        };

        let mut source = read_source(path)?;
        if let Some(transformer) = &self.inner.transformer {
            source = transformer.transform(source, path)?;
        }
        let (source, coverage_store) = self.instrument(path, source);

        let wrapper = self
            .inner
            .environment
            .evaluate(&wrap_module_source(&source), path)
            .map_err(|e| self.evaluation_error(e, path, &source))?;

        let require = self.create_require(path);
        module.set("require", require.clone());
        let jest = self.create_jest_object(path);
        let exports = module.get("exports");
        let dirname = path
            .parent()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default();

        let args = [
            Value::from(module),
            exports.clone(),
            Value::from(require),
            Value::from(dirname),
            Value::from(path.to_string_lossy().into_owned()),
            Value::from(global),
            Value::from(jest),
            coverage_store,
        ];

        self.inner.executing.lock().push(path.to_path_buf());
        let result = wrapper.call(exports, &args);
        self.inner.executing.lock().pop();
        result?;
        Ok(())
    }

    fn instrument(&self, path: &Path, source: String) -> (String, Value) {
        let Some(factory) = &self.inner.coverage_factory else {
            return (source, Value::Undefined);
        };
        if !should_collect_coverage(&self.inner.config, path) {
            return (source, Value::Undefined);
        }
        let mut collectors = self.inner.collectors.lock();
        let collector = collectors
            .entry(path.to_path_buf())
            .or_insert_with(|| factory.create(&source, path));
        (
            collector.instrumented_source(COVERAGE_STORE_NAME),
            collector.data_store(),
        )
    }

    /// Attach file and preprocessor context to syntax errors
    fn evaluation_error(&self, error: Exception, path: &Path, source: &str) -> RuntimeError {
        if !error.is_syntax_error() {
            return RuntimeError::Thrown(error);
        }

        let config = &self.inner.config;
        let relative = |p: &Path| {
            pathdiff::diff_paths(p, &config.root_dir)
                .unwrap_or_else(|| p.to_path_buf())
                .display()
                .to_string()
        };
        let preprocessor = match &config.script_preprocessor {
            Some(preprocessor) => relative(preprocessor),
            None => "No preprocessor specified, consider installing 'babel-jest'".to_string(),
        };
        let preprocessed = if config.script_preprocessor.is_some() {
            "preprocessed "
        } else {
            ""
        };

        RuntimeError::Syntax {
            path: path.to_path_buf(),
            message: format!(
                "{} in file '{}'.\n\n\
                 Make sure your preprocessor is set up correctly and ensure \
                 your 'preprocessorIgnorePatterns' configuration is correct.\n\
                 Preprocessor: {}.\n\
                 Jest tried to the execute the following {}code:\n{}\n",
                error.message(),
                relative(path),
                preprocessor,
                preprocessed,
                source
            ),
        }
    }

    /// Describe the real module in isolated registries and build a mock
    /// from the description
    fn generate_mock(&self, from: &Path, name: &str) -> Result<Value> {
        let mocker = &self.inner.mocker;
        if is_core_module(name) {
            let metadata = mocker
                .get_metadata(&self.core_module(name))
                .ok_or_else(|| RuntimeError::MockGeneration { path: PathBuf::from(name) })?;
            return Ok(mocker.generate_from_metadata(&metadata)?);
        }

        let path = self.inner.resolver.resolve_module(from, name)?;
        let cached = self.inner.metadata.lock().contains_key(&path);
        if !cached {
            // Circular automocks see an empty object while this one is built
            if let Some(placeholder) = mocker.get_metadata(&Value::from(Object::new())) {
                self.inner.metadata.lock().insert(path.clone(), placeholder);
            }

            let saved = std::mem::take(&mut *self.inner.registries.lock());
            let exports = self.require_module(from, name);
            let isolated = std::mem::replace(&mut *self.inner.registries.lock(), saved);
            drop(isolated);

            let described = exports.and_then(|exports| {
                mocker
                    .get_metadata(&exports)
                    .ok_or_else(|| RuntimeError::MockGeneration { path: path.clone() })
            });
            match described {
                Ok(metadata) => {
                    self.inner.metadata.lock().insert(path.clone(), metadata);
                }
                Err(err) => {
                    self.inner.metadata.lock().remove(&path);
                    return Err(err);
                }
            }
        }

        let metadata = self
            .inner
            .metadata
            .lock()
            .get(&path)
            .cloned()
            .ok_or_else(|| RuntimeError::MockGeneration { path: path.clone() })?;
        debug!("Generated automock for {}", path.display());
        Ok(mocker.generate_from_metadata(&metadata)?)
    }

    /// Public entry point of `jest.genMockFromModule`
    pub(crate) fn gen_mock_from_module(&self, from: &Path, name: &str) -> Result<Value> {
        self.generate_mock(from, name)
    }

    fn core_module(&self, name: &str) -> Value {
        if let Some(exports) = self.inner.environment.builtin_module(name) {
            return exports;
        }
        let name = name.strip_prefix("node:").unwrap_or(name);
        self.inner
            .core_modules
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Value::from(Object::new()))
            .clone()
    }

    fn module_object(&self, path: &Path) -> Object {
        let filename = path.to_string_lossy().into_owned();
        let paths: Vec<Value> = path
            .parent()
            .map(crate::module_system::node_modules_paths)
            .unwrap_or_default()
            .into_iter()
            .map(|p| Value::from(p.to_string_lossy().into_owned()))
            .collect();

        js_object! {
            "id" => filename.clone(),
            "filename" => filename,
            "exports" => Object::new(),
            "children" => Object::array(Vec::new()),
            "parent" => self.inner.mock_parent.clone(),
            "paths" => Object::array(paths),
            "loaded" => false,
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| RuntimeError::Read {
        path: path.to_path_buf(),
        source,
    })
}
