// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Running one test file from environment creation to teardown

use super::Runtime;
use crate::config::Config;
use crate::coverage::CoverageCollectorFactory;
use crate::environment::Environment;
use crate::error::{Result, RuntimeError};
use crate::module_system::ModuleMap;
use crate::transform::Transformer;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of running one test file
#[derive(Debug)]
pub struct TestFileResult {
    /// The test file
    pub test_path: PathBuf,
    /// Error raised while setting up or executing the file
    pub error: Option<RuntimeError>,
    /// Coverage per instrumented file
    pub coverage: IndexMap<PathBuf, serde_json::Value>,
    /// Wall time from environment creation to teardown
    pub duration: Duration,
}

impl TestFileResult {
    /// Returns true if the file executed without a file-level error
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs test files against a shared configuration and module map
#[derive(Clone)]
pub struct TestFileRunner {
    config: Arc<Config>,
    module_map: Arc<ModuleMap>,
    transformer: Option<Arc<dyn Transformer>>,
    coverage: Option<Arc<dyn CoverageCollectorFactory>>,
}

impl TestFileRunner {
    /// Create a runner
    pub fn new(config: Arc<Config>, module_map: Arc<ModuleMap>) -> Self {
        Self {
            config,
            module_map,
            transformer: None,
            coverage: None,
        }
    }

    /// Preprocess module source with `transformer`
    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Collect coverage with collectors from `factory`
    pub fn coverage_collector(mut self, factory: Arc<dyn CoverageCollectorFactory>) -> Self {
        self.coverage = Some(factory);
        self
    }

    /// Run `test_path` by requiring it through a fresh runtime
    pub fn run<E>(&self, test_path: &Path, make_environment: E) -> TestFileResult
    where
        E: FnOnce(&Config, &Path) -> Result<Arc<dyn Environment>>,
    {
        self.run_with(test_path, make_environment, |runtime, test_path| {
            runtime.require_module(test_path, &test_path.to_string_lossy())?;
            Ok(())
        })
    }

    /// Run `test_path` with a custom body in place of requiring it.
    ///
    /// Setup files are required first. The environment is disposed exactly
    /// once whether setup, the body or coverage extraction fails.
    pub fn run_with<E, F>(&self, test_path: &Path, make_environment: E, body: F) -> TestFileResult
    where
        E: FnOnce(&Config, &Path) -> Result<Arc<dyn Environment>>,
        F: FnOnce(&Runtime, &Path) -> Result<()>,
    {
        let start = Instant::now();
        let mut result = TestFileResult {
            test_path: test_path.to_path_buf(),
            error: None,
            coverage: IndexMap::new(),
            duration: Duration::ZERO,
        };

        info!("Running {}", test_path.display());
        match self.execute(test_path, make_environment, body, &mut result) {
            Ok(()) => debug!("{} finished", test_path.display()),
            Err(err) => {
                info!("{} failed: {}", test_path.display(), err);
                result.error = Some(err);
            }
        }
        result.duration = start.elapsed();
        result
    }

    fn execute<E, F>(
        &self,
        test_path: &Path,
        make_environment: E,
        body: F,
        result: &mut TestFileResult,
    ) -> Result<()>
    where
        E: FnOnce(&Config, &Path) -> Result<Arc<dyn Environment>>,
        F: FnOnce(&Runtime, &Path) -> Result<()>,
    {
        let environment = make_environment(&self.config, test_path)?;
        let environment = scopeguard::guard(environment, |environment| environment.dispose());

        let mut builder = Runtime::builder(
            Arc::clone(&self.config),
            Arc::clone(&*environment),
            Arc::clone(&self.module_map),
        );
        if let Some(transformer) = &self.transformer {
            builder = builder.transformer(Arc::clone(transformer));
        }
        if let Some(coverage) = &self.coverage {
            builder = builder.coverage_collector(Arc::clone(coverage));
        }
        let runtime = builder.build()?;

        let outcome = run_setup_files(&runtime, &self.config).and_then(|()| body(&runtime, test_path));
        result.coverage = runtime.get_all_coverage_info();
        outcome
    }
}

fn run_setup_files(runtime: &Runtime, config: &Config) -> Result<()> {
    for setup_file in config.setup_env_script_file.iter().chain(&config.setup_files) {
        debug!("Requiring setup file {}", setup_file.display());
        runtime.require_module(setup_file, &setup_file.to_string_lossy())?;
    }
    Ok(())
}

/// Run one test file with a fresh environment and runtime
pub fn run_test_file<E>(
    config: Arc<Config>,
    module_map: Arc<ModuleMap>,
    test_path: &Path,
    make_environment: E,
) -> TestFileResult
where
    E: FnOnce(&Config, &Path) -> Result<Arc<dyn Environment>>,
{
    TestFileRunner::new(config, module_map).run(test_path, make_environment)
}
