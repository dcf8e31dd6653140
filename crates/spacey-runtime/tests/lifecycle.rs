// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Running whole test files: setup, execution, coverage and teardown.

mod common;

use common::{path_str, Project, NATIVE};
use spacey_runtime::coverage::{CoverageCollector, CoverageCollectorFactory};
use spacey_runtime::{Config, Environment, ModuleMap, NativeEnvironment, RuntimeError, TestFileRunner};
use spacey_value::{Exception, Object, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

fn environment_for(env: &Arc<NativeEnvironment>) -> impl FnOnce(&Config, &Path) -> spacey_runtime::Result<Arc<dyn Environment>> {
    let env = Arc::clone(env);
    move |_, _| Ok(env as Arc<dyn Environment>)
}

fn runner(config: &Config) -> TestFileRunner {
    let map = ModuleMap::crawl(config).unwrap();
    TestFileRunner::new(Arc::new(config.clone()), Arc::new(map))
}

#[test]
fn setup_files_run_before_the_test_file() {
    let project = Project::new();
    let setup_env = project.write("setup/env.js", NATIVE);
    let setup = project.write("setup/globals.js", NATIVE);
    let test = project.write("__tests__/test.js", NATIVE);
    let mut config = project.config(false);
    config.setup_env_script_file = Some(setup_env.clone());
    config.setup_files = vec![setup.clone()];

    let env = Arc::new(NativeEnvironment::for_test_file(&config, &test));
    let order = Arc::new(Mutex::new(Vec::new()));
    for (path, label) in [(&setup_env, "env"), (&setup, "setup"), (&test, "test")] {
        let order = Arc::clone(&order);
        env.register_module(path, move |_| {
            order.lock().unwrap().push(label);
            Ok(())
        });
    }

    let result = runner(&config).run(&test, environment_for(&env));
    assert!(result.passed(), "{:?}", result.error);
    assert_eq!(*order.lock().unwrap(), vec!["env", "setup", "test"]);
    assert_eq!(env.dispose_count(), 1);
}

#[test]
fn the_environment_is_disposed_once_when_the_test_throws() {
    let project = Project::new();
    let test = project.write("__tests__/test.js", NATIVE);
    let config = project.config(false);
    let env = Arc::new(NativeEnvironment::for_test_file(&config, &test));
    env.register_module(&test, |_| Err(Exception::error("boom")));

    let result = runner(&config).run(&test, environment_for(&env));
    match &result.error {
        Some(RuntimeError::Thrown(exception)) => assert_eq!(exception.message(), "boom"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(env.is_disposed());
    assert_eq!(env.dispose_count(), 1);
}

#[test]
fn missing_setup_files_fail_the_run_and_still_dispose() {
    let project = Project::new();
    let test = project.write("__tests__/test.js", NATIVE);
    let mut config = project.config(false);
    config.setup_files = vec![project.path("setup/missing.js")];
    let env = Arc::new(NativeEnvironment::for_test_file(&config, &test));

    let result = runner(&config).run(&test, environment_for(&env));
    assert!(!result.passed());
    assert_eq!(env.dispose_count(), 1);
}

#[test]
fn modules_required_after_disposal_are_not_executed() {
    let project = Project::new();
    let late = project.write("late.js", NATIVE);
    let test = project.write("__tests__/test.js", NATIVE);
    let config = project.config(false);
    let env = Arc::new(NativeEnvironment::for_test_file(&config, &test));
    env.register_module(&late, |_| Err(Exception::error("should not run")));

    let result = runner(&config).run_with(&test, environment_for(&env), |runtime, test| {
        runtime.environment().dispose();
        let exports = runtime.require_module(test, "../late")?;
        assert!(exports.as_object().unwrap().own_keys().is_empty());
        Ok(())
    });
    assert!(result.passed(), "{:?}", result.error);
    assert_eq!(env.dispose_count(), 1);
}

struct StoreCollector {
    source: String,
    store: Object,
}

impl CoverageCollector for StoreCollector {
    fn instrumented_source(&self, _store_name: &str) -> String {
        self.source.clone()
    }

    fn data_store(&self) -> Value {
        Value::from(&self.store)
    }

    fn extract_runtime_coverage_info(&self) -> serde_json::Value {
        Value::from(&self.store).to_json()
    }
}

struct StoreCollectorFactory;

impl CoverageCollectorFactory for StoreCollectorFactory {
    fn create(&self, source: &str, _filename: &Path) -> Box<dyn CoverageCollector> {
        Box::new(StoreCollector {
            source: source.to_string(),
            store: Object::new(),
        })
    }
}

#[test]
fn coverage_is_collected_outside_the_test_directory() {
    let project = Project::new();
    let sum = project.write("sum.js", NATIVE);
    let test = project.write("__tests__/test.js", NATIVE);
    let mut config = project.config(false);
    config.collect_coverage = true;

    let env = Arc::new(NativeEnvironment::for_test_file(&config, &test));
    env.register_module(&sum, |scope| {
        if let Some(store) = scope.coverage.as_object() {
            store.set("statements", 3);
        }
        Ok(())
    });
    env.register_module(&test, |scope| {
        assert!(scope.coverage.is_undefined());
        scope.require("../sum")?;
        Ok(())
    });

    let result = runner(&config)
        .coverage_collector(Arc::new(StoreCollectorFactory))
        .run(&test, environment_for(&env));
    assert!(result.passed(), "{:?}", result.error);
    assert_eq!(result.coverage.len(), 1);
    assert_eq!(
        result.coverage.get(&sum),
        Some(&serde_json::json!({ "statements": 3 }))
    );
}

#[test]
fn fake_timers_run_through_the_jest_object() {
    let project = Project::new();
    let test = project.write("__tests__/test.js", NATIVE);
    let config = project.config(false);
    let env = Arc::new(NativeEnvironment::for_test_file(&config, &test));

    let fired = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&fired);
    env.register_module(&test, move |scope| {
        let log = Arc::clone(&log);
        let callback = Object::function("callback", move |ctx| {
            log.lock().unwrap().push(ctx.arg(0));
            Ok(Value::Undefined)
        });
        let set_timeout = scope.global.get("setTimeout");
        set_timeout.call(Value::Undefined, &[callback.clone().into(), 200.into(), "late".into()])?;
        set_timeout.call(Value::Undefined, &[callback.into(), 100.into(), "early".into()])?;

        scope.jest("runTimersToTime", &[150.into()])?;
        scope.jest("runAllTimers", &[])?;
        Ok(())
    });

    let result = runner(&config).run(&test, environment_for(&env));
    assert!(result.passed(), "{:?}", result.error);
    assert_eq!(
        *fired.lock().unwrap(),
        vec![Value::from("early"), Value::from("late")]
    );
}

#[test]
fn test_context_is_visible_to_modules() {
    let project = Project::new();
    let test = project.write("__tests__/test.js", NATIVE);
    let mut config = project.config(false);
    config.test_env_data = serde_json::json!({ "locale": "en", "retries": 2 });
    let env = Arc::new(NativeEnvironment::for_test_file(&config, &test));

    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    env.register_module(&test, move |scope| {
        let data = scope.jest("getTestEnvData", &[])?;
        let path = scope.jest("currentTestPath", &[])?;
        *sink.lock().unwrap() = Some((data, path));
        Ok(())
    });

    let result = runner(&config).run(&test, environment_for(&env));
    assert!(result.passed(), "{:?}", result.error);

    let (data, path) = seen.lock().unwrap().take().unwrap();
    let data = data.as_object().unwrap().clone();
    assert!(data.is_frozen());
    assert!(!data.set("locale", "fr"));
    assert_eq!(data.get("locale"), Value::from("en"));
    assert_eq!(data.get("retries"), Value::from(2));
    assert_eq!(path, Value::from(path_str(&test)));
}
