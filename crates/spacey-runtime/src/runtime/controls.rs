// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mocking controls for one requiring module (the `jest` object)

use super::Runtime;
use crate::environment::FakeTimers;
use crate::error::{Result, RuntimeError};
use spacey_mock::MockFunction;
use spacey_value::{CallContext, Exception, JsResult, Object, Value};
use std::path::{Path, PathBuf};

/// Mocking controls bound to the module at `from`.
///
/// Names passed to these methods are resolved relative to that module, so
/// `mock("./dep")` means the same file the module's own `require("./dep")`
/// would load.
#[derive(Debug, Clone)]
pub struct ModuleControls {
    runtime: Runtime,
    from: PathBuf,
}

impl ModuleControls {
    pub(crate) fn new(runtime: Runtime, from: PathBuf) -> Self {
        Self { runtime, from }
    }

    /// The module these controls act for
    pub fn module_path(&self) -> &Path {
        &self.from
    }

    /// Stop mocking modules that have no explicit override
    pub fn disable_automock(&self) -> &Self {
        self.runtime.set_automock(false);
        self
    }

    /// Mock every module that has no explicit override
    pub fn enable_automock(&self) -> &Self {
        self.runtime.set_automock(true);
        self
    }

    /// Always serve the real module for `name`
    pub fn unmock(&self, name: &str) -> Result<&Self> {
        self.runtime.set_explicit_mock(&self.from, name, false)?;
        Ok(self)
    }

    /// Always serve a mock for `name`
    pub fn mock(&self, name: &str) -> Result<&Self> {
        self.runtime.set_explicit_mock(&self.from, name, true)?;
        Ok(self)
    }

    /// Serve the memoized result of calling `factory` as the mock for `name`
    pub fn mock_with_factory(&self, name: &str, factory: Value) -> Result<&Self> {
        self.runtime.set_mock_factory(&self.from, name, factory)?;
        Ok(self)
    }

    /// Serve `exports` as the mock for `name`
    pub fn set_mock(&self, name: &str, exports: Value) -> Result<&Self> {
        let factory = Object::function("mockFactory", move |_| Ok(exports.clone()));
        self.mock_with_factory(name, Value::from(factory))
    }

    /// A fresh automock of `name`, independent of the mock registry
    pub fn gen_mock_from_module(&self, name: &str) -> Result<Value> {
        self.runtime.gen_mock_from_module(&self.from, name)
    }

    /// A new mock function, optionally with an implementation
    pub fn mock_fn(&self, implementation: Option<Object>) -> MockFunction {
        let mock = self.runtime.mocker().get_mock_function();
        if implementation.is_some() {
            mock.mock_implementation(implementation);
        }
        mock
    }

    /// See [`Runtime::reset_module_registry`]
    pub fn reset_module_registry(&self) -> &Self {
        self.runtime.reset_module_registry();
        self
    }

    /// The environment's fake timers
    pub fn fake_timers(&self) -> Result<FakeTimers> {
        self.runtime
            .environment()
            .fake_timers()
            .ok_or(RuntimeError::FakeTimersUnavailable)
    }

    /// Path of the test file being run
    pub fn current_test_path(&self) -> Option<PathBuf> {
        self.runtime
            .environment()
            .test_file_path()
            .map(Path::to_path_buf)
    }

    /// A frozen shallow copy of the configured `testEnvData`
    pub fn test_env_data(&self) -> Object {
        let copy = Object::new();
        if let Some(data) = Value::from_json(&self.runtime.config().test_env_data).as_object() {
            for key in data.own_keys() {
                copy.set(&key, data.get(&key));
            }
        }
        copy.freeze();
        copy
    }
}

/// A control method. `None` means "return the control object".
type Method = fn(&ModuleControls, &CallContext<'_>) -> JsResult<Option<Value>>;

const METHODS: &[(&[&str], Method)] = &[
    (&["disableAutomock", "autoMockOff"], disable_automock),
    (&["enableAutomock", "autoMockOn"], enable_automock),
    (&["unmock", "dontMock"], unmock),
    (&["mock", "doMock"], mock),
    (&["setMock"], set_mock),
    (&["genMockFromModule"], gen_mock_from_module),
    (&["fn"], mock_fn),
    (&["genMockFunction", "genMockFn"], gen_mock_function),
    (&["resetModuleRegistry"], reset_module_registry),
    (&["clearAllTimers"], clear_all_timers),
    (&["runAllTicks"], run_all_ticks),
    (&["runAllImmediates"], run_all_immediates),
    (&["runAllTimers"], run_all_timers),
    (&["runOnlyPendingTimers"], run_only_pending_timers),
    (&["runTimersToTime"], run_timers_to_time),
    (&["useFakeTimers"], use_fake_timers),
    (&["useRealTimers"], use_real_timers),
    (&["currentTestPath"], current_test_path),
    (&["getTestEnvData"], get_test_env_data),
];

impl Runtime {
    /// Build the control object handed to the module at `from`
    pub(crate) fn create_jest_object(&self, from: &Path) -> Object {
        let jest = Object::new();
        let handle = jest.downgrade();

        for (names, method) in METHODS {
            let runtime = self.downgrade();
            let from = from.to_path_buf();
            let this = handle.clone();
            let method = *method;
            let function = Object::function(names[0], move |ctx| {
                let runtime = runtime
                    .upgrade()
                    .ok_or_else(|| RuntimeError::RuntimeGone.into_exception())?;
                let controls = ModuleControls::new(runtime, from.clone());
                match method(&controls, ctx)? {
                    Some(value) => Ok(value),
                    None => Ok(this.upgrade().map(Value::from).unwrap_or_default()),
                }
            });
            for name in *names {
                jest.set(name, function.clone());
            }
        }
        jest
    }
}

fn throw(err: RuntimeError) -> Exception {
    err.into_exception()
}

fn disable_automock(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    controls.disable_automock();
    Ok(None)
}

fn enable_automock(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    controls.enable_automock();
    Ok(None)
}

fn unmock(controls: &ModuleControls, ctx: &CallContext<'_>) -> JsResult<Option<Value>> {
    let name = ctx.string_arg(0, "moduleName")?;
    controls.unmock(&name).map_err(throw)?;
    Ok(None)
}

fn mock(controls: &ModuleControls, ctx: &CallContext<'_>) -> JsResult<Option<Value>> {
    let name = ctx.string_arg(0, "moduleName")?;
    let factory = ctx.arg(1);
    if factory.is_undefined() {
        controls.mock(&name).map_err(throw)?;
    } else {
        controls.mock_with_factory(&name, factory).map_err(throw)?;
    }
    Ok(None)
}

fn set_mock(controls: &ModuleControls, ctx: &CallContext<'_>) -> JsResult<Option<Value>> {
    let name = ctx.string_arg(0, "moduleName")?;
    controls.set_mock(&name, ctx.arg(1)).map_err(throw)?;
    Ok(None)
}

fn gen_mock_from_module(controls: &ModuleControls, ctx: &CallContext<'_>) -> JsResult<Option<Value>> {
    let name = ctx.string_arg(0, "moduleName")?;
    controls.gen_mock_from_module(&name).map(Some).map_err(throw)
}

fn mock_fn(controls: &ModuleControls, ctx: &CallContext<'_>) -> JsResult<Option<Value>> {
    let implementation = ctx.arg(0).as_object().filter(|f| f.is_function()).cloned();
    Ok(Some(controls.mock_fn(implementation).to_value()))
}

fn gen_mock_function(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    Ok(Some(controls.mock_fn(None).to_value()))
}

fn reset_module_registry(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    controls.reset_module_registry();
    Ok(None)
}

fn with_timers(
    controls: &ModuleControls,
    f: impl FnOnce(&FakeTimers) -> JsResult<()>,
) -> JsResult<Option<Value>> {
    let timers = controls.fake_timers().map_err(throw)?;
    f(&timers)?;
    Ok(Some(Value::Undefined))
}

fn clear_all_timers(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    with_timers(controls, |timers| {
        timers.clear_all_timers();
        Ok(())
    })
}

fn run_all_ticks(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    with_timers(controls, FakeTimers::run_all_ticks)
}

fn run_all_immediates(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    with_timers(controls, FakeTimers::run_all_immediates)
}

fn run_all_timers(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    with_timers(controls, FakeTimers::run_all_timers)
}

fn run_only_pending_timers(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    with_timers(controls, FakeTimers::run_only_pending_timers)
}

fn run_timers_to_time(controls: &ModuleControls, ctx: &CallContext<'_>) -> JsResult<Option<Value>> {
    let ms = ctx
        .arg(0)
        .as_number()
        .ok_or_else(|| Exception::type_error("msToRun must be a number"))?;
    with_timers(controls, |timers| timers.run_timers_to_time(ms))
}

fn use_fake_timers(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    with_timers(controls, |timers| {
        timers.use_fake_timers();
        Ok(())
    })
}

fn use_real_timers(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    with_timers(controls, |timers| {
        timers.use_real_timers();
        Ok(())
    })
}

fn current_test_path(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    Ok(Some(
        controls
            .current_test_path()
            .map(|path| Value::from(path.to_string_lossy().into_owned()))
            .unwrap_or_default(),
    ))
}

fn get_test_env_data(controls: &ModuleControls, _: &CallContext<'_>) -> JsResult<Option<Value>> {
    Ok(Some(Value::from(controls.test_env_data())))
}
