// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host environment whose modules are Rust closures.
//!
//! Each module file is backed by a closure registered under its absolute
//! path. Evaluating the wrapped source of a registered file produces a
//! wrapper function that unpacks the positional module bindings into a
//! [`ModuleScope`] and runs the closure. Blank files evaluate to empty
//! modules, anything else is a `SyntaxError`.

use super::{unwrap_module_source, Environment, FakeTimers};
use crate::config::Config;
use parking_lot::RwLock;
use spacey_mock::ModuleMocker;
use spacey_value::{js_object, CallContext, Exception, JsResult, Object, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Body of a native module
pub type ModuleBody = Arc<dyn Fn(&ModuleScope) -> JsResult<()> + Send + Sync>;

/// Bindings a module body runs with
#[derive(Debug, Clone)]
pub struct ModuleScope {
    /// `this` of the module body (the initial exports)
    pub this: Value,
    /// The `module` object
    pub module: Object,
    /// The initial `exports` object
    pub exports: Value,
    /// The module's `require` function
    pub require: Value,
    /// `__dirname`
    pub dirname: String,
    /// `__filename`
    pub filename: String,
    /// The environment's global object
    pub global: Value,
    /// The module's control object
    pub jest: Value,
    /// Coverage data store, undefined when coverage is off
    pub coverage: Value,
}

impl ModuleScope {
    fn from_call(ctx: &CallContext<'_>) -> JsResult<Self> {
        let module = ctx
            .arg(0)
            .as_object()
            .cloned()
            .ok_or_else(|| Exception::type_error("module wrapper called without a module object"))?;
        Ok(Self {
            this: ctx.this.clone(),
            module,
            exports: ctx.arg(1),
            require: ctx.arg(2),
            dirname: ctx.arg(3).as_str().unwrap_or_default().to_string(),
            filename: ctx.arg(4).as_str().unwrap_or_default().to_string(),
            global: ctx.arg(5),
            jest: ctx.arg(6),
            coverage: ctx.arg(7),
        })
    }

    /// `require(name)`
    pub fn require(&self, name: &str) -> JsResult<Value> {
        self.require.call(Value::Undefined, &[Value::from(name)])
    }

    /// `require.requireActual(name)`
    pub fn require_actual(&self, name: &str) -> JsResult<Value> {
        self.require
            .get("requireActual")
            .call(Value::Undefined, &[Value::from(name)])
    }

    /// `require.requireMock(name)`
    pub fn require_mock(&self, name: &str) -> JsResult<Value> {
        self.require
            .get("requireMock")
            .call(Value::Undefined, &[Value::from(name)])
    }

    /// `require.resolve(name)`
    pub fn resolve(&self, name: &str) -> JsResult<Value> {
        self.require
            .get("resolve")
            .call(Value::Undefined, &[Value::from(name)])
    }

    /// Current `module.exports`
    pub fn exports(&self) -> Value {
        self.module.get("exports")
    }

    /// Assign a property on the current `module.exports`
    pub fn export(&self, key: &str, value: impl Into<Value>) -> JsResult<()> {
        match self.exports().as_object() {
            Some(exports) => {
                exports.set(key, value);
                Ok(())
            }
            None => Err(Exception::type_error(format!(
                "Cannot set property '{key}' of non-object module.exports"
            ))),
        }
    }

    /// Replace `module.exports`
    pub fn set_exports(&self, value: impl Into<Value>) {
        self.module.set("exports", value);
    }

    /// Call a method of the control object
    pub fn jest(&self, method: &str, args: &[Value]) -> JsResult<Value> {
        self.jest.get(method).call(self.jest.clone(), args)
    }
}

/// Environment backed by registered Rust closures
pub struct NativeEnvironment {
    global: RwLock<Option<Object>>,
    bodies: RwLock<HashMap<PathBuf, ModuleBody>>,
    builtins: RwLock<HashMap<String, Value>>,
    mocker: ModuleMocker,
    timers: FakeTimers,
    test_file_path: Option<PathBuf>,
    disposals: AtomicUsize,
}

impl std::fmt::Debug for NativeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEnvironment")
            .field("modules", &self.bodies.read().len())
            .field("test_file_path", &self.test_file_path)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl NativeEnvironment {
    /// Create an environment with fake timers installed
    pub fn new(config: &Config) -> Self {
        Self::build(config, None)
    }

    /// Create an environment for running `test_path`
    pub fn for_test_file(config: &Config, test_path: impl Into<PathBuf>) -> Self {
        Self::build(config, Some(test_path.into()))
    }

    fn build(config: &Config, test_file_path: Option<PathBuf>) -> Self {
        let global = js_object! {
            "process" => js_object! {
                "platform" => std::env::consts::OS,
                "env" => Object::new(),
            },
        };
        let mocker = ModuleMocker::new();
        let timers = FakeTimers::new(&global, &mocker, config.timer_max_loops);

        Self {
            global: RwLock::new(Some(global)),
            bodies: RwLock::new(HashMap::new()),
            builtins: RwLock::new(HashMap::new()),
            mocker,
            timers,
            test_file_path,
            disposals: AtomicUsize::new(0),
        }
    }

    /// Register the body of the module file at `path`
    pub fn register_module<F>(&self, path: impl Into<PathBuf>, body: F)
    where
        F: Fn(&ModuleScope) -> JsResult<()> + Send + Sync + 'static,
    {
        self.bodies.write().insert(path.into(), Arc::new(body));
    }

    /// Provide the exports of a built-in module
    pub fn register_builtin(&self, name: impl Into<String>, exports: impl Into<Value>) {
        self.builtins.write().insert(name.into(), exports.into());
    }

    /// Returns true once [`Environment::dispose`] has run
    pub fn is_disposed(&self) -> bool {
        self.global.read().is_none()
    }

    /// Number of times the environment was actually torn down
    pub fn dispose_count(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl Environment for NativeEnvironment {
    fn global(&self) -> Option<Object> {
        self.global.read().clone()
    }

    fn evaluate(&self, source: &str, filename: &Path) -> JsResult<Value> {
        let body = self.bodies.read().get(filename).cloned();
        if let Some(body) = body {
            let wrapper = Object::function("Object.<anonymous>", move |ctx| {
                let scope = ModuleScope::from_call(ctx)?;
                body(&scope)?;
                Ok(Value::Undefined)
            });
            return Ok(Value::from(wrapper));
        }

        match unwrap_module_source(source) {
            Some(inner) if inner.trim().is_empty() => Ok(Value::from(Object::function(
                "Object.<anonymous>",
                |_| Ok(Value::Undefined),
            ))),
            _ => Err(Exception::syntax_error(format!(
                "Unexpected token: no native module body registered for {}",
                filename.display()
            ))),
        }
    }

    fn fake_timers(&self) -> Option<FakeTimers> {
        Some(self.timers.clone())
    }

    fn module_mocker(&self) -> Option<ModuleMocker> {
        Some(self.mocker.clone())
    }

    fn builtin_module(&self, name: &str) -> Option<Value> {
        let name = name.strip_prefix("node:").unwrap_or(name);
        self.builtins.read().get(name).cloned()
    }

    fn test_file_path(&self) -> Option<&Path> {
        self.test_file_path.as_deref()
    }

    fn dispose(&self) {
        let Some(global) = self.global.write().take() else {
            return;
        };
        self.timers.dispose();
        for key in global.own_keys() {
            global.delete(&key);
        }
        self.bodies.write().clear();
        self.disposals.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Environment disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::wrap_module_source;

    #[test]
    fn test_registered_body_runs_with_positional_bindings() {
        let env = NativeEnvironment::new(&Config::default());
        let path = PathBuf::from("/p/a.js");
        env.register_module(&path, |scope| {
            scope.export("dirname", scope.dirname.as_str())?;
            scope.export("thisIsExports", scope.this == scope.exports)
        });

        let wrapper = env.evaluate(&wrap_module_source("// native"), &path).unwrap();
        let module = js_object! { "exports" => Object::new() };
        let exports = module.get("exports");
        wrapper
            .call(
                exports.clone(),
                &[
                    module.clone().into(),
                    exports.clone(),
                    Value::Undefined,
                    "/p".into(),
                    "/p/a.js".into(),
                ],
            )
            .unwrap();
        assert_eq!(exports.get("dirname"), Value::from("/p"));
        assert_eq!(exports.get("thisIsExports"), Value::Boolean(true));
    }

    #[test]
    fn test_blank_and_unknown_sources() {
        let env = NativeEnvironment::new(&Config::default());
        let path = Path::new("/p/empty.js");
        assert!(env.evaluate(&wrap_module_source("  \n"), path).unwrap().is_function());

        let err = env
            .evaluate(&wrap_module_source("module.exports = 1;"), path)
            .unwrap_err();
        assert!(err.is_syntax_error());
    }

    #[test]
    fn test_dispose_happens_once() {
        let env = NativeEnvironment::new(&Config::default());
        let global = env.global().unwrap();
        assert!(global.get("setTimeout").is_function());

        env.dispose();
        env.dispose();
        assert!(env.global().is_none());
        assert_eq!(env.dispose_count(), 1);
        assert!(global.own_keys().is_empty());
    }
}
