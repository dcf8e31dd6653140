// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The `require` function handed to module code

use super::{Runtime, WeakRuntime};
use crate::error::{Result, RuntimeError};
use crate::module_system::is_core_module;
use spacey_value::{CallContext, JsResult, Object, Value};
use std::path::{Path, PathBuf};

type RequireFn = fn(&Runtime, &Path, &str) -> Result<Value>;

impl Runtime {
    /// Build `require` for the module at `from`.
    ///
    /// The function and its members only hold a weak handle to the runtime,
    /// so module objects never keep a runtime alive.
    pub(crate) fn create_require(&self, from: &Path) -> Object {
        let runtime = self.downgrade();
        let require = bind(
            "require",
            &runtime,
            from,
            Runtime::require_module_or_mock,
        );

        require.set(
            "requireMock",
            bind("requireMock", &runtime, from, Runtime::require_mock),
        );
        require.set(
            "requireActual",
            bind("requireActual", &runtime, from, Runtime::require_module),
        );
        require.set(
            "resolve",
            bind("resolve", &runtime, from, |runtime, from, name| {
                if is_core_module(name) {
                    return Ok(Value::from(name));
                }
                let path = runtime.resolve_module(from, name)?;
                Ok(Value::from(path.to_string_lossy().into_owned()))
            }),
        );
        require.set("cache", Object::new());
        require.set("extensions", Object::new());
        require
    }
}

fn bind(name: &str, runtime: &WeakRuntime, from: &Path, f: RequireFn) -> Object {
    let runtime = runtime.clone();
    let from: PathBuf = from.to_path_buf();
    Object::function(name, move |ctx: &CallContext<'_>| -> JsResult<Value> {
        let module_name = ctx.string_arg(0, "module name")?;
        let runtime = runtime
            .upgrade()
            .ok_or_else(|| RuntimeError::RuntimeGone.into_exception())?;
        f(&runtime, &from, &module_name).map_err(RuntimeError::into_exception)
    })
}
