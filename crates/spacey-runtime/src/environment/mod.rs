// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Sandboxed execution environments.
//!
//! An environment owns the global object module code runs against and knows
//! how to turn wrapped module source into a callable function. The runtime
//! never evaluates source itself.

mod native;
mod timers;

pub use native::{ModuleBody, ModuleScope, NativeEnvironment};
pub use timers::{FakeTimers, TimerId};

use spacey_mock::ModuleMocker;
use spacey_value::{JsResult, Object, Value};
use std::path::Path;

/// Parameter names of the module wrapper, in call order
pub const MODULE_WRAPPER_PARAMS: [&str; 8] = [
    "module",
    "exports",
    "require",
    "__dirname",
    "__filename",
    "global",
    "jest",
    "$JEST_COVERAGE_DATA",
];

const WRAPPER_SUFFIX: &str = "\n})";

fn wrapper_prefix() -> String {
    format!("(function({}) {{", MODULE_WRAPPER_PARAMS.join(", "))
}

/// Wrap module source in a function taking the module bindings
pub fn wrap_module_source(source: &str) -> String {
    format!("{}{}{}", wrapper_prefix(), source, WRAPPER_SUFFIX)
}

/// Recover the module body from [`wrap_module_source`] output
pub fn unwrap_module_source(wrapped: &str) -> Option<&str> {
    wrapped
        .strip_prefix(wrapper_prefix().as_str())
        .and_then(|rest| rest.strip_suffix(WRAPPER_SUFFIX))
}

/// A sandbox that module code executes in.
///
/// Implementations must be usable from the thread that owns the runtime;
/// the `Send + Sync` bound lets a runtime be handed to a worker thread.
pub trait Environment: Send + Sync {
    /// The global object, or `None` once disposed
    fn global(&self) -> Option<Object>;

    /// Evaluate wrapped module source and return the wrapper function.
    ///
    /// Parse failures are reported as `SyntaxError` exceptions.
    fn evaluate(&self, source: &str, filename: &Path) -> JsResult<Value>;

    /// Fake timers installed on the global object
    fn fake_timers(&self) -> Option<FakeTimers>;

    /// Mocker that created the environment's own mock functions.
    ///
    /// A runtime adopts it so every mock of a test file lives in one registry.
    fn module_mocker(&self) -> Option<ModuleMocker> {
        None
    }

    /// Exports of a built-in module, when the environment provides one
    fn builtin_module(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Path of the test file this environment was created for
    fn test_file_path(&self) -> Option<&Path> {
        None
    }

    /// Release the global object and tear down fake timers
    fn dispose(&self);
}
