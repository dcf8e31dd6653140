// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Native function representation.

use crate::exception::{Exception, JsResult};
use crate::object::Object;
use crate::value::Value;
use std::any::Any;
use std::sync::Arc;

/// The behaviour behind a function object.
pub type NativeFn = Arc<dyn Fn(&CallContext<'_>) -> JsResult<Value> + Send + Sync>;

/// Function-specific state of a function object.
#[derive(Clone)]
pub struct FunctionData {
    /// The function name (`fn.name`)
    pub name: String,
    /// What happens when the function is called
    pub behavior: NativeFn,
    /// Opaque state owned by whoever created the function
    pub host_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl FunctionData {
    /// Creates function data without host state.
    pub fn new(name: impl Into<String>, behavior: NativeFn) -> Self {
        Self {
            name: name.into(),
            behavior,
            host_data: None,
        }
    }

    /// Attaches host state to the function.
    pub fn with_host_data(mut self, data: Arc<dyn Any + Send + Sync>) -> Self {
        self.host_data = Some(data);
        self
    }
}

/// The receiver and arguments of a single invocation.
pub struct CallContext<'a> {
    /// The function being invoked
    pub callee: &'a Object,
    /// The `this` binding
    pub this: Value,
    /// Positional arguments
    pub args: &'a [Value],
    /// True when invoked through `new`
    pub is_construct: bool,
}

impl CallContext<'_> {
    /// Returns the argument at `index`, or undefined when missing.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Returns the string argument at `index`, throwing a `TypeError` naming
    /// `what` otherwise.
    pub fn string_arg(&self, index: usize, what: &str) -> JsResult<String> {
        match self.args.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(Exception::type_error(format!(
                "{} must be a string, received {}",
                what,
                other.type_of()
            ))),
            None => Err(Exception::type_error(format!("{} is required", what))),
        }
    }

    /// Arguments from `index` onwards.
    pub fn rest(&self, index: usize) -> &[Value] {
        self.args.get(index..).unwrap_or_default()
    }
}
