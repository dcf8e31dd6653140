// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-value
//!
//! The in-memory JavaScript value model that module bodies, mocks and the
//! module registry exchange.
//!
//! Values are thread-safe: objects are shared handles compared by identity,
//! so the same exports object can be handed to several requirers and mutated
//! by any of them.
//!
//! ```
//! use spacey_value::{js_object, Value};
//!
//! let exports = js_object! { "answer" => 42 };
//! assert_eq!(exports.get("answer"), Value::Number(42.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod exception;
mod function;
mod json;
mod macros;
mod object;
mod value;

pub use exception::{Exception, JsResult};
pub use function::{CallContext, FunctionData, NativeFn};
pub use object::{Object, ObjectKind, Property, Slot, WeakObject};
pub use value::Value;
