// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Thrown JavaScript values.

use crate::object::{Object, ObjectKind};
use crate::value::Value;
use std::fmt;

/// Result of an operation that may throw.
pub type JsResult<T> = std::result::Result<T, Exception>;

/// A thrown JavaScript value.
///
/// Anything can be thrown; the helpers build the usual error objects.
#[derive(Debug, Clone)]
pub struct Exception {
    value: Value,
}

impl Exception {
    /// Wraps an arbitrary thrown value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Throws an error object with the given constructor name.
    pub fn with_name(name: &str, message: impl AsRef<str>) -> Self {
        Self::new(Object::error(name, message.as_ref()))
    }

    /// Create a new `Error`
    pub fn error(message: impl AsRef<str>) -> Self {
        Self::with_name("Error", message)
    }

    /// Create a new `TypeError`
    pub fn type_error(message: impl AsRef<str>) -> Self {
        Self::with_name("TypeError", message)
    }

    /// Create a new `SyntaxError`
    pub fn syntax_error(message: impl AsRef<str>) -> Self {
        Self::with_name("SyntaxError", message)
    }

    /// Create a new `ReferenceError`
    pub fn reference_error(message: impl AsRef<str>) -> Self {
        Self::with_name("ReferenceError", message)
    }

    /// Attaches a `code` property (e.g. `MODULE_NOT_FOUND`) to an error
    /// object. Primitive throws are left untouched.
    pub fn with_code(self, code: &str) -> Self {
        if let Some(object) = self.value.as_object() {
            object.set("code", code);
        }
        self
    }

    /// The thrown value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the exception, returning the thrown value.
    pub fn into_value(self) -> Value {
        self.value
    }

    fn error_object(&self) -> Option<&Object> {
        self.value
            .as_object()
            .filter(|object| matches!(object.kind(), ObjectKind::Error))
    }

    /// The error name (`TypeError`, ...) when an error object was thrown.
    pub fn name(&self) -> Option<String> {
        self.error_object()
            .and_then(|object| object.get("name").as_str().map(str::to_string))
    }

    /// The error message, or the display form of a non-error throw.
    pub fn message(&self) -> String {
        match self.error_object() {
            Some(object) => object.get("message").to_string(),
            None => self.value.to_string(),
        }
    }

    /// The `code` property of a thrown error object.
    pub fn code(&self) -> Option<String> {
        self.error_object()
            .and_then(|object| object.get("code").as_str().map(str::to_string))
    }

    /// Returns true for a thrown `SyntaxError`.
    pub fn is_syntax_error(&self) -> bool {
        self.name().as_deref() == Some("SyntaxError")
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}: {}", name, self.message()),
            None => write!(f, "Uncaught {}", self.value),
        }
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_objects() {
        let err = Exception::type_error("x is not a function").with_code("E_CALL");
        assert_eq!(err.name().as_deref(), Some("TypeError"));
        assert_eq!(err.message(), "x is not a function");
        assert_eq!(err.code().as_deref(), Some("E_CALL"));
        assert_eq!(err.to_string(), "TypeError: x is not a function");
    }

    #[test]
    fn test_primitive_throw() {
        let err = Exception::new("boom");
        assert!(err.name().is_none());
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "Uncaught boom");
        assert!(!err.is_syntax_error());
    }
}
