// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Value construction macros.

/// Create a JavaScript object literal.
///
/// Values go through `Value::from`, so anything convertible can be used.
///
/// # Example
///
/// ```
/// use spacey_value::{js_object, Value};
///
/// let obj = js_object! {
///     "name" => "Alice",
///     "age" => 30,
/// };
///
/// assert_eq!(obj.get("name"), Value::from("Alice"));
/// assert_eq!(obj.keys(), vec!["name", "age"]);
/// ```
#[macro_export]
macro_rules! js_object {
    () => {
        $crate::Object::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let object = $crate::Object::new();
        $(object.set($key, $crate::Value::from($value));)+
        object
    }};
}

/// Create a JavaScript array literal.
///
/// # Example
///
/// ```
/// use spacey_value::{js_array, Value};
///
/// let arr = js_array![1, "two", true];
/// assert_eq!(arr.get("length"), Value::from(3));
/// ```
#[macro_export]
macro_rules! js_array {
    () => {
        $crate::Object::array(::std::vec::Vec::new())
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Object::array(::std::vec![$($crate::Value::from($value)),+])
    };
}
