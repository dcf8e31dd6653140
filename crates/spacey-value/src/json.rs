// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Conversion between JSON documents and JavaScript values.

use crate::object::{Object, ObjectKind};
use crate::value::Value;
use std::collections::HashSet;

impl Value {
    /// Builds a fresh value graph from a JSON document.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Object(Object::array(items.iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => {
                let object = Object::new();
                for (key, item) in map {
                    object.set(key, Value::from_json(item));
                }
                Value::Object(object)
            }
        }
    }

    /// Serializes the value the way `JSON.stringify` would.
    ///
    /// Functions and undefined are dropped from objects and become null in
    /// arrays; cyclic references serialize as null.
    pub fn to_json(&self) -> serde_json::Value {
        to_json_inner(self, &mut HashSet::new()).unwrap_or(serde_json::Value::Null)
    }
}

fn to_json_inner(value: &Value, seen: &mut HashSet<usize>) -> Option<serde_json::Value> {
    Some(match value {
        Value::Undefined => return None,
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
            serde_json::Value::Number(serde_json::Number::from(*n as i64))
        }
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Object(object) => {
            if !seen.insert(object.id()) {
                return Some(serde_json::Value::Null);
            }
            let json = match object.kind() {
                ObjectKind::Function(_) => None,
                ObjectKind::Array(elements) => Some(serde_json::Value::Array(
                    elements
                        .iter()
                        .map(|element| {
                            to_json_inner(element, seen).unwrap_or(serde_json::Value::Null)
                        })
                        .collect(),
                )),
                ObjectKind::RegExp { .. } | ObjectKind::Error => {
                    Some(serde_json::Value::Object(serde_json::Map::new()))
                }
                ObjectKind::Ordinary => {
                    let mut map = serde_json::Map::new();
                    for key in object.keys() {
                        if let Some(item) = to_json_inner(&object.get(&key), seen) {
                            map.insert(key, item);
                        }
                    }
                    Some(serde_json::Value::Object(map))
                }
            };
            seen.remove(&object.id());
            return json;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_builds_objects() {
        let value = Value::from_json(&json!({"name": "pkg", "tags": ["a", "b"], "n": 2}));
        assert_eq!(value.get("name"), Value::from("pkg"));
        assert_eq!(value.get("tags").get("1"), Value::from("b"));
        assert_eq!(value.get("n"), Value::from(2));
    }

    #[test]
    fn test_to_json_skips_functions_and_cycles() {
        let object = Object::new();
        object.set("keep", 1);
        object.set("skip", Object::function("f", |_| Ok(Value::Undefined)));
        object.set("self", object.clone());
        assert_eq!(
            Value::from(&object).to_json(),
            json!({"keep": 1, "self": null})
        );
    }
}
