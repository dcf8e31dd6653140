// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! JavaScript object representation.
//!
//! An [`Object`] is a reference-counted handle. Locks are only held for the
//! duration of a single property access; calls into native functions never
//! run while the callee's lock is held, so functions may freely read and
//! write the objects they were invoked on.

use crate::exception::{Exception, JsResult};
use crate::function::{CallContext, FunctionData, NativeFn};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// The internal class of an object.
#[derive(Clone)]
pub enum ObjectKind {
    /// A plain object
    Ordinary,
    /// An array with its elements
    Array(Vec<Value>),
    /// A callable function
    Function(FunctionData),
    /// A regular expression literal
    RegExp {
        /// Pattern source
        source: String,
        /// Pattern flags
        flags: String,
    },
    /// An error object (`new Error(...)` and friends)
    Error,
}

impl ObjectKind {
    /// The `[[Class]]` name used by `Object.prototype.toString`.
    pub fn class_name(&self) -> &'static str {
        match self {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::RegExp { .. } => "RegExp",
            ObjectKind::Error => "Error",
        }
    }
}

/// Storage of a single property.
#[derive(Debug, Clone)]
pub enum Slot {
    /// A plain data property
    Data(Value),
    /// An accessor property backed by a getter function
    Accessor {
        /// The getter, if any
        getter: Option<Object>,
    },
}

/// A property descriptor.
#[derive(Debug, Clone)]
pub struct Property {
    /// The stored value or accessor
    pub slot: Slot,
    /// Whether the property shows up in enumeration
    pub enumerable: bool,
    /// Whether the property can be reassigned
    pub writable: bool,
}

impl Property {
    fn data(value: Value, enumerable: bool) -> Self {
        Self {
            slot: Slot::Data(value),
            enumerable,
            writable: true,
        }
    }
}

struct ObjectData {
    kind: ObjectKind,
    properties: IndexMap<String, Property>,
    prototype: Option<Object>,
    extensible: bool,
}

/// A shared handle to a JavaScript object.
///
/// Cloning the handle aliases the object; equality is identity.
#[derive(Clone)]
pub struct Object(Arc<RwLock<ObjectData>>);

/// A non-owning handle, used by functions that refer back to their own
/// object without keeping it alive.
#[derive(Clone)]
pub struct WeakObject(Weak<RwLock<ObjectData>>);

impl WeakObject {
    /// Upgrades to a strong handle if the object is still alive.
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }
}

impl Object {
    fn from_kind(kind: ObjectKind, prototype: Option<Object>) -> Self {
        Object(Arc::new(RwLock::new(ObjectData {
            kind,
            properties: IndexMap::new(),
            prototype,
            extensible: true,
        })))
    }

    /// Creates a new empty object.
    pub fn new() -> Self {
        Self::from_kind(ObjectKind::Ordinary, None)
    }

    /// Creates an empty object inheriting from `prototype`.
    pub fn with_prototype(prototype: Option<Object>) -> Self {
        Self::from_kind(ObjectKind::Ordinary, prototype)
    }

    /// Creates an array from its elements.
    pub fn array(elements: Vec<Value>) -> Self {
        Self::from_kind(ObjectKind::Array(elements), None)
    }

    /// Creates a regular expression object.
    pub fn regexp(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self::from_kind(
            ObjectKind::RegExp {
                source: source.into(),
                flags: flags.into(),
            },
            None,
        )
    }

    /// Creates an error object with non-enumerable `name` and `message`.
    pub fn error(name: &str, message: &str) -> Self {
        let object = Self::from_kind(ObjectKind::Error, None);
        object.define("name", Value::from(name), false);
        object.define("message", Value::from(message), false);
        object
    }

    /// Creates a native function without a `prototype` property.
    pub fn function<F>(name: impl Into<String>, behavior: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> JsResult<Value> + Send + Sync + 'static,
    {
        Self::from_function_data(FunctionData::new(name, Arc::new(behavior)))
    }

    /// Creates a native function usable with `new`.
    ///
    /// The function gets a fresh `prototype` object whose non-enumerable
    /// `constructor` points back at the function.
    pub fn constructor_function<F>(name: impl Into<String>, behavior: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> JsResult<Value> + Send + Sync + 'static,
    {
        let function = Self::function(name, behavior);
        let prototype = Object::new();
        prototype.define("constructor", Value::from(&function), false);
        function.define("prototype", Value::Object(prototype), false);
        function
    }

    /// Creates a function object from prepared function data.
    pub fn from_function_data(data: FunctionData) -> Self {
        Self::from_kind(ObjectKind::Function(data), None)
    }

    /// Stable identity of this object for the lifetime of the handle.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Returns true if both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Creates a non-owning handle.
    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }

    /// A snapshot of the object's internal class.
    pub fn kind(&self) -> ObjectKind {
        self.0.read().kind.clone()
    }

    /// Returns true if the object is callable.
    pub fn is_function(&self) -> bool {
        matches!(self.0.read().kind, ObjectKind::Function(_))
    }

    /// Returns true if the object is an array.
    pub fn is_array(&self) -> bool {
        matches!(self.0.read().kind, ObjectKind::Array(_))
    }

    /// Returns the `[[Class]]` name of the object.
    pub fn class_name(&self) -> &'static str {
        self.0.read().kind.class_name()
    }

    /// The prototype of this object.
    pub fn prototype(&self) -> Option<Object> {
        self.0.read().prototype.clone()
    }

    /// Replaces the prototype of this object.
    pub fn set_prototype(&self, prototype: Option<Object>) {
        self.0.write().prototype = prototype;
    }

    /// Reads a property through the prototype chain.
    ///
    /// A getter that throws reads as undefined; use [`Object::try_get`] to
    /// observe the exception.
    pub fn get(&self, key: &str) -> Value {
        self.try_get(key).unwrap_or_default()
    }

    /// Reads a property through the prototype chain, running getters.
    pub fn try_get(&self, key: &str) -> JsResult<Value> {
        let mut current = Some(self.clone());
        while let Some(object) = current {
            let found = object.lookup_own(key);
            match found {
                Some(Slot::Data(value)) => return Ok(value),
                Some(Slot::Accessor { getter: Some(getter) }) => {
                    return getter.call(Value::Object(self.clone()), &[]);
                }
                Some(Slot::Accessor { getter: None }) => return Ok(Value::Undefined),
                None => current = object.prototype(),
            }
        }
        Ok(Value::Undefined)
    }

    fn lookup_own(&self, key: &str) -> Option<Slot> {
        let data = self.0.read();
        if let ObjectKind::Array(elements) = &data.kind {
            if key == "length" {
                return Some(Slot::Data(Value::from(elements.len())));
            }
            if let Ok(index) = key.parse::<usize>() {
                return elements.get(index).cloned().map(Slot::Data);
            }
        }
        if let ObjectKind::Function(function) = &data.kind {
            if key == "name" && !data.properties.contains_key("name") {
                return Some(Slot::Data(Value::from(function.name.as_str())));
            }
        }
        data.properties.get(key).map(|property| property.slot.clone())
    }

    /// Reads an own property without consulting the prototype chain.
    pub fn get_own(&self, key: &str) -> Option<Value> {
        match self.lookup_own(key)? {
            Slot::Data(value) => Some(value),
            Slot::Accessor { .. } => None,
        }
    }

    /// Returns the own property descriptor for `key`.
    pub fn own_property(&self, key: &str) -> Option<Property> {
        self.0.read().properties.get(key).cloned()
    }

    /// Assigns a property, creating an enumerable data property if absent.
    ///
    /// Returns false when the write was refused (frozen object, read-only
    /// property or accessor).
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let mut data = self.0.write();
        if !data.extensible {
            return false;
        }
        if let ObjectKind::Array(elements) = &mut data.kind {
            if let Ok(index) = key.parse::<usize>() {
                if index >= elements.len() {
                    elements.resize(index + 1, Value::Undefined);
                }
                elements[index] = value;
                return true;
            }
        }
        match data.properties.get_mut(key) {
            Some(property) => match property.slot {
                Slot::Data(_) if property.writable => {
                    property.slot = Slot::Data(value);
                    true
                }
                _ => false,
            },
            None => {
                data.properties
                    .insert(key.to_string(), Property::data(value, true));
                true
            }
        }
    }

    /// Defines (or redefines) a writable data property.
    pub fn define(&self, key: &str, value: Value, enumerable: bool) {
        let mut data = self.0.write();
        data.properties
            .insert(key.to_string(), Property::data(value, enumerable));
    }

    /// Defines an enumerable accessor property.
    pub fn define_getter(&self, key: &str, getter: Object) {
        let mut data = self.0.write();
        data.properties.insert(
            key.to_string(),
            Property {
                slot: Slot::Accessor {
                    getter: Some(getter),
                },
                enumerable: true,
                writable: false,
            },
        );
    }

    /// Removes an own property.
    pub fn delete(&self, key: &str) -> bool {
        let mut data = self.0.write();
        if !data.extensible {
            return false;
        }
        data.properties.shift_remove(key).is_some()
    }

    /// Checks for a property anywhere on the prototype chain.
    pub fn has(&self, key: &str) -> bool {
        let mut current = Some(self.clone());
        while let Some(object) = current {
            if object.has_own(key) {
                return true;
            }
            current = object.prototype();
        }
        false
    }

    /// Checks for an own property.
    pub fn has_own(&self, key: &str) -> bool {
        self.lookup_own(key).is_some()
    }

    /// Own property names in insertion order, array indices first.
    ///
    /// Includes non-enumerable properties, like `Object.getOwnPropertyNames`.
    pub fn own_keys(&self) -> Vec<String> {
        let data = self.0.read();
        let mut keys = Vec::new();
        if let ObjectKind::Array(elements) = &data.kind {
            keys.extend((0..elements.len()).map(|index| index.to_string()));
        }
        keys.extend(data.properties.keys().cloned());
        keys
    }

    /// Own enumerable property names, like `Object.keys`.
    pub fn keys(&self) -> Vec<String> {
        let data = self.0.read();
        let mut keys = Vec::new();
        if let ObjectKind::Array(elements) = &data.kind {
            keys.extend((0..elements.len()).map(|index| index.to_string()));
        }
        keys.extend(
            data.properties
                .iter()
                .filter(|(_, property)| property.enumerable)
                .map(|(key, _)| key.clone()),
        );
        keys
    }

    /// Prevents any further changes to the object.
    pub fn freeze(&self) {
        let mut data = self.0.write();
        data.extensible = false;
        for property in data.properties.values_mut() {
            property.writable = false;
        }
    }

    /// Returns true once the object has been frozen.
    pub fn is_frozen(&self) -> bool {
        !self.0.read().extensible
    }

    /// Appends to an array, returning false for non-arrays.
    pub fn push(&self, value: Value) -> bool {
        let mut data = self.0.write();
        if !data.extensible {
            return false;
        }
        match &mut data.kind {
            ObjectKind::Array(elements) => {
                elements.push(value);
                true
            }
            _ => false,
        }
    }

    /// A snapshot of the array elements (empty for non-arrays).
    pub fn elements(&self) -> Vec<Value> {
        match &self.0.read().kind {
            ObjectKind::Array(elements) => elements.clone(),
            _ => Vec::new(),
        }
    }

    /// Empties an array in place, keeping its identity.
    pub fn clear_elements(&self) {
        if let ObjectKind::Array(elements) = &mut self.0.write().kind {
            elements.clear();
        }
    }

    /// The function name, if this is a function.
    pub fn function_name(&self) -> Option<String> {
        match &self.0.read().kind {
            ObjectKind::Function(function) => Some(function.name.clone()),
            _ => None,
        }
    }

    /// Opaque host data attached to a function.
    pub fn host_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        match &self.0.read().kind {
            ObjectKind::Function(function) => function.host_data.clone(),
            _ => None,
        }
    }

    /// Calls the object as a function.
    pub fn call(&self, this: Value, args: &[Value]) -> JsResult<Value> {
        self.invoke(this, args, false)
    }

    /// Calls the object as a constructor (`new F(...args)`).
    ///
    /// The fresh instance inherits from the function's `prototype`; an object
    /// returned by the function replaces the instance.
    pub fn construct(&self, args: &[Value]) -> JsResult<Value> {
        if !self.is_function() {
            return Err(Exception::type_error(format!(
                "{} is not a constructor",
                Value::from(self)
            )));
        }
        let prototype = self.get("prototype").as_object().cloned();
        let instance = Object::with_prototype(prototype);
        let result = self.invoke(Value::from(&instance), args, true)?;
        Ok(match result {
            Value::Object(object) => Value::Object(object),
            _ => Value::Object(instance),
        })
    }

    fn invoke(&self, this: Value, args: &[Value], is_construct: bool) -> JsResult<Value> {
        let behavior: NativeFn = match &self.0.read().kind {
            ObjectKind::Function(function) => function.behavior.clone(),
            kind => {
                return Err(Exception::type_error(format!(
                    "{} is not a function",
                    kind.class_name()
                )));
            }
        };
        behavior(&CallContext {
            callee: self,
            this,
            args,
            is_construct,
        })
    }

    /// Returns true if `constructor.prototype` appears on this object's
    /// prototype chain.
    pub fn instance_of(&self, constructor: &Object) -> bool {
        let Some(target) = constructor.get("prototype").as_object().cloned() else {
            return false;
        };
        let mut current = self.prototype();
        while let Some(object) = current {
            if object.ptr_eq(&target) {
                return true;
            }
            current = object.prototype();
        }
        false
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Object graphs may be cyclic, so never recurse into properties
        let data = self.0.read();
        let mut debug = f.debug_struct(data.kind.class_name());
        debug.field("id", &format_args!("{:#x}", self.id()));
        if let ObjectKind::Function(function) = &data.kind {
            debug.field("name", &function.name);
        }
        debug.field("keys", &data.properties.keys().collect::<Vec<_>>());
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_keep_insertion_order() {
        let object = Object::new();
        object.set("b", 1);
        object.set("a", 2);
        object.define("hidden", Value::Null, false);
        assert_eq!(object.own_keys(), vec!["b", "a", "hidden"]);
        assert_eq!(object.keys(), vec!["b", "a"]);
    }

    #[test]
    fn test_prototype_chain_lookup() {
        let parent = Object::new();
        parent.set("greet", "hello");
        let child = Object::with_prototype(Some(parent.clone()));
        assert_eq!(child.get("greet"), Value::from("hello"));
        assert!(child.has("greet"));
        assert!(!child.has_own("greet"));
    }

    #[test]
    fn test_frozen_object_rejects_writes() {
        let object = Object::new();
        object.set("a", 1);
        object.freeze();
        assert!(!object.set("a", 2));
        assert!(!object.set("b", 2));
        assert_eq!(object.get("a"), Value::from(1));
    }

    #[test]
    fn test_array_elements() {
        let array = Object::array(vec![]);
        array.push(Value::from("x"));
        array.set("2", "z");
        assert_eq!(array.get("length"), Value::from(3));
        assert_eq!(array.get("0"), Value::from("x"));
        assert_eq!(array.get("1"), Value::Undefined);
        array.clear_elements();
        assert_eq!(array.elements().len(), 0);
    }

    #[test]
    fn test_construct_links_instance_to_prototype() {
        let ctor = Object::constructor_function("Thing", |ctx| {
            if let Some(this) = ctx.this.as_object() {
                this.set("built", ctx.is_construct);
            }
            Ok(Value::Undefined)
        });
        let instance = ctor.construct(&[]).unwrap();
        let instance = instance.as_object().unwrap();
        assert!(instance.instance_of(&ctor));
        assert_eq!(instance.get("built"), Value::Boolean(true));
        assert_eq!(instance.get("constructor"), Value::from(&ctor));
    }

    #[test]
    fn test_constructor_returning_object_replaces_instance() {
        let replacement = Object::new();
        let captured = replacement.clone();
        let ctor = Object::constructor_function("Factory", move |_| Ok(Value::from(&captured)));
        let result = ctor.construct(&[]).unwrap();
        assert_eq!(result, Value::from(&replacement));
    }

    #[test]
    fn test_getter_runs_with_receiver() {
        let object = Object::new();
        object.set("base", 20);
        object.define_getter(
            "double",
            Object::function("get double", |ctx| {
                let base = ctx.this.get("base").as_number().unwrap_or_default();
                Ok(Value::from(base * 2.0))
            }),
        );
        assert_eq!(object.get("double"), Value::from(40));
        assert!(object.get_own("double").is_none());
    }

    #[test]
    fn test_function_reentrancy() {
        // A function may mutate the object it is called on
        let counter = Object::function("counter", |ctx| {
            let next = ctx.callee.get("count").as_number().unwrap_or_default() + 1.0;
            ctx.callee.set("count", next);
            Ok(Value::from(next))
        });
        counter.call(Value::Undefined, &[]).unwrap();
        assert_eq!(counter.call(Value::Undefined, &[]).unwrap(), Value::from(2));
        assert_eq!(counter.get("name"), Value::from("counter"));
    }
}
