// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Recording mock functions.

use crate::metadata::{MetadataKind, MockMetadata};
use crate::mocker::MockRegistry;
use indexmap::IndexMap;
use parking_lot::Mutex;
use spacey_value::{
    CallContext, Exception, FunctionData, JsResult, NativeFn, Object, Value, WeakObject,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Name given to mock functions whose metadata carries none.
const ANONYMOUS_MOCK_NAME: &str = "mockConstructor";

pub(crate) type SharedState = Arc<Mutex<MockState>>;

/// Everything a mock function remembers between calls.
pub(crate) struct MockState {
    /// `mock.calls`: one argument array per invocation
    calls: Object,
    /// `mock.instances`: the `this` of every invocation
    instances: Object,
    once_values: VecDeque<Value>,
    default_value: Value,
    return_value_last_set: bool,
    implementation: Option<Object>,
    once_implementations: VecDeque<Object>,
    proto_impl: Option<Object>,
    /// Function-typed prototype members copied onto `new` instances
    prototype_members: IndexMap<String, MockMetadata>,
}

impl MockState {
    fn new(prototype_members: IndexMap<String, MockMetadata>) -> Self {
        Self {
            calls: Object::array(Vec::new()),
            instances: Object::array(Vec::new()),
            once_values: VecDeque::new(),
            default_value: Value::Undefined,
            return_value_last_set: false,
            implementation: None,
            once_implementations: VecDeque::new(),
            proto_impl: None,
            prototype_members,
        }
    }

    pub(crate) fn clear(&self) {
        self.calls.clear_elements();
        self.instances.clear_elements();
    }

    fn reset(&mut self) {
        self.clear();
        self.once_values.clear();
        self.default_value = Value::Undefined;
        self.return_value_last_set = false;
        self.implementation = None;
        self.once_implementations.clear();
    }
}

/// What an invocation resolved to once the state lock is released.
enum Outcome {
    Return(Value),
    Delegate(Object),
}

/// A handle to a mock function object.
///
/// The handle and the JavaScript-visible members (`mock.calls`,
/// `mockReturnValue`, ...) share the same state, so configuration done from
/// either side is observed by both.
#[derive(Clone)]
pub struct MockFunction {
    function: Object,
    state: SharedState,
}

impl std::fmt::Debug for MockFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFunction")
            .field("function", &self.function)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl MockFunction {
    /// Builds a mock function described by `metadata` and records it in
    /// `registry`.
    pub(crate) fn create(registry: &Arc<MockRegistry>, metadata: &MockMetadata) -> Self {
        let prototype_members = metadata
            .prototype_members()
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, member)| member.kind == Some(MetadataKind::Function))
                    .map(|(slot, member)| (slot.clone(), member.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let state: SharedState = Arc::new(Mutex::new(MockState::new(prototype_members)));
        registry.track(&state);

        let name = metadata
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ANONYMOUS_MOCK_NAME.to_string());

        let behavior: NativeFn = {
            let state = state.clone();
            let registry = registry.clone();
            Arc::new(move |ctx: &CallContext<'_>| invoke(&state, &registry, ctx))
        };
        let function = Object::from_function_data(
            FunctionData::new(name, behavior).with_host_data(state.clone()),
        );

        let prototype = Object::new();
        prototype.define("constructor", Value::from(&function), false);
        function.define("prototype", Value::Object(prototype), false);

        let mock = Self { function, state };
        mock.install_members();
        if let Some(implementation) = &metadata.mock_impl {
            mock.mock_implementation(Some(implementation.clone()));
        }
        mock
    }

    /// Recovers the handle behind a mock function value.
    ///
    /// Returns `None` for anything that is not a mock function.
    pub fn from_value(value: &Value) -> Option<Self> {
        let function = value.as_object()?;
        let state = function
            .host_data()?
            .downcast::<Mutex<MockState>>()
            .ok()?;
        Some(Self {
            function: function.clone(),
            state,
        })
    }

    /// Returns true if `value` is a mock function.
    pub fn is_mock_function(value: &Value) -> bool {
        Self::from_value(value).is_some()
    }

    /// The underlying function object.
    pub fn object(&self) -> &Object {
        &self.function
    }

    /// The mock function as a value.
    pub fn to_value(&self) -> Value {
        Value::from(&self.function)
    }

    /// Invokes the mock as a plain call.
    pub fn call(&self, this: Value, args: &[Value]) -> JsResult<Value> {
        self.function.call(this, args)
    }

    /// Invokes the mock through `new`.
    pub fn construct(&self, args: &[Value]) -> JsResult<Value> {
        self.function.construct(args)
    }

    /// Argument lists of every invocation so far.
    pub fn calls(&self) -> Vec<Vec<Value>> {
        let calls = self.state.lock().calls.clone();
        calls
            .elements()
            .iter()
            .map(|args| args.as_object().map(Object::elements).unwrap_or_default())
            .collect()
    }

    /// The `this` value of every invocation so far.
    pub fn instances(&self) -> Vec<Value> {
        let instances = self.state.lock().instances.clone();
        instances.elements()
    }

    /// Number of recorded invocations.
    pub fn call_count(&self) -> usize {
        let calls = self.state.lock().calls.clone();
        calls.elements().len()
    }

    /// The currently installed implementation.
    pub fn implementation(&self) -> Option<Object> {
        self.state.lock().implementation.clone()
    }

    /// Forgets recorded calls and instances, keeping configured behaviour.
    pub fn mock_clear(&self) {
        self.state.lock().clear();
    }

    /// Forgets recorded calls and all configured behaviour.
    pub fn mock_reset(&self) {
        self.state.lock().reset();
    }

    /// Queues a value returned by exactly one future call.
    pub fn mock_return_value_once(&self, value: Value) {
        let mut state = self.state.lock();
        state.return_value_last_set = true;
        state.once_values.push_back(value);
    }

    /// Sets the value returned once the one-shot queue is exhausted.
    pub fn mock_return_value(&self, value: Value) {
        let mut state = self.state.lock();
        state.return_value_last_set = true;
        state.default_value = value;
    }

    /// Installs (or removes) the implementation run on every call.
    pub fn mock_implementation(&self, implementation: Option<Object>) {
        let mut state = self.state.lock();
        state.return_value_last_set = false;
        state.implementation = implementation;
    }

    /// Queues an implementation used for exactly one future call.
    pub fn mock_implementation_once(&self, implementation: Object) {
        let mut state = self.state.lock();
        state.return_value_last_set = false;
        state.once_implementations.push_back(implementation);
    }

    /// Installs an implementation returning `this`.
    pub fn mock_return_this(&self) {
        self.mock_implementation(Some(Object::function("mockReturnThis", |ctx| {
            Ok(ctx.this.clone())
        })));
    }

    pub(crate) fn set_proto_impl(&self, proto_impl: Option<Object>) {
        self.state.lock().proto_impl = proto_impl;
    }

    /// Defines the JavaScript-visible bookkeeping members.
    fn install_members(&self) {
        let function = &self.function;
        let (calls, instances) = {
            let state = self.state.lock();
            (state.calls.clone(), state.instances.clone())
        };

        function.set("_isMockFunction", true);
        let mock = Object::new();
        mock.set("calls", calls);
        mock.set("instances", instances);
        function.set("mock", mock);

        let this_fn = function.downgrade();
        self.install_method("_getMockImplementation", |mock, _| {
            Ok(mock.implementation().map(Value::Object).unwrap_or_default())
        });
        self.install_chained("mockClear", &this_fn, |mock, _| {
            mock.mock_clear();
            Ok(())
        });
        self.install_chained("mockReset", &this_fn, |mock, _| {
            mock.mock_reset();
            Ok(())
        });
        self.install_chained("mockReturnValueOnce", &this_fn, |mock, ctx| {
            mock.mock_return_value_once(ctx.arg(0));
            Ok(())
        });
        self.install_chained("mockReturnValue", &this_fn, |mock, ctx| {
            mock.mock_return_value(ctx.arg(0));
            Ok(())
        });
        self.install_chained("mockImplementation", &this_fn, |mock, ctx| {
            mock.mock_implementation(implementation_arg(ctx)?);
            Ok(())
        });
        self.install_chained("mockImpl", &this_fn, |mock, ctx| {
            mock.mock_implementation(implementation_arg(ctx)?);
            Ok(())
        });
        self.install_chained("mockImplementationOnce", &this_fn, |mock, ctx| {
            if let Some(implementation) = implementation_arg(ctx)? {
                mock.mock_implementation_once(implementation);
            }
            Ok(())
        });
        self.install_chained("mockReturnThis", &this_fn, |mock, _| {
            mock.mock_return_this();
            Ok(())
        });
    }

    fn install_method<F>(&self, name: &str, body: F)
    where
        F: Fn(&MockFunction, &CallContext<'_>) -> JsResult<Value> + Send + Sync + 'static,
    {
        let this_fn = self.function.downgrade();
        let state = Arc::downgrade(&self.state);
        let method = Object::function(name, move |ctx| {
            let mock = upgrade(&this_fn, &state)?;
            body(&mock, ctx)
        });
        self.function.set(name, method);
    }

    /// Installs a method that returns the mock function for chaining.
    fn install_chained<F>(&self, name: &str, this_fn: &WeakObject, body: F)
    where
        F: Fn(&MockFunction, &CallContext<'_>) -> JsResult<()> + Send + Sync + 'static,
    {
        let this_fn = this_fn.clone();
        self.install_method(name, move |mock, ctx| {
            body(mock, ctx)?;
            Ok(this_fn
                .upgrade()
                .map(Value::Object)
                .unwrap_or_default())
        });
    }
}

fn upgrade(
    function: &WeakObject,
    state: &std::sync::Weak<Mutex<MockState>>,
) -> JsResult<MockFunction> {
    match (function.upgrade(), state.upgrade()) {
        (Some(function), Some(state)) => Ok(MockFunction { function, state }),
        _ => Err(Exception::error("mock function is no longer alive")),
    }
}

fn implementation_arg(ctx: &CallContext<'_>) -> JsResult<Option<Object>> {
    match ctx.arg(0) {
        Value::Undefined => Ok(None),
        Value::Object(object) if object.is_function() => Ok(Some(object)),
        other => Err(Exception::type_error(format!(
            "mock implementation must be a function, received {}",
            other.type_of()
        ))),
    }
}

/// The body shared by every mock function.
fn invoke(state: &SharedState, registry: &Arc<MockRegistry>, ctx: &CallContext<'_>) -> JsResult<Value> {
    let (calls, instances) = {
        let state = state.lock();
        (state.calls.clone(), state.instances.clone())
    };
    instances.push(ctx.this.clone());
    calls.push(Value::Object(Object::array(ctx.args.to_vec())));

    if ctx.is_construct {
        if let Some(instance) = ctx.this.as_object() {
            let members = state.lock().prototype_members.clone();
            for (slot, metadata) in &members {
                let proto_impl = instance.get(slot).as_object().cloned();
                let own = MockFunction::create(registry, metadata);
                own.set_proto_impl(proto_impl);
                instance.set(slot, own.to_value());
            }
        }
        let implementation = state.lock().implementation.clone();
        return match implementation {
            Some(implementation) => implementation.call(ctx.this.clone(), ctx.args),
            None => Ok(Value::Undefined),
        };
    }

    let outcome = {
        let mut state = state.lock();
        let mut value = Value::Undefined;
        if state.return_value_last_set {
            value = state.once_values.pop_front().unwrap_or_default();
            if value.is_undefined() {
                value = state.default_value.clone();
            }
        }
        if !value.is_undefined() {
            Outcome::Return(value)
        } else if let Some(once) = state.once_implementations.pop_front() {
            Outcome::Delegate(once)
        } else if let Some(implementation) = state.implementation.clone() {
            Outcome::Delegate(implementation)
        } else if let Some(proto_impl) = state.proto_impl.clone() {
            Outcome::Delegate(proto_impl)
        } else {
            Outcome::Return(Value::Undefined)
        }
    };

    match outcome {
        Outcome::Return(value) => Ok(value),
        Outcome::Delegate(target) => target.call(ctx.this.clone(), ctx.args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModuleMocker;

    fn returning(value: i32) -> Object {
        Object::function("impl", move |_| Ok(Value::from(value)))
    }

    #[test]
    fn test_records_calls_and_instances() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        let receiver = Value::Object(Object::new());
        mock.call(receiver.clone(), &[Value::from(1), Value::from("a")])
            .unwrap();
        mock.call(Value::Undefined, &[]).unwrap();

        assert_eq!(
            mock.calls(),
            vec![vec![Value::from(1), Value::from("a")], vec![]]
        );
        assert_eq!(mock.instances(), vec![receiver, Value::Undefined]);
    }

    #[test]
    fn test_return_value_precedence() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        mock.mock_implementation(Some(returning(99)));
        mock.mock_return_value(Value::from(2));
        mock.mock_return_value_once(Value::from(1));

        let call = || mock.call(Value::Undefined, &[]).unwrap();
        assert_eq!(call(), Value::from(1));
        assert_eq!(call(), Value::from(2));
        assert_eq!(call(), Value::from(2));

        // Installing an implementation afterwards takes over again
        mock.mock_implementation(Some(returning(99)));
        assert_eq!(call(), Value::from(99));
    }

    #[test]
    fn test_once_queue_falls_through_to_implementation() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        mock.mock_return_value_once(Value::from("first"));
        mock.mock_return_value_once(Value::Undefined);
        let implementation = returning(5);
        mock.state.lock().implementation = Some(implementation);

        assert_eq!(mock.call(Value::Undefined, &[]).unwrap(), Value::from("first"));
        assert_eq!(mock.call(Value::Undefined, &[]).unwrap(), Value::from(5));
    }

    #[test]
    fn test_implementation_once_runs_before_implementation() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        mock.mock_implementation(Some(returning(1)));
        mock.mock_implementation_once(returning(7));
        assert_eq!(mock.call(Value::Undefined, &[]).unwrap(), Value::from(7));
        assert_eq!(mock.call(Value::Undefined, &[]).unwrap(), Value::from(1));
    }

    #[test]
    fn test_implementation_once_overrides_earlier_return_value() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        mock.mock_return_value(Value::from(2));
        mock.mock_implementation_once(returning(7));
        assert_eq!(mock.call(Value::Undefined, &[]).unwrap(), Value::from(7));
    }

    #[test]
    fn test_clear_keeps_configuration() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        mock.mock_return_value(Value::from(3));
        mock.call(Value::Undefined, &[]).unwrap();
        let visible_calls = mock.object().get("mock").get("calls");

        mock.mock_clear();
        assert_eq!(mock.call_count(), 0);
        assert_eq!(visible_calls.get("length"), Value::from(0));
        assert_eq!(mock.call(Value::Undefined, &[]).unwrap(), Value::from(3));
        // The JavaScript-visible array is the same object, updated in place
        assert_eq!(visible_calls.get("length"), Value::from(1));
    }

    #[test]
    fn test_reset_drops_configuration() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        mock.mock_return_value(Value::from(3));
        mock.mock_implementation_once(returning(4));
        mock.call(Value::Undefined, &[]).unwrap();
        mock.mock_reset();
        assert_eq!(mock.call_count(), 0);
        assert_eq!(mock.call(Value::Undefined, &[]).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_javascript_visible_members_chain() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        let function = mock.object().clone();

        let chained = function
            .get("mockReturnValueOnce")
            .call(Value::from(&function), &[Value::from(10)])
            .unwrap();
        assert_eq!(chained, Value::from(&function));
        assert_eq!(function.get("_isMockFunction"), Value::Boolean(true));
        assert_eq!(function.call(Value::Undefined, &[]).unwrap(), Value::from(10));

        function
            .get("mockReturnThis")
            .call(Value::from(&function), &[])
            .unwrap();
        let receiver = Value::Object(Object::new());
        assert_eq!(function.call(receiver.clone(), &[]).unwrap(), receiver);
    }

    #[test]
    fn test_non_function_implementation_is_rejected() {
        let mocker = ModuleMocker::new();
        let mock = mocker.get_mock_function();
        let err = mock
            .object()
            .get("mockImplementation")
            .call(mock.to_value(), &[Value::from(1)])
            .unwrap_err();
        assert_eq!(err.name().as_deref(), Some("TypeError"));
    }
}
