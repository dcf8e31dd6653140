// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Metadata extraction and mock building.

use crate::error::{MockError, Result};
use crate::metadata::{ConstantValue, MetadataKind, MockMetadata};
use crate::mock_function::{MockFunction, MockState, SharedState};
use parking_lot::Mutex;
use spacey_value::{Object, ObjectKind, Slot, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Own properties of functions that are never described.
const READONLY_FUNCTION_PROPS: &[&str] = &["arguments", "caller", "callee", "name", "length"];

/// Every mock function built by one mocker, so their call logs can be
/// cleared without walking the object graph.
#[derive(Default)]
pub(crate) struct MockRegistry {
    created: Mutex<Vec<Weak<Mutex<MockState>>>>,
}

impl MockRegistry {
    pub(crate) fn track(&self, state: &SharedState) {
        let mut created = self.created.lock();
        created.retain(|state| state.strong_count() > 0);
        created.push(Arc::downgrade(state));
    }

    fn live(&self) -> Vec<SharedState> {
        self.created.lock().iter().filter_map(Weak::upgrade).collect()
    }
}

/// Builds mocks from live values.
///
/// A mocker is owned by one module registry; [`ModuleMocker::clear_all_mocks`]
/// reaches every mock function it ever built that is still alive.
#[derive(Clone, Default)]
pub struct ModuleMocker {
    registry: Arc<MockRegistry>,
}

impl std::fmt::Debug for ModuleMocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleMocker")
            .field("live_mocks", &self.live_mock_count())
            .finish()
    }
}

impl ModuleMocker {
    /// Creates a mocker with an empty mock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Describes the shape of `component`.
    ///
    /// Returns `None` when the value cannot be classified (error objects,
    /// for instance). Objects reached more than once are described the
    /// first time and referenced by `refID` afterwards.
    pub fn get_metadata(&self, component: &Value) -> Option<MockMetadata> {
        describe(component, &mut HashMap::new())
    }

    /// Builds a fresh value from a metadata tree.
    ///
    /// Back-references are patched once every node exists, so a `ref` may
    /// point at a node that appears later in the tree.
    pub fn generate_from_metadata(&self, metadata: &MockMetadata) -> Result<Value> {
        let mut refs = HashMap::new();
        let mut pending = Vec::new();
        let mock = self.build(metadata, &mut refs, &mut pending);
        for (target, slot, id) in pending {
            let value = refs
                .get(&id)
                .cloned()
                .ok_or(MockError::DanglingReference(id))?;
            target.set(&slot, value);
        }
        Ok(mock)
    }

    /// Creates a standalone mock function (`jest.fn()`).
    pub fn get_mock_function(&self) -> MockFunction {
        MockFunction::create(
            &self.registry,
            &MockMetadata::of_kind(MetadataKind::Function),
        )
    }

    /// Returns true if `value` is a mock function built by any mocker.
    pub fn is_mock_function(value: &Value) -> bool {
        MockFunction::is_mock_function(value)
    }

    /// Clears the call log of every live mock built by this mocker.
    pub fn clear_all_mocks(&self) {
        let live = self.registry.live();
        trace!(count = live.len(), "clearing mock call state");
        for state in live {
            state.lock().clear();
        }
    }

    /// Number of mock functions built by this mocker that are still alive.
    pub fn live_mock_count(&self) -> usize {
        self.registry.live().len()
    }

    fn build(
        &self,
        metadata: &MockMetadata,
        refs: &mut HashMap<u32, Value>,
        pending: &mut Vec<(Object, String, u32)>,
    ) -> Value {
        let mock = self.make_component(metadata);
        if let Some(id) = metadata.ref_id {
            refs.insert(id, mock.clone());
        }

        if let Value::Object(object) = &mock {
            for (slot, member) in &metadata.members {
                match member.reference {
                    Some(id) => pending.push((object.clone(), slot.clone(), id)),
                    None => {
                        let value = self.build(member, refs, pending);
                        object.set(slot, value);
                    }
                }
            }
            if let Some(Value::Object(prototype)) = object.get_own("prototype") {
                prototype.set("constructor", Value::from(object));
            }
        }
        mock
    }

    fn make_component(&self, metadata: &MockMetadata) -> Value {
        match metadata.kind {
            Some(MetadataKind::Object) => Value::Object(Object::new()),
            Some(MetadataKind::Array) => Value::Object(Object::array(Vec::new())),
            Some(MetadataKind::Regexp) => Value::Object(Object::regexp("(?:)", "")),
            Some(MetadataKind::Function) => {
                MockFunction::create(&self.registry, metadata).to_value()
            }
            Some(MetadataKind::Constant) => metadata
                .value
                .as_ref()
                .map(ConstantValue::to_value)
                .unwrap_or_default(),
            Some(MetadataKind::Null) => Value::Null,
            Some(MetadataKind::Undefined) | None => Value::Undefined,
        }
    }
}

fn classify(component: &Value) -> Option<MetadataKind> {
    Some(match component {
        Value::Undefined => MetadataKind::Undefined,
        Value::Null => MetadataKind::Null,
        Value::Boolean(_) | Value::Number(_) | Value::String(_) => MetadataKind::Constant,
        Value::Object(object) => match object.kind() {
            ObjectKind::Function(_) => MetadataKind::Function,
            ObjectKind::Array(_) => MetadataKind::Array,
            ObjectKind::Ordinary => MetadataKind::Object,
            ObjectKind::RegExp { .. } => MetadataKind::Regexp,
            ObjectKind::Error => return None,
        },
    })
}

fn constant(component: &Value) -> Option<ConstantValue> {
    match component {
        Value::Boolean(b) => Some(ConstantValue::Boolean(*b)),
        Value::Number(n) => Some(ConstantValue::Number(*n)),
        Value::String(s) => Some(ConstantValue::String(s.clone())),
        _ => None,
    }
}

fn describe(component: &Value, refs: &mut HashMap<usize, u32>) -> Option<MockMetadata> {
    if let Value::Object(object) = component {
        if let Some(id) = refs.get(&object.id()) {
            return Some(MockMetadata::reference(*id));
        }
    }

    let kind = classify(component)?;
    let mut metadata = MockMetadata::of_kind(kind);
    let object = match component {
        Value::Object(object) => object,
        _ => {
            metadata.value = constant(component);
            return Some(metadata);
        }
    };

    let mock = MockFunction::from_value(component);
    if kind == MetadataKind::Function {
        metadata.name = object.function_name();
        metadata.mock_impl = mock.as_ref().and_then(MockFunction::implementation);
    }

    let id = refs.len() as u32;
    refs.insert(object.id(), id);
    metadata.ref_id = Some(id);

    // Arrays are left alone
    if kind == MetadataKind::Array {
        return Some(metadata);
    }

    for slot in slots(object, kind) {
        if slot.starts_with('_') || (mock.is_some() && slot.starts_with("mock")) {
            continue;
        }
        if kind == MetadataKind::Function && slot == "prototype" {
            continue;
        }
        if let Some(member) = describe(&object.get(&slot), refs) {
            metadata.members.insert(slot, member);
        }
    }

    if kind == MetadataKind::Function {
        if let Some(prototype) = object.get_own("prototype").filter(Value::is_object) {
            if let Some(member) = describe(&prototype, refs) {
                if !member.members.is_empty() {
                    metadata.members.insert("prototype".to_string(), member);
                }
            }
        }
    }

    Some(metadata)
}

/// Property names worth describing on `object`.
///
/// Plain objects contribute their whole prototype chain so instances keep
/// their inherited methods; functions and regexps only their own data
/// properties. Accessors are never described.
fn slots(object: &Object, kind: MetadataKind) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut current = Some(object.clone());
    while let Some(target) = current {
        for key in target.own_keys() {
            if names.contains(&key) || is_readonly(kind, &key) {
                continue;
            }
            let accessor = matches!(
                target.own_property(&key),
                Some(property) if matches!(property.slot, Slot::Accessor { .. })
            );
            if !accessor {
                names.push(key);
            }
        }
        current = match kind {
            MetadataKind::Object => target.prototype(),
            _ => None,
        };
    }
    names
}

fn is_readonly(kind: MetadataKind, key: &str) -> bool {
    match kind {
        MetadataKind::Function => READONLY_FUNCTION_PROPS.contains(&key),
        MetadataKind::Regexp => key == "source",
        _ => false,
    }
}
