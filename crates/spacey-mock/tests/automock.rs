// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end automock generation from live values.

use spacey_mock::{MetadataKind, MockFunction, ModuleMocker};
use spacey_value::{js_object, Object, Value};

fn returning(name: &str, value: &'static str) -> Object {
    Object::function(name, move |_| Ok(Value::from(value)))
}

#[test]
fn cycles_survive_a_round_trip() {
    let mocker = ModuleMocker::new();
    let original = js_object! {
        "run" => returning("run", "real"),
        "nested" => js_object! { "deep" => returning("deep", "real") },
        "count" => 3,
    };
    original.set("self", original.clone());

    let metadata = mocker.get_metadata(&Value::from(&original)).unwrap();
    let mock = mocker.generate_from_metadata(&metadata).unwrap();

    assert_eq!(mock.get("self"), mock);
    assert_ne!(mock, Value::from(&original));
    assert_eq!(mock.get("count"), Value::from(3));

    let run = MockFunction::from_value(&mock.get("run")).unwrap();
    assert_eq!(run.call_count(), 0);
    assert_eq!(run.call(Value::Undefined, &[]).unwrap(), Value::Undefined);
    assert!(MockFunction::is_mock_function(&mock.get("nested").get("deep")));
}

#[test]
fn function_names_are_preserved() {
    let mocker = ModuleMocker::new();
    let metadata = mocker
        .get_metadata(&Value::from(returning("bound handler", "x")))
        .unwrap();
    let mock = mocker.generate_from_metadata(&metadata).unwrap();
    assert_eq!(mock.get("name"), Value::from("bound handler"));
}

#[test]
fn constructed_instances_get_their_own_prototype_mocks() {
    let mocker = ModuleMocker::new();
    let class = Object::constructor_function("Counter", |_| Ok(Value::Undefined));
    let prototype = class.get("prototype");
    prototype
        .as_object()
        .unwrap()
        .set("increment", returning("increment", "real"));

    let metadata = mocker.get_metadata(&Value::from(&class)).unwrap();
    assert_eq!(
        metadata.prototype_members().unwrap()["increment"].kind,
        Some(MetadataKind::Function)
    );

    let mock_class = MockFunction::from_value(&mocker.generate_from_metadata(&metadata).unwrap())
        .unwrap();
    let proto_increment =
        MockFunction::from_value(&mock_class.object().get("prototype").get("increment")).unwrap();
    proto_increment.mock_return_value(Value::from("from prototype"));

    let first = mock_class.construct(&[Value::from(1)]).unwrap();
    let second = mock_class.construct(&[]).unwrap();
    assert_eq!(mock_class.calls(), vec![vec![Value::from(1)], vec![]]);
    assert_eq!(mock_class.instances(), vec![first.clone(), second.clone()]);
    assert!(first.as_object().unwrap().instance_of(mock_class.object()));

    // Each instance owns a separate mock that delegates to the prototype one
    let first_increment = MockFunction::from_value(&first.get("increment")).unwrap();
    let second_increment = MockFunction::from_value(&second.get("increment")).unwrap();
    assert_ne!(first_increment.to_value(), second_increment.to_value());
    assert_eq!(
        first_increment.call(first.clone(), &[]).unwrap(),
        Value::from("from prototype")
    );

    second_increment.mock_return_value(Value::from("own"));
    assert_eq!(second_increment.call(second.clone(), &[]).unwrap(), Value::from("own"));
    assert_eq!(
        first_increment.call(first, &[]).unwrap(),
        Value::from("from prototype")
    );
}

#[test]
fn constructor_implementation_runs_after_members_are_copied() {
    let mocker = ModuleMocker::new();
    let class = Object::constructor_function("Store", |_| Ok(Value::Undefined));
    class
        .get("prototype")
        .as_object()
        .unwrap()
        .set("get", returning("get", "real"));
    let metadata = mocker.get_metadata(&Value::from(&class)).unwrap();
    let mock_class =
        MockFunction::from_value(&mocker.generate_from_metadata(&metadata).unwrap()).unwrap();

    mock_class.mock_implementation(Some(Object::function("ctor", |ctx| {
        let saw_member = MockFunction::is_mock_function(&ctx.this.get("get"));
        if let Some(this) = ctx.this.as_object() {
            this.set("sawMember", saw_member);
        }
        Ok(Value::Undefined)
    })));

    let instance = mock_class.construct(&[]).unwrap();
    assert_eq!(instance.get("sawMember"), Value::Boolean(true));
}

#[test]
fn remocking_a_mock_keeps_its_implementation_but_not_its_bookkeeping() {
    let mocker = ModuleMocker::new();
    let mock = mocker.get_mock_function();
    mock.mock_implementation(Some(returning("impl", "configured")));
    mock.object().set("helper", 1);

    let metadata = mocker.get_metadata(&mock.to_value()).unwrap();
    assert!(metadata.mock_impl.is_some());
    assert!(metadata.members.keys().all(|key| !key.starts_with("mock")));
    assert!(metadata.members.contains_key("helper"));

    let again = MockFunction::from_value(&mocker.generate_from_metadata(&metadata).unwrap())
        .unwrap();
    assert_eq!(
        again.call(Value::Undefined, &[]).unwrap(),
        Value::from("configured")
    );
}

#[test]
fn metadata_serializes_to_the_documented_shape() {
    let mocker = ModuleMocker::new();
    let original = js_object! { "flag" => true };
    original.set("me", original.clone());
    let metadata = mocker.get_metadata(&Value::from(&original)).unwrap();

    let json = serde_json::to_value(&metadata).unwrap();
    assert_eq!(json["type"], "object");
    assert_eq!(json["refID"], 0);
    assert_eq!(json["members"]["flag"]["value"], true);
    assert_eq!(json["members"]["me"]["ref"], 0);
}
