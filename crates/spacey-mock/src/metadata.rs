// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shape descriptors for mock generation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spacey_value::{Object, Value};

/// The shape class of a described value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataKind {
    /// A callable value
    Function,
    /// A plain object
    Object,
    /// An array (elements are not described)
    Array,
    /// A regular expression
    Regexp,
    /// A number, string or boolean
    Constant,
    /// undefined
    Undefined,
    /// null
    Null,
}

/// A primitive captured by `constant` metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantValue {
    /// A boolean
    Boolean(bool),
    /// A number
    Number(f64),
    /// A string
    String(String),
}

impl ConstantValue {
    /// Converts the constant back into a JavaScript value.
    pub fn to_value(&self) -> Value {
        match self {
            ConstantValue::Boolean(b) => Value::Boolean(*b),
            ConstantValue::Number(n) => Value::Number(*n),
            ConstantValue::String(s) => Value::String(s.clone()),
        }
    }
}

/// A node of the metadata tree.
///
/// A node either describes a value (`type` plus optional `name`, `value`,
/// `members` and `refID`) or is a back-reference (`ref`) to a node declared
/// elsewhere in the same tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockMetadata {
    /// The described shape; absent on back-references
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MetadataKind>,
    /// Function name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Captured primitive for `constant` nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConstantValue>,
    /// Described members in discovery order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub members: IndexMap<String, MockMetadata>,
    /// Identifier other nodes use to refer back to this one
    #[serde(rename = "refID", default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<u32>,
    /// Back-reference to the node declaring this `refID`
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<u32>,
    /// Implementation of a described mock function, carried over when a
    /// mock is itself re-mocked
    #[serde(skip)]
    pub mock_impl: Option<Object>,
}

impl MockMetadata {
    /// Creates a node describing a value of `kind`.
    pub fn of_kind(kind: MetadataKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Creates a back-reference node.
    pub fn reference(id: u32) -> Self {
        Self {
            reference: Some(id),
            ..Self::default()
        }
    }

    /// Returns true for back-reference nodes.
    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Members of the `prototype` member of a function node.
    pub fn prototype_members(&self) -> Option<&IndexMap<String, MockMetadata>> {
        self.members
            .get("prototype")
            .map(|prototype| &prototype.members)
    }
}
