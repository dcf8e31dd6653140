// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-mock
//!
//! Automatic mock generation.
//!
//! The [`ModuleMocker`] walks a live value graph and records its shape as a
//! [`MockMetadata`] tree, then builds fresh mock values from that tree. Every
//! function in the tree becomes a recording [`MockFunction`].
//!
//! ```
//! use spacey_mock::{ModuleMocker, MockFunction};
//! use spacey_value::{js_object, Object, Value};
//!
//! let mocker = ModuleMocker::new();
//! let real = js_object! {
//!     "add" => Object::function("add", |_| Ok(Value::from(3))),
//! };
//!
//! let metadata = mocker.get_metadata(&Value::from(&real)).unwrap();
//! let mock = mocker.generate_from_metadata(&metadata).unwrap();
//!
//! let add = MockFunction::from_value(&mock.get("add")).unwrap();
//! assert_eq!(add.call(Value::Undefined, &[]).unwrap(), Value::Undefined);
//! assert_eq!(add.call_count(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod metadata;
mod mock_function;
mod mocker;

pub use error::{MockError, Result};
pub use metadata::{ConstantValue, MetadataKind, MockMetadata};
pub use mock_function::MockFunction;
pub use mocker::ModuleMocker;
