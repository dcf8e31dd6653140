// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module indexing, resolution and mock policy

mod identity;
mod module_map;
pub(crate) mod policy;
mod registry;
mod resolver;

pub use identity::{ModuleIdentity, ModuleKind};
pub use module_map::{provided_module_name, ModuleMap, ModuleMapBuilder, MOCKS_DIRECTORY, NODE_MODULES};
pub use policy::{MockDecision, MockReason};
pub use registry::ModuleRecord;
pub(crate) use registry::Registries;
pub use resolver::{is_core_module, is_relative_name, node_modules_paths, Resolver};
