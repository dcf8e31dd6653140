// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module and mock registries

use super::identity::ModuleIdentity;
use spacey_value::{Object, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A module that has started executing in the current registry lifetime
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Absolute path of the module file
    pub path: PathBuf,
    /// The `module` object handed to the module body
    pub module: Object,
    /// Paths of the modules this one required, in order
    pub children: Vec<PathBuf>,
}

impl ModuleRecord {
    /// Create a record for `path` around its module object
    pub fn new(path: PathBuf, module: Object) -> Self {
        Self {
            path,
            module,
            children: Vec::new(),
        }
    }

    /// Current value of `module.exports`
    pub fn exports(&self) -> Value {
        self.module.get("exports")
    }

    /// Returns true once the module body has finished
    pub fn is_loaded(&self) -> bool {
        self.module.get("loaded").to_boolean()
    }
}

/// The module registry and mock registry of one runtime.
///
/// Swapped out wholesale while an automock is generated so the module being
/// described runs against a clean slate.
#[derive(Debug, Default)]
pub(crate) struct Registries {
    pub(crate) modules: HashMap<PathBuf, ModuleRecord>,
    pub(crate) mocks: HashMap<ModuleIdentity, Value>,
}

impl Registries {
    pub(crate) fn module_exports(&self, path: &Path) -> Option<Value> {
        self.modules.get(path).map(ModuleRecord::exports)
    }

    pub(crate) fn add_child(&mut self, parent: &Path, child: &Path) {
        if let Some(record) = self.modules.get_mut(parent) {
            record.children.push(child.to_path_buf());
            if let Some(children) = record.module.get("children").as_object() {
                children.push(Value::from(child.to_string_lossy().into_owned()));
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.modules.clear();
        self.mocks.clear();
    }
}
