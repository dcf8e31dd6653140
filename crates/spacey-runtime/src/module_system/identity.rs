// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module identities.

use std::fmt;
use std::path::{Path, PathBuf};

/// Whether a module is a host built-in or a user file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleKind {
    /// Built-in module provided by the environment
    Core,
    /// Module backed by a file
    User,
}

/// Cache key for the mock registry and mock overrides.
///
/// The same textual name can refer to different files depending on the
/// requester, and a real module and its manual mock are distinct files, so
/// the key is the resolved pair rather than the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity {
    /// Core or user module
    pub kind: ModuleKind,
    /// Resolved real file (the module name for core modules)
    pub real_path: Option<PathBuf>,
    /// Manual mock file, if one is registered
    pub mock_path: Option<PathBuf>,
}

impl ModuleIdentity {
    /// Identity of a built-in module
    pub fn core(name: &str) -> Self {
        Self {
            kind: ModuleKind::Core,
            real_path: Some(PathBuf::from(name)),
            mock_path: None,
        }
    }

    /// Identity of a user module with the given real and mock files
    pub fn user(real_path: Option<PathBuf>, mock_path: Option<PathBuf>) -> Self {
        Self {
            kind: ModuleKind::User,
            real_path,
            mock_path,
        }
    }

    /// Identity of a file addressed by its own path
    pub fn for_path(path: &Path) -> Self {
        Self::user(Some(path.to_path_buf()), None)
    }

    /// Returns true for built-in modules
    pub fn is_core(&self) -> bool {
        self.kind == ModuleKind::Core
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ModuleKind::Core => "node",
            ModuleKind::User => "user",
        };
        let show = |path: &Option<PathBuf>| {
            path.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "null".to_string())
        };
        write!(f, "{}:{}:{}", kind, show(&self.real_path), show(&self.mock_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ModuleIdentity::core("fs").to_string(), "node:fs:null");
        let id = ModuleIdentity::user(None, Some(PathBuf::from("/p/__mocks__/A.js")));
        assert_eq!(id.to_string(), "user:null:/p/__mocks__/A.js");
    }

    #[test]
    fn test_for_path_matches_resolved_identity() {
        let path = Path::new("/p/a.js");
        assert_eq!(
            ModuleIdentity::for_path(path),
            ModuleIdentity::user(Some(path.to_path_buf()), None)
        );
    }
}
