// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Temporary project fixtures shared by the integration suites.

#![allow(dead_code)]

use spacey_runtime::config::normalize_path;
use spacey_runtime::{Config, ModuleMap, NativeEnvironment, Runtime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Marker content for files whose body is registered natively
pub const NATIVE: &str = "// native module\n";

pub struct Project {
    _dir: TempDir,
    pub root: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = normalize_path(dir.path());
        Self { _dir: dir, root }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Write `content` to `relative`, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// A Haste module file named `name`
    pub fn haste(&self, relative: &str, name: &str) -> PathBuf {
        self.write(relative, &format!("/**\n * @providesModule {name}\n */\n"))
    }

    /// Default configuration with automocking switched as requested
    pub fn config(&self, automock: bool) -> Config {
        let mut config = Config::new(&self.root).normalize().unwrap();
        config.automock = automock;
        config
    }

    /// The requiring test file
    pub fn test_file(&self) -> PathBuf {
        self.path("__tests__/test.js")
    }

    /// Crawl the project and build a runtime over a fresh native environment
    pub fn start(&self, config: Config) -> (Runtime, Arc<NativeEnvironment>) {
        let map = Arc::new(ModuleMap::crawl(&config).unwrap());
        let env = Arc::new(NativeEnvironment::for_test_file(&config, self.test_file()));
        let runtime = Runtime::new(Arc::new(config), env.clone(), map).unwrap();
        (runtime, env)
    }
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
