// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Index of Haste modules, Haste packages and manual mocks.

use crate::config::{normalize_path, Config};
use crate::error::Result;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::{DirEntry, WalkDir};

/// Directory holding manual mocks
pub const MOCKS_DIRECTORY: &str = "__mocks__";

/// Third-party dependency directory
pub const NODE_MODULES: &str = "node_modules";

static DOCBLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(/\*\*?(?s:.)*?\*/)").expect("valid docblock regex"));

static PROVIDES_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@providesModule\s+([^\s*]+)").expect("valid providesModule regex"));

/// Read-only name index consumed by the resolver.
///
/// Built once per test run and shared between runtimes.
#[derive(Debug, Clone, Default)]
pub struct ModuleMap {
    modules: HashMap<String, PathBuf>,
    packages: HashMap<String, PathBuf>,
    mocks: HashMap<String, PathBuf>,
}

impl ModuleMap {
    /// Start building a map by hand
    pub fn builder() -> ModuleMapBuilder {
        ModuleMapBuilder::default()
    }

    /// Crawl the configured roots.
    ///
    /// `node_modules` directories are skipped except for the packages listed
    /// in `haste.providesModuleNodeModules`.
    pub fn crawl(config: &Config) -> Result<Self> {
        let extensions: Vec<&str> = config
            .module_file_extensions
            .iter()
            .map(String::as_str)
            .collect();
        let mut builder = ModuleMapBuilder::default();

        for root in &config.roots {
            if !root.is_dir() {
                tracing::warn!("Skipping missing root {}", root.display());
                continue;
            }
            let walker = WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| keep_entry(entry, &config.haste.provides_module_node_modules));

            for entry in walker {
                let entry = entry.map_err(|e| {
                    std::io::Error::other(format!("Failed to crawl {}: {e}", root.display()))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                builder.index_file(entry.path(), &extensions)?;
            }
        }

        let map = builder.build();
        tracing::debug!(
            "Crawled {} modules, {} packages, {} mocks",
            map.modules.len(),
            map.packages.len(),
            map.mocks.len()
        );
        Ok(map)
    }

    /// Path of the Haste module declared under `name`
    pub fn lookup(&self, name: &str) -> Option<&Path> {
        self.modules.get(name).map(PathBuf::as_path)
    }

    /// `package.json` of the Haste package named `name`
    pub fn lookup_package(&self, name: &str) -> Option<&Path> {
        self.packages.get(name).map(PathBuf::as_path)
    }

    /// Manual mock registered under `name`
    pub fn lookup_mock(&self, name: &str) -> Option<&Path> {
        self.mocks.get(name).map(PathBuf::as_path)
    }

    /// Haste modules sorted by name
    pub fn modules(&self) -> Vec<(&str, &Path)> {
        sorted(&self.modules)
    }

    /// Haste packages sorted by name
    pub fn packages(&self) -> Vec<(&str, &Path)> {
        sorted(&self.packages)
    }

    /// Manual mocks sorted by name
    pub fn mocks(&self) -> Vec<(&str, &Path)> {
        sorted(&self.mocks)
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.modules.len() + self.packages.len() + self.mocks.len()
    }

    /// Returns true when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sorted(map: &HashMap<String, PathBuf>) -> Vec<(&str, &Path)> {
    let mut entries: Vec<_> = map
        .iter()
        .map(|(name, path)| (name.as_str(), path.as_path()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn keep_entry(entry: &DirEntry, allowed: &[String]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    let parent_is_node_modules = entry
        .path()
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|name| name == NODE_MODULES);
    if parent_is_node_modules {
        return entry
            .file_name()
            .to_str()
            .is_some_and(|name| allowed.iter().any(|a| a == name));
    }
    true
}

/// Builder for [`ModuleMap`]. The first registration of a name wins.
#[derive(Debug, Default)]
pub struct ModuleMapBuilder {
    map: ModuleMap,
}

impl ModuleMapBuilder {
    /// Register a Haste module
    pub fn module(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        insert_first(&mut self.map.modules, "module", name.into(), path.into());
        self
    }

    /// Register a Haste package by its `package.json`
    pub fn package(mut self, name: impl Into<String>, package_json: impl Into<PathBuf>) -> Self {
        insert_first(&mut self.map.packages, "package", name.into(), package_json.into());
        self
    }

    /// Register a manual mock
    pub fn mock(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        insert_first(&mut self.map.mocks, "mock", name.into(), path.into());
        self
    }

    /// Finish building
    pub fn build(self) -> ModuleMap {
        self.map
    }

    fn index_file(&mut self, path: &Path, extensions: &[&str]) -> Result<()> {
        let path = normalize_path(path);
        let in_node_modules = path.components().any(|c| c.as_os_str() == NODE_MODULES);

        if path.file_name().is_some_and(|name| name == "package.json") {
            if !in_node_modules {
                let content = std::fs::read_to_string(&path)?;
                match serde_json::from_str::<serde_json::Value>(&content) {
                    Ok(json) => {
                        if let Some(name) = json.get("name").and_then(|n| n.as_str()) {
                            insert_first(&mut self.map.packages, "package", name.to_string(), path);
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring malformed {}: {}", path.display(), e),
                }
            }
            return Ok(());
        }

        let has_module_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if !has_module_extension {
            return Ok(());
        }

        if let Some(name) = mock_name(&path) {
            insert_first(&mut self.map.mocks, "mock", name, path);
            return Ok(());
        }

        let content = std::fs::read_to_string(&path)?;
        if let Some(name) = provided_module_name(&content) {
            insert_first(&mut self.map.modules, "module", name, path);
        }
        Ok(())
    }
}

fn insert_first(map: &mut HashMap<String, PathBuf>, what: &str, name: String, path: PathBuf) {
    match map.get(&name) {
        Some(existing) if existing != &path => {
            tracing::warn!(
                "Duplicate {} name '{}': keeping {}, ignoring {}",
                what,
                name,
                existing.display(),
                path.display()
            );
        }
        Some(_) => {}
        None => {
            map.insert(name, path);
        }
    }
}

/// Name of a manual mock: its path inside the nearest `__mocks__` directory,
/// without extension.
fn mock_name(path: &Path) -> Option<String> {
    let components: Vec<_> = path.components().collect();
    let index = components
        .iter()
        .rposition(|c| c.as_os_str() == MOCKS_DIRECTORY)?;
    let inside: PathBuf = components[index + 1..].iter().collect();
    let stem = inside.with_extension("");
    let name = stem
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    (!name.is_empty()).then_some(name)
}

/// Name declared by `@providesModule` in the leading docblock
pub fn provided_module_name(source: &str) -> Option<String> {
    let docblock = DOCBLOCK.captures(source)?.get(1)?.as_str();
    PROVIDES_MODULE
        .captures(docblock)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_provided_module_name() {
        let source = "/**\n * Copyright\n * @providesModule Banana\n */\nmodule.exports = 1;";
        assert_eq!(provided_module_name(source), Some("Banana".to_string()));
        assert_eq!(provided_module_name("var x = '@providesModule Nope';"), None);
    }

    #[test]
    fn test_mock_name() {
        assert_eq!(
            mock_name(Path::new("/p/__mocks__/fs.js")),
            Some("fs".to_string())
        );
        assert_eq!(
            mock_name(Path::new("/p/__mocks__/scoped/thing.js")),
            Some("scoped/thing".to_string())
        );
        assert_eq!(mock_name(Path::new("/p/src/thing.js")), None);
    }

    #[test]
    fn test_builder_keeps_first_registration() {
        let map = ModuleMap::builder()
            .module("A", "/first/A.js")
            .module("A", "/second/A.js")
            .mock("A", "/first/__mocks__/A.js")
            .build();
        assert_eq!(map.lookup("A"), Some(Path::new("/first/A.js")));
        assert_eq!(map.lookup_mock("A"), Some(Path::new("/first/__mocks__/A.js")));
        assert_eq!(map.lookup_package("A"), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_crawl() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/__mocks__")).unwrap();
        fs::create_dir_all(root.join("node_modules/hidden")).unwrap();
        fs::create_dir_all(root.join("node_modules/shared")).unwrap();
        fs::create_dir_all(root.join("haste-pkg")).unwrap();

        fs::write(
            root.join("src/Banana.js"),
            "/**\n * @providesModule Banana\n */\nexports.x = 1;",
        )
        .unwrap();
        fs::write(root.join("src/plain.js"), "exports.x = 1;").unwrap();
        fs::write(root.join("src/__mocks__/Banana.js"), "").unwrap();
        fs::write(
            root.join("node_modules/hidden/Hidden.js"),
            "/** @providesModule Hidden */",
        )
        .unwrap();
        fs::write(
            root.join("node_modules/shared/Shared.js"),
            "/** @providesModule Shared */",
        )
        .unwrap();
        fs::write(
            root.join("haste-pkg/package.json"),
            r#"{"name": "haste-pkg", "main": "main.js"}"#,
        )
        .unwrap();

        let mut config = Config::new(root);
        config.haste.provides_module_node_modules = vec!["shared".to_string()];
        let config = config.normalize().unwrap();
        let map = ModuleMap::crawl(&config).unwrap();

        let root = normalize_path(root);
        assert_eq!(map.lookup("Banana"), Some(root.join("src/Banana.js").as_path()));
        assert_eq!(
            map.lookup_mock("Banana"),
            Some(root.join("src/__mocks__/Banana.js").as_path())
        );
        assert_eq!(map.lookup("Shared"), Some(root.join("node_modules/shared/Shared.js").as_path()));
        assert_eq!(map.lookup("Hidden"), None);
        assert_eq!(
            map.lookup_package("haste-pkg"),
            Some(root.join("haste-pkg/package.json").as_path())
        );
        assert_eq!(map.lookup("plain"), None);
    }
}
