// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module path resolution.
//!
//! Order for a `(requester, name)` pair:
//!
//! 1. Relative and absolute names resolve against the requester's directory.
//! 2. Names matched by a module name mapper rule resolve their replacement.
//! 3. Haste module names resolve through the module map.
//! 4. Everything else is looked up in ancestor `node_modules` directories,
//!    then as a Haste package (`package.json` outside `node_modules`).

use super::identity::ModuleIdentity;
use super::module_map::{ModuleMap, NODE_MODULES};
use crate::config::{normalize_path, Config};
use crate::error::{Result, RuntimeError};
use dashmap::DashMap;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Node built-in module names
const CORE_MODULES: &[&str] = &[
    "assert",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "https",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

/// Check if a module name refers to a built-in
pub fn is_core_module(name: &str) -> bool {
    let name = name.strip_prefix("node:").unwrap_or(name);
    CORE_MODULES.contains(&name)
}

/// Check if a module name is a relative or absolute path
pub fn is_relative_name(name: &str) -> bool {
    name == "."
        || name == ".."
        || name.starts_with("./")
        || name.starts_with("../")
        || name.starts_with('/')
        || (cfg!(windows) && name.chars().nth(1) == Some(':'))
}

/// Parse a package specifier into name and optional subpath
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    if let Some(scoped) = specifier.strip_prefix('@') {
        // @scope/name or @scope/name/subpath
        if let Some(slash_pos) = scoped.find('/') {
            let after_scope = &specifier[slash_pos + 2..];
            if let Some(subpath_pos) = after_scope.find('/') {
                let name_end = slash_pos + 2 + subpath_pos;
                return (&specifier[..name_end], Some(&specifier[name_end + 1..]));
            }
        }
        (specifier, None)
    } else if let Some(slash_pos) = specifier.find('/') {
        (&specifier[..slash_pos], Some(&specifier[slash_pos + 1..]))
    } else {
        (specifier, None)
    }
}

/// Minimal package.json structure for resolution
#[derive(Debug, Deserialize)]
struct PackageJson {
    main: Option<String>,
}

/// Resolves module names to files for one test run.
///
/// Results are cached per `(requester directory, name)`.
pub struct Resolver {
    module_map: Arc<ModuleMap>,
    root_dir: PathBuf,
    /// Extensions to try, with leading dot
    extensions: Vec<String>,
    name_mapper: Vec<(Regex, String)>,
    paths: DashMap<(PathBuf, String), PathBuf>,
    identities: DashMap<(PathBuf, String), ModuleIdentity>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("root_dir", &self.root_dir)
            .field("extensions", &self.extensions)
            .field("cached", &self.paths.len())
            .finish()
    }
}

impl Resolver {
    /// Create a resolver over `module_map`
    pub fn new(config: &Config, module_map: Arc<ModuleMap>) -> Result<Self> {
        Ok(Self {
            module_map,
            root_dir: config.root_dir.clone(),
            extensions: config.dotted_extensions(),
            name_mapper: config.name_mapper_rules()?,
            paths: DashMap::new(),
            identities: DashMap::new(),
        })
    }

    /// The module map backing Haste lookups
    pub fn module_map(&self) -> &ModuleMap {
        &self.module_map
    }

    /// Apply the first matching module name mapper rule
    pub fn map_module_name(&self, name: &str) -> Option<String> {
        if is_relative_name(name) {
            return None;
        }
        self.name_mapper
            .iter()
            .find(|(regex, _)| regex.is_match(name))
            .map(|(regex, replacement)| regex.replace(name, replacement.as_str()).into_owned())
    }

    /// Resolve `name` as required from the file `from`
    pub fn resolve_module(&self, from: &Path, name: &str) -> Result<PathBuf> {
        let dir = from.parent().unwrap_or(Path::new("/")).to_path_buf();
        let key = (dir, name.to_string());
        if let Some(cached) = self.paths.get(&key) {
            return Ok(cached.clone());
        }

        let resolved = self
            .resolve_uncached(&key.0, name)
            .ok_or_else(|| RuntimeError::module_not_found(name, from, &self.root_dir))?;
        tracing::trace!("Resolved '{}' from {} to {}", name, from.display(), resolved.display());
        self.paths.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn resolve_uncached(&self, dir: &Path, name: &str) -> Option<PathBuf> {
        if is_relative_name(name) {
            return self.resolve_path(&normalize_path(&dir.join(name)));
        }

        if let Some(mapped) = self.map_module_name(name) {
            tracing::debug!("Mapped module name '{}' to '{}'", name, mapped);
            return self.resolve_mapped(dir, &mapped);
        }

        if let Some(path) = self.module_map.lookup(name) {
            return Some(path.to_path_buf());
        }

        self.resolve_node_module(dir, name)
            .or_else(|| self.resolve_haste_package(name))
    }

    fn resolve_mapped(&self, dir: &Path, mapped: &str) -> Option<PathBuf> {
        if let Some(path) = self.module_map.lookup(mapped) {
            return Some(path.to_path_buf());
        }
        if is_relative_name(mapped) {
            return self.resolve_path(&normalize_path(&dir.join(mapped)));
        }
        self.resolve_node_module(dir, mapped)
            .or_else(|| self.resolve_haste_package(mapped))
    }

    /// Resolve a path to an existing file.
    ///
    /// A directory prefers a same-named sibling file over its own entry
    /// point. A missing path is retried with each extension appended, then
    /// with `.json`.
    pub fn resolve_path(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        if path.is_dir() {
            return self
                .with_extensions(path)
                .or_else(|| self.resolve_directory(path));
        }

        self.with_extensions(path)
    }

    fn with_extensions(&self, path: &Path) -> Option<PathBuf> {
        self.extensions
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(".json"))
            .map(|ext| {
                let mut candidate = path.as_os_str().to_owned();
                candidate.push(ext);
                PathBuf::from(candidate)
            })
            .find(|candidate| candidate.is_file())
    }

    /// Resolve a directory through `package.json` main or an index file
    fn resolve_directory(&self, dir: &Path) -> Option<PathBuf> {
        let package_json_path = dir.join("package.json");
        if package_json_path.is_file() {
            let main = std::fs::read_to_string(&package_json_path)
                .ok()
                .and_then(|content| serde_json::from_str::<PackageJson>(&content).ok())
                .and_then(|pkg| pkg.main);
            if let Some(main) = main {
                let main_path = normalize_path(&dir.join(main));
                if main_path.is_file() {
                    return Some(main_path);
                }
                if let Some(found) = self.with_extensions(&main_path) {
                    return Some(found);
                }
                if main_path.is_dir() && main_path != dir {
                    if let Some(found) = self.resolve_directory(&main_path) {
                        return Some(found);
                    }
                }
            }
        }

        self.with_extensions(&dir.join("index"))
    }

    /// Resolve a package from ancestor `node_modules` directories
    fn resolve_node_module(&self, dir: &Path, name: &str) -> Option<PathBuf> {
        node_modules_paths(dir)
            .into_iter()
            .find_map(|node_modules| self.resolve_path(&node_modules.join(name)))
    }

    /// Resolve through a Haste package's directory
    fn resolve_haste_package(&self, name: &str) -> Option<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(name);
        let package_json = self.module_map.lookup_package(package_name)?;
        let package_dir = package_json.parent()?;
        match subpath {
            Some(sub) => self.resolve_path(&normalize_path(&package_dir.join(sub))),
            None => self.resolve_directory(package_dir),
        }
    }

    /// Compute the identity of `name` as required from `from`.
    ///
    /// Names that are neither Haste modules nor manual mocks must resolve,
    /// otherwise this fails with the resolution error.
    pub fn module_identity(&self, from: &Path, name: &str) -> Result<ModuleIdentity> {
        if is_core_module(name) {
            return Ok(ModuleIdentity::core(name));
        }

        let key = (from.to_path_buf(), name.to_string());
        if let Some(cached) = self.identities.get(&key) {
            return Ok(cached.clone());
        }

        let identity = if self.map_module_name(name).is_some() {
            ModuleIdentity::user(Some(self.resolve_module(from, name)?), None)
        } else {
            let haste = self.module_map.lookup(name).map(Path::to_path_buf);
            let mock = self.module_map.lookup_mock(name).map(Path::to_path_buf);
            if haste.is_none() && mock.is_none() {
                ModuleIdentity::user(Some(self.resolve_module(from, name)?), None)
            } else {
                ModuleIdentity::user(haste, mock)
            }
        };

        self.identities.insert(key, identity.clone());
        Ok(identity)
    }

    /// Drop cached resolutions
    pub fn clear_cache(&self) {
        self.paths.clear();
        self.identities.clear();
    }
}

/// `node_modules` lookup directories for a module living in `dir`, nearest
/// first. Directories that are themselves `node_modules` are skipped.
pub fn node_modules_paths(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .filter(|ancestor| ancestor.file_name().is_none_or(|name| name != NODE_MODULES))
        .map(|ancestor| ancestor.join(NODE_MODULES))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn resolver_for(root: &Path, map: ModuleMap) -> Resolver {
        let config = Config::new(root).normalize().unwrap();
        Resolver::new(&config, Arc::new(map)).unwrap()
    }

    #[test]
    fn test_is_core_module() {
        assert!(is_core_module("fs"));
        assert!(is_core_module("path"));
        assert!(is_core_module("node:fs"));
        assert!(!is_core_module("lodash"));
    }

    #[test]
    fn test_is_relative_name() {
        assert!(is_relative_name("./a"));
        assert!(is_relative_name("../a"));
        assert!(is_relative_name("/a"));
        assert!(is_relative_name(".."));
        assert!(!is_relative_name("a/b"));
        assert!(!is_relative_name(".hidden"));
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("lodash"), ("lodash", None));
        assert_eq!(parse_package_specifier("lodash/get"), ("lodash", Some("get")));
        assert_eq!(parse_package_specifier("@types/node"), ("@types/node", None));
        assert_eq!(
            parse_package_specifier("@babel/core/lib/index"),
            ("@babel/core", Some("lib/index"))
        );
    }

    #[test]
    fn test_node_modules_paths() {
        assert_eq!(
            node_modules_paths(Path::new("/p/node_modules/a/lib")),
            vec![
                PathBuf::from("/p/node_modules/a/lib/node_modules"),
                PathBuf::from("/p/node_modules/a/node_modules"),
                PathBuf::from("/p/node_modules"),
                PathBuf::from("/node_modules"),
            ]
        );
    }

    #[test]
    fn test_sibling_file_beats_directory_index() {
        let dir = tempfile::tempdir().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("sub/Thing")).unwrap();
        fs::write(root.join("sub/Thing/index.js"), "").unwrap();
        let resolver = resolver_for(&root, ModuleMap::default());
        let from = root.join("a.js");

        assert_eq!(
            resolver.resolve_module(&from, "./sub/Thing").unwrap(),
            root.join("sub/Thing/index.js")
        );

        fs::write(root.join("sub/Thing.js"), "").unwrap();
        let fresh = resolver_for(&root, ModuleMap::default());
        assert_eq!(
            fresh.resolve_module(&from, "./sub/Thing").unwrap(),
            root.join("sub/Thing.js")
        );
    }

    #[test]
    fn test_extensions_then_json() {
        let dir = tempfile::tempdir().unwrap();
        let root = normalize_path(dir.path());
        fs::write(root.join("data.json"), "{}").unwrap();
        fs::write(root.join("empty.js"), "").unwrap();
        let resolver = resolver_for(&root, ModuleMap::default());
        let from = root.join("a.js");

        assert_eq!(
            resolver.resolve_module(&from, "./data").unwrap(),
            root.join("data.json")
        );
        assert_eq!(
            resolver.resolve_module(&from, "./empty").unwrap(),
            root.join("empty.js")
        );
        let err = resolver.resolve_module(&from, "./missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot find module './missing' from 'a.js'"
        );
    }

    #[test]
    fn test_node_modules_walk_up_and_main() {
        let dir = tempfile::tempdir().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("node_modules/pkg/lib")).unwrap();
        fs::create_dir_all(root.join("src/deep")).unwrap();
        fs::write(
            root.join("node_modules/pkg/package.json"),
            r#"{"main": "./lib/entry"}"#,
        )
        .unwrap();
        fs::write(root.join("node_modules/pkg/lib/entry.js"), "").unwrap();
        fs::write(root.join("node_modules/pkg/lib/other.js"), "").unwrap();

        let resolver = resolver_for(&root, ModuleMap::default());
        let from = root.join("src/deep/a.js");
        assert_eq!(
            resolver.resolve_module(&from, "pkg").unwrap(),
            root.join("node_modules/pkg/lib/entry.js")
        );
        assert_eq!(
            resolver.resolve_module(&from, "pkg/lib/other").unwrap(),
            root.join("node_modules/pkg/lib/other.js")
        );
    }

    #[test]
    fn test_haste_module_and_package() {
        let dir = tempfile::tempdir().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("flat/sub")).unwrap();
        fs::write(root.join("flat/package.json"), r#"{"name": "flat", "main": "main.js"}"#)
            .unwrap();
        fs::write(root.join("flat/main.js"), "").unwrap();
        fs::write(root.join("flat/sub/part.js"), "").unwrap();

        let map = ModuleMap::builder()
            .module("Banana", root.join("Banana.js"))
            .package("flat", root.join("flat/package.json"))
            .build();
        let resolver = resolver_for(&root, map);
        let from = root.join("a.js");

        assert_eq!(
            resolver.resolve_module(&from, "Banana").unwrap(),
            root.join("Banana.js")
        );
        assert_eq!(
            resolver.resolve_module(&from, "flat").unwrap(),
            root.join("flat/main.js")
        );
        assert_eq!(
            resolver.resolve_module(&from, "flat/sub/part").unwrap(),
            root.join("flat/sub/part.js")
        );
    }

    #[test]
    fn test_mapper_runs_before_haste() {
        let dir = tempfile::tempdir().unwrap();
        let root = normalize_path(dir.path());
        fs::write(root.join("stub.js"), "").unwrap();

        let mut config = Config::new(&root);
        config
            .module_name_mapper
            .insert("^Banana$".to_string(), "<rootDir>/stub.js".to_string());
        let config = config.normalize().unwrap();
        let map = ModuleMap::builder().module("Banana", root.join("Banana.js")).build();
        let resolver = Resolver::new(&config, Arc::new(map)).unwrap();

        assert_eq!(
            resolver.resolve_module(&root.join("a.js"), "Banana").unwrap(),
            root.join("stub.js")
        );
        let identity = resolver.module_identity(&root.join("a.js"), "Banana").unwrap();
        assert_eq!(identity.real_path, Some(root.join("stub.js")));
        assert_eq!(identity.mock_path, None);
    }

    #[test]
    fn test_identity_of_mock_only_module_does_not_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let root = normalize_path(dir.path());
        let mock = root.join("__mocks__/OnlyMock.js");
        let map = ModuleMap::builder().mock("OnlyMock", &mock).build();
        let resolver = resolver_for(&root, map);

        let identity = resolver.module_identity(&root.join("a.js"), "OnlyMock").unwrap();
        assert_eq!(identity, ModuleIdentity::user(None, Some(mock)));
        assert!(resolver.module_identity(&root.join("a.js"), "Nothing").is_err());
    }
}
