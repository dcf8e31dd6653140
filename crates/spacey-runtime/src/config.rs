// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Test run configuration.
//!
//! Configuration is read from JSON, either a dedicated config file or the
//! `jest` key of a `package.json`. Every field has a default so partial
//! configs deserialize. Call [`Config::normalize`] before handing the config
//! to a runtime: it expands `<rootDir>` and makes paths absolute.

use crate::error::{Result, RuntimeError};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

const ROOT_DIR_TAG: &str = "<rootDir>";

/// Default limit on timer loop iterations
pub const DEFAULT_TIMER_MAX_LOOPS: usize = 100_000;

/// Haste crawling options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HasteConfig {
    /// Packages under `node_modules` whose `@providesModule` files are indexed
    pub provides_module_node_modules: Vec<String>,
}

/// Runtime configuration for one test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Project root; relative paths are resolved against it
    pub root_dir: PathBuf,
    /// Directories crawled for the module map (defaults to `rootDir`)
    #[serde(alias = "testPathDirs")]
    pub roots: Vec<PathBuf>,
    /// Serve generated mocks unless a module is exempted
    pub automock: bool,
    /// Regexes matched against resolved paths that are never automocked
    pub unmocked_module_path_patterns: Vec<String>,
    /// Ordered `regex -> replacement` rules for non-relative module names
    pub module_name_mapper: IndexMap<String, String>,
    /// Extensions tried when a path does not exist as written
    pub module_file_extensions: Vec<String>,
    /// Files required before every test file
    pub setup_files: Vec<PathBuf>,
    /// Environment script required before the setup files
    pub setup_env_script_file: Option<PathBuf>,
    /// Name of the directory holding test files
    pub test_directory_name: String,
    /// Collect coverage for every loaded file
    pub collect_coverage: bool,
    /// Restrict coverage collection to these files
    #[serde(deserialize_with = "deserialize_path_set")]
    pub collect_coverage_only_from: Vec<PathBuf>,
    /// Source preprocessor named in syntax error hints
    pub script_preprocessor: Option<PathBuf>,
    /// Arbitrary data exposed through `jest.getTestEnvData()`
    pub test_env_data: serde_json::Value,
    /// Haste crawling options
    pub haste: HasteConfig,
    /// Timer iterations before fake timers assume an infinite loop
    pub timer_max_loops: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            roots: Vec::new(),
            automock: true,
            unmocked_module_path_patterns: Vec::new(),
            module_name_mapper: IndexMap::new(),
            module_file_extensions: vec!["js".to_string(), "json".to_string()],
            setup_files: Vec::new(),
            setup_env_script_file: None,
            test_directory_name: "__tests__".to_string(),
            collect_coverage: false,
            collect_coverage_only_from: Vec::new(),
            script_preprocessor: None,
            test_env_data: serde_json::Value::Object(serde_json::Map::new()),
            haste: HasteConfig::default(),
            timer_max_loops: DEFAULT_TIMER_MAX_LOOPS,
        }
    }
}

/// `collectCoverageOnlyFrom` is historically a `{path: true}` object; a plain
/// list is accepted too.
fn deserialize_path_set<'de, D>(deserializer: D) -> std::result::Result<Vec<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PathSet {
        List(Vec<PathBuf>),
        Map(IndexMap<PathBuf, bool>),
    }

    Ok(match PathSet::deserialize(deserializer)? {
        PathSet::List(paths) => paths,
        PathSet::Map(paths) => paths
            .into_iter()
            .filter_map(|(path, enabled)| enabled.then_some(path))
            .collect(),
    })
}

impl Config {
    /// Create a default configuration rooted at `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Read and normalize a configuration file.
    ///
    /// For a `package.json` the `jest` key is used. A missing `rootDir`
    /// defaults to the directory containing the file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| RuntimeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut json: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| RuntimeError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;

        if path.file_name().is_some_and(|name| name == "package.json") {
            json = json
                .get_mut("jest")
                .map(serde_json::Value::take)
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        }

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_json(json, &base_dir)
    }

    /// Build a normalized configuration from a JSON value
    pub fn from_json(json: serde_json::Value, base_dir: &Path) -> Result<Self> {
        let mut config: Config = serde_json::from_value(json)
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        if config.root_dir.as_os_str().is_empty() {
            config.root_dir = base_dir.to_path_buf();
        } else if config.root_dir.is_relative() {
            config.root_dir = base_dir.join(&config.root_dir);
        }
        config.normalize()
    }

    /// Expand `<rootDir>` tags and absolutize every path field
    pub fn normalize(mut self) -> Result<Self> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(RuntimeError::Config("No rootDir config value found".into()));
        }
        if self.root_dir.is_relative() {
            self.root_dir = std::env::current_dir()?.join(&self.root_dir);
        }
        let root_dir = normalize_path(&self.root_dir);
        self.root_dir = root_dir.clone();

        let resolve = |path: &Path| resolve_root_dir_tag(&root_dir, path);

        self.roots = self.roots.iter().map(|p| resolve(p)).collect();
        if self.roots.is_empty() {
            self.roots.push(root_dir.clone());
        }
        self.setup_files = self.setup_files.iter().map(|p| resolve(p)).collect();
        self.setup_env_script_file = self.setup_env_script_file.as_deref().map(resolve);
        self.script_preprocessor = self.script_preprocessor.as_deref().map(resolve);
        self.collect_coverage_only_from = self
            .collect_coverage_only_from
            .iter()
            .map(|p| resolve(p))
            .collect();

        let root_str = root_dir.to_string_lossy().into_owned();
        for replacement in self.module_name_mapper.values_mut() {
            if replacement.starts_with(ROOT_DIR_TAG) {
                *replacement = resolve(Path::new(replacement.as_str()))
                    .to_string_lossy()
                    .into_owned();
            }
        }
        for pattern in &mut self.unmocked_module_path_patterns {
            *pattern = pattern.replace(ROOT_DIR_TAG, &regex::escape(&root_str));
        }

        for extension in &mut self.module_file_extensions {
            if let Some(stripped) = extension.strip_prefix('.') {
                *extension = stripped.to_string();
            }
        }

        Ok(self)
    }

    /// Compile the unmock patterns into a single alternation
    pub fn unmock_regex(&self) -> Result<Option<Regex>> {
        if self.unmocked_module_path_patterns.is_empty() {
            return Ok(None);
        }
        let joined = self.unmocked_module_path_patterns.join("|");
        Regex::new(&joined)
            .map(Some)
            .map_err(|source| RuntimeError::pattern(joined, source))
    }

    /// Compile the module name mapper in declaration order
    pub fn name_mapper_rules(&self) -> Result<Vec<(Regex, String)>> {
        self.module_name_mapper
            .iter()
            .map(|(pattern, replacement)| {
                Regex::new(pattern)
                    .map(|regex| (regex, replacement.clone()))
                    .map_err(|source| RuntimeError::pattern(pattern.clone(), source))
            })
            .collect()
    }

    /// File extensions with a leading dot, in search order
    pub fn dotted_extensions(&self) -> Vec<String> {
        self.module_file_extensions
            .iter()
            .map(|ext| format!(".{ext}"))
            .collect()
    }
}

fn resolve_root_dir_tag(root_dir: &Path, path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    let expanded = match text.strip_prefix(ROOT_DIR_TAG) {
        Some(rest) => root_dir.join(rest.trim_start_matches(['/', '\\'])),
        None => root_dir.join(path),
    };
    normalize_path(&expanded)
}

/// Lexically normalize a path, removing `.` and resolving `..` components
/// without touching the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_value(json!({})).unwrap();
        assert!(config.automock);
        assert_eq!(config.module_file_extensions, vec!["js", "json"]);
        assert_eq!(config.test_directory_name, "__tests__");
        assert_eq!(config.timer_max_loops, DEFAULT_TIMER_MAX_LOOPS);
    }

    #[test]
    fn test_root_dir_tags_are_expanded() {
        let config = Config::from_json(
            json!({
                "rootDir": "/project",
                "setupFiles": ["<rootDir>/setup.js"],
                "moduleNameMapper": {"^image![a-z]+$": "<rootDir>/stubs/image.js"},
                "unmockedModulePathPatterns": ["<rootDir>/node_modules/react"],
                "collectCoverageOnlyFrom": {"<rootDir>/src/a.js": true, "<rootDir>/src/b.js": false}
            }),
            Path::new("/elsewhere"),
        )
        .unwrap();

        assert_eq!(config.root_dir, PathBuf::from("/project"));
        assert_eq!(config.roots, vec![PathBuf::from("/project")]);
        assert_eq!(config.setup_files, vec![PathBuf::from("/project/setup.js")]);
        assert_eq!(
            config.module_name_mapper["^image![a-z]+$"],
            "/project/stubs/image.js"
        );
        assert_eq!(
            config.unmocked_module_path_patterns,
            vec!["/project/node_modules/react"]
        );
        assert_eq!(
            config.collect_coverage_only_from,
            vec![PathBuf::from("/project/src/a.js")]
        );
    }

    #[test]
    fn test_mapper_keeps_declaration_order() {
        let config = Config::from_json(
            json!({"moduleNameMapper": {"^b$": "second", "^a$": "first"}}),
            Path::new("/p"),
        )
        .unwrap();
        let rules = config.name_mapper_rules().unwrap();
        assert_eq!(rules[0].1, "second");
        assert_eq!(rules[1].1, "first");
    }

    #[test]
    fn test_invalid_unmock_pattern() {
        let mut config = Config::new("/p");
        config.unmocked_module_path_patterns = vec!["(".to_string()];
        assert!(matches!(
            config.unmock_regex(),
            Err(RuntimeError::Pattern { .. })
        ));
    }

    #[test]
    fn test_package_json_jest_key() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("package.json");
        std::fs::write(
            &package,
            r#"{"name": "app", "jest": {"automock": false, "testDirectoryName": "spec"}}"#,
        )
        .unwrap();

        let config = Config::from_file(&package).unwrap();
        assert!(!config.automock);
        assert_eq!(config.test_directory_name, "spec");
        assert_eq!(config.root_dir, normalize_path(dir.path()));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d.js")),
            PathBuf::from("/a/c/d.js")
        );
    }
}
