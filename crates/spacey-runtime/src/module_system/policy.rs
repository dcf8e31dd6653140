// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mock resolution policy.
//!
//! Decides whether `require(name)` from a given file serves the mock or the
//! real module. The first matching rule wins:
//!
//! 1. core modules are never mocked
//! 2. an explicit `mock`/`unmock` override for the identity
//! 3. names rewritten by the module name mapper are never mocked
//! 4. automock disabled: never mock
//! 5. a remembered transitive unmock for this requester
//! 6. a remembered decision for the identity
//! 7. unresolvable names with a manual mock are mocked
//! 8. resolved paths matching an unmock pattern are not mocked
//! 9. a `node_modules` file required from an unmocked `node_modules` file
//!    inherits the unmock
//! 10. everything else is mocked

use super::identity::ModuleIdentity;
use super::module_map::NODE_MODULES;
use super::resolver::{is_core_module, Resolver};
use crate::error::Result;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a module is or is not mocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockReason {
    /// Built-in modules are always real
    CoreModule,
    /// `jest.mock` / `jest.unmock` was called for the identity
    ExplicitOverride,
    /// The name was rewritten by the module name mapper
    MappedName,
    /// Automocking is turned off
    AutomockDisabled,
    /// The requester is an unmocked dependency and so is the module
    TransitiveUnmock,
    /// The resolved path matches an unmocked module path pattern
    UnmockPattern,
    /// Only a manual mock exists for the name
    ManualMockOnly,
    /// Automocking applies
    Automock,
}

impl fmt::Display for MockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CoreModule => "core module",
            Self::ExplicitOverride => "explicit override",
            Self::MappedName => "mapped module name",
            Self::AutomockDisabled => "automock disabled",
            Self::TransitiveUnmock => "transitive dependency of an unmocked module",
            Self::UnmockPattern => "matches unmockedModulePathPatterns",
            Self::ManualMockOnly => "manual mock without a real module",
            Self::Automock => "automock",
        };
        f.write_str(text)
    }
}

/// Outcome of the mock policy for one require
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockDecision {
    /// Serve the mock
    pub mock: bool,
    /// The rule that decided
    pub reason: MockReason,
}

impl MockDecision {
    fn new(mock: bool, reason: MockReason) -> Self {
        Self { mock, reason }
    }
}

/// Mutable policy state owned by one runtime
#[derive(Debug, Default)]
pub(crate) struct MockPolicy {
    automock: bool,
    explicit: HashMap<ModuleIdentity, bool>,
    decisions: HashMap<ModuleIdentity, MockDecision>,
    /// Identities marked unmocked because an unmocked dependency required them
    transitive: HashMap<ModuleIdentity, bool>,
    /// `(requester, identity)` pairs resolved through transitive unmocking
    transitive_pairs: HashSet<(PathBuf, ModuleIdentity)>,
}

impl MockPolicy {
    pub(crate) fn new(automock: bool) -> Self {
        Self {
            automock,
            ..Self::default()
        }
    }

    pub(crate) fn automock(&self) -> bool {
        self.automock
    }

    pub(crate) fn set_automock(&mut self, automock: bool) {
        self.automock = automock;
    }

    pub(crate) fn set_explicit(&mut self, identity: ModuleIdentity, mock: bool) {
        self.explicit.insert(identity, mock);
    }

    pub(crate) fn explicit(&self, identity: &ModuleIdentity) -> Option<bool> {
        self.explicit.get(identity).copied()
    }

    pub(crate) fn mark_transitively_unmocked(&mut self, identity: ModuleIdentity) {
        self.transitive.insert(identity, false);
    }

    pub(crate) fn decide(
        &mut self,
        resolver: &Resolver,
        unmock: Option<&Regex>,
        from: &Path,
        name: &str,
    ) -> Result<MockDecision> {
        if is_core_module(name) {
            return Ok(MockDecision::new(false, MockReason::CoreModule));
        }

        let identity = resolver.module_identity(from, name)?;
        if let Some(mock) = self.explicit(&identity) {
            return Ok(MockDecision::new(mock, MockReason::ExplicitOverride));
        }

        if resolver.map_module_name(name).is_some() {
            return Ok(MockDecision::new(false, MockReason::MappedName));
        }

        if !self.automock {
            return Ok(MockDecision::new(false, MockReason::AutomockDisabled));
        }

        let pair = (from.to_path_buf(), identity.clone());
        if self.transitive_pairs.contains(&pair) {
            return Ok(MockDecision::new(false, MockReason::TransitiveUnmock));
        }

        if let Some(decision) = self.decisions.get(&identity) {
            return Ok(*decision);
        }

        let real_path = match resolver.resolve_module(from, name) {
            Ok(path) => path,
            Err(err) => {
                if resolver.module_map().lookup_mock(name).is_some() {
                    return Ok(self.remember(identity, true, MockReason::ManualMockOnly));
                }
                return Err(err);
            }
        };

        if unmock.is_some_and(|regex| regex.is_match(&real_path.to_string_lossy())) {
            return Ok(self.remember(identity, false, MockReason::UnmockPattern));
        }

        if in_node_modules(from) && in_node_modules(&real_path) {
            let requester = ModuleIdentity::for_path(from);
            let requester_unmocked = unmock.is_some_and(|regex| regex.is_match(&from.to_string_lossy()))
                || self.explicit(&requester) == Some(false)
                || self.transitive.get(&requester) == Some(&false);
            if requester_unmocked {
                self.transitive.insert(identity, false);
                self.transitive_pairs.insert(pair);
                return Ok(MockDecision::new(false, MockReason::TransitiveUnmock));
            }
        }

        Ok(self.remember(identity, true, MockReason::Automock))
    }

    fn remember(&mut self, identity: ModuleIdentity, mock: bool, reason: MockReason) -> MockDecision {
        let decision = MockDecision::new(mock, reason);
        self.decisions.insert(identity, decision);
        decision
    }
}

fn in_node_modules(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == NODE_MODULES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{normalize_path, Config};
    use crate::module_system::ModuleMap;
    use std::fs;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = normalize_path(dir.path());
            Self { _dir: dir, root }
        }

        fn file(&self, relative: &str) -> PathBuf {
            let path = self.root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "").unwrap();
            path
        }

        fn resolver(&self, config: &Config, map: ModuleMap) -> Resolver {
            Resolver::new(config, Arc::new(map)).unwrap()
        }
    }

    #[test]
    fn test_precedence() {
        let fx = Fixture::new();
        fx.file("lib/util.js");
        let config = Config::new(&fx.root).normalize().unwrap();
        let resolver = fx.resolver(&config, ModuleMap::default());
        let from = fx.root.join("test.js");
        let mut policy = MockPolicy::new(true);

        let core = policy.decide(&resolver, None, &from, "fs").unwrap();
        assert_eq!(core, MockDecision::new(false, MockReason::CoreModule));

        let default = policy.decide(&resolver, None, &from, "./lib/util").unwrap();
        assert_eq!(default, MockDecision::new(true, MockReason::Automock));

        let identity = resolver.module_identity(&from, "./lib/util").unwrap();
        policy.set_explicit(identity.clone(), false);
        assert!(!policy.decide(&resolver, None, &from, "./lib/util").unwrap().mock);
        policy.set_explicit(identity, true);
        assert!(policy.decide(&resolver, None, &from, "./lib/util").unwrap().mock);

        let mut off = MockPolicy::new(false);
        assert_eq!(
            off.decide(&resolver, None, &from, "./lib/util").unwrap().reason,
            MockReason::AutomockDisabled
        );
    }

    #[test]
    fn test_unmock_pattern_and_missing_modules() {
        let fx = Fixture::new();
        fx.file("vendor/jquery.js");
        let mock = fx.file("__mocks__/Ghost.js");
        let config = Config::new(&fx.root).normalize().unwrap();
        let resolver = fx.resolver(&config, ModuleMap::builder().mock("Ghost", mock).build());
        let from = fx.root.join("test.js");
        let unmock = Regex::new("/vendor/").unwrap();
        let mut policy = MockPolicy::new(true);

        let vendor = policy
            .decide(&resolver, Some(&unmock), &from, "./vendor/jquery")
            .unwrap();
        assert_eq!(vendor, MockDecision::new(false, MockReason::UnmockPattern));

        let ghost = policy.decide(&resolver, Some(&unmock), &from, "Ghost").unwrap();
        assert_eq!(ghost, MockDecision::new(true, MockReason::ManualMockOnly));

        let missing = policy.decide(&resolver, Some(&unmock), &from, "./nope");
        assert!(missing.unwrap_err().is_module_not_found());
    }

    #[test]
    fn test_transitive_unmock() {
        let fx = Fixture::new();
        let react = fx.file("node_modules/react/index.js");
        fx.file("node_modules/fbjs/index.js");
        fx.file("node_modules/other/index.js");
        let config = Config::new(&fx.root).normalize().unwrap();
        let resolver = fx.resolver(&config, ModuleMap::default());
        let unmock = Regex::new("/node_modules/react/").unwrap();
        let mut policy = MockPolicy::new(true);

        let from_react = policy.decide(&resolver, Some(&unmock), &react, "fbjs").unwrap();
        assert_eq!(from_react, MockDecision::new(false, MockReason::TransitiveUnmock));

        // fbjs now counts as unmocked for its own dependencies
        let fbjs = fx.root.join("node_modules/fbjs/index.js");
        let from_fbjs = policy.decide(&resolver, Some(&unmock), &fbjs, "other").unwrap();
        assert!(!from_fbjs.mock);

        // A test file requiring the same package still gets a mock
        let test = fx.root.join("test.js");
        let from_test = policy.decide(&resolver, Some(&unmock), &test, "other").unwrap();
        assert_eq!(from_test, MockDecision::new(true, MockReason::Automock));
    }

    #[test]
    fn test_mapped_names_are_real() {
        let fx = Fixture::new();
        fx.file("stubs/style.js");
        let mut config = Config::new(&fx.root);
        config
            .module_name_mapper
            .insert(r"^.+\.css$".to_string(), "<rootDir>/stubs/style.js".to_string());
        let config = config.normalize().unwrap();
        let resolver = fx.resolver(&config, ModuleMap::default());
        let mut policy = MockPolicy::new(true);

        let decision = policy
            .decide(&resolver, None, &fx.root.join("test.js"), "button.css")
            .unwrap();
        assert_eq!(decision, MockDecision::new(false, MockReason::MappedName));
    }
}
