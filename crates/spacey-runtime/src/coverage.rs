// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Coverage collector bookkeeping.
//!
//! Instrumentation itself is provided by a [`CoverageCollectorFactory`]. The
//! runtime only decides which files get a collector, hands the instrumented
//! source to the environment and drains the collectors at the end.

use crate::config::Config;
use crate::module_system::NODE_MODULES;
use spacey_value::Value;
use std::path::Path;

/// Name of the coverage store parameter in the module wrapper
pub const COVERAGE_STORE_NAME: &str = "$JEST_COVERAGE_DATA";

/// Coverage instrumentation for one file
pub trait CoverageCollector: Send + Sync {
    /// Instrumented source that records into the store bound to `store_name`
    fn instrumented_source(&self, store_name: &str) -> String;

    /// The store passed to the module as its coverage binding
    fn data_store(&self) -> Value;

    /// Coverage recorded so far
    fn extract_runtime_coverage_info(&self) -> serde_json::Value;
}

/// Creates a collector for a file's (transformed) source
pub trait CoverageCollectorFactory: Send + Sync {
    /// Create a collector for `source` loaded from `filename`
    fn create(&self, source: &str, filename: &Path) -> Box<dyn CoverageCollector>;
}

/// Whether coverage should be collected for `filename`.
///
/// Files inside the test directory and under `node_modules` never are.
pub fn should_collect_coverage(config: &Config, filename: &Path) -> bool {
    let requested = if config.collect_coverage_only_from.is_empty() {
        config.collect_coverage
    } else {
        config
            .collect_coverage_only_from
            .iter()
            .any(|path| path == filename)
    };
    if !requested {
        return false;
    }

    !filename.components().any(|component| {
        let name = component.as_os_str();
        name == NODE_MODULES || name == config.test_directory_name.as_str()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_should_collect_coverage() {
        let mut config = Config::new("/p");
        assert!(!should_collect_coverage(&config, Path::new("/p/src/a.js")));

        config.collect_coverage = true;
        assert!(should_collect_coverage(&config, Path::new("/p/src/a.js")));
        assert!(!should_collect_coverage(&config, Path::new("/p/src/__tests__/a-test.js")));
        assert!(!should_collect_coverage(&config, Path::new("/p/node_modules/x/index.js")));

        config.collect_coverage = false;
        config.collect_coverage_only_from = vec![PathBuf::from("/p/src/b.js")];
        assert!(should_collect_coverage(&config, Path::new("/p/src/b.js")));
        assert!(!should_collect_coverage(&config, Path::new("/p/src/a.js")));
    }
}
