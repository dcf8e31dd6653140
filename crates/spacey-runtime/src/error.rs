// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module runtime

use spacey_value::Exception;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for module runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while resolving, mocking or executing modules
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No resolution step produced a file
    #[error("Cannot find module '{module}' from '{from}'")]
    ModuleNotFound {
        /// The requested module name
        module: String,
        /// The requiring file, relative to the root directory
        from: String,
    },

    /// A module's exports could not be described for automocking
    #[error("Failed to get mock metadata: {}", .path.display())]
    MockGeneration {
        /// Resolved path of the module being automocked
        path: PathBuf,
    },

    /// Building a mock from metadata failed
    #[error(transparent)]
    Mock(#[from] spacey_mock::MockError),

    /// Module source could not be parsed
    #[error("SyntaxError: {message}")]
    Syntax {
        /// The offending file
        path: PathBuf,
        /// Parser message with file and preprocessor context
        message: String,
    },

    /// JavaScript code threw
    #[error("{0}")]
    Thrown(#[from] Exception),

    /// A JSON module is malformed
    #[error("Invalid JSON in {}: {source}", .path.display())]
    InvalidJson {
        /// The JSON file
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// A module file could not be read
    #[error("Cannot read {}: {source}", .path.display())]
    Read {
        /// The file being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File system error
    #[error("File system error: {0}")]
    Fs(#[from] std::io::Error),

    /// Configuration is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A configured regular expression does not compile
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        /// The pattern as written in the configuration
        pattern: String,
        /// Compilation error
        #[source]
        source: regex::Error,
    },

    /// A timer operation was requested from an environment without fake timers
    #[error("The test environment does not provide fake timers")]
    FakeTimersUnavailable,

    /// The runtime was dropped while module code still held a reference
    #[error("The module runtime has been torn down")]
    RuntimeGone,
}

impl RuntimeError {
    /// Create a module not found error naming `from` relative to `root_dir`
    pub fn module_not_found(module: impl Into<String>, from: &Path, root_dir: &Path) -> Self {
        let relative = pathdiff::diff_paths(from, root_dir)
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| from.to_path_buf());
        Self::ModuleNotFound {
            module: module.into(),
            from: relative.display().to_string(),
        }
    }

    /// Create a pattern compilation error
    pub fn pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            source,
        }
    }

    /// Returns true if this is a module resolution failure
    pub fn is_module_not_found(&self) -> bool {
        matches!(self, Self::ModuleNotFound { .. })
    }

    /// Converts the error into a value thrown into module code.
    ///
    /// Exceptions that originated in JavaScript are passed through untouched.
    pub fn into_exception(self) -> Exception {
        match self {
            Self::Thrown(exception) => exception,
            Self::ModuleNotFound { .. } => {
                Exception::error(self.to_string()).with_code("MODULE_NOT_FOUND")
            }
            Self::Syntax { message, .. } => Exception::syntax_error(message),
            other => Exception::error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_not_found_names_requester_relative_to_root() {
        let err = RuntimeError::module_not_found(
            "DoesntExist",
            Path::new("/project/src/root.js"),
            Path::new("/project/src"),
        );
        assert_eq!(
            err.to_string(),
            "Cannot find module 'DoesntExist' from 'root.js'"
        );

        let exception = err.into_exception();
        assert_eq!(exception.code().as_deref(), Some("MODULE_NOT_FOUND"));
    }

    #[test]
    fn test_thrown_exceptions_pass_through() {
        let original = Exception::type_error("bad");
        let value = original.value().clone();
        let roundtrip = RuntimeError::from(original).into_exception();
        assert_eq!(roundtrip.value(), &value);
    }
}
