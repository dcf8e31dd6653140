// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-runtime
//!
//! The module runtime of one test file: resolution, mocking and execution of
//! CommonJS modules inside a sandboxed [`Environment`].
//!
//! - [`Runtime`] keeps the module and mock registries and decides, per
//!   `require`, whether the real module or a mock is served
//! - [`Resolver`] maps `(requester, name)` pairs to files using relative
//!   paths, the module-name mapper, Haste names and `node_modules`
//! - [`ModuleMap`] indexes Haste modules, packages and manual mocks
//! - [`FakeTimers`] replaces the environment's timer APIs with a
//!   deterministic clock
//! - [`TestFileRunner`] drives one test file from environment creation to
//!   disposal
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_runtime::{Config, ModuleMap, NativeEnvironment, Runtime};
//! use std::sync::Arc;
//!
//! let config = Arc::new(Config::new("/project").normalize()?);
//! let map = Arc::new(ModuleMap::crawl(&config)?);
//! let env = Arc::new(NativeEnvironment::new(&config));
//! env.register_module("/project/sum.js", |scope| {
//!     scope.export("answer", 42)
//! });
//!
//! let runtime = Runtime::new(config, env, map)?;
//! let sum = runtime.require_module_or_mock("/project/test.js".as_ref(), "./sum")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coverage;
pub mod environment;
pub mod error;
pub mod module_system;
pub mod runtime;
pub mod transform;

// Re-exports
pub use config::{Config, HasteConfig};
pub use coverage::{CoverageCollector, CoverageCollectorFactory};
pub use environment::{Environment, FakeTimers, ModuleScope, NativeEnvironment};
pub use error::{Result, RuntimeError};
pub use module_system::{MockDecision, MockReason, ModuleIdentity, ModuleKind, ModuleMap, Resolver};
pub use runtime::{run_test_file, ModuleControls, Runtime, RuntimeBuilder, TestFileResult, TestFileRunner};
pub use transform::Transformer;
