// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for mock generation

use spacey_value::Exception;
use thiserror::Error;

/// Result type for mock generation
pub type Result<T> = std::result::Result<T, MockError>;

/// Errors that can occur while building mocks
#[derive(Debug, Error)]
pub enum MockError {
    /// A `ref` pointed at a `refID` that no node in the tree declares
    #[error("Mock metadata refers to unknown refID {0}")]
    DanglingReference(u32),
}

impl MockError {
    /// Converts the failure into a thrown JavaScript error.
    pub fn into_exception(self) -> Exception {
        Exception::error(self.to_string())
    }
}
