// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source preprocessing hook

use crate::error::Result;
use std::path::Path;

/// Rewrites module source before it is evaluated
pub trait Transformer: Send + Sync {
    /// Transform `source` loaded from `filename`
    fn transform(&self, source: String, filename: &Path) -> Result<String>;
}

impl<F> Transformer for F
where
    F: Fn(String, &Path) -> Result<String> + Send + Sync,
{
    fn transform(&self, source: String, filename: &Path) -> Result<String> {
        self(source, filename)
    }
}
