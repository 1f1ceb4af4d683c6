// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::io;

use crate::errors::fmt_with_context;

/// The backing key-value store could not serve a `get` or `set`.
///
/// The error includes:
/// - The reason reported by the store client
/// - A chain of contexts describing when the error occurred
///
/// # Usage
///
/// ```rust
/// # use ts_semantic_cache::errors::StoreUnavailable;
/// let err = StoreUnavailable::new("connection reset")
///     .context("get {(cpu.*)}#{usage_user[int64]}#{empty}#{empty,empty}")
///     .context("shard 2");
/// ```
#[derive(thiserror::Error, Debug)]
pub struct StoreUnavailable {
    reason: String,

    #[source]
    io: Option<io::Error>,

    /// A chain of contexts describing when the error occurred.
    when: Vec<String>,
}

impl StoreUnavailable {
    pub fn new(reason: impl ToString) -> Self {
        StoreUnavailable {
            reason: reason.to_string(),
            io: None,
            when: vec![],
        }
    }

    /// Append a context to the error.
    pub fn context(mut self, context: impl ToString) -> Self {
        self.when.push(context.to_string());
        self
    }
}

impl fmt::Display for StoreUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_with_context(
            f,
            format_args!("cache store unavailable: {}", self.reason),
            &self.when,
        )
    }
}

impl From<io::Error> for StoreUnavailable {
    fn from(err: io::Error) -> Self {
        StoreUnavailable {
            reason: err.to_string(),
            io: Some(err),
            when: vec![],
        }
    }
}
