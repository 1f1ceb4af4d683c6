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

use crate::errors::fmt_with_context;

/// A query whose shape the cache does not understand.
///
/// The cache only derives keys for `SELECT ... FROM <metric> WHERE ... [GROUP BY ...]` queries with
/// tag equality and time bounds. Anything else is answered by the database without caching.
///
/// ```rust
/// # use ts_semantic_cache::errors::UnsupportedQuery;
/// let err = UnsupportedQuery::new("no WHERE clause")
///     .context("building semantic segment");
/// assert_eq!(
///     err.to_string(),
///     "unsupported query: no WHERE clause; when: (building semantic segment)"
/// );
/// ```
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedQuery {
    reason: String,

    /// A chain of contexts describing when the error occurred.
    when: Vec<String>,
}

impl UnsupportedQuery {
    pub fn new(reason: impl ToString) -> Self {
        UnsupportedQuery {
            reason: reason.to_string(),
            when: vec![],
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Append a context to the error.
    pub fn context(mut self, context: impl ToString) -> Self {
        self.when.push(context.to_string());
        self
    }
}

impl fmt::Display for UnsupportedQuery {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_with_context(f, format_args!("unsupported query: {}", self.reason), &self.when)
    }
}
