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

/// The source database rejected or failed a statement.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    reason: String,

    /// A chain of contexts describing when the error occurred.
    when: Vec<String>,
}

impl DatabaseError {
    pub fn new(reason: impl ToString) -> Self {
        DatabaseError {
            reason: reason.to_string(),
            when: vec![],
        }
    }

    /// Append a context to the error.
    pub fn context(mut self, context: impl ToString) -> Self {
        self.when.push(context.to_string());
        self
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_with_context(f, format_args!("database error: {}", self.reason), &self.when)
    }
}
