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

use crate::errors::CodecError;
use crate::errors::DatabaseError;
use crate::errors::MergeInvariantViolation;
use crate::errors::StoreUnavailable;
use crate::errors::UnsupportedQuery;

/// Errors that can occur while answering a query through the cache.
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("Query is Unsupported: {0}")]
    Unsupported(#[from] UnsupportedQuery),

    #[error("Query encounter Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Query encounter Store error: {0}")]
    StoreUnavailable(#[from] StoreUnavailable),

    #[error("Query encounter Merge error: {0}")]
    Merge(#[from] MergeInvariantViolation),

    #[error("Query encounter Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Remainder query failed: {0}")]
    RemainderQueryFailed(DatabaseError),
}

impl QueryError {
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            Self::Unsupported(e) => Self::Unsupported(e.context(context)),
            Self::StoreUnavailable(e) => Self::StoreUnavailable(e.context(context)),
            Self::Database(e) => Self::Database(e.context(context)),
            Self::RemainderQueryFailed(e) => Self::RemainderQueryFailed(e.context(context)),
            Self::Codec(_) | Self::Merge(_) => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_forwarded() {
        let err = QueryError::from(UnsupportedQuery::new("no FROM")).context("prepare");
        assert_eq!(
            err.to_string(),
            "Query is Unsupported: unsupported query: no FROM; when: (prepare)"
        );

        let err = QueryError::RemainderQueryFailed(DatabaseError::new("timeout")).context("gap");
        assert_eq!(
            err.to_string(),
            "Remainder query failed: database error: timeout; when: (gap)"
        );

        let err = QueryError::from(CodecError::MissingTerminator).context("ignored");
        assert_eq!(
            err.to_string(),
            "Query encounter Codec error: cache value is missing the trailing \\r\\n terminator"
        );
    }
}
