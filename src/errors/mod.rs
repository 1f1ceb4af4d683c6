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

//! Errors raised while answering a query through the cache.
//!
//! Only [`MergeInvariantViolation`] and a failing full database query are surfaced to the caller.
//! Every other error is logged and turned into a fallback path by the engine.

mod codec_error;
mod database_error;
mod merge_error;
mod query_error;
mod store_unavailable;
mod unsupported_query;

pub use codec_error::CodecError;
pub use database_error::DatabaseError;
pub use merge_error::MergeInvariantViolation;
pub use query_error::QueryError;
pub use store_unavailable::StoreUnavailable;
pub use unsupported_query::UnsupportedQuery;

/// Write `reason` and the `when` chain in the `"{reason}; when: (a; b)"` form shared by the errors here.
pub(crate) fn fmt_with_context(
    f: &mut std::fmt::Formatter,
    reason: impl std::fmt::Display,
    when: &[String],
) -> std::fmt::Result {
    write!(f, "{}", reason)?;

    if when.is_empty() {
        return Ok(());
    }

    write!(f, "; when: (")?;

    for (i, when) in when.iter().enumerate() {
        if i > 0 {
            write!(f, "; ")?;
        }
        write!(f, "{}", when)?;
    }

    write!(f, ")")
}
