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

use crate::row::DataType;

/// A cache value or row set that cannot be encoded or decoded.
///
/// A decoding error means the stored value is unusable; the caller treats it as a cache miss.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("row layout has no columns")]
    EmptyLayout,

    #[error("row {row} has {found} values, layout has {expected} columns")]
    Arity {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row} column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        row: usize,
        column: usize,
        expected: DataType,
        found: &'static str,
    },

    #[error("row payload of {len} bytes is not a multiple of the row width {width}")]
    RowWidth { len: usize, width: usize },

    #[error("sub-segment key {key:?} must be non-empty and must not contain a space")]
    InvalidKey { key: String },

    #[error("truncated cache value at offset {offset}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("no separator after sub-segment key at offset {offset}")]
    MissingSeparator { offset: usize },

    #[error("invalid hit flag {flag} at offset {offset}")]
    InvalidFlag { offset: usize, flag: u8 },

    #[error("time range at offset {offset} ends at {end} before it starts at {start}")]
    ReversedRange { offset: usize, start: i64, end: i64 },

    #[error("invalid byte length {len} at offset {offset}")]
    InvalidLength { offset: usize, len: i64 },

    #[error("sub-segment key at offset {offset} is not valid UTF-8")]
    NonUtf8Key { offset: usize },

    #[error("cache value is missing the trailing \\r\\n terminator")]
    MissingTerminator,

    #[error("decoder made no progress at offset {offset}")]
    Stalled { offset: usize },
}
