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

/// Input handed to the merger breaks an ordering invariant.
///
/// Cached and fetched rows are always produced in ascending time order and tag combinations are
/// always produced sorted, so this error points at corrupt state upstream.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeInvariantViolation {
    #[error("{side} series is not strictly ascending at row {index}: {prev} then {ts}")]
    Unsorted {
        side: &'static str,
        index: usize,
        prev: i64,
        ts: i64,
    },

    #[error("{side} series row {index} has no int64 timestamp in column 0")]
    MissingTimestamp { side: &'static str, index: usize },

    #[error("{side} tag combinations are not sorted at {key:?}")]
    UnsortedCombinations { side: &'static str, key: String },
}
