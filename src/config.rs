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

use std::time::Duration;

/// How a field list is assigned to a backing store shard.
///
/// Part of [`CacheState`](crate::CacheState): caches sharing a state share its assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShardAssignment {
    /// The n-th distinct field list seen goes to shard `n % shards`.
    ///
    /// Assignments depend on the order queries arrive in, so they differ between runs.
    DiscoveryOrder,

    /// `crc32(field_list) % shards`, stable across runs.
    #[default]
    ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Name of the cache instance, for logging.
    pub name: String,

    /// A remainder window no longer than this is not fetched; the cached rows are served as a
    /// full hit.
    pub remainder_threshold: Duration,

    /// Two entries whose windows are at most this far apart are merged into one when written.
    pub adjacency: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            name: "semantic-cache".to_string(),
            remainder_threshold: Duration::from_secs(60),
            adjacency: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn new(name: impl ToString) -> Self {
        CacheConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_remainder_threshold(mut self, threshold: Duration) -> Self {
        self.remainder_threshold = threshold;
        self
    }

    pub fn with_adjacency(mut self, adjacency: Duration) -> Self {
        self.adjacency = adjacency;
        self
    }

    pub(crate) fn remainder_threshold_secs(&self) -> i64 {
        self.remainder_threshold.as_secs() as i64
    }

    pub(crate) fn adjacency_secs(&self) -> i64 {
        self.adjacency.as_secs() as i64
    }
}
