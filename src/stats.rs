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
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Counters of how queries were served.
#[derive(Debug, Default)]
pub(crate) struct HitStats {
    queries: AtomicU64,
    full_hits: AtomicU64,
    partial_hits: AtomicU64,
    misses: AtomicU64,
    uncached: AtomicU64,
    remainder_queries: AtomicU64,
}

impl HitStats {
    pub(crate) fn query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn full_hit(&self) {
        self.full_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn partial_hit(&self) {
        self.partial_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn uncached(&self) {
        self.uncached.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remainder_query(&self) {
        self.remainder_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            queries: self.queries.load(Ordering::Relaxed),
            full_hits: self.full_hits.load(Ordering::Relaxed),
            partial_hits: self.partial_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            uncached: self.uncached.load(Ordering::Relaxed),
            remainder_queries: self.remainder_queries.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the hit counters of a [`Cache`](crate::Cache).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub queries: u64,
    pub full_hits: u64,
    pub partial_hits: u64,
    pub misses: u64,

    /// Queries answered by the database alone because they could not be cached.
    pub uncached: u64,

    pub remainder_queries: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "queries: {}, full hits: {}, partial hits: {}, misses: {}, uncached: {}, remainder queries: {}",
            self.queries,
            self.full_hits,
            self.partial_hits,
            self.misses,
            self.uncached,
            self.remainder_queries
        )
    }
}
