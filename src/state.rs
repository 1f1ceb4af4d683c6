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

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;

use crate::catalog::TagCatalog;
use crate::config::ShardAssignment;
use crate::template::TemplateCache;

/// Field list to shard assignments, decided once per distinct field list.
#[derive(Debug, Default)]
pub struct ShardMap {
    assignment: ShardAssignment,

    /// Field list to its discovery ordinal or content hash.
    assigned: Mutex<HashMap<String, u64>>,
}

impl ShardMap {
    pub fn new(assignment: ShardAssignment) -> Self {
        ShardMap {
            assignment,
            assigned: Mutex::new(HashMap::new()),
        }
    }

    /// The shard out of `shards` that holds entries of `field_list`.
    ///
    /// `shards` must not be zero.
    pub async fn shard_for(&self, field_list: &str, shards: usize) -> usize {
        let mut assigned = self.assigned.lock().await;

        let next = assigned.len() as u64;
        let n = *assigned.entry(field_list.to_string()).or_insert_with(|| {
            let n = match self.assignment {
                ShardAssignment::DiscoveryOrder => next,
                ShardAssignment::ContentHash => crc32fast::hash(field_list.as_bytes()) as u64,
            };
            debug!("ShardMap: assign {} to {}", field_list, n);
            n
        });

        (n % shards.max(1) as u64) as usize
    }

    pub async fn len(&self) -> usize {
        self.assigned.lock().await.len()
    }
}

/// State shared by the caches of one process: the catalog and everything memoized per query
/// shape.
///
/// Created once at startup and handed to every [`Cache`](crate::Cache) that should share it.
#[derive(Debug)]
pub struct CacheState {
    pub catalog: Arc<TagCatalog>,
    pub templates: TemplateCache,
    pub shards: ShardMap,
}

impl CacheState {
    pub fn new(catalog: TagCatalog, assignment: ShardAssignment) -> Self {
        CacheState {
            catalog: Arc::new(catalog),
            templates: TemplateCache::new(),
            shards: ShardMap::new(assignment),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_discovery_order() {
        let m = ShardMap::new(ShardAssignment::DiscoveryOrder);

        assert_eq!(m.shard_for("a[int64]", 2).await, 0);
        assert_eq!(m.shard_for("b[int64]", 2).await, 1);
        assert_eq!(m.shard_for("c[int64]", 2).await, 0);
        assert_eq!(m.shard_for("b[int64]", 2).await, 1);
        assert_eq!(m.len().await, 3);
    }

    #[tokio::test]
    async fn test_content_hash_is_stable() {
        let a = ShardMap::new(ShardAssignment::ContentHash);
        let b = ShardMap::new(ShardAssignment::ContentHash);

        b.shard_for("other[float64]", 7).await;

        for fields in ["usage_user[int64]", "usage_idle[float64],usage_user[int64]"] {
            let expected = (crc32fast::hash(fields.as_bytes()) % 7) as usize;
            assert_eq!(a.shard_for(fields, 7).await, expected);
            assert_eq!(b.shard_for(fields, 7).await, expected);
        }
    }
}
