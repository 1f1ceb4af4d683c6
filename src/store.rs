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

use log::debug;

use crate::codec::CacheEntry;
use crate::errors::QueryError;
use crate::errors::StoreUnavailable;
use crate::merge::DecodedEntry;
use crate::row::DataType;
use crate::state::ShardMap;
use crate::time_range::TimeRange;
use crate::type_config::Store;
use crate::type_config::StoreItem;

/// Reads and writes framed cache entries on a set of backing store shards.
///
/// An entry is stored under the key of its whole semantic segment; the shard is picked by the
/// field list of the segment.
pub struct SegmentStore<S> {
    shards: Vec<S>,
}

impl<S> fmt::Debug for SegmentStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SegmentStore(shards={})", self.shards.len())
    }
}

impl<S> SegmentStore<S>
where
    S: Store + Send + Sync + 'static,
{
    pub fn new(shards: Vec<S>) -> Self {
        SegmentStore { shards }
    }

    async fn shard(&self, shards: &ShardMap, field_list: &str) -> Result<&S, StoreUnavailable> {
        if self.shards.is_empty() {
            return Err(StoreUnavailable::new("no store shard configured"));
        }
        let i = shards.shard_for(field_list, self.shards.len()).await;
        Ok(&self.shards[i])
    }

    /// Fetch and decode the entry stored under `key`.
    ///
    /// Returns `Ok(None)` on a miss. A value that does not decode is a [`QueryError::Codec`].
    pub async fn get(
        &self,
        shards: &ShardMap,
        field_list: &str,
        key: &str,
        range: TimeRange,
        layout: &[DataType],
    ) -> Result<Option<DecodedEntry>, QueryError> {
        let store = self.shard(shards, field_list).await?;

        let Some(stored) = store
            .get(key, range)
            .await
            .map_err(|e| e.context(format!("get {}", key)))?
        else {
            return Ok(None);
        };

        let entry = CacheEntry::decode(&stored.value)?;
        let decoded = DecodedEntry::decode(&entry, stored.range, layout)?;

        debug!(
            "SegmentStore: get {}: {} records over {}",
            key,
            decoded.series.len(),
            decoded.range
        );
        Ok(Some(decoded))
    }

    /// Encode `entry` and replace the value stored under `key`.
    pub async fn set(
        &self,
        shards: &ShardMap,
        field_list: &str,
        key: &str,
        entry: &DecodedEntry,
        layout: &[DataType],
    ) -> Result<(), QueryError> {
        let store = self.shard(shards, field_list).await?;

        let encoded = entry.encode(layout)?;
        let item = StoreItem {
            key: key.to_string(),
            value: encoded.encode()?,
            range: entry.range,
            num_tables: encoded.records.len() as i64,
        };

        debug!(
            "SegmentStore: set {}: {} records over {}, {} bytes",
            key,
            item.num_tables,
            item.range,
            item.value.len()
        );

        store
            .set(item)
            .await
            .map_err(|e| e.context(format!("set {}", key)))?;
        Ok(())
    }
}
