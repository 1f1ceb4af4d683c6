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

//! MemStore: an in-memory backing store that counts calls and can be switched off.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::errors::StoreUnavailable;
use crate::time_range::TimeRange;
use crate::type_config::Store;
use crate::type_config::StoreItem;
use crate::type_config::StoredValue;

#[derive(Debug, Default)]
pub struct MemState {
    pub data: BTreeMap<String, StoredValue>,

    /// `num_tables` of the last write per key.
    pub tables: BTreeMap<String, i64>,

    pub gets: u64,
    pub sets: u64,

    /// Fail every call with [`StoreUnavailable`].
    pub unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemStore {
    pub state: Arc<Mutex<MemState>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub async fn gets(&self) -> u64 {
        self.state.lock().await.gets
    }

    pub async fn sets(&self) -> u64 {
        self.state.lock().await.sets
    }

    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.data.keys().cloned().collect()
    }

    pub async fn raw(&self, key: &str) -> Option<StoredValue> {
        self.state.lock().await.data.get(key).cloned()
    }

    /// Replace a stored value without going through the cache, such as with corrupt bytes.
    pub async fn put_raw(&self, key: &str, value: impl Into<Bytes>, range: TimeRange) {
        let mut state = self.state.lock().await;
        state.data.insert(key.to_string(), StoredValue {
            value: value.into(),
            range,
        });
    }
}

#[async_trait::async_trait]
impl Store for MemStore {
    async fn get(&self, key: &str, _range: TimeRange) -> Result<Option<StoredValue>, StoreUnavailable> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(StoreUnavailable::new("MemStore is unavailable"));
        }

        state.gets += 1;
        Ok(state.data.get(key).cloned())
    }

    async fn set(&self, item: StoreItem) -> Result<(), StoreUnavailable> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(StoreUnavailable::new("MemStore is unavailable"));
        }

        state.sets += 1;
        state.tables.insert(item.key.clone(), item.num_tables);
        state.data.insert(item.key, StoredValue {
            value: item.value,
            range: item.range,
        });
        Ok(())
    }
}
