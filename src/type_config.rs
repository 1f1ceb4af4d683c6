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

use bytes::Bytes;

use crate::dialect::Dialect;
use crate::errors::DatabaseError;
use crate::errors::StoreUnavailable;
use crate::result::QueryResult;
use crate::time_range::TimeRange;

pub trait TypeConfig
where
    Self: fmt::Debug,
    Self: Default,
    Self: Send + Sync + 'static,
{
    /// The query language spoken by the database.
    type Dialect: Dialect;

    /// One connection to the key-value store holding cache values.
    type Store: Store + Send + Sync + 'static;

    /// The client of the time-series database the cache sits in front of.
    type Database: Database + Send + Sync + 'static;
}

/// A cache value as held by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub value: Bytes,

    /// The window the value was written for.
    pub range: TimeRange,
}

/// A cache value to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreItem {
    pub key: String,
    pub value: Bytes,
    pub range: TimeRange,

    /// Number of records framed in `value`.
    pub num_tables: i64,
}

/// An opaque byte store addressed by string key.
///
/// The time range travels with every value for the caller's bookkeeping; the store does not need
/// to interpret it.
#[async_trait::async_trait]
pub trait Store {
    /// Get the value of `key`, or `None` on a miss.
    ///
    /// `range` is the window being requested.
    async fn get(&self, key: &str, range: TimeRange) -> Result<Option<StoredValue>, StoreUnavailable>;

    /// Replace the value of `item.key`.
    async fn set(&self, item: StoreItem) -> Result<(), StoreUnavailable>;
}

/// The source database.
///
/// Results use epoch-second timestamps in column 0 and one series per distinct GROUP BY tag set.
#[async_trait::async_trait]
pub trait Database {
    async fn query(&self, statement: &str) -> Result<QueryResult, DatabaseError>;
}
