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

#![allow(clippy::uninlined_format_args)]

//! A semantic cache for time-series query results, in front of InfluxDB or TimescaleDB.
//!
//! Results are cached by what a query asks for, not by its text: the metric, the tag combinations,
//! the fields, the predicates and the aggregation form a [semantic segment](segment::SemanticSegment)
//! key, and the time window is tracked per tag combination. A later query of the same segment is
//! answered from the cache when its window is covered, or by fetching only the missing part.
//!
//! # Query flow
//!
//! ```text
//!  query text
//!      |
//!      v
//!  parse + normalize ---> TemplateCache ---> QueryShape ---> SemanticSegment key
//!      |  not cacheable                                             |
//!      |                                                            v
//!      |                                             SegmentStore::get (shard by field list)
//!      |                                                            |
//!      |                       .--------------+---------------------+---------------.
//!      |                       |              |                                     |
//!      |                    full hit     partial hit                         miss / undecodable
//!      |                       |              |                                     |
//!      |                       |     remainder query for the gaps           full query to database
//!      |                       |     merge into entry, write back           build entry, write
//!      |                       |              |                                     |
//!      v                       v              v                                     v
//!  database ------------------> assemble: filter to the window, output columns, group-by tags
//! ```
//!
//! # Cache Key Structure
//!
//! ```text
//! {(cpu.hostname=host_1)(cpu.hostname=host_2)}#{usage_user[int64]}#{empty}#{max,1m}
//! ```
//!
//! The value under a key frames one record per tag combination, see [`codec`].
//!
//! # Failures
//!
//! A query the cache does not understand, an unavailable store, or an undecodable value never
//! fails a query: it falls back to the database. A failed remainder query returns the cached part
//! marked incomplete.

mod cache;
mod catalog;
mod config;
mod result;
mod row;
mod state;
mod stats;
mod store;
mod template;
mod time_range;
mod type_config;

pub use cache::Cache;
pub use cache::HitKind;
pub use cache::QueryOutcome;
pub use catalog::TagCatalog;
pub use config::CacheConfig;
pub use config::ShardAssignment;
pub use dialect::Dialect;
pub use dialect::InfluxQl;
pub use dialect::Timescale;
pub use result::QueryResult;
pub use result::Series;
pub use row::DataType;
pub use row::Row;
pub use row::Value;
pub use state::CacheState;
pub use state::ShardMap;
pub use stats::CacheStats;
pub use store::SegmentStore;
pub use template::QueryTemplate;
pub use template::TemplateCache;
pub use time_range::TimeRange;
pub use type_config::Database;
pub use type_config::Store;
pub use type_config::StoreItem;
pub use type_config::StoredValue;
pub use type_config::TypeConfig;

pub mod codec;
pub mod dialect;
pub mod errors;
pub mod merge;
pub mod query;
pub mod resolver;
pub mod segment;

pub mod testing {
    pub mod database;
    pub mod store;
    pub mod types;
    pub mod util;
}
