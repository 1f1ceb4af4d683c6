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

//! Fixtures for cache tests: a devops-style `cpu` metric, and caches wired to in-memory backends.

use std::sync::Arc;

use crate::catalog::TagCatalog;
use crate::config::CacheConfig;
use crate::config::ShardAssignment;
use crate::dialect::Dialect;
use crate::dialect::InfluxQl;
use crate::dialect::Timescale;
use crate::result::QueryResult;
use crate::row::timestamp;
use crate::row::DataType;
use crate::state::CacheState;
use crate::testing::database::Point;
use crate::testing::database::TestDatabase;
use crate::testing::store::MemStore;
use crate::testing::types::TestConfig;
use crate::testing::types::TimescaleTestConfig;
use crate::time_range::TimeRange;
use crate::Cache;

/// 2022-01-01T00:00:00Z
pub const T0: i64 = 1_640_995_200;

pub const MINUTE: i64 = 60;
pub const HOUR: i64 = 3600;

pub fn host(i: usize) -> String {
    format!("host_{}", i)
}

/// `usage_user` of host `h` at `ts`; deterministic so results can be compared across runs.
pub fn usage_user(h: usize, ts: i64) -> i64 {
    (h as i64) * 1000 + (ts - T0).div_euclid(MINUTE) % 100
}

pub fn usage_system(h: usize, ts: i64) -> f64 {
    (h as f64) + ((ts - T0).div_euclid(MINUTE) % 10) as f64 / 4.0
}

/// The catalog of the `cpu` metric as [`load_cpu`] fills it.
pub fn cpu_catalog(hosts: usize) -> TagCatalog {
    TagCatalog::new()
        .with_tag_values("cpu", "hostname", (0..hosts).map(host))
        .with_field("cpu", "usage_user", DataType::Int64)
        .with_field("cpu", "usage_system", DataType::Float64)
}

/// Insert one `cpu` point per host every `step` seconds of `range`.
pub async fn load_cpu<D: Dialect>(db: &TestDatabase<D>, hosts: usize, range: TimeRange, step: i64) {
    let mut ts = range.start;
    while ts < range.end {
        for h in 0..hosts {
            let p = Point::new(ts)
                .tag("hostname", &host(h))
                .field("usage_user", usage_user(h, ts))
                .field("usage_system", usage_system(h, ts));
            db.insert("cpu", p).await;
        }
        ts += step;
    }
}

pub fn influx_time(ts: i64) -> String {
    InfluxQl.format_time(ts)
}

pub fn timescale_time(ts: i64) -> String {
    Timescale.format_time(ts)
}

/// `time >= '..' AND time < '..'` for `[start, end)` in InfluxQL.
pub fn influx_window(start: i64, end: i64) -> String {
    InfluxQl.time_clause(TimeRange::new(start, end))
}

/// Timestamps of every row of series `i`.
pub fn timestamps(result: &QueryResult, i: usize) -> Vec<i64> {
    result
        .series
        .get(i)
        .map(|s| s.rows.iter().filter_map(timestamp).collect())
        .unwrap_or_default()
}

/// A cache over a TestDatabase holding `hosts` hosts of `cpu` data for the first day after [`T0`].
pub async fn influx_cache(
    hosts: usize,
    config: CacheConfig,
) -> (Cache<TestConfig>, MemStore, TestDatabase<InfluxQl>) {
    let db = TestDatabase::<InfluxQl>::new();
    load_cpu(&db, hosts, TimeRange::new(T0, T0 + 24 * HOUR), MINUTE).await;

    let store = MemStore::new();
    let state = Arc::new(CacheState::new(cpu_catalog(hosts), ShardAssignment::default()));
    let cache = Cache::new(config, state, vec![store.clone()], db.clone());
    (cache, store, db)
}

/// Like [`influx_cache`], in front of a TimescaleDB stand-in.
pub async fn timescale_cache(
    hosts: usize,
    config: CacheConfig,
) -> (Cache<TimescaleTestConfig>, MemStore, TestDatabase<Timescale>) {
    let db = TestDatabase::<Timescale>::new();
    load_cpu(&db, hosts, TimeRange::new(T0, T0 + 24 * HOUR), MINUTE).await;

    let store = MemStore::new();
    let state = Arc::new(CacheState::new(cpu_catalog(hosts), ShardAssignment::default()));
    let cache = Cache::new(config, state, vec![store.clone()], db.clone());
    (cache, store, db)
}
