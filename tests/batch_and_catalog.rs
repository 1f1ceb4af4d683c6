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

//! Batch and catalog integration test
//!
//! 1. **Batch**: concurrent queries come back in request order, each with its own rows
//! 2. **Duplicate in a batch**: two concurrent queries of one key agree on the result
//! 3. **Catalog load**: tag values and field types are read with the InfluxQL catalog statements
//! 4. **No catalog statements**: TimescaleDB catalogs must be built by the caller

use std::sync::Arc;

use pretty_assertions::assert_eq;
use ts_semantic_cache::errors::QueryError;
use ts_semantic_cache::testing::database::TestDatabase;
use ts_semantic_cache::testing::store::MemStore;
use ts_semantic_cache::testing::types::TestConfig;
use ts_semantic_cache::testing::util::cpu_catalog;
use ts_semantic_cache::testing::util::influx_cache;
use ts_semantic_cache::testing::util::influx_window;
use ts_semantic_cache::testing::util::load_cpu;
use ts_semantic_cache::testing::util::usage_user;
use ts_semantic_cache::testing::util::HOUR;
use ts_semantic_cache::testing::util::MINUTE;
use ts_semantic_cache::testing::util::T0;
use ts_semantic_cache::Cache;
use ts_semantic_cache::CacheConfig;
use ts_semantic_cache::CacheState;
use ts_semantic_cache::HitKind;
use ts_semantic_cache::InfluxQl;
use ts_semantic_cache::ShardAssignment;
use ts_semantic_cache::TagCatalog;
use ts_semantic_cache::Timescale;
use ts_semantic_cache::TimeRange;
use ts_semantic_cache::Value;

fn last_of_host(h: usize) -> String {
    format!(
        "SELECT last(usage_user) FROM cpu WHERE hostname = 'host_{}' AND {} GROUP BY time(1h)",
        h,
        influx_window(T0, T0 + HOUR)
    )
}

#[tokio::test]
async fn test_query_batch() -> anyhow::Result<()> {
    let (cache, _store, _db) = influx_cache(4, CacheConfig::new("batch")).await;

    let queries = (0..4).map(last_of_host).chain([last_of_host(0)]).collect::<Vec<_>>();
    let refs = queries.iter().map(|q| q.as_str()).collect::<Vec<_>>();

    let outcomes = cache.query_batch(&refs).await;
    assert_eq!(outcomes.len(), 5);

    let mut results = vec![];
    for (h, outcome) in outcomes.into_iter().enumerate() {
        let outcome = outcome?;
        assert!(matches!(outcome.hit_kind, HitKind::Miss | HitKind::Full));
        results.push(outcome.result);

        if h < 4 {
            let last = T0 + HOUR - MINUTE;
            assert_eq!(results[h].series[0].rows, vec![vec![
                Value::Int64(T0),
                Value::Float64(usage_user(h, last) as f64),
            ]]);
        }
    }
    assert_eq!(results[4], results[0]);

    let stats = cache.stats();
    assert_eq!(stats.queries, 5);
    assert_eq!(stats.misses + stats.full_hits, 5);
    Ok(())
}

#[tokio::test]
async fn test_batch_spreads_over_shards() -> anyhow::Result<()> {
    let db = TestDatabase::<InfluxQl>::new();
    load_cpu(&db, 2, TimeRange::new(T0, T0 + HOUR), MINUTE).await;

    let shards = vec![MemStore::new(), MemStore::new()];
    let state = Arc::new(CacheState::new(cpu_catalog(2), ShardAssignment::DiscoveryOrder));
    let cache = Cache::<TestConfig>::new(CacheConfig::new("shards"), state, shards.clone(), db);

    let window = influx_window(T0, T0 + HOUR);
    let user = format!("SELECT max(usage_user) FROM cpu WHERE hostname = 'host_0' AND {} GROUP BY time(1h)", window);
    let system = format!("SELECT max(usage_system) FROM cpu WHERE hostname = 'host_0' AND {} GROUP BY time(1h)", window);

    cache.query(&user).await?;
    cache.query(&system).await?;

    assert_eq!(shards[0].keys().await, vec![cache.segment(&user).await?.key()]);
    assert_eq!(shards[1].keys().await, vec![cache.segment(&system).await?.key()]);
    Ok(())
}

#[tokio::test]
async fn test_load_catalog() -> anyhow::Result<()> {
    let db = TestDatabase::<InfluxQl>::new();
    load_cpu(&db, 3, TimeRange::new(T0, T0 + HOUR), MINUTE).await;

    let catalog = TagCatalog::load(&InfluxQl, &db).await?;
    assert_eq!(catalog, cpu_catalog(3));

    let statements = db.statements().await;
    assert_eq!(statements, vec![
        "SHOW TAG KEYS".to_string(),
        r#"SHOW TAG VALUES FROM "cpu" WITH KEY = "hostname""#.to_string(),
        "SHOW FIELD KEYS".to_string(),
    ]);
    Ok(())
}

#[tokio::test]
async fn test_load_catalog_unsupported() {
    let db = TestDatabase::<Timescale>::new();
    let err = TagCatalog::load(&Timescale, &db).await.unwrap_err();

    assert!(matches!(err, QueryError::Unsupported(_)), "got: {}", err);
    assert_eq!(db.query_count().await, 0);
}
