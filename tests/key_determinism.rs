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

//! Key determinism integration test
//!
//! 1. **Literals**: queries that differ only in time bounds share a key and one template
//! 2. **Clause order**: reordered WHERE conjuncts and SELECT items give the same key
//! 3. **Tag literals**: share a template but not a key
//! 4. **Shape changes**: a different field, predicate or interval gives a different key
//! 5. **Shared state**: two caches over one state share the template memo and shard map
//! 6. **Separators in tag values**: a value holding `,` is escaped in the key and matched whole

use std::sync::Arc;

use pretty_assertions::assert_eq;
use pretty_assertions::assert_ne;
use ts_semantic_cache::segment;
use ts_semantic_cache::testing::database::Point;
use ts_semantic_cache::testing::database::TestDatabase;
use ts_semantic_cache::testing::store::MemStore;
use ts_semantic_cache::testing::types::TestConfig;
use ts_semantic_cache::testing::util::cpu_catalog;
use ts_semantic_cache::testing::util::influx_cache;
use ts_semantic_cache::testing::util::influx_window;
use ts_semantic_cache::testing::util::timestamps;
use ts_semantic_cache::testing::util::HOUR;
use ts_semantic_cache::testing::util::MINUTE;
use ts_semantic_cache::testing::util::T0;
use ts_semantic_cache::Cache;
use ts_semantic_cache::CacheConfig;
use ts_semantic_cache::CacheState;
use ts_semantic_cache::DataType;
use ts_semantic_cache::HitKind;
use ts_semantic_cache::InfluxQl;
use ts_semantic_cache::ShardAssignment;
use ts_semantic_cache::TagCatalog;

#[tokio::test]
async fn test_time_bounds_do_not_change_key() -> anyhow::Result<()> {
    let (cache, _store, _db) = influx_cache(4, CacheConfig::new("bounds")).await;

    let q = |start: i64, end: i64| {
        format!(
            "SELECT mean(usage_user) FROM cpu WHERE hostname = 'host_1' AND {} GROUP BY time(1m)",
            influx_window(start, end)
        )
    };

    let a = cache.segment(&q(T0, T0 + HOUR)).await?;
    let b = cache.segment(&q(T0 + 5 * HOUR, T0 + 7 * HOUR)).await?;
    assert_eq!(a.key(), b.key());
    assert_eq!(cache.state().templates.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_clause_order_does_not_change_key() -> anyhow::Result<()> {
    let (cache, _store, _db) = influx_cache(4, CacheConfig::new("order")).await;
    let window = influx_window(T0, T0 + HOUR);

    let a = cache
        .segment(&format!(
            "SELECT max(usage_user),max(usage_system) FROM cpu WHERE hostname = 'host_1' AND usage_user > 10 AND {} GROUP BY time(1h)",
            window
        ))
        .await?;
    let b = cache
        .segment(&format!(
            "SELECT max(usage_system), max(usage_user) FROM cpu WHERE {} AND usage_user > 10 AND hostname = 'host_1' GROUP BY time(1h)",
            window
        ))
        .await?;

    assert_eq!(a.key(), b.key());
    assert_eq!(
        a.key(),
        "{(cpu.hostname=host_1)}#{usage_system[float64],usage_user[int64]}#{(usage_user>10[int64])}#{max,1h}"
    );
    Ok(())
}

#[tokio::test]
async fn test_tag_literals_share_template() -> anyhow::Result<()> {
    let (cache, _store, _db) = influx_cache(4, CacheConfig::new("tags")).await;

    let q = |host: &str| {
        format!(
            "SELECT mean(usage_user) FROM cpu WHERE hostname = '{}' AND {} GROUP BY time(1m)",
            host,
            influx_window(T0, T0 + HOUR)
        )
    };

    let a = cache.segment(&q("host_1")).await?;
    let b = cache.segment(&q("host_2")).await?;

    assert_ne!(a.key(), b.key());
    assert_eq!(a.partial_key(), b.partial_key());
    assert_eq!(a.field_list(), b.field_list());
    assert_eq!(cache.state().templates.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_shape_changes_change_key() -> anyhow::Result<()> {
    let catalog = cpu_catalog(4);
    let window = influx_window(T0, T0 + HOUR);
    let key = |q: String| segment::build(&q, &catalog, &InfluxQl).map(|s| s.key());

    let base = key(format!(
        "SELECT mean(usage_user) FROM cpu WHERE hostname = 'host_1' AND {} GROUP BY time(1m)",
        window
    ))?;

    let variants = [
        format!(
            "SELECT mean(usage_system) FROM cpu WHERE hostname = 'host_1' AND {} GROUP BY time(1m)",
            window
        ),
        format!(
            "SELECT mean(usage_user) FROM cpu WHERE hostname = 'host_1' AND usage_system > 1.5 AND {} GROUP BY time(1m)",
            window
        ),
        format!(
            "SELECT mean(usage_user) FROM cpu WHERE hostname = 'host_1' AND {} GROUP BY time(5m)",
            window
        ),
        format!(
            "SELECT max(usage_user) FROM cpu WHERE hostname = 'host_1' AND {} GROUP BY time(1m)",
            window
        ),
    ];

    for v in variants {
        assert_ne!(key(v.clone())?, base, "{}", v);
    }
    Ok(())
}

#[tokio::test]
async fn test_caches_share_state() -> anyhow::Result<()> {
    let state = Arc::new(CacheState::new(cpu_catalog(2), ShardAssignment::DiscoveryOrder));
    let db = TestDatabase::<InfluxQl>::new();

    let a = Cache::<TestConfig>::new(
        CacheConfig::new("a"),
        state.clone(),
        vec![MemStore::new(), MemStore::new()],
        db.clone(),
    );
    let b = Cache::<TestConfig>::new(CacheConfig::new("b"), state.clone(), vec![MemStore::new()], db);

    let window = influx_window(T0, T0 + HOUR);
    a.segment(&format!(
        "SELECT mean(usage_user) FROM cpu WHERE hostname = 'host_1' AND {} GROUP BY time(1m)",
        window
    ))
    .await?;
    b.segment(&format!(
        "SELECT mean(usage_user) FROM cpu WHERE hostname = 'host_0' AND {} GROUP BY time(1m)",
        window
    ))
    .await?;

    assert_eq!(state.templates.len().await, 1);
    assert_eq!(state.shards.shard_for("usage_user", 2).await, 0);
    assert_eq!(state.shards.shard_for("usage_system", 2).await, 1);
    assert_eq!(state.shards.len().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_separator_in_tag_value() -> anyhow::Result<()> {
    let hosts = ["rack1,a", "rack2"];

    let db = TestDatabase::<InfluxQl>::new();
    for (h, host) in hosts.iter().enumerate() {
        for i in 0..120 {
            let p = Point::new(T0 + i * MINUTE)
                .tag("hostname", host)
                .field("usage_user", h as i64 * 1000 + i);
            db.insert("cpu", p).await;
        }
    }

    let catalog = TagCatalog::new()
        .with_tag_values("cpu", "hostname", hosts)
        .with_field("cpu", "usage_user", DataType::Int64);
    let state = Arc::new(CacheState::new(catalog, ShardAssignment::ContentHash));
    let cache = Cache::<TestConfig>::new(CacheConfig::new("separators"), state, vec![MemStore::new()], db.clone());

    let q = |end: i64| {
        format!(
            "SELECT usage_user FROM cpu WHERE {} GROUP BY hostname",
            influx_window(T0, end)
        )
    };

    let key = cache.segment(&q(T0 + HOUR)).await?.key();
    assert!(key.contains(r"(cpu.hostname=rack1\,a)(cpu.hostname=rack2)"), "{}", key);

    let out = cache.query(&q(T0 + HOUR)).await?;
    assert_eq!(out.hit_kind, HitKind::Miss);
    let direct = cache.query_uncached(&q(T0 + HOUR)).await?;
    assert_eq!(out.result.series.len(), direct.series.len());
    assert_eq!(out.result.series.len(), 2);
    assert_eq!(out.result.series[0].tags.get("hostname").map(|s| s.as_str()), Some("rack1,a"));
    assert_eq!(timestamps(&out.result, 0).len(), 60);

    let out = cache.query(&q(T0 + 2 * HOUR)).await?;
    assert_eq!(out.hit_kind, HitKind::Partial);
    assert_eq!(timestamps(&out.result, 0).len(), 120);
    assert_eq!(timestamps(&out.result, 1).len(), 120);

    let statements = db.statements().await;
    let remainder = statements.last().expect("remainder query is sent");
    assert!(remainder.contains("'rack1,a'"), "{}", remainder);
    Ok(())
}
