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

//! Fallback integration test
//!
//! Validates that a failing collaborator degrades a query instead of failing it:
//!
//! 1. **Undecodable entry**: treated as a miss, then overwritten with a good entry
//! 2. **Unavailable store**: the query goes to the database and nothing is written
//! 3. **Failed remainder query**: the cached part is returned, marked incomplete
//! 4. **Unsupported query**: forwarded to the database untouched
//! 5. **Failed full query**: the only database failure surfaced to the caller
//! 6. **Unrepresentable result**: an ungrouped series repeating timestamps is served uncached

use bytes::Bytes;
use pretty_assertions::assert_eq;
use ts_semantic_cache::codec::CacheEntry;
use ts_semantic_cache::errors::QueryError;
use ts_semantic_cache::testing::util::influx_cache;
use ts_semantic_cache::testing::util::influx_window;
use ts_semantic_cache::testing::util::timestamps;
use ts_semantic_cache::testing::util::HOUR;
use ts_semantic_cache::testing::util::MINUTE;
use ts_semantic_cache::testing::util::T0;
use ts_semantic_cache::CacheConfig;
use ts_semantic_cache::HitKind;
use ts_semantic_cache::TimeRange;

fn max_host_1(start: i64, end: i64) -> String {
    format!(
        "SELECT max(usage_user) FROM cpu WHERE hostname = 'host_1' AND {} GROUP BY time(5m)",
        influx_window(start, end)
    )
}

#[tokio::test]
async fn test_undecodable_entry_is_a_miss() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(2, CacheConfig::new("corrupt")).await;

    let q = max_host_1(T0, T0 + HOUR);
    let first = cache.query(&q).await?;
    let key = cache.segment(&q).await?.key();

    store
        .put_raw(&key, Bytes::from_static(b"garbage"), TimeRange::new(T0, T0 + HOUR))
        .await;

    let out = cache.query(&q).await?;
    assert_eq!(out.hit_kind, HitKind::Miss);
    assert_eq!(out.result, first.result);
    assert_eq!(db.query_count().await, 2);

    let raw = store.raw(&key).await.expect("entry is rewritten");
    let entry = CacheEntry::decode(&raw.value)?;
    assert_eq!(entry.records.len(), 1);

    let out = cache.query(&q).await?;
    assert_eq!(out.hit_kind, HitKind::Full);
    assert_eq!(db.query_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_truncated_entry_is_a_miss() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(2, CacheConfig::new("truncated")).await;

    let q = max_host_1(T0, T0 + HOUR);
    cache.query(&q).await?;
    let key = cache.segment(&q).await?.key();

    let raw = store.raw(&key).await.expect("entry is written");
    let cut = raw.value.slice(..raw.value.len() - 7);
    store.put_raw(&key, cut, raw.range).await;

    let out = cache.query(&q).await?;
    assert_eq!(out.hit_kind, HitKind::Miss);
    assert_eq!(timestamps(&out.result, 0).len(), 12);
    assert_eq!(db.query_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_store_skips_cache() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(2, CacheConfig::new("no-store")).await;
    store.set_unavailable(true).await;

    let out = cache.query(&max_host_1(T0, T0 + HOUR)).await?;
    assert_eq!(out.hit_kind, HitKind::Miss);
    assert_eq!(timestamps(&out.result, 0).len(), 12);
    assert_eq!(db.query_count().await, 1);
    assert_eq!(store.sets().await, 0);
    assert!(store.keys().await.is_empty());

    let stats = cache.stats();
    assert_eq!(stats.uncached, 1);
    assert_eq!(stats.misses, 0);

    store.set_unavailable(false).await;
    let out = cache.query(&max_host_1(T0, T0 + HOUR)).await?;
    assert_eq!(out.hit_kind, HitKind::Miss);
    assert_eq!(store.sets().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_remainder_returns_cached_part() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(2, CacheConfig::new("remainder-fails")).await;

    let q = max_host_1(T0, T0 + 2 * HOUR);
    cache.query(&max_host_1(T0, T0 + HOUR)).await?;

    db.set_failing(true).await;
    let out = cache.query(&q).await?;
    assert_eq!(out.hit_kind, HitKind::Partial);
    assert!(!out.complete);
    assert_eq!(timestamps(&out.result, 0).len(), 12, "only the cached hour");
    assert_eq!(store.sets().await, 1, "nothing is written for a failed remainder");

    db.set_failing(false).await;
    let out = cache.query(&q).await?;
    assert_eq!(out.hit_kind, HitKind::Partial);
    assert!(out.complete);
    assert_eq!(timestamps(&out.result, 0).len(), 24);
    Ok(())
}

#[tokio::test]
async fn test_unsupported_query_goes_to_database() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(2, CacheConfig::new("unsupported")).await;

    let limited = format!("{} LIMIT 3", max_host_1(T0, T0 + HOUR));
    assert!(cache.segment(&limited).await.is_err());

    let out = cache.query(&limited).await?;
    assert_eq!(out.hit_kind, HitKind::Miss);
    assert!(!out.result.is_empty());

    let out = cache.query("SHOW TAG KEYS").await?;
    assert_eq!(out.hit_kind, HitKind::Miss);
    assert_eq!(out.result.series[0].name, "cpu");

    assert_eq!(db.query_count().await, 2);
    assert_eq!(store.sets().await, 0);
    assert_eq!(cache.stats().uncached, 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_full_query_is_an_error() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(2, CacheConfig::new("db-down")).await;
    db.set_failing(true).await;

    let res = cache.query(&max_host_1(T0, T0 + HOUR)).await;
    let err = res.expect_err("nothing cached to fall back to");
    assert!(matches!(err, QueryError::Database(_)), "got: {}", err);
    assert_eq!(store.sets().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_repeated_timestamps_are_served_uncached() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(2, CacheConfig::new("ungrouped")).await;

    // No GROUP BY: both hosts come back as one series, two rows per timestamp.
    let q = format!(
        "SELECT usage_user FROM cpu WHERE {}",
        influx_window(T0, T0 + 10 * MINUTE)
    );
    let direct = cache.query_uncached(&q).await?;
    assert_eq!(direct.series.len(), 1);
    assert_eq!(direct.series[0].rows.len(), 20);

    for _ in 0..2 {
        let out = cache.query(&q).await?;
        assert_eq!(out.hit_kind, HitKind::Miss);
        assert!(out.complete);
        assert_eq!(out.result, direct);
    }

    assert_eq!(db.query_count().await, 3);
    assert_eq!(store.sets().await, 0);
    Ok(())
}
