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

//! Hit kind integration test
//!
//! Drives one aggregated query shape through the states of a cache entry:
//!
//! 1. **Miss**: an empty cache runs the full query and writes one record over the query window
//! 2. **Full hit**: a window inside the cached one is answered without the database
//! 3. **Partial hit**: a window extending the cached one fetches only the missing tail and
//!    widens the stored window
//! 4. **Stale tail**: a missing tail no longer than the remainder threshold is not fetched
//!
//! Row values are deterministic, so every answer is compared with what the database holds.

use pretty_assertions::assert_eq;
use ts_semantic_cache::codec::CacheEntry;
use ts_semantic_cache::testing::util::influx_cache;
use ts_semantic_cache::testing::util::influx_window;
use ts_semantic_cache::testing::util::timestamps;
use ts_semantic_cache::testing::util::usage_user;
use ts_semantic_cache::testing::util::HOUR;
use ts_semantic_cache::testing::util::MINUTE;
use ts_semantic_cache::testing::util::T0;
use ts_semantic_cache::CacheConfig;
use ts_semantic_cache::HitKind;
use ts_semantic_cache::TimeRange;
use ts_semantic_cache::Value;

fn mean_host_3(start: i64, end: i64) -> String {
    format!(
        "SELECT mean(usage_user) FROM cpu WHERE hostname = 'host_3' AND {} GROUP BY time(1m)",
        influx_window(start, end)
    )
}

fn minutes(start: i64, end: i64) -> Vec<i64> {
    (start..end).step_by(MINUTE as usize).collect()
}

#[tokio::test]
async fn test_miss_writes_one_record() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(4, CacheConfig::new("miss")).await;

    let q = mean_host_3(T0, T0 + HOUR);
    let out = cache.query(&q).await?;

    assert_eq!(out.hit_kind, HitKind::Miss);
    assert!(out.complete);
    assert_eq!(db.query_count().await, 1);
    assert_eq!(store.sets().await, 1);

    let series = &out.result.series[0];
    assert_eq!(series.columns, vec!["time", "mean"]);
    assert!(series.tags.is_empty());
    assert_eq!(timestamps(&out.result, 0), minutes(T0, T0 + HOUR));
    assert_eq!(series.rows[5], vec![
        Value::Int64(T0 + 5 * MINUTE),
        Value::Float64(usage_user(3, T0 + 5 * MINUTE) as f64),
    ]);

    let segment = cache.segment(&q).await?;
    assert_eq!(
        segment.key(),
        "{(cpu.hostname=host_3)}#{usage_user[int64]}#{empty}#{mean,1m}"
    );

    let raw = store.raw(&segment.key()).await.expect("entry is written");
    assert_eq!(raw.range, TimeRange::new(T0, T0 + HOUR));

    let entry = CacheEntry::decode(&raw.value)?;
    assert_eq!(entry.records.len(), 1);
    assert_eq!(entry.records[0].key, segment.sub_keys()[0]);
    assert_eq!(entry.records[0].range, Some(TimeRange::new(T0, T0 + HOUR)));
    // 60 rows of timestamp and one float.
    assert_eq!(entry.records[0].rows.len(), 60 * 16);

    Ok(())
}

#[tokio::test]
async fn test_full_hit_on_sub_range() -> anyhow::Result<()> {
    let (cache, _store, db) = influx_cache(4, CacheConfig::new("full-hit")).await;

    let whole = cache.query(&mean_host_3(T0, T0 + HOUR)).await?;
    let out = cache.query(&mean_host_3(T0, T0 + HOUR / 2)).await?;

    assert_eq!(out.hit_kind, HitKind::Full);
    assert_eq!(db.query_count().await, 1, "no round-trip for a covered window");
    assert_eq!(out.result.series[0].rows, whole.result.series[0].rows[..30].to_vec());

    let out = cache.query(&mean_host_3(T0 + 10 * MINUTE, T0 + 20 * MINUTE)).await?;
    assert_eq!(out.hit_kind, HitKind::Full);
    assert_eq!(timestamps(&out.result, 0), minutes(T0 + 10 * MINUTE, T0 + 20 * MINUTE));

    let stats = cache.stats();
    assert_eq!(stats.queries, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.full_hits, 2);
    Ok(())
}

#[tokio::test]
async fn test_partial_hit_fetches_tail() -> anyhow::Result<()> {
    let (cache, store, db) = influx_cache(4, CacheConfig::new("partial-hit")).await;

    cache.query(&mean_host_3(T0, T0 + HOUR)).await?;

    let q = mean_host_3(T0, T0 + 2 * HOUR);
    let out = cache.query(&q).await?;

    assert_eq!(out.hit_kind, HitKind::Partial);
    assert!(out.complete);

    let statements = db.statements().await;
    assert_eq!(statements.len(), 2);
    assert!(
        statements[1].contains("time >= '2022-01-01T01:00:00Z' AND time < '2022-01-01T02:00:00Z'"),
        "remainder query covers the tail only: {}",
        statements[1]
    );
    assert!(statements[1].contains("'host_3'"));

    assert_eq!(timestamps(&out.result, 0), minutes(T0, T0 + 2 * HOUR));
    let last = T0 + 2 * HOUR - MINUTE;
    assert_eq!(
        out.result.series[0].rows.last(),
        Some(&vec![Value::Int64(last), Value::Float64(usage_user(3, last) as f64)])
    );

    let key = cache.segment(&q).await?.key();
    let raw = store.raw(&key).await.expect("entry is written");
    assert_eq!(raw.range, TimeRange::new(T0, T0 + 2 * HOUR));

    // The widened entry now serves the whole window.
    let again = cache.query(&q).await?;
    assert_eq!(again.hit_kind, HitKind::Full);
    assert_eq!(again.result, out.result);
    assert_eq!(db.query_count().await, 2);

    let stats = cache.stats();
    assert_eq!(stats.partial_hits, 1);
    assert_eq!(stats.remainder_queries, 1);
    Ok(())
}

#[tokio::test]
async fn test_short_tail_is_served_stale() -> anyhow::Result<()> {
    let (cache, _store, db) = influx_cache(4, CacheConfig::new("stale")).await;

    cache.query(&mean_host_3(T0, T0 + HOUR)).await?;

    let out = cache.query(&mean_host_3(T0, T0 + HOUR + MINUTE)).await?;
    assert_eq!(out.hit_kind, HitKind::Full);
    assert_eq!(db.query_count().await, 1, "a 60s tail is not worth a round-trip");
    assert_eq!(timestamps(&out.result, 0), minutes(T0, T0 + HOUR));

    // One second longer and the tail is fetched.
    let out = cache.query(&mean_host_3(T0, T0 + HOUR + MINUTE + 1)).await?;
    assert_eq!(out.hit_kind, HitKind::Partial);
    assert_eq!(db.query_count().await, 2);
    Ok(())
}
