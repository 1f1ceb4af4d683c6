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
use std::sync::atomic;
use std::sync::Arc;

use futures::future::join_all;
use log::debug;
use log::error;
use log::info;
use log::warn;

use crate::codec::decode_rows;
use crate::codec::encode_rows;
use crate::config::CacheConfig;
use crate::errors::CodecError;
use crate::errors::QueryError;
use crate::errors::UnsupportedQuery;
use crate::merge::merge_entries;
use crate::merge::merge_series;
use crate::merge::CachedSeries;
use crate::merge::DecodedEntry;
use crate::query::ParsedQuery;
use crate::resolver::remainder_query;
use crate::resolver::resolve;
use crate::resolver::Resolution;
use crate::result::QueryResult;
use crate::result::Series;
use crate::row::timestamp;
use crate::row::Row;
use crate::segment::QueryShape;
use crate::segment::SemanticSegment;
use crate::segment::TagCombination;
use crate::state::CacheState;
use crate::stats::CacheStats;
use crate::stats::HitStats;
use crate::store::SegmentStore;
use crate::template::normalize;
use crate::template::QueryTemplate;
use crate::time_range::TimeRange;
use crate::type_config::Database;
use crate::TypeConfig;

/// How a query was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HitKind {
    /// The whole query went to the database.
    Miss = 0,

    /// Part of the result came from the cache, the rest from a remainder query.
    Partial = 1,

    /// The cache alone answered.
    Full = 2,
}

impl HitKind {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub result: QueryResult,
    pub hit_kind: HitKind,

    /// False when a remainder query failed and only cached rows are returned.
    pub complete: bool,
}

impl QueryOutcome {
    fn new(result: QueryResult, hit_kind: HitKind) -> Self {
        QueryOutcome {
            result,
            hit_kind,
            complete: true,
        }
    }
}

/// Everything derived from the query text before the store is consulted.
struct Prepared {
    parsed: ParsedQuery,
    template: QueryTemplate,
    shape: Arc<QueryShape>,
    segment: SemanticSegment,
}

impl Prepared {
    fn range(&self) -> TimeRange {
        self.template.range
    }
}

/// A query result cache in front of a time-series database.
///
/// Results are cached per tag combination under a key derived from the shape of the query, not
/// its time window. A later query of the same shape is answered from the cache as far as the cached
/// windows reach; only the rest is fetched from the database and stitched in.
///
/// ## Sharing
///
/// Key derivation is memoized in a [`CacheState`], which may be shared by several caches.
/// All methods take `&self`; concurrent queries for the same key are not serialized and the last
/// write wins.
///
/// ## Failures
///
/// - A query whose shape is not understood goes to the database uncached.
/// - A cache value that does not decode is treated as a miss and overwritten.
/// - An unavailable store turns the query into an uncached one.
/// - A failed remainder query returns the cached part, marked incomplete.
pub struct Cache<C: TypeConfig> {
    config: CacheConfig,

    state: Arc<CacheState>,

    store: SegmentStore<C::Store>,

    database: C::Database,

    dialect: C::Dialect,

    stats: HitStats,

    /// A process-wide unique identifier for the cache. Used for debugging purposes.
    uniq: u64,
}

impl<C> fmt::Display for Cache<C>
where
    C: TypeConfig,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Cache({})[uniq={}]", self.config.name, self.uniq)
    }
}

impl<C> Cache<C>
where
    C: TypeConfig,
{
    /// Create a cache writing to `stores`, one per shard, and reading through to `database`.
    pub fn new(
        config: CacheConfig,
        state: Arc<CacheState>,
        stores: Vec<C::Store>,
        database: C::Database,
    ) -> Self {
        static UNIQ: atomic::AtomicU64 = atomic::AtomicU64::new(0);
        let uniq = UNIQ.fetch_add(1, atomic::Ordering::SeqCst);

        let cache = Cache {
            config,
            state,
            store: SegmentStore::new(stores),
            database,
            dialect: C::Dialect::default(),
            stats: HitStats::default(),
            uniq,
        };

        info!(
            "{}: created with {:?}, {:?}",
            cache, cache.store, cache.config
        );
        cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<CacheState> {
        &self.state
    }

    pub fn dialect(&self) -> &C::Dialect {
        &self.dialect
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Derive the semantic segment of `query`, through the template cache.
    pub async fn segment(&self, query: &str) -> Result<SemanticSegment, UnsupportedQuery> {
        Ok(self.prepare(query).await?.segment)
    }

    /// Answer `query` from the cache, the database, or both.
    pub async fn query(&self, query: &str) -> Result<QueryOutcome, QueryError> {
        self.stats.query();

        let prepared = match self.prepare(query).await {
            Ok(p) => p,
            Err(e) => {
                info!("{}: not cacheable, query database: {}", self, e);
                return self.uncached(query).await;
            }
        };

        let key = prepared.segment.key();
        let field_list = prepared.segment.field_list();

        let entry = self
            .store
            .get(
                &self.state.shards,
                &field_list,
                &key,
                prepared.range(),
                prepared.shape.layout(),
            )
            .await;

        let entry = match entry {
            Ok(entry) => entry,
            Err(QueryError::Codec(e)) => {
                warn!("{}: undecodable entry {}, treat as miss: {}", self, key, e);
                None
            }
            Err(QueryError::StoreUnavailable(e)) => {
                warn!("{}: store unavailable, query database: {}", self, e);
                return self.uncached(query).await;
            }
            Err(e) => return Err(e),
        };

        let Some(entry) = entry else {
            return self.miss(&prepared, None).await;
        };

        let plan = resolve(
            &prepared.segment,
            &entry,
            prepared.range(),
            self.config.remainder_threshold_secs(),
        );

        match plan.resolution {
            Resolution::FullHit { stale } => {
                debug!(
                    "{}: full hit {} over {}, stale: {}",
                    self,
                    key,
                    prepared.range(),
                    stale
                );
                self.stats.full_hit();
                let result = self.assemble(&prepared, &entry);
                Ok(QueryOutcome::new(result, HitKind::Full))
            }
            Resolution::AllMiss => {
                debug!("{}: nothing usable in {} for {}", self, key, prepared.range());
                self.miss(&prepared, Some(entry)).await
            }
            Resolution::PartialHit { gaps, remainder } => {
                self.partial(&prepared, entry, &gaps, remainder).await
            }
        }
    }

    /// Answer `query` from the database without looking at or writing to the cache.
    pub async fn query_uncached(&self, query: &str) -> Result<QueryResult, QueryError> {
        let result = self
            .database
            .query(query)
            .await
            .map_err(|e| e.context("query_uncached"))?;
        Ok(result)
    }

    /// Answer several queries concurrently.
    ///
    /// Results are in the order of `queries`.
    pub async fn query_batch(&self, queries: &[&str]) -> Vec<Result<QueryOutcome, QueryError>> {
        join_all(queries.iter().map(|q| self.query(q))).await
    }

    async fn prepare(&self, query: &str) -> Result<Prepared, UnsupportedQuery> {
        let catalog = &self.state.catalog;

        let parsed = ParsedQuery::parse(query)?;
        let template = normalize(&parsed, catalog, &self.dialect)?;

        let shape = self
            .state
            .templates
            .get_or_build(&template, || {
                QueryShape::build(&parsed, &template, catalog, &self.dialect)
            })
            .await?;

        let segment = shape.segment_for(&template.tag_conditions)?;

        Ok(Prepared {
            parsed,
            template,
            shape,
            segment,
        })
    }

    async fn uncached(&self, query: &str) -> Result<QueryOutcome, QueryError> {
        self.stats.uncached();
        let result = self.query_uncached(query).await?;
        Ok(QueryOutcome::new(result, HitKind::Miss))
    }

    /// Run the whole query, cache its result and return it.
    ///
    /// `old` is an entry of the same key that could not serve the query; it is merged with the
    /// new one if their windows are adjacent.
    async fn miss(&self, p: &Prepared, old: Option<DecodedEntry>) -> Result<QueryOutcome, QueryError> {
        self.stats.miss();

        let result = self
            .database
            .query(&p.parsed.text)
            .await
            .map_err(|e| e.context(format!("{}: full query", self)))?;

        // A result the entry layout can not hold is served as the database returned it.
        let fresh = match self.entry_from(p, &result, p.range()) {
            Ok(entry) => entry,
            Err(e @ (QueryError::Codec(_) | QueryError::Merge(_))) => {
                warn!("{}: result of {} can not be cached: {}", self, p.segment, e);
                return Ok(QueryOutcome::new(result, HitKind::Miss));
            }
            Err(e) => return Err(e),
        };

        let outcome = QueryOutcome::new(self.assemble(p, &fresh), HitKind::Miss);

        let to_write = match &old {
            None => fresh,
            Some(old) => match merge_entries(old, &fresh, self.config.adjacency_secs()) {
                Ok(Some(merged)) => {
                    debug!(
                        "{}: merged {} with cached {} into {}",
                        self, fresh.range, old.range, merged.range
                    );
                    merged
                }
                Ok(None) => fresh,
                Err(e) => {
                    error!("{}: corrupt entry {}: {}", self, p.segment, e);
                    return Err(e.into());
                }
            },
        };

        self.write(p, &to_write).await;
        Ok(outcome)
    }

    /// Fetch `remainder` for the `gaps` combinations and merge it into `entry`.
    async fn partial(
        &self,
        p: &Prepared,
        entry: DecodedEntry,
        gaps: &[TagCombination],
        remainder: TimeRange,
    ) -> Result<QueryOutcome, QueryError> {
        self.stats.partial_hit();
        self.stats.remainder_query();

        let statement = remainder_query(&p.parsed, &p.template, &self.dialect, gaps, remainder);
        debug!(
            "{}: partial hit, {} of {} combinations miss {}: {}",
            self,
            gaps.len(),
            p.segment.combinations().len(),
            remainder,
            statement
        );

        let fetched = match self.database.query(&statement).await {
            Ok(fetched) => fetched,
            Err(e) => {
                let e = QueryError::RemainderQueryFailed(e).context(&statement);
                warn!("{}: serve cached part only: {}", self, e);
                return Ok(QueryOutcome {
                    result: self.assemble(p, &entry),
                    hit_kind: HitKind::Partial,
                    complete: false,
                });
            }
        };

        let mut updated = entry.rebased(entry.range.hull(&remainder));

        for combination in gaps {
            let key = p.segment.sub_key(combination);
            let rows = match self.rows_for(p, &fetched, combination) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("{}: remainder of {} can not be cached: {}", self, p.segment, e);
                    return Ok(QueryOutcome {
                        result: self.assemble(p, &entry),
                        hit_kind: HitKind::Partial,
                        complete: false,
                    });
                }
            };

            let series = match entry.get(&key) {
                Some(old) if old.known_range(entry.range).gap_to(&remainder) == 0 => {
                    let known = old.known_range(entry.range).hull(&remainder);
                    let rows = merge_series(&old.rows, &rows).map_err(|e| {
                        error!("{}: corrupt series {}: {}", self, key, e);
                        e
                    })?;
                    CachedSeries::new(&key, Some(known), rows)
                }
                // Not adjacent to what is cached: the fetched window replaces it.
                _ => CachedSeries::new(&key, Some(remainder), rows),
            };

            updated.upsert(series);
        }

        // Empty series known over the whole window are stored as placeholders.
        let updated = updated.rebased(updated.range);

        self.write(p, &updated).await;

        Ok(QueryOutcome::new(self.assemble(p, &updated), HitKind::Partial))
    }

    /// Build an entry over `range` from a database result; every combination gets a series.
    fn entry_from(&self, p: &Prepared, result: &QueryResult, range: TimeRange) -> Result<DecodedEntry, QueryError> {
        let mut series = Vec::with_capacity(p.segment.combinations().len());

        for combination in p.segment.combinations() {
            let rows = self.rows_for(p, result, combination)?;
            let range = if rows.is_empty() { None } else { Some(range) };
            series.push(CachedSeries::new(p.segment.sub_key(combination), range, rows));
        }

        Ok(DecodedEntry::new(range, series))
    }

    /// Rows of `result` that belong to `combination`, in stored layout.
    ///
    /// Rows are passed through the codec so they hold exactly what a later read returns.
    /// Fails with [`QueryError::Merge`] if the rows of `combination` repeat a timestamp, as the
    /// untagged series of an ungrouped query over several tag values does.
    fn rows_for(
        &self,
        p: &Prepared,
        result: &QueryResult,
        combination: &TagCombination,
    ) -> Result<Vec<Row>, QueryError> {
        let layout = p.shape.layout();
        let mut rows: Vec<Row> = vec![];

        for s in result.series.iter().filter(|s| combination.matches(&s.tags)) {
            let mut stored = Vec::with_capacity(s.rows.len());
            for (i, row) in s.rows.iter().enumerate() {
                let r = p.shape.to_layout(row, &s.tags).ok_or(CodecError::Arity {
                    row: i,
                    expected: p.shape.columns().len(),
                    found: row.len(),
                })?;
                stored.push(r);
            }

            let stored = decode_rows(&encode_rows(&stored, layout)?, layout)?;
            rows = merge_series(&rows, &stored)?;
        }

        Ok(rows)
    }

    /// The result of a query from the cached rows of `entry`, restricted to the query window.
    fn assemble(&self, p: &Prepared, entry: &DecodedEntry) -> QueryResult {
        let range = p.range();
        let group_by = p.shape.group_by();
        let mut out = vec![];

        for combination in p.segment.combinations() {
            let Some(cached) = entry.get(&p.segment.sub_key(combination)) else {
                continue;
            };

            let rows = cached
                .rows
                .iter()
                .filter(|r| timestamp(r).is_some_and(|t| range.contains_ts(t)))
                .map(|r| p.shape.to_result(r))
                .collect::<Vec<_>>();
            if rows.is_empty() {
                continue;
            }

            let mut series = Series::new(p.shape.metric(), p.shape.columns().to_vec());
            for (k, v) in combination.assignments() {
                if group_by.contains(k) {
                    series = series.with_tag(k, v);
                }
            }
            out.push(series.with_rows(rows));
        }

        QueryResult::new(out)
    }

    /// Write `entry`; a failed write only costs a future miss.
    async fn write(&self, p: &Prepared, entry: &DecodedEntry) {
        let key = p.segment.key();
        let res = self
            .store
            .set(
                &self.state.shards,
                &p.segment.field_list(),
                &key,
                entry,
                p.shape.layout(),
            )
            .await;

        if let Err(e) = res {
            warn!("{}: failed to write {}: {}", self, key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_kind_codes() {
        assert_eq!(HitKind::Miss.as_u8(), 0);
        assert_eq!(HitKind::Partial.as_u8(), 1);
        assert_eq!(HitKind::Full.as_u8(), 2);
        assert!(HitKind::Miss < HitKind::Partial && HitKind::Partial < HitKind::Full);
    }
}
