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

//! Merging cached rows with freshly fetched rows, and whole cache entries with each other.
//!
//! Every series handled here is strictly ascending by timestamp. Input that is not is rejected
//! with [`MergeInvariantViolation`] instead of producing a non-monotonic result.

use std::cmp::Ordering;

use crate::codec::encode_segment;
use crate::codec::CacheEntry;
use crate::errors::CodecError;
use crate::errors::MergeInvariantViolation;
use crate::row::timestamp;
use crate::row::DataType;
use crate::row::Row;
use crate::time_range::TimeRange;

/// The decoded rows of one tag combination.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSeries {
    /// Sub-segment key.
    pub key: String,

    /// `None` for a known-empty placeholder.
    pub range: Option<TimeRange>,

    /// Rows in stored layout.
    pub rows: Vec<Row>,
}

impl CachedSeries {
    pub fn new(key: impl ToString, range: Option<TimeRange>, rows: Vec<Row>) -> Self {
        CachedSeries {
            key: key.to_string(),
            range,
            rows,
        }
    }

    /// The window this series is known over, given the window of its entry.
    pub fn known_range(&self, entry_range: TimeRange) -> TimeRange {
        self.range.unwrap_or(entry_range)
    }
}

/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntry {
    /// The window the entry was written for.
    pub range: TimeRange,

    /// Sorted by key.
    pub series: Vec<CachedSeries>,
}

impl DecodedEntry {
    pub fn new(range: TimeRange, mut series: Vec<CachedSeries>) -> Self {
        series.sort_by(|a, b| a.key.cmp(&b.key));
        DecodedEntry { range, series }
    }

    pub fn decode(entry: &CacheEntry, range: TimeRange, layout: &[DataType]) -> Result<Self, CodecError> {
        let series = entry
            .records
            .iter()
            .map(|r| Ok(CachedSeries::new(&r.key, r.range, r.decode_rows(layout)?)))
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Self::new(range, series))
    }

    pub fn encode(&self, layout: &[DataType]) -> Result<CacheEntry, CodecError> {
        let records = self
            .series
            .iter()
            .map(|s| encode_segment(&s.key, s.range, &s.rows, layout))
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(CacheEntry::new(records))
    }

    pub fn get(&self, key: &str) -> Option<&CachedSeries> {
        self.series
            .binary_search_by(|s| s.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.series[i])
    }

    /// The same entry over `range`, a window containing the current one.
    pub fn rebased(&self, range: TimeRange) -> DecodedEntry {
        DecodedEntry {
            range,
            series: self
                .series
                .iter()
                .map(|s| rebase(s, self.range, range))
                .collect(),
        }
    }

    /// Insert or replace the series with the same key.
    pub fn upsert(&mut self, series: CachedSeries) {
        match self.series.binary_search_by(|s| s.key.cmp(&series.key)) {
            Ok(i) => self.series[i] = series,
            Err(i) => self.series.insert(i, series),
        }
    }
}

fn ts_at(rows: &[Row], side: &'static str, index: usize) -> Result<i64, MergeInvariantViolation> {
    timestamp(&rows[index]).ok_or(MergeInvariantViolation::MissingTimestamp { side, index })
}

fn check_ascending(rows: &[Row], side: &'static str) -> Result<(), MergeInvariantViolation> {
    let mut prev: Option<i64> = None;
    for index in 0..rows.len() {
        let ts = ts_at(rows, side, index)?;
        if let Some(prev) = prev {
            if ts <= prev {
                return Err(MergeInvariantViolation::Unsorted {
                    side,
                    index,
                    prev,
                    ts,
                });
            }
        }
        prev = Some(ts);
    }
    Ok(())
}

/// Merge the rows of one tag combination.
///
/// Disjoint inputs are concatenated. Overlapping inputs are spliced at the first timestamp of
/// the later one, found by binary search. On a timestamp present in both, the cached row wins.
pub fn merge_series(cached: &[Row], fetched: &[Row]) -> Result<Vec<Row>, MergeInvariantViolation> {
    check_ascending(cached, "cached")?;
    check_ascending(fetched, "fetched")?;

    if cached.is_empty() {
        return Ok(fetched.to_vec());
    }
    if fetched.is_empty() {
        return Ok(cached.to_vec());
    }

    let (c_first, c_last) = (ts_at(cached, "cached", 0)?, ts_at(cached, "cached", cached.len() - 1)?);
    let (f_first, f_last) = (ts_at(fetched, "fetched", 0)?, ts_at(fetched, "fetched", fetched.len() - 1)?);

    if c_last < f_first {
        return Ok([cached, fetched].concat());
    }
    if f_last < c_first {
        return Ok([fetched, cached].concat());
    }

    // Rows before the other side starts are copied as is.
    let c_start = cached.partition_point(|r| timestamp(r).is_some_and(|t| t < f_first));
    let f_start = fetched.partition_point(|r| timestamp(r).is_some_and(|t| t < c_first));

    let mut out = Vec::with_capacity(cached.len() + fetched.len());
    out.extend_from_slice(&cached[..c_start]);
    out.extend_from_slice(&fetched[..f_start]);

    let (mut i, mut j) = (c_start, f_start);
    while i < cached.len() && j < fetched.len() {
        let (a, b) = (ts_at(cached, "cached", i)?, ts_at(fetched, "fetched", j)?);
        match a.cmp(&b) {
            Ordering::Less => {
                out.push(cached[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.push(fetched[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                out.push(cached[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&cached[i..]);
    out.extend_from_slice(&fetched[j..]);

    Ok(out)
}

fn check_keys_sorted(entry: &DecodedEntry, side: &'static str) -> Result<(), MergeInvariantViolation> {
    for w in entry.series.windows(2) {
        if w[0].key >= w[1].key {
            return Err(MergeInvariantViolation::UnsortedCombinations {
                side,
                key: w[1].key.clone(),
            });
        }
    }
    Ok(())
}

/// Express `series` of an entry over `entry_range` as a series of an entry over `merged_range`.
///
/// A placeholder only states emptiness over its own entry window, so it becomes an empty series
/// with an explicit range unless the windows agree.
fn rebase(series: &CachedSeries, entry_range: TimeRange, merged_range: TimeRange) -> CachedSeries {
    let known = series.known_range(entry_range);
    let range = if series.rows.is_empty() && known == merged_range {
        None
    } else {
        Some(known)
    };
    CachedSeries::new(&series.key, range, series.rows.clone())
}

/// Merge two entries of the same semantic segment.
///
/// Returns `None` when the windows are more than `adjacency` seconds apart. Combinations present
/// on one side pass through; combinations on both sides are merged with [`merge_series`], `a`
/// taking precedence.
pub fn merge_entries(
    a: &DecodedEntry,
    b: &DecodedEntry,
    adjacency: i64,
) -> Result<Option<DecodedEntry>, MergeInvariantViolation> {
    if a.range.gap_to(&b.range) > adjacency {
        return Ok(None);
    }

    check_keys_sorted(a, "first")?;
    check_keys_sorted(b, "second")?;

    let range = a.range.hull(&b.range);
    let mut series = Vec::with_capacity(a.series.len().max(b.series.len()));

    let (mut i, mut j) = (0, 0);
    while i < a.series.len() && j < b.series.len() {
        let (x, y) = (&a.series[i], &b.series[j]);
        match x.key.cmp(&y.key) {
            Ordering::Less => {
                series.push(rebase(x, a.range, range));
                i += 1;
            }
            Ordering::Greater => {
                series.push(rebase(y, b.range, range));
                j += 1;
            }
            Ordering::Equal => {
                let rows = merge_series(&x.rows, &y.rows)?;
                let known = x.known_range(a.range).hull(&y.known_range(b.range));
                let merged = CachedSeries::new(&x.key, Some(known), rows);
                series.push(rebase(&merged, range, range));
                i += 1;
                j += 1;
            }
        }
    }
    series.extend(a.series[i..].iter().map(|s| rebase(s, a.range, range)));
    series.extend(b.series[j..].iter().map(|s| rebase(s, b.range, range)));

    Ok(Some(DecodedEntry { range, series }))
}
