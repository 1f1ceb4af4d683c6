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

//! Decides, per tag combination, what a cache entry covers of a requested window.
//!
//! ```text
//! entry:      [---------- record range ----------)
//! request:                  [----------------------------)
//! coverage:                 [------ cached ------)[- gap -)
//! ```

use crate::dialect::Dialect;
use crate::merge::CachedSeries;
use crate::merge::DecodedEntry;
use crate::query::ParsedQuery;
use crate::segment::SemanticSegment;
use crate::segment::TagCombination;
use crate::template::QueryTemplate;
use crate::time_range::TimeRange;

/// What a cache entry holds of one tag combination for a requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Rows are cached for the whole window.
    Covered,

    /// The combination is known to have no rows in the whole window.
    CoveredEmpty,

    /// Part of the window, `range`, has to be fetched.
    ///
    /// `usable` is false when nothing cached for this combination overlaps the window.
    Gap { range: TimeRange, usable: bool },
}

impl Coverage {
    pub fn is_usable(&self) -> bool {
        match self {
            Coverage::Covered | Coverage::CoveredEmpty => true,
            Coverage::Gap { usable, .. } => *usable,
        }
    }
}

/// Coverage of `request` by a record known over `known`.
fn cover(known: TimeRange, request: TimeRange, covered: Coverage) -> Coverage {
    if known.contains(&request) {
        return covered;
    }

    if !known.overlaps(&request) {
        return Coverage::Gap {
            range: request,
            usable: false,
        };
    }

    let range = if known.start <= request.start {
        TimeRange::new(known.end, request.end)
    } else if known.end >= request.end {
        TimeRange::new(request.start, known.start)
    } else {
        // Missing on both sides.
        request
    };

    Coverage::Gap {
        range,
        usable: true,
    }
}

/// Coverage of `request` for a combination stored as `series` in an entry over `entry_range`.
pub fn coverage(series: Option<&CachedSeries>, entry_range: TimeRange, request: TimeRange) -> Coverage {
    match series {
        None => Coverage::Gap {
            range: request,
            usable: false,
        },
        Some(s) => match s.range {
            Some(r) => cover(r, request, Coverage::Covered),
            None => cover(entry_range, request, Coverage::CoveredEmpty),
        },
    }
}

/// The decision for a whole query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Serve from the cache alone.
    ///
    /// `stale` is set when gaps exist but their hull is within the remainder threshold.
    FullHit { stale: bool },

    /// Fetch `remainder` for the gap combinations, then merge.
    PartialHit {
        gaps: Vec<TagCombination>,
        remainder: TimeRange,
    },

    /// Nothing cached is usable; run the whole query.
    AllMiss,
}

/// Per combination coverage of a query and the resolution derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// In combination order of the segment.
    pub coverages: Vec<(TagCombination, Coverage)>,
    pub resolution: Resolution,
}

impl Plan {
    pub fn coverage_of(&self, combination: &TagCombination) -> Option<Coverage> {
        self.coverages
            .iter()
            .find(|(c, _)| c == combination)
            .map(|(_, cov)| *cov)
    }
}

/// Resolve a query of `segment` over `request` against `entry`.
///
/// A remainder whose window spans at most `threshold` seconds is not worth a round-trip: the
/// query is served as a full hit.
pub fn resolve(segment: &SemanticSegment, entry: &DecodedEntry, request: TimeRange, threshold: i64) -> Plan {
    let coverages = segment
        .combinations()
        .iter()
        .map(|c| {
            let cov = coverage(entry.get(&segment.sub_key(c)), entry.range, request);
            (c.clone(), cov)
        })
        .collect::<Vec<_>>();

    let mut gaps = vec![];
    let mut remainder: Option<TimeRange> = None;
    for (c, cov) in &coverages {
        if let Coverage::Gap { range, .. } = cov {
            gaps.push(c.clone());
            remainder = Some(remainder.map_or(*range, |r| r.hull(range)));
        }
    }

    let resolution = match remainder {
        None => Resolution::FullHit { stale: false },
        Some(_) if !coverages.iter().any(|(_, cov)| cov.is_usable()) => Resolution::AllMiss,
        Some(r) if r.span() <= threshold => Resolution::FullHit { stale: true },
        Some(remainder) => Resolution::PartialHit { gaps, remainder },
    };

    Plan {
        coverages,
        resolution,
    }
}

/// The query fetching `range` of the `gaps` combinations only.
///
/// Conditions other than tag restrictions and time bounds are kept as written.
pub fn remainder_query<D: Dialect>(
    parsed: &ParsedQuery,
    template: &QueryTemplate,
    dialect: &D,
    gaps: &[TagCombination],
    range: TimeRange,
) -> String {
    let mut conjuncts = template.residual.clone();

    let gaps = gaps.iter().collect::<Vec<_>>();
    if let Some(tags) = dialect.tag_clause(&gaps) {
        conjuncts.push(tags);
    }
    conjuncts.push(dialect.time_clause(range));

    parsed.with_filter(&conjuncts.join(" AND "))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::catalog::TagCatalog;
    use crate::dialect::InfluxQl;
    use crate::dialect::Timescale;
    use crate::row::DataType;
    use crate::row::Value;
    use crate::segment;
    use crate::template::normalize;

    fn r(s: i64, e: i64) -> TimeRange {
        TimeRange::new(s, e)
    }

    #[test]
    fn test_coverage() {
        let rows = vec![vec![Value::Int64(10)]];
        let s = CachedSeries::new("k", Some(r(0, 100)), rows);
        let entry = r(0, 100);

        assert_eq!(coverage(Some(&s), entry, r(10, 90)), Coverage::Covered);
        assert_eq!(coverage(Some(&s), entry, r(0, 100)), Coverage::Covered);
        assert_eq!(coverage(Some(&s), entry, r(50, 200)), Coverage::Gap {
            range: r(100, 200),
            usable: true
        });
        assert_eq!(coverage(Some(&s), entry, r(-50, 50)), Coverage::Gap {
            range: r(-50, 0),
            usable: true
        });
        assert_eq!(coverage(Some(&s), entry, r(-50, 150)), Coverage::Gap {
            range: r(-50, 150),
            usable: true
        });
        assert_eq!(coverage(Some(&s), entry, r(100, 150)), Coverage::Gap {
            range: r(100, 150),
            usable: false
        });
        assert_eq!(coverage(None, entry, r(10, 20)), Coverage::Gap {
            range: r(10, 20),
            usable: false
        });
    }

    #[test]
    fn test_placeholder_coverage() {
        let s = CachedSeries::new("k", None, vec![]);

        assert_eq!(coverage(Some(&s), r(0, 100), r(0, 50)), Coverage::CoveredEmpty);
        assert_eq!(coverage(Some(&s), r(0, 100), r(50, 150)), Coverage::Gap {
            range: r(100, 150),
            usable: true
        });
    }

    fn catalog() -> TagCatalog {
        TagCatalog::new()
            .with_tag_values("cpu", "hostname", ["host_1", "host_2"])
            .with_field("cpu", "usage_user", DataType::Int64)
    }

    fn segment() -> SemanticSegment {
        let q = "SELECT usage_user FROM cpu WHERE time >= '2022-01-01T00:00:00Z' AND time < '2022-01-01T01:00:00Z' GROUP BY hostname";
        match segment::build(q, &catalog(), &InfluxQl) {
            Ok(s) => s,
            Err(e) => panic!("{}", e),
        }
    }

    #[test]
    fn test_resolve() {
        let seg = segment();
        let keys = seg.sub_keys();

        let entry = DecodedEntry::new(r(0, 1000), vec![
            CachedSeries::new(&keys[0], Some(r(0, 1000)), vec![]),
            CachedSeries::new(&keys[1], Some(r(0, 500)), vec![]),
        ]);

        assert_eq!(resolve(&seg, &entry, r(0, 400), 60).resolution, Resolution::FullHit {
            stale: false
        });
        assert_eq!(resolve(&seg, &entry, r(0, 540), 60).resolution, Resolution::FullHit {
            stale: true
        });

        let plan = resolve(&seg, &entry, r(100, 900), 60);
        assert_eq!(plan.resolution, Resolution::PartialHit {
            gaps: vec![seg.combinations()[1].clone()],
            remainder: r(500, 900),
        });
        assert_eq!(plan.coverage_of(&seg.combinations()[0]), Some(Coverage::Covered));

        assert_eq!(resolve(&seg, &entry, r(2000, 3000), 60).resolution, Resolution::AllMiss);
    }

    #[test]
    fn test_resolve_missing_combination() {
        let seg = segment();
        let keys = seg.sub_keys();

        let entry = DecodedEntry::new(r(0, 1000), vec![CachedSeries::new(
            &keys[0],
            Some(r(0, 1000)),
            vec![],
        )]);

        let plan = resolve(&seg, &entry, r(0, 1000), 60);
        assert_eq!(plan.resolution, Resolution::PartialHit {
            gaps: vec![seg.combinations()[1].clone()],
            remainder: r(0, 1000),
        });
    }

    #[test]
    fn test_remainder_query() -> anyhow::Result<()> {
        let q = "SELECT usage_user FROM cpu WHERE hostname IN ('host_1','host_2') AND usage_user > 90 AND time >= '2022-01-01 00:00:00 +0000' AND time < '2022-01-01 01:00:00 +0000' GROUP BY hostname ORDER BY time";
        let catalog = catalog();
        let parsed = ParsedQuery::parse(q)?;
        let template = normalize(&parsed, &catalog, &Timescale)?;

        let gaps = vec![TagCombination::parse("cpu.hostname=host_2")];
        let got = remainder_query(&parsed, &template, &Timescale, &gaps, r(1_640_998_800, 1_641_002_400));
        assert_eq!(
            got,
            "SELECT usage_user FROM cpu WHERE usage_user > 90 AND hostname IN ('host_2') AND time >= '2022-01-01 01:00:00 +0000' AND time < '2022-01-01 02:00:00 +0000' GROUP BY hostname ORDER BY time"
        );
        Ok(())
    }

    #[test]
    fn test_remainder_query_all_combination() -> anyhow::Result<()> {
        let q = "SELECT max(usage_user) FROM cpu WHERE time >= '2022-01-01T00:00:00Z' AND time < '2022-01-01T01:00:00Z' GROUP BY time(1m)";
        let catalog = catalog();
        let parsed = ParsedQuery::parse(q)?;
        let template = normalize(&parsed, &catalog, &InfluxQl)?;

        let gaps = vec![TagCombination::all("cpu")];
        let got = remainder_query(&parsed, &template, &InfluxQl, &gaps, r(1_640_998_800, 1_640_998_860));
        assert_eq!(
            got,
            "SELECT max(usage_user) FROM cpu WHERE time >= '2022-01-01T01:00:00Z' AND time < '2022-01-01T01:01:00Z' GROUP BY time(1m)"
        );
        Ok(())
    }
}
