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

//! Query-language differences between the supported databases.
//!
//! Everything above this module (key derivation, codec, resolver, merger) is dialect agnostic.
//! A [`Dialect`] only answers questions about syntax: how a time literal looks, how a tag
//! restriction or a time window is written, and what a time bucket expression is.

mod influxql;
mod timescale;

use std::fmt;

pub use influxql::InfluxQl;
use regex::Regex;
pub use timescale::Timescale;

use crate::segment::TagCombination;
use crate::time_range::TimeRange;

pub trait Dialect
where
    Self: fmt::Debug,
    Self: Default,
    Self: Send + Sync + 'static,
{
    fn name(&self) -> &'static str;

    /// Pattern of a time literal, without the enclosing quotes.
    fn time_literal(&self) -> &Regex;

    /// Parse a time literal to epoch seconds.
    fn parse_time(&self, literal: &str) -> Option<i64>;

    /// Format epoch seconds as a time literal, without quotes.
    fn format_time(&self, ts: i64) -> String;

    fn quote_ident(&self, ident: &str) -> String;

    /// Escape a value to be embedded in a single-quoted string literal.
    fn escape_literal(&self, value: &str) -> String {
        value.replace('\'', "\\'")
    }

    /// If `expr` is a time bucket expression, return its interval in compact form, such as `15m`.
    fn time_bucket(&self, expr: &str) -> Option<String>;

    /// Whether a result row carries the timestamp in column 0 without it being selected.
    fn implicit_time_column(&self) -> bool;

    /// Whether a result row carries the group-by tag value as column 1.
    fn embeds_tag_column(&self) -> bool;

    /// Result column name of the `nth` aggregate of `func` in a SELECT list, counting from 0.
    fn aggregate_column(&self, func: &str, nth: usize) -> String {
        if nth == 0 {
            func.to_string()
        } else {
            format!("{}_{}", func, nth)
        }
    }

    fn tag_equality(&self, key: &str, value: &str) -> String {
        format!("{} = '{}'", self.quote_ident(key), self.escape_literal(value))
    }

    /// Restrict one tag key to any of `values`.
    fn tag_values_clause(&self, key: &str, values: &[&str]) -> String {
        match values {
            [v] => self.tag_equality(key, v),
            _ => {
                let alts = values
                    .iter()
                    .map(|v| self.tag_equality(key, v))
                    .collect::<Vec<_>>();
                format!("({})", alts.join(" OR "))
            }
        }
    }

    /// Restrict a query to exactly `combinations`.
    ///
    /// Returns `None` when the combinations put no restriction on tags, as for `metric.*`.
    fn tag_clause(&self, combinations: &[&TagCombination]) -> Option<String> {
        if combinations.iter().any(|c| c.assignments().is_empty()) {
            return None;
        }

        let first = combinations.first()?.assignments();
        let single_key = first.len() == 1
            && combinations
                .iter()
                .all(|c| c.assignments().len() == 1 && c.assignments()[0].0 == first[0].0);

        if single_key {
            let values = combinations
                .iter()
                .map(|c| c.assignments()[0].1.as_str())
                .collect::<Vec<_>>();
            return Some(self.tag_values_clause(&first[0].0, &values));
        }

        let alts = combinations
            .iter()
            .map(|c| {
                let eqs = c
                    .assignments()
                    .iter()
                    .map(|(k, v)| self.tag_equality(k, v))
                    .collect::<Vec<_>>();
                format!("({})", eqs.join(" AND "))
            })
            .collect::<Vec<_>>();
        Some(format!("({})", alts.join(" OR ")))
    }

    fn time_clause(&self, range: TimeRange) -> String {
        format!(
            "time >= '{}' AND time < '{}'",
            self.format_time(range.start),
            self.format_time(range.end)
        )
    }

    /// Statement listing tag keys per metric, if the database has one.
    ///
    /// Expected result: one series per metric, one row per key, the key in column 0.
    fn show_tag_keys(&self) -> Option<String> {
        None
    }

    /// Statement listing the values of tag `key` of `metric`.
    ///
    /// Expected result: rows of `[key, value]`.
    fn show_tag_values(&self, _metric: &str, _key: &str) -> Option<String> {
        None
    }

    /// Statement listing field keys and types per metric.
    ///
    /// Expected result: one series per metric, rows of `[field, type]`.
    fn show_field_keys(&self) -> Option<String> {
        None
    }
}

/// Render an interval such as `15 minute` or `1 hours` as `15m` or `1h`.
pub fn compact_interval(interval: &str) -> String {
    let interval = interval.trim();
    let split = interval
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(interval.len());
    let (num, unit) = interval.split_at(split);
    let unit = unit.trim().to_ascii_lowercase();

    let short = match unit.as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => "s",
        "m" | "min" | "mins" | "minute" | "minutes" => "m",
        "h" | "hour" | "hours" => "h",
        "d" | "day" | "days" => "d",
        "w" | "week" | "weeks" => "w",
        _ => return interval.split_whitespace().collect(),
    };

    if num.is_empty() {
        return interval.split_whitespace().collect();
    }
    format!("{}{}", num, short)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_interval() {
        assert_eq!(compact_interval("15 minute"), "15m");
        assert_eq!(compact_interval("1 hours"), "1h");
        assert_eq!(compact_interval("30s"), "30s");
        assert_eq!(compact_interval("1 day"), "1d");
        assert_eq!(compact_interval("5 fortnights"), "5fortnights");
        assert_eq!(compact_interval("minute"), "minute");
    }
}
