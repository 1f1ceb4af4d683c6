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

use std::sync::LazyLock;

use chrono::DateTime;
use chrono::Utc;
use regex::Regex;

use crate::dialect::compact_interval;
use crate::dialect::Dialect;
use crate::query::call;
use crate::query::split_top_level;

static TIME_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}\s\d{2}:\d{2}:\d{2}(\.\d+)?\s[+-]\d{4}$")
        .expect("time literal pattern is valid")
});

static PLAIN_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("identifier pattern is valid"));

/// SQL for TimescaleDB.
///
/// Results carry the group-by tag as column 1:
///
/// ```text
/// SELECT time_bucket('15 minute', time) AS bucket, hostname, avg(usage_user) FROM cpu
///     WHERE hostname IN ('host_1','host_2')
///     AND time >= '2022-01-01 00:00:00 +0000' AND time < '2022-01-01 01:00:00 +0000'
///     GROUP BY hostname, bucket ORDER BY hostname, bucket
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Timescale;

impl Dialect for Timescale {
    fn name(&self) -> &'static str {
        "timescale"
    }

    fn time_literal(&self) -> &Regex {
        &TIME_LITERAL
    }

    fn parse_time(&self, literal: &str) -> Option<i64> {
        DateTime::parse_from_str(literal, "%Y-%m-%d %H:%M:%S%.f %z")
            .ok()
            .map(|t| t.timestamp())
    }

    fn format_time(&self, ts: i64) -> String {
        match DateTime::<Utc>::from_timestamp(ts, 0) {
            Some(t) => t.format("%Y-%m-%d %H:%M:%S %z").to_string(),
            None => ts.to_string(),
        }
    }

    fn quote_ident(&self, ident: &str) -> String {
        if PLAIN_IDENT.is_match(ident) {
            ident.to_string()
        } else {
            format!("\"{}\"", ident)
        }
    }

    fn escape_literal(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    fn time_bucket(&self, expr: &str) -> Option<String> {
        let (name, args) = call(expr)?;
        if name != "time_bucket" {
            return None;
        }
        let width = split_top_level(args, ',').into_iter().next()?;
        let width = width.trim().trim_matches('\'');
        Some(compact_interval(width))
    }

    fn implicit_time_column(&self) -> bool {
        false
    }

    fn embeds_tag_column(&self) -> bool {
        true
    }

    /// PostgreSQL names every unaliased `avg(..)` column `avg`.
    fn aggregate_column(&self, func: &str, _nth: usize) -> String {
        func.to_string()
    }

    fn tag_values_clause(&self, key: &str, values: &[&str]) -> String {
        let list = values
            .iter()
            .map(|v| format!("'{}'", self.escape_literal(v)))
            .collect::<Vec<_>>();
        format!("{} IN ({})", self.quote_ident(key), list.join(","))
    }
}
