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
use chrono::SecondsFormat;
use chrono::Utc;
use regex::Regex;

use crate::dialect::compact_interval;
use crate::dialect::Dialect;
use crate::query::call;

static TIME_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?Z$")
        .expect("time literal pattern is valid")
});

/// InfluxQL, as spoken by InfluxDB 1.x.
///
/// ```text
/// SELECT mean(usage_user) FROM "cpu" WHERE ("hostname" = 'host_1' OR "hostname" = 'host_2')
///     AND time >= '2022-01-01T00:00:00Z' AND time < '2022-01-01T01:00:00Z'
///     GROUP BY "hostname",time(15m)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct InfluxQl;

impl Dialect for InfluxQl {
    fn name(&self) -> &'static str {
        "influxql"
    }

    fn time_literal(&self) -> &Regex {
        &TIME_LITERAL
    }

    fn parse_time(&self, literal: &str) -> Option<i64> {
        DateTime::parse_from_rfc3339(literal)
            .ok()
            .map(|t| t.timestamp())
    }

    fn format_time(&self, ts: i64) -> String {
        match DateTime::<Utc>::from_timestamp(ts, 0) {
            Some(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
            None => ts.to_string(),
        }
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident)
    }

    fn time_bucket(&self, expr: &str) -> Option<String> {
        let (name, args) = call(expr)?;
        if name != "time" {
            return None;
        }
        // time(1m) or time(1m, 30s): the offset does not change the bucket width.
        let width = args.split(',').next()?.trim();
        Some(compact_interval(width))
    }

    fn implicit_time_column(&self) -> bool {
        true
    }

    fn embeds_tag_column(&self) -> bool {
        false
    }

    fn show_tag_keys(&self) -> Option<String> {
        Some("SHOW TAG KEYS".to_string())
    }

    fn show_tag_values(&self, metric: &str, key: &str) -> Option<String> {
        Some(format!(
            "SHOW TAG VALUES FROM {} WITH KEY = {}",
            self.quote_ident(metric),
            self.quote_ident(key)
        ))
    }

    fn show_field_keys(&self) -> Option<String> {
        Some("SHOW FIELD KEYS".to_string())
    }
}
