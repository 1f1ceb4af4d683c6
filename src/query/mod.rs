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

//! Clause-level parsing of the restricted query shapes the cache understands:
//!
//! ```text
//! SELECT <items> FROM <metric> WHERE <expr> [GROUP BY <items>] [ORDER BY <items>] [LIMIT <n>]
//! ```
//!
//! Both InfluxQL and the TimescaleDB SQL produced for the same workloads fit this shape.
//! Dialect specific parts, such as time buckets and time literals, are interpreted later by a
//! [`Dialect`](crate::Dialect).

mod expr;

use std::sync::LazyLock;

pub use expr::parse_expr;
pub use expr::CompareOp;
pub use expr::Comparison;
pub use expr::Expr;
pub use expr::ExprKind;
pub use expr::Operand;
pub use expr::Span;
use regex::Regex;

use crate::errors::UnsupportedQuery;

static CLAUSES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*SELECT\s+(?P<select>.+?)\s+FROM\s+(?P<from>.+?)(?:\s+WHERE\s+(?P<where>.+?))?(?:\s+GROUP\s+BY\s+(?P<group>.+?))?(?:\s+ORDER\s+BY\s+(?P<order>.+?))?(?:\s+LIMIT\s+(?P<limit>\d+))?\s*;?\s*$",
    )
    .expect("clause pattern is valid")
});

static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)$").expect("call pattern is valid")
});

static ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^(.+?)\s+AS\s+("[^"]+"|[A-Za-z_][A-Za-z0-9_]*)$"#)
        .expect("alias pattern is valid")
});

/// One item of a SELECT list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    /// The expression text, trimmed, without alias.
    pub expr: String,
    pub alias: Option<String>,
}

impl SelectItem {
    fn parse(item: &str) -> Self {
        let item = item.trim();
        match ALIAS.captures(item) {
            Some(c) => SelectItem {
                expr: c[1].trim().to_string(),
                alias: Some(unquote(&c[2]).to_string()),
            },
            None => SelectItem {
                expr: item.to_string(),
                alias: None,
            },
        }
    }

    /// Split `f(args)` into the lower-cased function name and the raw argument text.
    pub fn call(&self) -> Option<(String, &str)> {
        call(&self.expr)
    }
}

/// Split `f(args)` into the lower-cased function name and the raw argument text.
pub fn call(expr: &str) -> Option<(String, &str)> {
    let c = CALL.captures(expr.trim())?;
    let name = c.get(1)?.as_str().to_ascii_lowercase();
    let args = c.get(2)?.as_str();
    Some((name, args))
}

/// Remove one level of double quotes around an identifier.
pub fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Split `s` on `sep` where it is not nested in parentheses or quotes.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, c) if c == sep && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    let last = s[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// A query split into the clauses the cache works with.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub text: String,

    pub select: Vec<SelectItem>,

    /// Metric name with quotes and retention policy or schema prefix removed.
    pub metric: String,

    pub filter: Expr,

    /// Span of the WHERE expression in `text`.
    pub where_span: Span,

    /// GROUP BY items as written.
    pub group_by: Vec<String>,

    pub order_by: Option<String>,
    pub limit: Option<u64>,
}

impl ParsedQuery {
    pub fn parse(text: &str) -> Result<Self, UnsupportedQuery> {
        let caps = CLAUSES
            .captures(text)
            .ok_or_else(|| UnsupportedQuery::new("not a SELECT ... FROM ... query"))?;

        let select = caps
            .name("select")
            .map(|m| split_top_level(m.as_str(), ','))
            .unwrap_or_default();
        if select.iter().any(|s| s.is_empty()) {
            return Err(UnsupportedQuery::new("empty SELECT item"));
        }
        let select = select.into_iter().map(SelectItem::parse).collect();

        let from = caps.name("from").map(|m| m.as_str()).unwrap_or_default();
        let metric = metric_name(from)?;

        let where_m = caps
            .name("where")
            .ok_or_else(|| UnsupportedQuery::new("no WHERE clause"))?;
        let filter = parse_expr(where_m.as_str(), where_m.start())?;

        let group_by = match caps.name("group") {
            Some(m) => group_items(m.as_str()),
            None => vec![],
        };

        let order_by = caps.name("order").map(|m| m.as_str().trim().to_string());
        let limit = match caps.name("limit") {
            Some(m) => Some(m.as_str().parse::<u64>().map_err(|e| {
                UnsupportedQuery::new(format!("invalid LIMIT {:?}: {}", m.as_str(), e))
            })?),
            None => None,
        };

        Ok(ParsedQuery {
            text: text.to_string(),
            select,
            metric,
            filter,
            where_span: where_m.range(),
            group_by,
            order_by,
            limit,
        })
    }

    /// The query text with its WHERE expression replaced by `filter`.
    pub fn with_filter(&self, filter: &str) -> String {
        format!(
            "{}{}{}",
            &self.text[..self.where_span.start],
            filter,
            &self.text[self.where_span.end..]
        )
    }
}

/// Extract the metric from a FROM clause: `"db"."rp"."cpu"` becomes `cpu`.
fn metric_name(from: &str) -> Result<String, UnsupportedQuery> {
    let from = from.trim();
    if from.contains(',') || from.contains(char::is_whitespace) {
        return Err(UnsupportedQuery::new(format!(
            "only a single metric is supported, got {:?}",
            from
        )));
    }

    let cleaned = from.replace('"', "");
    let metric = cleaned.rsplit('.').next().unwrap_or_default();
    if metric.is_empty() {
        return Err(UnsupportedQuery::new("empty FROM clause"));
    }
    Ok(metric.to_string())
}

/// GROUP BY items; an InfluxQL `fill(...)` trailing the list is dropped.
fn group_items(group: &str) -> Vec<String> {
    split_top_level(group, ',')
        .into_iter()
        .map(|item| match item.to_ascii_lowercase().find("fill(") {
            Some(p) => item[..p].trim(),
            None => item,
        })
        .filter(|item| !item.is_empty())
        .map(|s| s.to_string())
        .collect()
}
