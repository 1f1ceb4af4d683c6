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

//! TestDatabase: an in-memory time-series database that evaluates the query shapes the cache
//! issues, in either dialect, and records every statement it receives.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::Mutex;

use crate::dialect::Dialect;
use crate::errors::DatabaseError;
use crate::query::call;
use crate::query::unquote;
use crate::query::CompareOp;
use crate::query::Comparison;
use crate::query::Expr;
use crate::query::ExprKind;
use crate::query::Operand;
use crate::query::ParsedQuery;
use crate::result::QueryResult;
use crate::result::Series;
use crate::row::Row;
use crate::row::Value;
use crate::type_config::Database;

static SHOW_TAG_VALUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^SHOW TAG VALUES FROM "([^"]+)" WITH KEY = "([^"]+)"$"#)
        .expect("show tag values pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub ts: i64,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, Value>,
}

impl Point {
    pub fn new(ts: i64) -> Self {
        Point {
            ts,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct DbState {
    /// Points per metric, in insertion order.
    pub points: BTreeMap<String, Vec<Point>>,

    /// Every statement received, including failed ones.
    pub statements: Vec<String>,

    /// Fail every statement.
    pub failing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TestDatabase<D> {
    pub state: Arc<Mutex<DbState>>,
    dialect: D,
}

/// A result column of a SELECT list.
#[derive(Debug, Clone, PartialEq)]
enum Column {
    Time,
    Tag(String),
    Field(String),
    Aggregate(String, String),
}

impl<D: Dialect> TestDatabase<D> {
    pub fn new() -> Self {
        TestDatabase {
            state: Arc::new(Mutex::new(DbState::default())),
            dialect: D::default(),
        }
    }

    pub async fn insert(&self, metric: &str, point: Point) {
        let mut state = self.state.lock().await;
        state.points.entry(metric.to_string()).or_default().push(point);
    }

    pub async fn set_failing(&self, failing: bool) {
        self.state.lock().await.failing = failing;
    }

    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    pub async fn query_count(&self) -> usize {
        self.state.lock().await.statements.len()
    }

    fn show(&self, state: &DbState, statement: &str) -> Option<QueryResult> {
        let statement = statement.trim();

        if statement.eq_ignore_ascii_case("SHOW TAG KEYS") {
            let series = state
                .points
                .iter()
                .map(|(metric, points)| {
                    let keys = points
                        .iter()
                        .flat_map(|p| p.tags.keys().cloned())
                        .collect::<BTreeSet<_>>();
                    let rows = keys.into_iter().map(|k| vec![Value::String(k)]).collect();
                    Series::new(metric, vec!["tagKey".to_string()]).with_rows(rows)
                })
                .collect();
            return Some(QueryResult::new(series));
        }

        if statement.eq_ignore_ascii_case("SHOW FIELD KEYS") {
            let series = state
                .points
                .iter()
                .map(|(metric, points)| {
                    let mut fields = BTreeMap::new();
                    for p in points {
                        for (k, v) in &p.fields {
                            fields.entry(k.clone()).or_insert_with(|| field_type(v));
                        }
                    }
                    let rows = fields
                        .into_iter()
                        .map(|(k, t)| vec![Value::String(k), Value::String(t.to_string())])
                        .collect();
                    Series::new(metric, vec!["fieldKey".to_string(), "fieldType".to_string()])
                        .with_rows(rows)
                })
                .collect();
            return Some(QueryResult::new(series));
        }

        let caps = SHOW_TAG_VALUES.captures(statement)?;
        let (metric, key) = (&caps[1], &caps[2]);
        let values = state
            .points
            .get(metric)
            .map(|points| {
                points
                    .iter()
                    .filter_map(|p| p.tags.get(key).cloned())
                    .collect::<BTreeSet<_>>()
            })
            .unwrap_or_default();

        let rows = values
            .into_iter()
            .map(|v| vec![Value::String(key.to_string()), Value::String(v)])
            .collect();
        let series = Series::new(metric, vec!["key".to_string(), "value".to_string()]).with_rows(rows);
        Some(QueryResult::new(vec![series]))
    }

    fn evaluate(&self, state: &DbState, parsed: &ParsedQuery) -> Result<QueryResult, DatabaseError> {
        let points = state
            .points
            .get(&parsed.metric)
            .map(|v| v.as_slice())
            .unwrap_or_default();

        let (group_tags, interval) = self.group_by(parsed)?;
        let (columns, names) = self.columns(parsed, points);
        let aggregated = columns.iter().any(|c| matches!(c, Column::Aggregate(..)));
        let lower = lower_bound(&parsed.filter, &self.dialect);

        let mut groups: BTreeMap<BTreeMap<String, String>, Vec<&Point>> = BTreeMap::new();
        for p in points.iter().filter(|p| self.matches(&parsed.filter, p)) {
            let key = group_tags
                .iter()
                .filter_map(|k| p.tags.get(k).map(|v| (k.clone(), v.clone())))
                .collect();
            groups.entry(key).or_default().push(p);
        }

        let mut series = vec![];
        for (tags, mut points) in groups {
            points.sort_by_key(|p| p.ts);

            let rows = if aggregated {
                let mut buckets: BTreeMap<i64, Vec<&Point>> = BTreeMap::new();
                for p in points {
                    let bucket = match interval {
                        Some(i) => p.ts - p.ts.rem_euclid(i),
                        None => lower.unwrap_or(0),
                    };
                    buckets.entry(bucket).or_default().push(p);
                }
                buckets
                    .into_iter()
                    .map(|(ts, points)| aggregate_row(&columns, ts, &points))
                    .collect::<Vec<_>>()
            } else {
                points.iter().map(|p| plain_row(&columns, p)).collect()
            };

            let mut s = Series::new(&parsed.metric, names.clone()).with_rows(rows);
            s.tags = tags;
            series.push(s);
        }

        Ok(QueryResult::new(series))
    }

    /// GROUP BY tag keys and the bucket width in seconds.
    fn group_by(&self, parsed: &ParsedQuery) -> Result<(Vec<String>, Option<i64>), DatabaseError> {
        let mut tags = vec![];
        let mut interval = None;

        for item in &parsed.group_by {
            let select = match item.parse::<usize>() {
                Ok(n) => parsed.select.get(n.wrapping_sub(1)),
                Err(_) => parsed
                    .select
                    .iter()
                    .find(|s| s.alias.as_deref() == Some(unquote(item))),
            };
            let expr = select.map_or(item.as_str(), |s| s.expr.as_str());

            if let Some(width) = self.dialect.time_bucket(expr) {
                let secs = interval_secs(&width)
                    .ok_or_else(|| DatabaseError::new(format!("invalid interval {}", width)))?;
                interval = Some(secs);
                continue;
            }

            let name = unquote(expr);
            if !name.eq_ignore_ascii_case("time") {
                tags.push(name.to_string());
            }
        }

        Ok((tags, interval))
    }

    fn columns(&self, parsed: &ParsedQuery, points: &[Point]) -> (Vec<Column>, Vec<String>) {
        let mut columns = vec![];
        let mut names = vec![];

        if self.dialect.implicit_time_column() {
            columns.push(Column::Time);
            names.push("time".to_string());
        }

        let all_fields = points
            .iter()
            .flat_map(|p| p.fields.keys().cloned())
            .collect::<BTreeSet<_>>();
        let is_tag = |name: &str| points.iter().any(|p| p.tags.contains_key(name));

        for item in &parsed.select {
            let expr = item.expr.as_str();
            let alias = item.alias.clone();

            if self.dialect.time_bucket(expr).is_some() || unquote(expr).eq_ignore_ascii_case("time") {
                if !self.dialect.implicit_time_column() {
                    columns.push(Column::Time);
                    names.push(alias.unwrap_or_else(|| "time".to_string()));
                }
                continue;
            }

            if expr == "*" {
                for f in &all_fields {
                    columns.push(Column::Field(f.clone()));
                    names.push(f.clone());
                }
                continue;
            }

            if let Some((func, args)) = call(expr) {
                let arg = unquote(args);
                if arg == "*" {
                    for f in &all_fields {
                        columns.push(Column::Aggregate(func.clone(), f.clone()));
                        names.push(format!("{}_{}", func, f));
                    }
                } else {
                    columns.push(Column::Aggregate(func.clone(), arg.to_string()));
                    names.push(alias.unwrap_or(func));
                }
                continue;
            }

            let name = unquote(expr).to_string();
            if is_tag(&name) {
                columns.push(Column::Tag(name.clone()));
            } else {
                columns.push(Column::Field(name.clone()));
            }
            names.push(alias.unwrap_or(name));
        }

        (columns, names)
    }

    fn matches(&self, expr: &Expr, p: &Point) -> bool {
        match &expr.kind {
            ExprKind::And(l, r) => self.matches(l, p) && self.matches(r, p),
            ExprKind::Or(l, r) => self.matches(l, p) || self.matches(r, p),
            ExprKind::Leaf(c) => self.compare(c, p),
        }
    }

    fn compare(&self, c: &Comparison, p: &Point) -> bool {
        if c.is_time() {
            let Operand::Str(literal) = &c.rhs else {
                return false;
            };
            return self
                .dialect
                .parse_time(literal)
                .is_some_and(|t| op_holds(c.op, p.ts.cmp(&t)));
        }

        if let Some(tag) = p.tags.get(&c.lhs) {
            return match (&c.op, &c.rhs) {
                (CompareOp::In, Operand::List(items)) => items.contains(tag),
                (op, Operand::Str(s)) => op_holds(*op, tag.as_str().cmp(s.as_str())),
                _ => false,
            };
        }

        let Some(v) = p.fields.get(&c.lhs) else {
            return false;
        };

        match (&c.rhs, v) {
            (Operand::Number(n), v) => {
                let (Ok(n), Some(x)) = (n.parse::<f64>(), v.as_f64()) else {
                    return false;
                };
                x.partial_cmp(&n).is_some_and(|o| op_holds(c.op, o))
            }
            (Operand::Str(s), Value::String(x)) => op_holds(c.op, x.as_str().cmp(s.as_str())),
            (Operand::Bool(b), Value::Bool(x)) => op_holds(c.op, x.cmp(b)),
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl<D: Dialect> Database for TestDatabase<D> {
    async fn query(&self, statement: &str) -> Result<QueryResult, DatabaseError> {
        let mut state = self.state.lock().await;
        state.statements.push(statement.to_string());

        if state.failing {
            return Err(DatabaseError::new("TestDatabase is failing"));
        }

        if let Some(res) = self.show(&state, statement) {
            return Ok(res);
        }

        let parsed = ParsedQuery::parse(statement)
            .map_err(|e| DatabaseError::new(format!("syntax error: {}", e)))?;
        self.evaluate(&state, &parsed)
    }
}

fn op_holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::NotEq => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::LtEq => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::GtEq => ord != Ordering::Less,
        CompareOp::RegexMatch | CompareOp::RegexNotMatch | CompareOp::In => false,
    }
}

fn lower_bound<D: Dialect>(filter: &Expr, dialect: &D) -> Option<i64> {
    filter.leaves().into_iter().find_map(|c| {
        let Operand::Str(literal) = &c.rhs else {
            return None;
        };
        let t = dialect.parse_time(literal)?;
        match c.op {
            CompareOp::GtEq if c.is_time() => Some(t),
            CompareOp::Gt if c.is_time() => Some(t + 1),
            _ => None,
        }
    })
}

fn interval_secs(width: &str) -> Option<i64> {
    let split = width.find(|c: char| !c.is_ascii_digit())?;
    let (n, unit) = width.split_at(split);
    let n = n.parse::<i64>().ok()?;
    let unit = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        "w" => 7 * 86400,
        _ => return None,
    };
    Some(n * unit)
}

fn field_type(v: &Value) -> &'static str {
    match v {
        Value::Int64(_) => "integer",
        Value::Float64(_) => "float",
        Value::Bool(_) => "boolean",
        Value::String(_) | Value::Null => "string",
    }
}

fn plain_row(columns: &[Column], p: &Point) -> Row {
    columns
        .iter()
        .map(|c| match c {
            Column::Time => Value::Int64(p.ts),
            Column::Tag(k) => p.tags.get(k).map_or(Value::Null, |v| Value::String(v.clone())),
            Column::Field(f) | Column::Aggregate(_, f) => p.fields.get(f).cloned().unwrap_or(Value::Null),
        })
        .collect()
}

fn aggregate_row(columns: &[Column], ts: i64, points: &[&Point]) -> Row {
    columns
        .iter()
        .map(|c| match c {
            Column::Time => Value::Int64(ts),
            Column::Tag(k) => points
                .first()
                .and_then(|p| p.tags.get(k))
                .map_or(Value::Null, |v| Value::String(v.clone())),
            Column::Field(f) => points
                .first()
                .and_then(|p| p.fields.get(f).cloned())
                .unwrap_or(Value::Null),
            Column::Aggregate(func, f) => {
                let values = points.iter().filter_map(|p| p.fields.get(f)).collect::<Vec<_>>();
                aggregate(func, &values)
            }
        })
        .collect()
}

fn aggregate(func: &str, values: &[&Value]) -> Value {
    let nums = values.iter().filter_map(|v| v.as_f64()).collect::<Vec<_>>();
    let by_num = |a: &&&Value, b: &&&Value| {
        let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    };

    match func {
        "mean" | "avg" if !nums.is_empty() => Value::Float64(nums.iter().sum::<f64>() / nums.len() as f64),
        "count" => Value::Int64(values.len() as i64),
        "sum" if values.iter().all(|v| matches!(v, Value::Int64(_))) => {
            Value::Int64(values.iter().filter_map(|v| v.as_i64()).sum())
        }
        "sum" => Value::Float64(nums.iter().sum()),
        "max" => values.iter().max_by(by_num).map_or(Value::Null, |v| (*v).clone()),
        "min" => values.iter().min_by(by_num).map_or(Value::Null, |v| (*v).clone()),
        "first" => values.first().map_or(Value::Null, |v| (*v).clone()),
        "last" => values.last().map_or(Value::Null, |v| (*v).clone()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dialect::InfluxQl;
    use crate::dialect::Timescale;

    async fn db<D: Dialect>() -> TestDatabase<D> {
        let db = TestDatabase::<D>::new();
        for ts in [0i64, 30, 60, 90] {
            for (host, base) in [("h1", 0i64), ("h2", 100)] {
                let p = Point::new(ts).tag("hostname", host).field("usage_user", base + ts);
                db.insert("cpu", p).await;
            }
        }
        db
    }

    #[tokio::test]
    async fn test_plain_and_grouped() -> anyhow::Result<()> {
        let db = db::<InfluxQl>().await;

        let res = db
            .query("SELECT usage_user FROM cpu WHERE hostname = 'h2' AND time >= '1970-01-01T00:00:30Z' AND time < '1970-01-01T00:01:30Z'")
            .await?;
        assert_eq!(res.series.len(), 1);
        assert_eq!(res.series[0].rows, vec![
            vec![Value::Int64(30), Value::Int64(130)],
            vec![Value::Int64(60), Value::Int64(160)],
        ]);

        let res = db
            .query("SELECT max(usage_user) FROM cpu WHERE time >= '1970-01-01T00:00:00Z' AND time < '1970-01-01T00:02:00Z' GROUP BY hostname,time(1m)")
            .await?;
        assert_eq!(res.series.len(), 2);
        assert_eq!(res.series[1].tags.get("hostname").map(|s| s.as_str()), Some("h2"));
        assert_eq!(res.series[1].rows, vec![
            vec![Value::Int64(0), Value::Int64(130)],
            vec![Value::Int64(60), Value::Int64(190)],
        ]);

        assert_eq!(db.query_count().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_timescale_bucket() -> anyhow::Result<()> {
        let db = db::<Timescale>().await;

        let res = db
            .query("SELECT time_bucket('1 minute', time) AS minute, hostname, avg(usage_user) FROM cpu WHERE hostname IN ('h1') AND time >= '1970-01-01 00:00:00 +0000' AND time < '1970-01-01 00:02:00 +0000' GROUP BY hostname, minute ORDER BY hostname, minute")
            .await?;
        assert_eq!(res.series[0].columns, vec!["minute", "hostname", "avg"]);
        assert_eq!(res.series[0].rows, vec![
            vec![Value::Int64(0), Value::from("h1"), Value::Float64(15.0)],
            vec![Value::Int64(60), Value::from("h1"), Value::Float64(75.0)],
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn test_show_and_failure() -> anyhow::Result<()> {
        let db = db::<InfluxQl>().await;

        let res = db.query(r#"SHOW TAG VALUES FROM "cpu" WITH KEY = "hostname""#).await?;
        assert_eq!(res.series[0].rows.len(), 2);

        db.set_failing(true).await;
        assert!(db.query("SHOW TAG KEYS").await.is_err());
        assert_eq!(db.statements().await.len(), 2);
        Ok(())
    }
}
