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

use std::collections::BTreeMap;

use crate::catalog::TagCatalog;
use crate::dialect::Dialect;
use crate::errors::UnsupportedQuery;
use crate::query::unquote;
use crate::query::Comparison;
use crate::query::Operand;
use crate::query::ParsedQuery;
use crate::query::SelectItem;
use crate::row::DataType;
use crate::row::Row;
use crate::row::Value;
use crate::segment::combine;
use crate::segment::Field;
use crate::segment::SemanticSegment;
use crate::segment::TagCondition;
use crate::segment::EMPTY;
use crate::template::normalize;
use crate::template::QueryTemplate;

/// Where a stored column comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// Column `i` of a result row.
    Column(usize),

    /// The value of a tag of the result series.
    Tag(String),
}

/// The literal-independent part of a query: everything but the time window and the tag values.
///
/// Also fixes the stored row layout: the timestamp, then the embedded tag column if the dialect
/// has one, then the fields in key order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryShape {
    metric: String,
    fields: Vec<Field>,
    predicates: Vec<String>,
    aggregation: String,
    interval: String,

    /// GROUP BY tag keys, sorted.
    group_by: Vec<String>,

    /// Known values of the GROUP BY tags when the shape was built.
    group_by_values: Vec<(String, Vec<String>)>,

    layout: Vec<DataType>,
    sources: Vec<Source>,

    /// Result column names, in result column order.
    columns: Vec<String>,
}

impl QueryShape {
    pub fn build<D: Dialect>(
        parsed: &ParsedQuery,
        template: &QueryTemplate,
        catalog: &TagCatalog,
        dialect: &D,
    ) -> Result<Self, UnsupportedQuery> {
        let metric = parsed.metric.as_str();

        if parsed.limit.is_some() {
            return Err(UnsupportedQuery::new("LIMIT results can not be stitched"));
        }
        if let Some(order) = &parsed.order_by {
            if order.to_ascii_lowercase().contains("desc") {
                return Err(UnsupportedQuery::new("descending order is not supported"));
            }
        }

        let mut b = ShapeBuilder::new(metric, catalog, dialect);
        if dialect.implicit_time_column() {
            b.push_time();
        }
        for (i, item) in parsed.select.iter().enumerate() {
            b.push_item(i, item)?;
        }

        let Some(time_column) = b.time_column else {
            return Err(UnsupportedQuery::new("the timestamp is not selected"));
        };
        if time_column != 0 {
            return Err(UnsupportedQuery::new("the timestamp must be the first column"));
        }

        let (group_by, group_interval) = group_items(parsed, catalog, dialect)?;
        let interval = match (b.interval.take(), group_interval) {
            (Some(a), Some(g)) if a != g => {
                return Err(UnsupportedQuery::new(format!(
                    "time bucket {} selected but {} grouped",
                    a, g
                )))
            }
            (a, g) => a.or(g).unwrap_or_else(|| EMPTY.to_string()),
        };

        if b.star {
            for (name, data_type) in catalog.fields(metric) {
                let col = b.next_column();
                b.push_field(name, data_type, Source::Column(col))?;
            }
            for key in &group_by {
                b.push_field(key, DataType::String, Source::Tag(key.clone()))?;
            }
        }

        if b.fields.is_empty() {
            return Err(UnsupportedQuery::new("no field selected"));
        }

        let group_by_values = group_by
            .iter()
            .map(|k| (k.clone(), catalog.tag_values(metric, k).to_vec()))
            .collect();

        let predicates = template.predicates.iter().map(render_predicate).collect();

        Ok(b.finish(group_by, group_by_values, predicates, interval))
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// Stored row layout.
    pub fn layout(&self) -> &[DataType] {
        &self.layout
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The key with an empty tag combination part, identical for every query of this shape.
    pub fn partial_key(&self) -> String {
        SemanticSegment::new(
            &self.metric,
            vec![],
            self.fields.clone(),
            self.predicates.clone(),
            &self.aggregation,
            &self.interval,
        )
        .partial_key()
    }

    /// The semantic segment of a query of this shape restricted by `conditions`.
    pub fn segment_for(&self, conditions: &[TagCondition]) -> Result<SemanticSegment, UnsupportedQuery> {
        for c in conditions {
            if c.values.len() > 1 && !self.group_by.contains(&c.key) {
                return Err(UnsupportedQuery::new(format!(
                    "{} is pinned to several values but not grouped by",
                    c.key
                )));
            }
        }

        for (key, values) in &self.group_by_values {
            let pinned = conditions.iter().any(|c| &c.key == key);
            if !pinned && values.is_empty() {
                return Err(UnsupportedQuery::new(format!(
                    "no known values of {}.{}",
                    self.metric, key
                )));
            }
        }

        let combinations = combine(&self.metric, conditions, &self.group_by_values);

        Ok(SemanticSegment::new(
            &self.metric,
            combinations,
            self.fields.clone(),
            self.predicates.clone(),
            &self.aggregation,
            &self.interval,
        ))
    }

    /// Rearrange a result row of a series tagged `tags` to the stored layout.
    ///
    /// Returns `None` if the row is narrower than this shape expects.
    pub fn to_layout(&self, row: &Row, tags: &BTreeMap<String, String>) -> Option<Row> {
        self.sources
            .iter()
            .map(|s| match s {
                Source::Column(i) => row.get(*i).cloned(),
                Source::Tag(k) => Some(tags.get(k).map_or(Value::Null, |v| Value::String(v.clone()))),
            })
            .collect()
    }

    /// Rearrange a stored row to result column order.
    pub fn to_result(&self, stored: &Row) -> Row {
        let mut row = vec![Value::Null; self.columns.len()];
        for (source, v) in self.sources.iter().zip(stored.iter()) {
            if let Source::Column(i) = source {
                if let Some(slot) = row.get_mut(*i) {
                    *slot = v.clone();
                }
            }
        }
        row
    }
}

/// Classifies SELECT items into result columns and key fields.
struct ShapeBuilder<'a, D> {
    metric: &'a str,
    catalog: &'a TagCatalog,
    dialect: &'a D,

    columns: Vec<String>,
    time_column: Option<usize>,
    tag_column: Option<(usize, String)>,

    /// Key fields with the stored type and where the value comes from.
    fields: Vec<(Field, DataType, Source)>,

    aggregation: Option<String>,
    plain_fields: bool,
    interval: Option<String>,
    star: bool,
}

impl<'a, D: Dialect> ShapeBuilder<'a, D> {
    fn new(metric: &'a str, catalog: &'a TagCatalog, dialect: &'a D) -> Self {
        ShapeBuilder {
            metric,
            catalog,
            dialect,
            columns: vec![],
            time_column: None,
            tag_column: None,
            fields: vec![],
            aggregation: None,
            plain_fields: false,
            interval: None,
            star: false,
        }
    }

    fn next_column(&mut self) -> usize {
        self.columns.push(String::new());
        self.columns.len() - 1
    }

    fn name_column(&mut self, col: usize, name: impl ToString) {
        self.columns[col] = name.to_string();
    }

    fn push_time(&mut self) {
        let col = self.next_column();
        self.name_column(col, "time");
        self.time_column = Some(col);
    }

    fn push_field(&mut self, name: &str, data_type: DataType, source: Source) -> Result<(), UnsupportedQuery> {
        if self.fields.iter().any(|(f, _, _)| f.name == name) {
            return Err(UnsupportedQuery::new(format!("{} selected twice", name)));
        }

        let stored = if self.aggregation.is_some() && !matches!(source, Source::Tag(_)) {
            DataType::Float64
        } else {
            data_type
        };

        if let Source::Column(col) = source {
            if self.columns[col].is_empty() {
                self.name_column(col, name);
            }
        }
        self.fields.push((Field::new(name, data_type), stored, source));
        Ok(())
    }

    fn field_type(&self, name: &str) -> Result<DataType, UnsupportedQuery> {
        self.catalog
            .field_type(self.metric, name)
            .ok_or_else(|| UnsupportedQuery::new(format!("unknown field {}.{}", self.metric, name)))
    }

    fn push_item(&mut self, i: usize, item: &SelectItem) -> Result<(), UnsupportedQuery> {
        let expr = item.expr.as_str();

        if let Some(interval) = self.dialect.time_bucket(expr) {
            self.interval = Some(interval);
            let col = self.next_column();
            self.name_column(col, item.alias.as_deref().unwrap_or("time"));
            self.time_column.get_or_insert(col);
            return Ok(());
        }

        if unquote(expr).eq_ignore_ascii_case("time") {
            if !self.dialect.implicit_time_column() {
                let col = self.next_column();
                self.name_column(col, item.alias.as_deref().unwrap_or("time"));
                self.time_column.get_or_insert(col);
            }
            return Ok(());
        }

        if expr == "*" {
            if self.aggregation.is_some() {
                return Err(UnsupportedQuery::new("* mixed with aggregates"));
            }
            self.star = true;
            self.plain_fields = true;
            return Ok(());
        }

        if let Some((func, args)) = item.call() {
            return self.push_aggregate(i, item, &func, args);
        }

        let name = unquote(expr);
        if !is_ident(name) {
            return Err(UnsupportedQuery::new(format!("unsupported SELECT item {}", expr)));
        }

        if self.catalog.is_tag(self.metric, name) {
            let col = self.next_column();
            if self.dialect.embeds_tag_column() {
                if self.tag_column.is_some() {
                    return Err(UnsupportedQuery::new("more than one tag column selected"));
                }
                self.name_column(col, item.alias.as_deref().unwrap_or(name));
                self.tag_column = Some((col, name.to_string()));
                return Ok(());
            }
            self.name_column(col, item.alias.as_deref().unwrap_or(name));
            return self.push_field(name, DataType::String, Source::Column(col));
        }

        if self.aggregation.is_some() {
            return Err(UnsupportedQuery::new("plain fields mixed with aggregates"));
        }
        self.plain_fields = true;

        let data_type = self.field_type(name)?;
        let col = self.next_column();
        self.name_column(col, item.alias.as_deref().unwrap_or(name));
        self.push_field(name, data_type, Source::Column(col))
    }

    fn push_aggregate(
        &mut self,
        i: usize,
        item: &SelectItem,
        func: &str,
        args: &str,
    ) -> Result<(), UnsupportedQuery> {
        if self.plain_fields {
            return Err(UnsupportedQuery::new("aggregates mixed with plain fields"));
        }
        match &self.aggregation {
            Some(a) if a != func => {
                return Err(UnsupportedQuery::new(format!(
                    "mixed aggregations {} and {}",
                    a, func
                )))
            }
            _ => self.aggregation = Some(func.to_string()),
        }

        let nth = self.fields.len();
        let arg = unquote(args);

        if arg == "*" {
            for (name, data_type) in self.catalog.fields(self.metric) {
                let col = self.next_column();
                self.name_column(col, format!("{}_{}", func, name));
                self.push_field(name, data_type, Source::Column(col))?;
            }
            return Ok(());
        }

        if !is_ident(arg) {
            return Err(UnsupportedQuery::new(format!(
                "unsupported aggregate argument in item {}: {}",
                i, args
            )));
        }

        let data_type = self.field_type(arg)?;
        let col = self.next_column();
        let name = match &item.alias {
            Some(alias) => alias.clone(),
            None => self.dialect.aggregate_column(func, nth),
        };
        self.name_column(col, name);
        self.push_field(arg, data_type, Source::Column(col))
    }

    fn finish(
        mut self,
        group_by: Vec<String>,
        group_by_values: Vec<(String, Vec<String>)>,
        predicates: Vec<String>,
        interval: String,
    ) -> QueryShape {
        self.fields.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        let mut layout = vec![DataType::Int64];
        let mut sources = vec![Source::Column(self.time_column.unwrap_or(0))];

        if let Some((col, _)) = &self.tag_column {
            layout.push(DataType::String);
            sources.push(Source::Column(*col));
        }

        let mut fields = Vec::with_capacity(self.fields.len());
        for (field, stored, source) in self.fields {
            fields.push(field);
            layout.push(stored);
            sources.push(source);
        }

        QueryShape {
            metric: self.metric.to_string(),
            fields,
            predicates,
            aggregation: self.aggregation.unwrap_or_else(|| EMPTY.to_string()),
            interval,
            group_by,
            group_by_values,
            layout,
            sources,
            columns: self.columns,
        }
    }
}

/// Split GROUP BY items into sorted tag keys and the time bucket interval.
fn group_items<D: Dialect>(
    parsed: &ParsedQuery,
    catalog: &TagCatalog,
    dialect: &D,
) -> Result<(Vec<String>, Option<String>), UnsupportedQuery> {
    let mut tags = vec![];
    let mut interval = None;

    for item in &parsed.group_by {
        // `GROUP BY 1, 2` refers to SELECT items by position.
        let select = match item.parse::<usize>() {
            Ok(n) => parsed.select.get(n.wrapping_sub(1)),
            Err(_) => parsed
                .select
                .iter()
                .find(|s| s.alias.as_deref() == Some(unquote(item))),
        };
        let expr = select.map_or(item.as_str(), |s| s.expr.as_str());

        if let Some(i) = dialect.time_bucket(expr) {
            interval = Some(i);
            continue;
        }

        let name = unquote(expr);
        if name.eq_ignore_ascii_case("time") {
            continue;
        }
        if !catalog.is_tag(&parsed.metric, name) {
            return Err(UnsupportedQuery::new(format!(
                "GROUP BY {} is not a tag of {}",
                name, parsed.metric
            )));
        }
        tags.push(name.to_string());
    }

    tags.sort();
    tags.dedup();
    Ok((tags, interval))
}

/// Render a predicate as `(lhs op rhs[type])`.
fn render_predicate(c: &Comparison) -> String {
    let data_type = match &c.rhs {
        Operand::Str(_) => "string",
        Operand::Bool(_) => "bool",
        Operand::Number(n) if n.contains('.') => "float64",
        Operand::Number(_) => "int64",
        Operand::Ident(_) | Operand::Regex(_) | Operand::List(_) => "string",
    };
    format!("({}[{}])", c, data_type)
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Derive the semantic segment of `query`.
///
/// This is the uncached path of key derivation; see [`TemplateCache`](crate::TemplateCache)
/// for the memoized one.
pub fn build<D: Dialect>(
    query: &str,
    catalog: &TagCatalog,
    dialect: &D,
) -> Result<SemanticSegment, UnsupportedQuery> {
    let parsed = ParsedQuery::parse(query)?;
    let template = normalize(&parsed, catalog, dialect)?;
    let shape = QueryShape::build(&parsed, &template, catalog, dialect)?;
    shape.segment_for(&template.tag_conditions)
}
