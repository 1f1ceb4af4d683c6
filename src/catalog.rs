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

use log::debug;
use log::info;

use crate::dialect::Dialect;
use crate::errors::QueryError;
use crate::errors::UnsupportedQuery;
use crate::row::DataType;
use crate::row::Value;
use crate::type_config::Database;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MetricCatalog {
    /// Tag key to its known values, sorted.
    tags: BTreeMap<String, Vec<String>>,
    fields: BTreeMap<String, DataType>,
}

/// Known tag values and field types per metric.
///
/// Loaded once before queries are served and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCatalog {
    metrics: BTreeMap<String, MetricCatalog>,
}

impl TagCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag_values(
        mut self,
        metric: &str,
        key: &str,
        values: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        self.add_tag_values(metric, key, values);
        self
    }

    pub fn with_field(mut self, metric: &str, name: &str, data_type: DataType) -> Self {
        self.metric_mut(metric)
            .fields
            .insert(name.to_string(), data_type);
        self
    }

    fn add_tag_values(
        &mut self,
        metric: &str,
        key: &str,
        values: impl IntoIterator<Item = impl ToString>,
    ) {
        let known = self
            .metric_mut(metric)
            .tags
            .entry(key.to_string())
            .or_default();
        known.extend(values.into_iter().map(|v| v.to_string()));
        known.sort();
        known.dedup();
    }

    fn metric_mut(&mut self, metric: &str) -> &mut MetricCatalog {
        self.metrics.entry(metric.to_string()).or_default()
    }

    pub fn is_tag(&self, metric: &str, key: &str) -> bool {
        self.metrics
            .get(metric)
            .is_some_and(|m| m.tags.contains_key(key))
    }

    /// Known values of a tag, sorted. Empty for an unknown tag.
    pub fn tag_values(&self, metric: &str, key: &str) -> &[String] {
        self.metrics
            .get(metric)
            .and_then(|m| m.tags.get(key))
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    pub fn tag_keys(&self, metric: &str) -> Vec<&str> {
        self.metrics
            .get(metric)
            .map(|m| m.tags.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn field_type(&self, metric: &str, name: &str) -> Option<DataType> {
        self.metrics.get(metric)?.fields.get(name).copied()
    }

    /// Fields of a metric, sorted by name.
    pub fn fields(&self, metric: &str) -> Vec<(&str, DataType)> {
        self.metrics
            .get(metric)
            .map(|m| m.fields.iter().map(|(k, t)| (k.as_str(), *t)).collect())
            .unwrap_or_default()
    }

    /// Load tag keys, tag values and field types with the dialect's catalog statements.
    pub async fn load<D, DB>(dialect: &D, db: &DB) -> Result<Self, QueryError>
    where
        D: Dialect,
        DB: Database + ?Sized,
    {
        let unsupported = || {
            UnsupportedQuery::new(format!("{} has no catalog statements", dialect.name()))
                .context("TagCatalog::load")
        };

        let show_tag_keys = dialect.show_tag_keys().ok_or_else(unsupported)?;
        let show_field_keys = dialect.show_field_keys().ok_or_else(unsupported)?;

        let mut catalog = TagCatalog::new();

        let tag_keys = db
            .query(&show_tag_keys)
            .await
            .map_err(|e| e.context("load tag keys"))?;

        for series in &tag_keys.series {
            for key in series.rows.iter().filter_map(|r| string_at(r, 0)) {
                let stmt = dialect
                    .show_tag_values(&series.name, key)
                    .ok_or_else(unsupported)?;

                let values = db
                    .query(&stmt)
                    .await
                    .map_err(|e| e.context(format!("load values of {}.{}", series.name, key)))?;

                let values = values
                    .series
                    .iter()
                    .flat_map(|s| s.rows.iter())
                    .filter_map(|r| string_at(r, 1))
                    .collect::<Vec<_>>();

                debug!(
                    "TagCatalog::load: {}.{}: {} values",
                    series.name,
                    key,
                    values.len()
                );
                catalog.add_tag_values(&series.name, key, values);
            }
        }

        let field_keys = db
            .query(&show_field_keys)
            .await
            .map_err(|e| e.context("load field keys"))?;

        for series in &field_keys.series {
            for row in &series.rows {
                if let (Some(name), Some(typ)) = (string_at(row, 0), string_at(row, 1)) {
                    catalog = catalog.with_field(&series.name, name, DataType::from_catalog(typ));
                }
            }
        }

        info!(
            "TagCatalog::load: loaded {} metrics with {}",
            catalog.metrics.len(),
            dialect.name()
        );

        Ok(catalog)
    }
}

fn string_at(row: &[Value], i: usize) -> Option<&str> {
    match row.get(i) {
        Some(Value::String(s)) => Some(s.as_str()),
        _ => None,
    }
}
