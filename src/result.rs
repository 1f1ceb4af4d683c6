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

use crate::row::timestamp;
use crate::row::Row;
use crate::time_range::TimeRange;

/// A named series of rows sharing one set of tag values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub columns: Vec<String>,

    /// Rows in ascending time order; the epoch-second timestamp is column 0.
    pub rows: Vec<Row>,
}

impl Series {
    pub fn new(name: impl ToString, columns: Vec<String>) -> Self {
        Series {
            name: name.to_string(),
            columns,
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, key: impl ToString, value: impl ToString) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }
}

/// The structured result of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub series: Vec<Series>,
}

impl QueryResult {
    pub fn new(series: Vec<Series>) -> Self {
        QueryResult { series }
    }

    /// No series carries a row.
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.rows.is_empty())
    }

    pub fn row_count(&self) -> usize {
        self.series.iter().map(|s| s.rows.len()).sum()
    }

    /// The window spanned by all row timestamps, `[min, max + 1)`.
    pub fn time_range(&self) -> Option<TimeRange> {
        let mut ts = self
            .series
            .iter()
            .flat_map(|s| s.rows.iter())
            .filter_map(timestamp);

        let first = ts.next()?;
        let (min, max) = ts.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        Some(TimeRange::new(min, max + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Value;

    #[test]
    fn test_time_range() {
        let empty = QueryResult::new(vec![Series::new("cpu", vec!["time".to_string()])]);
        assert!(empty.is_empty());
        assert_eq!(empty.time_range(), None);

        let res = QueryResult::new(vec![
            Series::new("cpu", vec![]).with_rows(vec![vec![Value::Int64(60)], vec![Value::Int64(120)]]),
            Series::new("cpu", vec![]).with_rows(vec![vec![Value::Int64(30)]]),
        ]);
        assert!(!res.is_empty());
        assert_eq!(res.row_count(), 3);
        assert_eq!(res.time_range(), Some(TimeRange::new(30, 121)));
    }
}
