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

//! Semantic segments: cache keys derived from the shape of a query.
//!
//! ```text
//! {(cpu.hostname=host_1)(cpu.hostname=host_2)}#{usage_user[int64]}#{(usage_idle>90.0[float64])}#{mean,1m}
//!  '---------------- tag combinations -------' '--- fields ---'   '------ predicates ------'  '-aggr,interval-'
//! ```
//!
//! Time bounds are not part of the key. Each tag combination has its own sub-segment key, which
//! addresses one record of a cache entry:
//!
//! ```text
//! {(cpu.hostname=host_1)}#{usage_user[int64]}#{(usage_idle>90.0[float64])}#{mean,1m}
//! ```

mod combination;
mod shape;

use std::fmt;

pub use combination::combine;
pub use combination::TagCombination;
pub use combination::TagCondition;
pub use shape::build;
pub use shape::QueryShape;

use crate::row::DataType;

pub const EMPTY: &str = "empty";

/// A selected field and the type the catalog declares for it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl ToString, data_type: DataType) -> Self {
        Field {
            name: name.to_string(),
            data_type,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.data_type)
    }
}

/// The canonical, time independent cache key of a query.
///
/// Fields, predicates and tag combinations are kept sorted, so queries that only differ in clause
/// order produce the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticSegment {
    metric: String,
    combinations: Vec<TagCombination>,
    fields: Vec<Field>,

    /// Rendered predicates such as `(usage_idle>90.0[float64])`, sorted.
    predicates: Vec<String>,

    aggregation: String,
    interval: String,
}

impl SemanticSegment {
    pub fn new(
        metric: impl ToString,
        mut combinations: Vec<TagCombination>,
        mut fields: Vec<Field>,
        mut predicates: Vec<String>,
        aggregation: impl ToString,
        interval: impl ToString,
    ) -> Self {
        combinations.sort();
        combinations.dedup();
        fields.sort();
        fields.dedup_by(|a, b| a.name == b.name);
        predicates.sort();
        predicates.dedup();

        SemanticSegment {
            metric: metric.to_string(),
            combinations,
            fields,
            predicates,
            aggregation: aggregation.to_string(),
            interval: interval.to_string(),
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn combinations(&self) -> &[TagCombination] {
        &self.combinations
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn aggregation(&self) -> &str {
        &self.aggregation
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    /// `usage_user[int64],usage_system[int64]`: the field part without braces.
    ///
    /// Selects the backing store shard.
    pub fn field_list(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Everything after the tag combinations: `#{fields}#{predicates}#{aggregation,interval}`.
    pub fn partial_key(&self) -> String {
        let predicates = if self.predicates.is_empty() {
            EMPTY.to_string()
        } else {
            self.predicates.concat()
        };

        format!(
            "#{{{}}}#{{{}}}#{{{},{}}}",
            self.field_list(),
            predicates,
            self.aggregation,
            self.interval
        )
    }

    /// The key of the whole segment, addressing a cache entry.
    pub fn key(&self) -> String {
        let combinations = self
            .combinations
            .iter()
            .map(|c| format!("({})", c))
            .collect::<String>();
        format!("{{{}}}{}", combinations, self.partial_key())
    }

    /// The key of one tag combination, addressing one record of a cache entry.
    pub fn sub_key(&self, combination: &TagCombination) -> String {
        format!("{{({})}}{}", combination, self.partial_key())
    }

    /// Sub-segment keys of all combinations, in combination order.
    pub fn sub_keys(&self) -> Vec<String> {
        let partial = self.partial_key();
        self.combinations
            .iter()
            .map(|c| format!("{{({})}}{}", c, partial))
            .collect()
    }
}

impl fmt::Display for SemanticSegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
