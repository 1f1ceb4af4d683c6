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

//! Query templates: a query with its time literals and tag literals replaced by placeholders.
//!
//! Deriving a [`QueryShape`] is the expensive part of key building, and a workload repeats a small
//! number of shapes with different hosts and time windows. [`TemplateCache`] memoizes shapes by
//! template text.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;

use crate::catalog::TagCatalog;
use crate::dialect::Dialect;
use crate::errors::UnsupportedQuery;
use crate::query::CompareOp;
use crate::query::Comparison;
use crate::query::ExprKind;
use crate::query::Operand;
use crate::query::ParsedQuery;
use crate::query::Span;
use crate::segment::QueryShape;
use crate::segment::TagCondition;
use crate::time_range::TimeRange;

/// Replaces a time literal.
pub const TIME_PLACEHOLDER: &str = "?";

/// Replaces a tag restriction such as `(hostname = 'a' OR hostname = 'b')`.
pub const TAGS_PLACEHOLDER: &str = "$tags";

/// A query with its literals taken out.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTemplate {
    /// The query text with placeholders; the memoization key.
    pub text: String,

    /// The requested window, from the time bounds.
    pub range: TimeRange,

    /// Tag restrictions, sorted by key.
    pub tag_conditions: Vec<TagCondition>,

    /// Comparisons that are neither time bounds nor tag restrictions.
    pub predicates: Vec<Comparison>,

    /// Text of the WHERE conjuncts holding `predicates`, kept verbatim in remainder queries.
    pub residual: Vec<String>,
}

/// Split the WHERE clause of `parsed` into time bounds, tag restrictions and other predicates.
///
/// An identifier is a tag if `catalog` knows it as a tag of the queried metric.
pub fn normalize<D: Dialect>(
    parsed: &ParsedQuery,
    catalog: &TagCatalog,
    dialect: &D,
) -> Result<QueryTemplate, UnsupportedQuery> {
    let is_tag = |key: &str| catalog.is_tag(&parsed.metric, key);

    let mut start: Option<i64> = None;
    let mut end: Option<i64> = None;
    let mut replacements: Vec<(Span, &str)> = vec![];
    let mut tag_conditions: Vec<TagCondition> = vec![];
    let mut predicates = vec![];
    let mut residual = vec![];

    for conjunct in parsed.filter.conjuncts() {
        let leaves = conjunct.leaves();

        if leaves.iter().any(|l| l.is_time()) {
            let ExprKind::Leaf(leaf) = &conjunct.kind else {
                return Err(UnsupportedQuery::new(format!(
                    "time bound combined with other conditions: {}",
                    &parsed.text[conjunct.span.clone()]
                )));
            };

            let (ts, literal_span) = time_bound(leaf, dialect)?;
            let slot = match leaf.op {
                CompareOp::GtEq => (&mut start, ts),
                CompareOp::Gt => (&mut start, ts + 1),
                CompareOp::Lt => (&mut end, ts),
                CompareOp::LtEq => (&mut end, ts + 1),
                op => {
                    return Err(UnsupportedQuery::new(format!(
                        "time compared with '{}'",
                        op
                    )))
                }
            };
            if slot.0.replace(slot.1).is_some() {
                return Err(UnsupportedQuery::new("time bounded twice on the same side"));
            }

            replacements.push((literal_span, TIME_PLACEHOLDER));
            continue;
        }

        let pins = leaves
            .iter()
            .filter(|l| is_tag(&l.lhs) && l.pinned_values().is_some())
            .count();

        if pins == 0 {
            predicates.extend(leaves.into_iter().cloned());
            residual.push(parsed.text[conjunct.span.clone()].to_string());
            continue;
        }

        let key = &leaves[0].lhs;
        if pins != leaves.len() || conjunct.has_and() || leaves.iter().any(|l| &l.lhs != key) {
            return Err(UnsupportedQuery::new(format!(
                "tag equality combined with other conditions: {}",
                &parsed.text[conjunct.span.clone()]
            )));
        }

        if tag_conditions.iter().any(|c| &c.key == key) {
            return Err(UnsupportedQuery::new(format!("tag {} restricted twice", key)));
        }

        let values = leaves.iter().flat_map(|l| l.pinned_values().unwrap_or_default());
        tag_conditions.push(TagCondition::new(key, values));
        replacements.push((conjunct.span.clone(), TAGS_PLACEHOLDER));
    }

    let (Some(start), Some(end)) = (start, end) else {
        return Err(UnsupportedQuery::new(
            "both a lower and an upper time bound are required",
        ));
    };
    if start > end {
        return Err(UnsupportedQuery::new(format!(
            "empty time window [{}, {})",
            start, end
        )));
    }

    tag_conditions.sort();

    replacements.sort_by_key(|(span, _)| span.start);
    let mut text = String::with_capacity(parsed.text.len());
    let mut pos = 0;
    for (span, placeholder) in replacements {
        text.push_str(&parsed.text[pos..span.start]);
        text.push_str(placeholder);
        pos = span.end;
    }
    text.push_str(&parsed.text[pos..]);

    Ok(QueryTemplate {
        text,
        range: TimeRange::new(start, end),
        tag_conditions,
        predicates,
        residual,
    })
}

/// Parse the literal of a time bound and return it with the span of its unquoted text.
fn time_bound<D: Dialect>(leaf: &Comparison, dialect: &D) -> Result<(i64, Span), UnsupportedQuery> {
    let Operand::Str(literal) = &leaf.rhs else {
        return Err(UnsupportedQuery::new(format!(
            "time bound is not a quoted literal: {}",
            leaf
        )));
    };

    if !dialect.time_literal().is_match(literal) {
        return Err(UnsupportedQuery::new(format!(
            "time literal {:?} is not in {} format",
            literal,
            dialect.name()
        )));
    }

    let ts = dialect.parse_time(literal).ok_or_else(|| {
        UnsupportedQuery::new(format!("invalid time literal {:?}", literal))
    })?;

    // The literal is the last token of the leaf: `'...'`.
    let end = leaf.span.end - 1;
    Ok((ts, end - literal.len()..end))
}

/// Memoized query shapes, keyed by template text.
///
/// Entries live as long as the cache. Building a shape happens under the lock; it only runs once
/// per distinct template.
#[derive(Debug, Default)]
pub struct TemplateCache {
    shapes: Mutex<HashMap<String, Arc<QueryShape>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shape memoized for `template`, building it with `build` on first sight.
    ///
    /// A failed build is not memoized.
    pub async fn get_or_build<F>(
        &self,
        template: &QueryTemplate,
        build: F,
    ) -> Result<Arc<QueryShape>, UnsupportedQuery>
    where
        F: FnOnce() -> Result<QueryShape, UnsupportedQuery>,
    {
        let mut shapes = self.shapes.lock().await;

        if let Some(shape) = shapes.get(&template.text) {
            return Ok(shape.clone());
        }

        let shape = Arc::new(build()?);
        debug!(
            "TemplateCache: new template {:?}: {}",
            template.text,
            shape.partial_key()
        );
        shapes.insert(template.text.clone(), shape.clone());
        Ok(shape)
    }

    pub async fn len(&self) -> usize {
        self.shapes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
