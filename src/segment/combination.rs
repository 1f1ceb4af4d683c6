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
use std::fmt;

/// A tag key restricted to one or more values by a query, such as `hostname IN ('a','b')`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TagCondition {
    pub key: String,

    /// Sorted and deduplicated.
    pub values: Vec<String>,
}

impl TagCondition {
    pub fn new(key: impl ToString, values: impl IntoIterator<Item = impl ToString>) -> Self {
        let mut values = values.into_iter().map(|v| v.to_string()).collect::<Vec<_>>();
        values.sort();
        values.dedup();
        TagCondition {
            key: key.to_string(),
            values,
        }
    }
}

/// One concrete assignment of tag values, rendered `metric.k1=v1,k2=v2`, or `metric.*` for all.
///
/// The rendered text is part of the cache key; the assignments are kept alongside to match result
/// series and to build remainder queries. A `\`, `,` or `=` inside a key or value is rendered
/// with a leading `\`, the way the InfluxDB line protocol escapes tag sets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TagCombination {
    text: String,
    assignments: Vec<(String, String)>,
}

impl TagCombination {
    /// Build the combination of `metric` that assigns each key its value, in the given order.
    pub fn new(metric: &str, assignments: Vec<(String, String)>) -> Self {
        if assignments.is_empty() {
            return Self::all(metric);
        }

        TagCombination {
            text: format!("{}.{}", metric, render(&assignments)),
            assignments,
        }
    }

    /// Parse a rendered combination, such as `cpu.hostname=host_1,region=eu`.
    pub fn parse(text: &str) -> Self {
        let body = text.split_once('.').map(|(_, b)| b).unwrap_or(text);

        let assignments = if body == "*" {
            vec![]
        } else {
            split_unescaped(body, ',')
                .iter()
                .filter_map(|kv| match split_unescaped(kv, '=').as_slice() {
                    [k, v] => Some((unescape(k), unescape(v))),
                    _ => None,
                })
                .collect()
        };

        TagCombination {
            text: text.to_string(),
            assignments,
        }
    }

    pub fn all(metric: &str) -> Self {
        TagCombination {
            text: format!("{}.*", metric),
            assignments: vec![],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// `(key, value)` pairs in rendered order. Empty for `metric.*`.
    pub fn assignments(&self) -> &[(String, String)] {
        &self.assignments
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a result series tagged `tags` belongs to this combination.
    ///
    /// A key the series is not tagged with does not exclude it: a query that does not group by a
    /// pinned tag returns an untagged series.
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        self.assignments
            .iter()
            .all(|(k, v)| tags.get(k).map_or(true, |t| t == v))
    }
}

impl fmt::Display for TagCombination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Split `s` at every `sep` not preceded by an escaping `\`. Pieces keep their escapes.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut pieces = vec![];
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == sep => {
                pieces.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&s[start..]);
    pieces
}

/// `k1=v1,k2=v2`, escaped.
fn render(assignments: &[(String, String)]) -> String {
    assignments
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Every assignment of the given keys, in key order then value order.
fn cartesian(groups: &[(&str, &[String])]) -> Vec<Vec<(String, String)>> {
    let mut out = vec![vec![]];

    for (key, values) in groups {
        let mut next = Vec::with_capacity(out.len() * values.len());
        for prefix in &out {
            for v in values.iter() {
                let mut assignment: Vec<(String, String)> = prefix.clone();
                assignment.push((key.to_string(), v.clone()));
                next.push(assignment);
            }
        }
        out = next;
    }

    out
}

/// Build the tag combinations of a query.
///
/// `conditions` are the tag values the query pins; `group_by_values` are the known values of the
/// GROUP BY tags, used for tags no condition pins.
///
/// A pinned assignment `p` and an enumerated assignment `e` are joined as `p,e` when the rendered
/// `p` sorts at or after `,e`, otherwise as `e,p`.
/// This order is part of the cache key and must not change.
pub fn combine(
    metric: &str,
    conditions: &[TagCondition],
    group_by_values: &[(String, Vec<String>)],
) -> Vec<TagCombination> {
    let mut conditions = conditions.iter().collect::<Vec<_>>();
    conditions.sort();

    let pinned_groups = conditions
        .iter()
        .map(|c| (c.key.as_str(), c.values.as_slice()))
        .collect::<Vec<_>>();

    let enumerated_groups = group_by_values
        .iter()
        .filter(|(k, values)| !values.is_empty() && !conditions.iter().any(|c| &c.key == k))
        .map(|(k, values)| (k.as_str(), values.as_slice()))
        .collect::<Vec<_>>();

    let pinned = if pinned_groups.is_empty() {
        vec![]
    } else {
        cartesian(&pinned_groups)
    };

    let enumerated = if enumerated_groups.is_empty() {
        vec![]
    } else {
        cartesian(&enumerated_groups)
    };

    let assignments = match (pinned.is_empty(), enumerated.is_empty()) {
        (true, true) => return vec![TagCombination::all(metric)],
        (false, true) => pinned,
        (true, false) => enumerated,
        (false, false) => {
            let mut joined = Vec::with_capacity(pinned.len() * enumerated.len());
            for p in &pinned {
                for e in &enumerated {
                    let (first, second) = if render(p) >= format!(",{}", render(e)) {
                        (p, e)
                    } else {
                        (e, p)
                    };
                    joined.push(first.iter().chain(second.iter()).cloned().collect());
                }
            }
            joined
        }
    };

    let mut combinations = assignments
        .into_iter()
        .map(|a| TagCombination::new(metric, a))
        .collect::<Vec<_>>();
    combinations.sort();
    combinations.dedup();
    combinations
}
