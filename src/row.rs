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

use std::fmt;

/// Width in bytes of a stored `string` value. Longer strings are truncated.
pub const STRING_WIDTH: usize = 32;

/// Scalar type of one column of a cached row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Int64,
    Float64,
    Bool,
    String,
}

impl DataType {
    /// Fixed number of bytes a value of this type occupies in a row.
    pub fn width(&self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::Int64 | DataType::Float64 => 8,
            DataType::String => STRING_WIDTH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::Bool => "bool",
            DataType::String => "string",
        }
    }

    /// Map a catalog type name to a column type.
    ///
    /// Accepts both the canonical names and the InfluxDB `SHOW FIELD KEYS` names.
    /// Anything unrecognized is stored as a string.
    pub fn from_catalog(name: &str) -> DataType {
        match name.to_ascii_lowercase().as_str() {
            "float" | "float64" | "double precision" | "double" | "real" => DataType::Float64,
            "integer" | "int64" | "bigint" | "int" => DataType::Int64,
            "boolean" | "bool" => DataType::Bool,
            _ => DataType::String,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Total byte width of a row with the given column types.
pub fn row_width(types: &[DataType]) -> usize {
    types.iter().map(|t| t.width()).sum()
}

/// One scalar of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Bool(bool),
    String(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value, widening an int64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// A result row: the timestamp in column 0, followed by the remaining columns.
pub type Row = Vec<Value>;

/// The timestamp of a row, if column 0 holds one.
pub fn timestamp(row: &Row) -> Option<i64> {
    row.first().and_then(Value::as_i64)
}
