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

use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;

use crate::errors::CodecError;
use crate::row::row_width;
use crate::row::DataType;
use crate::row::Row;
use crate::row::Value;
use crate::row::STRING_WIDTH;

/// Encode `rows` with the column layout `types`.
///
/// `Null` is written as the zero value of its column type.
/// An `int64` value is accepted in a `float64` column.
pub fn encode_rows(rows: &[Row], types: &[DataType]) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(rows.len() * row_width(types));
    encode_rows_into(&mut buf, rows, types)?;
    Ok(buf.freeze())
}

pub fn encode_rows_into(
    buf: &mut BytesMut,
    rows: &[Row],
    types: &[DataType],
) -> Result<(), CodecError> {
    if types.is_empty() {
        return Err(CodecError::EmptyLayout);
    }

    for (i, row) in rows.iter().enumerate() {
        if row.len() != types.len() {
            return Err(CodecError::Arity {
                row: i,
                expected: types.len(),
                found: row.len(),
            });
        }

        for (j, (value, typ)) in row.iter().zip(types).enumerate() {
            encode_value(buf, value, *typ).map_err(|found| CodecError::TypeMismatch {
                row: i,
                column: j,
                expected: *typ,
                found,
            })?;
        }
    }

    Ok(())
}

fn encode_value(buf: &mut BytesMut, value: &Value, typ: DataType) -> Result<(), &'static str> {
    match (typ, value) {
        (DataType::Bool, Value::Bool(v)) => buf.put_u8(*v as u8),
        (DataType::Bool, Value::Null) => buf.put_u8(0),

        (DataType::Int64, Value::Int64(v)) => buf.put_i64_le(*v),
        (DataType::Int64, Value::Null) => buf.put_i64_le(0),

        (DataType::Float64, Value::Float64(v)) => buf.put_f64_le(*v),
        (DataType::Float64, Value::Int64(v)) => buf.put_f64_le(*v as f64),
        (DataType::Float64, Value::Null) => buf.put_f64_le(0.0),

        (DataType::String, Value::String(s)) => put_fixed_str(buf, s),
        (DataType::String, Value::Null) => buf.put_bytes(0, STRING_WIDTH),

        (_, v) => return Err(v.type_name()),
    }
    Ok(())
}

/// Write at most [`STRING_WIDTH`] bytes of `s`, cut at a char boundary, then zero padding.
fn put_fixed_str(buf: &mut BytesMut, s: &str) {
    let mut n = s.len().min(STRING_WIDTH);
    while !s.is_char_boundary(n) {
        n -= 1;
    }
    buf.put_slice(&s.as_bytes()[..n]);
    buf.put_bytes(0, STRING_WIDTH - n);
}

/// Decode a row payload written by [`encode_rows`].
pub fn decode_rows(mut buf: &[u8], types: &[DataType]) -> Result<Vec<Row>, CodecError> {
    let width = row_width(types);
    if width == 0 {
        return Err(CodecError::EmptyLayout);
    }

    if buf.len() % width != 0 {
        return Err(CodecError::RowWidth {
            len: buf.len(),
            width,
        });
    }

    let mut rows = Vec::with_capacity(buf.len() / width);

    while buf.has_remaining() {
        let mut row = Vec::with_capacity(types.len());
        for typ in types {
            let v = match typ {
                DataType::Bool => Value::Bool(buf.get_u8() != 0),
                DataType::Int64 => Value::Int64(buf.get_i64_le()),
                DataType::Float64 => Value::Float64(buf.get_f64_le()),
                DataType::String => {
                    let raw = &buf[..STRING_WIDTH];
                    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
                    let s = String::from_utf8_lossy(&raw[..end]).into_owned();
                    buf.advance(STRING_WIDTH);
                    Value::String(s)
                }
            };
            row.push(v);
        }
        rows.push(row);
    }

    Ok(rows)
}
