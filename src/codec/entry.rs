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

use crate::codec::decode_rows;
use crate::codec::encode_rows;
use crate::errors::CodecError;
use crate::row::DataType;
use crate::row::Row;
use crate::time_range::TimeRange;

/// Terminates a framed cache value.
pub const TERMINATOR: &[u8; 2] = b"\r\n";

const FLAG_EMPTY: u8 = 0;
const FLAG_RANGE: u8 = 1;

/// The cached rows of one tag combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Sub-segment key, such as `{(cpu.hostname=host_3)}#{usage_user[int64]}#{empty}#{mean,1m}`.
    pub key: String,

    /// The window the rows were fetched for.
    ///
    /// `None` marks a known-empty placeholder: there are no rows for this combination in the
    /// window of the entry it belongs to.
    pub range: Option<TimeRange>,

    /// Encoded rows, see [`encode_rows`].
    pub rows: Bytes,
}

impl SegmentRecord {
    pub fn new(key: impl ToString, range: TimeRange, rows: Bytes) -> Self {
        SegmentRecord {
            key: key.to_string(),
            range: Some(range),
            rows,
        }
    }

    pub fn placeholder(key: impl ToString) -> Self {
        SegmentRecord {
            key: key.to_string(),
            range: None,
            rows: Bytes::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.range.is_none()
    }

    pub fn decode_rows(&self, types: &[DataType]) -> Result<Vec<Row>, CodecError> {
        decode_rows(&self.rows, types)
    }

    /// Append the framed record to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        if self.key.is_empty() || self.key.contains(' ') {
            return Err(CodecError::InvalidKey {
                key: self.key.clone(),
            });
        }

        buf.put_slice(self.key.as_bytes());
        buf.put_u8(b' ');

        match self.range {
            Some(r) => {
                buf.put_u8(FLAG_RANGE);
                buf.put_i64_le(r.start);
                buf.put_i64_le(r.end);
            }
            None => buf.put_u8(FLAG_EMPTY),
        }

        buf.put_i64_le(self.rows.len() as i64);
        buf.put_slice(&self.rows);
        Ok(())
    }
}

/// Encode `rows` and wrap them in a record for `key`.
///
/// `range` is `None` for a known-empty placeholder, in which case `rows` must be empty.
pub fn encode_segment(
    key: impl ToString,
    range: Option<TimeRange>,
    rows: &[Row],
    types: &[DataType],
) -> Result<SegmentRecord, CodecError> {
    let rows = encode_rows(rows, types)?;
    Ok(SegmentRecord {
        key: key.to_string(),
        range,
        rows,
    })
}

/// Decode one framed record starting at `offset`.
///
/// Returns the record and the offset just past it.
pub fn decode_segment(buf: &Bytes, offset: usize) -> Result<(SegmentRecord, usize), CodecError> {
    let rest = &buf[offset..];
    let sp = rest
        .iter()
        .position(|b| *b == b' ')
        .ok_or(CodecError::MissingSeparator { offset })?;

    if sp == 0 {
        return Err(CodecError::InvalidKey { key: String::new() });
    }

    let key = std::str::from_utf8(&rest[..sp])
        .map_err(|_| CodecError::NonUtf8Key { offset })?
        .to_string();

    let mut pos = offset + sp + 1;

    let flag = take(buf, pos, 1)?[0];
    pos += 1;

    let range = match flag {
        FLAG_EMPTY => None,
        FLAG_RANGE => {
            let mut b = take(buf, pos, 16)?;
            let start = b.get_i64_le();
            let end = b.get_i64_le();
            if start > end {
                return Err(CodecError::ReversedRange {
                    offset: pos,
                    start,
                    end,
                });
            }
            pos += 16;
            Some(TimeRange { start, end })
        }
        flag => {
            return Err(CodecError::InvalidFlag {
                offset: pos - 1,
                flag,
            })
        }
    };

    let len = take(buf, pos, 8)?.get_i64_le();
    if len < 0 {
        return Err(CodecError::InvalidLength { offset: pos, len });
    }
    pos += 8;

    let len = len as usize;
    take(buf, pos, len)?;
    let rows = buf.slice(pos..pos + len);
    pos += len;

    Ok((SegmentRecord { key, range, rows }, pos))
}

fn take(buf: &[u8], offset: usize, n: usize) -> Result<&[u8], CodecError> {
    let remaining = buf.len().saturating_sub(offset);
    if remaining < n {
        return Err(CodecError::Truncated {
            offset,
            needed: n,
            remaining,
        });
    }
    Ok(&buf[offset..offset + n])
}

/// A whole cache value: one record per tag combination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub records: Vec<SegmentRecord>,
}

impl CacheEntry {
    pub fn new(records: Vec<SegmentRecord>) -> Self {
        CacheEntry { records }
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        for record in &self.records {
            record.encode_into(&mut buf)?;
        }
        buf.put_slice(TERMINATOR);
        Ok(buf.freeze())
    }

    /// Decode a framed cache value.
    ///
    /// Record payloads are zero-copy slices of `buf`.
    pub fn decode(buf: &Bytes) -> Result<Self, CodecError> {
        let mut records = vec![];
        let mut offset = 0;

        loop {
            let rest = &buf[offset..];
            if rest == TERMINATOR {
                break;
            }
            if rest.len() < TERMINATOR.len() {
                return Err(CodecError::MissingTerminator);
            }

            let (record, next) = decode_segment(buf, offset)?;
            if next <= offset {
                return Err(CodecError::Stalled { offset });
            }

            records.push(record);
            offset = next;
        }

        Ok(CacheEntry { records })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::row::Value;

    const KEY: &str = "{(cpu.hostname=host_3)}#{usage_user[int64]}#{empty}#{mean,1m}";

    fn layout() -> Vec<DataType> {
        vec![DataType::Int64, DataType::Float64]
    }

    #[test]
    fn test_wire_format() -> anyhow::Result<()> {
        let rows: Vec<Row> = vec![vec![Value::Int64(60), Value::Float64(2.5)]];
        let record = encode_segment(KEY, Some(TimeRange::new(0, 120)), &rows, &layout())?;

        let buf = CacheEntry::new(vec![record]).encode()?;

        let mut want = vec![];
        want.extend_from_slice(KEY.as_bytes());
        want.push(b' ');
        want.push(1);
        want.extend_from_slice(&0i64.to_le_bytes());
        want.extend_from_slice(&120i64.to_le_bytes());
        want.extend_from_slice(&16i64.to_le_bytes());
        want.extend_from_slice(&60i64.to_le_bytes());
        want.extend_from_slice(&2.5f64.to_le_bytes());
        want.extend_from_slice(b"\r\n");

        assert_eq!(buf.to_vec(), want);
        Ok(())
    }

    #[test]
    fn test_placeholder_wire_format() -> anyhow::Result<()> {
        let buf = CacheEntry::new(vec![SegmentRecord::placeholder("{(cpu.*)}#{a[bool]}#{empty}#{empty,empty}")])
            .encode()?;

        let mut want = b"{(cpu.*)}#{a[bool]}#{empty}#{empty,empty} ".to_vec();
        want.extend_from_slice(&[0u8; 9]);
        want.extend_from_slice(b"\r\n");
        assert_eq!(buf.to_vec(), want);
        Ok(())
    }

    #[test]
    fn test_entry_round_trip() -> anyhow::Result<()> {
        let rows: Vec<Row> = vec![
            vec![Value::Int64(60), Value::Float64(2.5)],
            vec![Value::Int64(120), Value::Float64(3.5)],
        ];
        let entry = CacheEntry::new(vec![
            encode_segment("{(cpu.hostname=host_1)}#x", Some(TimeRange::new(0, 180)), &rows, &layout())?,
            SegmentRecord::placeholder("{(cpu.hostname=host_2)}#x"),
        ]);

        let buf = entry.encode()?;
        let got = CacheEntry::decode(&buf)?;
        assert_eq!(got, entry);
        assert_eq!(got.records[0].decode_rows(&layout())?, rows);
        assert!(got.records[1].is_placeholder());
        Ok(())
    }

    #[test]
    fn test_empty_entry() -> anyhow::Result<()> {
        let buf = CacheEntry::default().encode()?;
        assert_eq!(buf.as_ref(), b"\r\n");
        assert_eq!(CacheEntry::decode(&buf)?, CacheEntry::default());
        Ok(())
    }

    #[test]
    fn test_reject_key_with_space() {
        let err = CacheEntry::new(vec![SegmentRecord::placeholder("a b")])
            .encode()
            .unwrap_err();
        assert_eq!(err, CodecError::InvalidKey {
            key: "a b".to_string()
        });
    }

    #[test]
    fn test_decode_malformed() -> anyhow::Result<()> {
        let rows: Vec<Row> = vec![vec![Value::Int64(60), Value::Float64(2.5)]];
        let entry = CacheEntry::new(vec![encode_segment(KEY, Some(TimeRange::new(0, 120)), &rows, &layout())?]);
        let good = entry.encode()?;

        // No terminator.
        let buf = good.slice(..good.len() - 2);
        assert_eq!(CacheEntry::decode(&buf), Err(CodecError::MissingTerminator));

        // Payload cut short.
        let mut cut = good.slice(..good.len() - 6).to_vec();
        cut.extend_from_slice(b"\r\n");
        let err = CacheEntry::decode(&Bytes::from(cut)).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { needed: 16, .. }), "{:?}", err);

        // Nothing at all.
        assert_eq!(CacheEntry::decode(&Bytes::new()), Err(CodecError::MissingTerminator));

        // Bad flag.
        let mut bad = good.to_vec();
        bad[KEY.len() + 1] = 7;
        let err = CacheEntry::decode(&Bytes::from(bad)).unwrap_err();
        assert_eq!(err, CodecError::InvalidFlag {
            offset: KEY.len() + 1,
            flag: 7
        });

        // Negative length.
        let mut bad = good.to_vec();
        let len_at = KEY.len() + 2 + 16;
        bad[len_at..len_at + 8].copy_from_slice(&(-1i64).to_le_bytes());
        let err = CacheEntry::decode(&Bytes::from(bad)).unwrap_err();
        assert_eq!(err, CodecError::InvalidLength {
            offset: len_at,
            len: -1
        });

        // Window ending before it starts.
        let mut bad = good.to_vec();
        let range_at = KEY.len() + 2;
        bad[range_at..range_at + 8].copy_from_slice(&500i64.to_le_bytes());
        let err = CacheEntry::decode(&Bytes::from(bad)).unwrap_err();
        assert_eq!(err, CodecError::ReversedRange {
            offset: range_at,
            start: 500,
            end: 120
        });

        // Garbage without a key separator.
        let err = CacheEntry::decode(&Bytes::from_static(b"garbage")).unwrap_err();
        assert_eq!(err, CodecError::MissingSeparator { offset: 0 });
        Ok(())
    }

    #[test]
    fn test_row_width_checked_on_rows() -> anyhow::Result<()> {
        let record = SegmentRecord::new(KEY, TimeRange::new(0, 1), Bytes::from_static(&[0u8; 10]));
        let got = CacheEntry::decode(&CacheEntry::new(vec![record]).encode()?)?;
        let err = got.records[0].decode_rows(&layout()).unwrap_err();
        assert_eq!(err, CodecError::RowWidth { len: 10, width: 16 });
        Ok(())
    }
}
