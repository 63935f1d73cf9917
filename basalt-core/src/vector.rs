// Copyright 2025 Sushanth (https://github.com/sushanthpy)
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

//! The "packed" column-vector codec.
//!
//! The segment engine treats column payloads as opaque byte buffers; this
//! module is the built-in codec that produces and consumes them. Layout
//! (big-endian):
//!
//! ```text
//! i32 count | u64 validity words... | payload
//! ```
//!
//! The validity bitmap carries one bit per row (bit set = non-null). Nulls
//! occupy no payload bytes. Int/Long/Double payloads are fixed-width;
//! String/Bitmap payloads are `u32` length-prefixed.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::column::ColumnType;
use crate::error::{BasaltError, Result};
use crate::value::IngestValue;
use crate::wire;

/// One bit per row, `u64` words, bit set = value present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidityBitmap {
    bits: Vec<u64>,
    len: usize,
}

impl ValidityBitmap {
    pub fn with_len(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn from_words(words: Vec<u64>, len: usize) -> Self {
        debug_assert!(words.len() == len.div_ceil(64));
        Self { bits: words, len }
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        idx < self.len && (self.bits[idx / 64] >> (idx % 64)) & 1 == 1
    }

    #[inline]
    pub fn set_valid(&mut self, idx: usize) {
        if idx < self.len {
            self.bits[idx / 64] |= 1 << (idx % 64);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.bits
    }
}

/// Encoder/decoder for packed column vectors.
pub struct ValueVector;

impl ValueVector {
    /// Encode `values` as one packed vector of `column_type`. Every non-null
    /// value must match the column type.
    pub fn encode(column_type: ColumnType, values: &[IngestValue]) -> Result<Vec<u8>> {
        let mut bitmap = ValidityBitmap::with_len(values.len());
        for (idx, value) in values.iter().enumerate() {
            if !value.is_null() {
                if value.column_type() != Some(column_type) {
                    return Err(BasaltError::InvalidRow(format!(
                        "value {value} does not match column type {column_type}"
                    )));
                }
                bitmap.set_valid(idx);
            }
        }

        let mut buf = Vec::with_capacity(4 + bitmap.words().len() * 8 + values.len() * 8);
        buf.write_i32::<BigEndian>(values.len() as i32)
            .expect("vec write");
        for word in bitmap.words() {
            buf.write_u64::<BigEndian>(*word).expect("vec write");
        }

        for value in values {
            match value {
                IngestValue::Null => {}
                IngestValue::Int(v) => buf.write_i32::<BigEndian>(*v).expect("vec write"),
                IngestValue::Long(v) => buf.write_i64::<BigEndian>(*v).expect("vec write"),
                IngestValue::Double(v) => buf.write_f64::<BigEndian>(*v).expect("vec write"),
                IngestValue::Str(v) => {
                    buf.write_u32::<BigEndian>(v.len() as u32).expect("vec write");
                    buf.extend_from_slice(v.as_bytes());
                }
                IngestValue::Bitmap(v) => {
                    buf.write_u32::<BigEndian>(v.len() as u32).expect("vec write");
                    buf.extend_from_slice(v);
                }
            }
        }
        Ok(buf)
    }

    /// Decode one packed vector. Corrupt buffers surface as metadata errors.
    pub fn decode(column_type: ColumnType, bytes: &[u8]) -> Result<Vec<IngestValue>> {
        let mut cursor = Cursor::new(bytes);
        let count = wire::read_len(&mut cursor)?;

        let words_len = count.div_ceil(64);
        if bytes.len() < 4 + words_len * 8 {
            return Err(BasaltError::Metadata("truncated buffer".into()));
        }
        let mut words = vec![0u64; words_len];
        for word in &mut words {
            *word = cursor.read_u64::<BigEndian>().map_err(wire::truncated)?;
        }
        let bitmap = ValidityBitmap::from_words(words, count);

        let mut values = Vec::new();
        for idx in 0..count {
            if !bitmap.is_valid(idx) {
                values.push(IngestValue::Null);
                continue;
            }
            let value = match column_type {
                ColumnType::Int => IngestValue::Int(
                    cursor.read_i32::<BigEndian>().map_err(wire::truncated)?,
                ),
                ColumnType::Long => IngestValue::Long(
                    cursor.read_i64::<BigEndian>().map_err(wire::truncated)?,
                ),
                ColumnType::Double => IngestValue::Double(
                    cursor.read_f64::<BigEndian>().map_err(wire::truncated)?,
                ),
                ColumnType::String => {
                    let len = cursor.read_u32::<BigEndian>().map_err(wire::truncated)? as usize;
                    let raw = wire::take(&mut cursor, len)?;
                    IngestValue::Str(String::from_utf8(raw).map_err(|_| {
                        BasaltError::Metadata("invalid utf-8 in string vector".into())
                    })?)
                }
                ColumnType::Bitmap => {
                    let len = cursor.read_u32::<BigEndian>().map_err(wire::truncated)? as usize;
                    IngestValue::Bitmap(wire::take(&mut cursor, len)?)
                }
            };
            values.push(value);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_fixed_width_with_nulls() {
        let values = vec![
            IngestValue::Int(5),
            IngestValue::Null,
            IngestValue::Int(-3),
            IngestValue::Null,
        ];
        let bytes = ValueVector::encode(ColumnType::Int, &values).unwrap();
        assert_eq!(ValueVector::decode(ColumnType::Int, &bytes).unwrap(), values);
    }

    #[test]
    fn roundtrip_strings_and_bitmaps() {
        let strings = vec![
            IngestValue::Str("Rodney".into()),
            IngestValue::Str("".into()),
            IngestValue::Null,
        ];
        let bytes = ValueVector::encode(ColumnType::String, &strings).unwrap();
        assert_eq!(
            ValueVector::decode(ColumnType::String, &bytes).unwrap(),
            strings
        );

        let bitmaps = vec![IngestValue::Bitmap(vec![0xde, 0xad]), IngestValue::Null];
        let bytes = ValueVector::encode(ColumnType::Bitmap, &bitmaps).unwrap();
        assert_eq!(
            ValueVector::decode(ColumnType::Bitmap, &bytes).unwrap(),
            bitmaps
        );
    }

    #[test]
    fn roundtrip_empty_vector() {
        let bytes = ValueVector::encode(ColumnType::Long, &[]).unwrap();
        assert!(ValueVector::decode(ColumnType::Long, &bytes).unwrap().is_empty());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let err = ValueVector::encode(ColumnType::Int, &[IngestValue::Str("x".into())]);
        assert!(matches!(err, Err(BasaltError::InvalidRow(_))));
    }

    #[test]
    fn truncated_vector_fails_closed() {
        let values = vec![IngestValue::Long(42), IngestValue::Long(43)];
        let mut bytes = ValueVector::encode(ColumnType::Long, &values).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            ValueVector::decode(ColumnType::Long, &bytes),
            Err(BasaltError::Metadata(_))
        ));
    }
}
