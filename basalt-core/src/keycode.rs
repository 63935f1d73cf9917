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

//! Order-preserving key encoding.
//!
//! Encoded keys compare bytewise in the same order as their typed values, so
//! chunks, digests and the memtable can work on raw bytes throughout:
//!
//! - `Int`/`Long`: big-endian with the sign bit flipped,
//! - `Double`: IEEE-754 total order (flip all bits for negatives, flip the
//!   sign bit for positives),
//! - `String`: raw UTF-8 bytes.
//!
//! Bitmap columns cannot key a segment.

use crate::column::ColumnType;
use crate::error::{BasaltError, Result};
use crate::value::IngestValue;

/// Encode a key value for the given key column type.
pub fn encode_key(value: &IngestValue, key_type: ColumnType) -> Result<Vec<u8>> {
    match (key_type, value) {
        (ColumnType::Int, IngestValue::Int(v)) => {
            Ok(((*v as u32) ^ 0x8000_0000).to_be_bytes().to_vec())
        }
        (ColumnType::Long, IngestValue::Long(v)) => {
            Ok(((*v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes().to_vec())
        }
        (ColumnType::Double, IngestValue::Double(v)) => {
            let bits = v.to_bits();
            let ordered = if bits & 0x8000_0000_0000_0000 != 0 {
                !bits
            } else {
                bits ^ 0x8000_0000_0000_0000
            };
            Ok(ordered.to_be_bytes().to_vec())
        }
        (ColumnType::String, IngestValue::Str(v)) => Ok(v.as_bytes().to_vec()),
        (ColumnType::Bitmap, _) => Err(BasaltError::InvalidRow(
            "bitmap columns cannot key a segment".into(),
        )),
        (_, IngestValue::Null) => Err(BasaltError::InvalidRow("null key value".into())),
        (expected, got) => Err(BasaltError::InvalidRow(format!(
            "key value {got} does not match key column type {expected}"
        ))),
    }
}

/// Decode an encoded key back into its typed value.
pub fn decode_key(bytes: &[u8], key_type: ColumnType) -> Result<IngestValue> {
    match key_type {
        ColumnType::Int => {
            let raw: [u8; 4] = bytes
                .try_into()
                .map_err(|_| BasaltError::Metadata("int key must be 4 bytes".into()))?;
            Ok(IngestValue::Int((u32::from_be_bytes(raw) ^ 0x8000_0000) as i32))
        }
        ColumnType::Long => {
            let raw: [u8; 8] = bytes
                .try_into()
                .map_err(|_| BasaltError::Metadata("long key must be 8 bytes".into()))?;
            Ok(IngestValue::Long(
                (u64::from_be_bytes(raw) ^ 0x8000_0000_0000_0000) as i64,
            ))
        }
        ColumnType::Double => {
            let raw: [u8; 8] = bytes
                .try_into()
                .map_err(|_| BasaltError::Metadata("double key must be 8 bytes".into()))?;
            let ordered = u64::from_be_bytes(raw);
            let bits = if ordered & 0x8000_0000_0000_0000 != 0 {
                ordered ^ 0x8000_0000_0000_0000
            } else {
                !ordered
            };
            Ok(IngestValue::Double(f64::from_bits(bits)))
        }
        ColumnType::String => {
            let s = std::str::from_utf8(bytes)
                .map_err(|_| BasaltError::Metadata("string key is not valid utf-8".into()))?;
            Ok(IngestValue::Str(s.to_string()))
        }
        ColumnType::Bitmap => Err(BasaltError::Metadata(
            "bitmap columns cannot key a segment".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_order_matches<T: Clone + PartialOrd>(
        values: Vec<T>,
        to_value: impl Fn(T) -> IngestValue,
        key_type: ColumnType,
    ) {
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut by_bytes: Vec<(Vec<u8>, T)> = values
            .into_iter()
            .map(|v| (encode_key(&to_value(v.clone()), key_type).unwrap(), v))
            .collect();
        by_bytes.sort_by(|a, b| a.0.cmp(&b.0));

        for (expected, (_, got)) in sorted.into_iter().zip(by_bytes) {
            assert!(expected.partial_cmp(&got) == Some(std::cmp::Ordering::Equal));
        }
    }

    #[test]
    fn int_keys_preserve_order() {
        encoded_order_matches(
            vec![0, -1, i32::MIN, i32::MAX, 42, -42],
            IngestValue::Int,
            ColumnType::Int,
        );
    }

    #[test]
    fn long_keys_preserve_order() {
        encoded_order_matches(
            vec![0i64, -1, i64::MIN, i64::MAX, 1 << 40, -(1 << 40)],
            IngestValue::Long,
            ColumnType::Long,
        );
    }

    #[test]
    fn double_keys_preserve_order() {
        encoded_order_matches(
            vec![0.0f64, -0.5, 1.5, -1000.25, f64::MAX, f64::MIN],
            IngestValue::Double,
            ColumnType::Double,
        );
    }

    #[test]
    fn string_keys_preserve_order() {
        encoded_order_matches(
            vec!["".to_string(), "a".into(), "ab".into(), "b".into()],
            IngestValue::Str,
            ColumnType::String,
        );
    }

    #[test]
    fn roundtrip_all_key_types() {
        let cases = vec![
            (IngestValue::Int(-7), ColumnType::Int),
            (IngestValue::Long(1 << 50), ColumnType::Long),
            (IngestValue::Double(-2.75), ColumnType::Double),
            (IngestValue::Str("Rodney".into()), ColumnType::String),
        ];
        for (value, key_type) in cases {
            let bytes = encode_key(&value, key_type).unwrap();
            assert_eq!(decode_key(&bytes, key_type).unwrap(), value);
        }
    }

    #[test]
    fn null_and_mismatched_keys_are_rejected() {
        assert!(matches!(
            encode_key(&IngestValue::Null, ColumnType::Int),
            Err(BasaltError::InvalidRow(_))
        ));
        assert!(matches!(
            encode_key(&IngestValue::Str("x".into()), ColumnType::Int),
            Err(BasaltError::InvalidRow(_))
        ));
        assert!(matches!(
            encode_key(&IngestValue::Int(1), ColumnType::Bitmap),
            Err(BasaltError::InvalidRow(_))
        ));
    }
}
