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

//! The typed cell model for ingested rows.

use std::fmt;

use crate::column::ColumnType;

/// A single cell of an ingested row.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestValue {
    Null,
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Bitmap(Vec<u8>),
}

impl IngestValue {
    pub fn is_null(&self) -> bool {
        matches!(self, IngestValue::Null)
    }

    /// The column type this value belongs to, `None` for nulls.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            IngestValue::Null => None,
            IngestValue::Int(_) => Some(ColumnType::Int),
            IngestValue::Long(_) => Some(ColumnType::Long),
            IngestValue::Double(_) => Some(ColumnType::Double),
            IngestValue::Str(_) => Some(ColumnType::String),
            IngestValue::Bitmap(_) => Some(ColumnType::Bitmap),
        }
    }

    /// Text form used for partition routing. Bitmaps and nulls do not route.
    pub fn partition_text(&self) -> Option<String> {
        match self {
            IngestValue::Null | IngestValue::Bitmap(_) => None,
            IngestValue::Int(v) => Some(v.to_string()),
            IngestValue::Long(v) => Some(v.to_string()),
            IngestValue::Double(v) => Some(v.to_string()),
            IngestValue::Str(v) => Some(v.clone()),
        }
    }
}

impl fmt::Display for IngestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestValue::Null => f.write_str("null"),
            IngestValue::Int(v) => write!(f, "{v}"),
            IngestValue::Long(v) => write!(f, "{v}"),
            IngestValue::Double(v) => write!(f, "{v}"),
            IngestValue::Str(v) => f.write_str(v),
            IngestValue::Bitmap(v) => write!(f, "bitmap[{} bytes]", v.len()),
        }
    }
}

impl From<i32> for IngestValue {
    fn from(v: i32) -> Self {
        IngestValue::Int(v)
    }
}

impl From<i64> for IngestValue {
    fn from(v: i64) -> Self {
        IngestValue::Long(v)
    }
}

impl From<f64> for IngestValue {
    fn from(v: f64) -> Self {
        IngestValue::Double(v)
    }
}

impl From<&str> for IngestValue {
    fn from(v: &str) -> Self {
        IngestValue::Str(v.to_string())
    }
}

impl From<String> for IngestValue {
    fn from(v: String) -> Self {
        IngestValue::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_text_stringifies_scalars() {
        assert_eq!(IngestValue::Int(7).partition_text().unwrap(), "7");
        assert_eq!(
            IngestValue::Str("nfl".into()).partition_text().unwrap(),
            "nfl"
        );
        assert!(IngestValue::Null.partition_text().is_none());
        assert!(IngestValue::Bitmap(vec![1]).partition_text().is_none());
    }

    #[test]
    fn column_type_of_null_is_none() {
        assert!(IngestValue::Null.column_type().is_none());
        assert_eq!(IngestValue::Long(1).column_type(), Some(ColumnType::Long));
    }
}
