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

//! Effective schemas and the schema evolution fold.
//!
//! The effective schema of a dataset at a version horizon is produced by
//! folding its column definitions in ascending version order:
//!
//! - tombstones remove the entry,
//! - redeclarations identical in every property are skipped (logged),
//! - changed redeclarations replace the entry,
//! - anything else inserts.
//!
//! The fold is deterministic: it depends only on the set of columns, not on
//! how they are batched or ordered by the caller.

use std::collections::HashMap;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::column::{Column, ColumnType};
use crate::error::Result;
use crate::wire;

/// Effective `name -> Column` mapping for a dataset at a version horizon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: HashMap<String, Column>,
}

impl Schema {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold column definitions into an effective schema. Input order does
    /// not matter: columns are processed in ascending `(version, name)`
    /// order regardless of how the caller batched them.
    pub fn fold(columns: impl IntoIterator<Item = Column>) -> Schema {
        let mut sorted: Vec<Column> = columns.into_iter().collect();
        sorted.sort_by(|a, b| (a.version, &a.name).cmp(&(b.version, &b.name)));

        let mut schema = Schema::empty();
        for column in sorted {
            schema.apply(column);
        }
        schema
    }

    /// Apply one column definition to the schema, following the fold rule.
    pub fn apply(&mut self, column: Column) {
        if column.is_deleted {
            self.columns.remove(&column.name);
            return;
        }
        if let Some(current) = self.columns.get(&column.name) {
            if current.has_same_properties(&column) {
                debug!(
                    column = %column.name,
                    version = column.version,
                    "skipping redundant column redeclaration"
                );
                return;
            }
        }
        self.columns.insert(column.name.clone(), column);
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in name order.
    pub fn columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.values().collect();
        columns.sort_by(|a, b| a.name.cmp(&b.name));
        columns
    }

    /// Wire form: `i32 count`, then per column (in name order)
    /// `utf(name) | utf(dataset) | utf(type tag) | i32 version`.
    ///
    /// Serializer, tombstone and system flags are not written; readers
    /// reconstruct the defaults and derive the system flag from the name
    /// prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let columns = self.columns();
        let mut buf = Vec::with_capacity(4 + columns.len() * 32);
        buf.write_i32::<BigEndian>(columns.len() as i32)
            .expect("vec write");
        for column in columns {
            wire::write_utf(&mut buf, &column.name);
            wire::write_utf(&mut buf, &column.dataset);
            wire::write_utf(&mut buf, column.column_type.tag());
            buf.write_i32::<BigEndian>(column.version as i32)
                .expect("vec write");
        }
        buf
    }

    /// Decode the wire form, failing closed on unknown type tags.
    pub fn from_bytes(bytes: &[u8]) -> Result<Schema> {
        let mut cursor = Cursor::new(bytes);
        let count = wire::read_len(&mut cursor)?;

        let mut columns = Vec::new();
        for _ in 0..count {
            let name = wire::read_utf(&mut cursor)?;
            let dataset = wire::read_utf(&mut cursor)?;
            let tag = wire::read_utf(&mut cursor)?;
            let version = cursor.read_i32::<BigEndian>().map_err(wire::truncated)? as u32;
            let column_type = ColumnType::from_tag(&tag)?;
            columns.push(Column::new(name, dataset, version, column_type));
        }
        Ok(Schema::fold(columns))
    }
}
