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

//! Versioned column definitions.
//!
//! A column belongs to a `(dataset, version)` pair and is append-only: a
//! re-declaration at a higher version supersedes earlier definitions, and a
//! tombstone (`is_deleted`) removes the column from the effective schema
//! from that version onward. The fold that produces the effective schema
//! lives in [`crate::schema`].

use std::fmt;

use crate::error::{BasaltError, Result};
use crate::schema::Schema;

/// Names starting with this prefix are reserved for system columns.
pub const SYSTEM_PREFIX: char = ':';

/// Row-level tombstone marker, consumed by the read path.
pub const DELETED_COLUMN: &str = ":deleted";

/// Chunk-inheritance marker, consumed by the read path.
pub const INHERITED_COLUMN: &str = ":inherited";

/// Tag of the built-in packed vector codec (see [`crate::vector`]).
pub const DEFAULT_SERIALIZER: &str = "packed";

/// Value type of a column, with its canonical wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int,
    Long,
    Double,
    String,
    Bitmap,
}

impl ColumnType {
    /// Canonical wire tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Long => "long",
            ColumnType::Double => "double",
            ColumnType::String => "string",
            ColumnType::Bitmap => "bitmap",
        }
    }

    /// Parse a wire tag, failing closed on anything unknown.
    pub fn from_tag(tag: &str) -> Result<ColumnType> {
        match tag {
            "int" => Ok(ColumnType::Int),
            "long" => Ok(ColumnType::Long),
            "double" => Ok(ColumnType::Double),
            "string" => Ok(ColumnType::String),
            "bitmap" => Ok(ColumnType::Bitmap),
            other => Err(BasaltError::Metadata(format!(
                "unknown column type tag '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A named, typed column definition at a specific version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub dataset: String,
    pub version: u32,
    pub column_type: ColumnType,
    /// Opaque tag of the value codec producing this column's byte vectors.
    pub serializer: String,
    /// Tombstone: removes the column from the effective schema.
    pub is_deleted: bool,
    /// Always equal to `name.starts_with(':')` for well-formed columns.
    pub is_system: bool,
}

impl Column {
    /// A live column with the default serializer. The system flag is derived
    /// from the name prefix.
    pub fn new(
        name: impl Into<String>,
        dataset: impl Into<String>,
        version: u32,
        column_type: ColumnType,
    ) -> Self {
        let name = name.into();
        let is_system = name.starts_with(SYSTEM_PREFIX);
        Self {
            name,
            dataset: dataset.into(),
            version,
            column_type,
            serializer: DEFAULT_SERIALIZER.to_string(),
            is_deleted: false,
            is_system,
        }
    }

    /// A tombstone for an existing column.
    pub fn tombstone(
        name: impl Into<String>,
        dataset: impl Into<String>,
        version: u32,
        column_type: ColumnType,
    ) -> Self {
        let mut column = Self::new(name, dataset, version, column_type);
        column.is_deleted = true;
        column
    }

    /// Property equality: type, serializer and tombstone flag all match.
    /// Name, dataset and version are identity, not properties.
    pub fn has_same_properties(&self, other: &Column) -> bool {
        self.column_type == other.column_type
            && self.serializer == other.serializer
            && self.is_deleted == other.is_deleted
    }

    /// Check this column as a proposed change against the current effective
    /// schema. Returns every violated rule; empty means valid.
    pub fn validate(&self, schema: &Schema) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();

        if self.is_system != self.name.starts_with(SYSTEM_PREFIX) {
            violations.push(SchemaViolation::SystemFlagMismatch {
                name: self.name.clone(),
                is_system: self.is_system,
            });
        }

        match schema.get(&self.name) {
            Some(current) => {
                if self.version <= current.version {
                    violations.push(SchemaViolation::StaleVersion {
                        name: self.name.clone(),
                        proposed: self.version,
                        current: current.version,
                    });
                }
                if self.has_same_properties(current) {
                    violations.push(SchemaViolation::NoChange {
                        name: self.name.clone(),
                    });
                }
            }
            None => {
                if self.is_deleted {
                    violations.push(SchemaViolation::TombstoneWithoutTarget {
                        name: self.name.clone(),
                    });
                }
            }
        }

        violations
    }
}

/// One violated schema-change rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// `is_system` disagrees with the `':'` name prefix.
    SystemFlagMismatch { name: String, is_system: bool },
    /// Re-declaration at a version not greater than the current one.
    StaleVersion {
        name: String,
        proposed: u32,
        current: u32,
    },
    /// Re-declaration identical in every property.
    NoChange { name: String },
    /// Tombstone for a column absent from the effective schema.
    TombstoneWithoutTarget { name: String },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::SystemFlagMismatch { name, is_system } => write!(
                f,
                "column '{name}': is_system={is_system} disagrees with the ':' name prefix"
            ),
            SchemaViolation::StaleVersion {
                name,
                proposed,
                current,
            } => write!(
                f,
                "column '{name}': version {proposed} must be greater than current {current}"
            ),
            SchemaViolation::NoChange { name } => {
                write!(f, "column '{name}': no property differs from the current definition")
            }
            SchemaViolation::TombstoneWithoutTarget { name } => {
                write!(f, "column '{name}': cannot delete a column that does not exist")
            }
        }
    }
}
