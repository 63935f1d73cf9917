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

//! Error types for basalt.
//!
//! One enum covers the whole workspace. A compare-and-swap conflict during a
//! flush is deliberately *not* represented here: it is a normal concurrent
//! outcome and surfaces as `Ok(false)` from the flush protocol.

use std::io;
use thiserror::Error;

use crate::column::SchemaViolation;

#[derive(Error, Debug)]
pub enum BasaltError {
    /// A proposed schema change violated one or more rules. Carries every
    /// violated rule, not just the first.
    #[error("schema change rejected: {}", format_violations(.0))]
    SchemaViolations(Vec<SchemaViolation>),

    /// Corrupt or unknown values read from the metadata tier, e.g. an
    /// unrecognized column type tag or a truncated wire buffer.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Requested dataset or segment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempt to create a dataset that already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// An ingested row has a null in the partition column and the dataset
    /// has no default partition key configured.
    #[error("null value in partition column '{column}' and no default partition key")]
    NullPartitionValue { column: String },

    /// A committed chunk's override map references a chunk that is absent
    /// from the segment. Fatal data-integrity error.
    #[error("segment {segment}: chunk {chunk} referenced by overrides is missing")]
    MissingChunk { segment: String, chunk: String },

    /// A row or batch that cannot be ingested: wrong arity, missing key
    /// column, value/type mismatch.
    #[error("invalid row: {0}")]
    InvalidRow(String),

    /// Underlying persistent-store failure, propagated unchanged. This
    /// layer never retries.
    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, BasaltError>;
