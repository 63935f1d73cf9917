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

//! The ingestion buffer.
//!
//! Rows are routed to `(partition, segment)` on ingest: the partition comes
//! from the dataset's partition column (stringified), falling back to the
//! default partition key; the segment from the dataset's segmenting rule
//! applied to the key. Each segment buffers rows in a `BTreeMap` keyed by
//! the encoded key, so duplicates last-write-win and iteration is always in
//! key order. `batches` hands the buffered segments to the flush protocol;
//! a segment is cleared only after its flush commits.

use std::collections::{BTreeMap, HashMap};

use basalt_core::error::{BasaltError, Result};
use basalt_core::keycode;
use basalt_core::value::IngestValue;

use crate::flush::SegmentBatch;
use crate::meta::Dataset;

/// Partition used when the dataset has no partition column and no default
/// partition key.
pub const DEFAULT_PARTITION: &str = "_default";

type SegmentKey = (String, String);

/// In-memory buffer of ingested rows, grouped by `(partition, segment)`.
#[derive(Debug)]
pub struct MemTable {
    dataset: Dataset,
    columns: Vec<String>,
    key_idx: usize,
    partition_idx: Option<usize>,
    segments: HashMap<SegmentKey, BTreeMap<Vec<u8>, Vec<IngestValue>>>,
}

impl MemTable {
    /// A memtable ingesting rows shaped as `columns`. The dataset's key
    /// column (and partition column, if configured) must be present.
    pub fn new(dataset: Dataset, columns: Vec<String>) -> Result<Self> {
        let key_idx = columns
            .iter()
            .position(|c| *c == dataset.key_column)
            .ok_or_else(|| {
                BasaltError::InvalidRow(format!(
                    "key column '{}' is not in the ingest columns",
                    dataset.key_column
                ))
            })?;
        let partition_idx = match &dataset.partition_column {
            Some(partition_column) => Some(
                columns
                    .iter()
                    .position(|c| c == partition_column)
                    .ok_or_else(|| {
                        BasaltError::InvalidRow(format!(
                            "partition column '{partition_column}' is not in the ingest columns"
                        ))
                    })?,
            ),
            None => None,
        };
        Ok(Self {
            dataset,
            columns,
            key_idx,
            partition_idx,
            segments: HashMap::new(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Ingest a batch of rows, in order. Later rows win over earlier rows
    /// with the same key in the same partition.
    pub fn ingest(&mut self, rows: Vec<Vec<IngestValue>>) -> Result<()> {
        for row in rows {
            if row.len() != self.columns.len() {
                return Err(BasaltError::InvalidRow(format!(
                    "row has {} values but {} columns are configured",
                    row.len(),
                    self.columns.len()
                )));
            }
            let partition = self.route_partition(&row)?;
            let key = keycode::encode_key(&row[self.key_idx], self.dataset.key_type)?;
            let segment = self.dataset.segmenting.segment_of(&row[self.key_idx])?;
            self.segments
                .entry((partition, segment))
                .or_default()
                .insert(key, row);
        }
        Ok(())
    }

    fn route_partition(&self, row: &[IngestValue]) -> Result<String> {
        match self.partition_idx {
            Some(idx) => match row[idx].partition_text() {
                Some(text) => Ok(text),
                None => self.dataset.default_partition_key.clone().ok_or_else(|| {
                    BasaltError::NullPartitionValue {
                        column: self.columns[idx].clone(),
                    }
                }),
            },
            None => Ok(self
                .dataset
                .default_partition_key
                .clone()
                .unwrap_or_else(|| DEFAULT_PARTITION.to_string())),
        }
    }

    /// Buffered rows of one partition, in key order across its segments.
    pub fn read_rows(&self, partition: &str) -> Vec<(IngestValue, Vec<IngestValue>)> {
        let mut merged: BTreeMap<&[u8], &Vec<IngestValue>> = BTreeMap::new();
        for ((p, _), rows) in &self.segments {
            if p == partition {
                for (key, row) in rows {
                    merged.insert(key.as_slice(), row);
                }
            }
        }
        merged
            .into_values()
            .map(|row| (row[self.key_idx].clone(), row.clone()))
            .collect()
    }

    pub fn num_rows(&self) -> usize {
        self.segments.values().map(|rows| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.values().all(|rows| rows.is_empty())
    }

    /// Snapshot every non-empty segment as a flushable batch, key-ordered.
    pub fn batches(&self) -> Vec<SegmentBatch> {
        let mut batches: Vec<SegmentBatch> = self
            .segments
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|((partition, segment), rows)| SegmentBatch {
                partition: partition.clone(),
                segment: segment.clone(),
                columns: self.columns.clone(),
                rows: rows
                    .iter()
                    .map(|(key, row)| (key.clone(), row.clone()))
                    .collect(),
            })
            .collect();
        batches.sort_by(|a, b| (&a.partition, &a.segment).cmp(&(&b.partition, &b.segment)));
        batches
    }

    /// Drop a segment's buffered rows after its flush committed.
    pub fn clear_segment(&mut self, partition: &str, segment: &str) {
        self.segments
            .remove(&(partition.to_string(), segment.to_string()));
    }
}
