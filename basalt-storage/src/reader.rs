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

//! The read path: streaming the logical current view of a segment.
//!
//! Chunks are enumerated in write order. Before any row is produced, the
//! reader folds every chunk's override map (metadata buffers only) into a
//! per-chunk mask of superseded positions. Rows then stream chunk by chunk
//! in ascending position order, skipping masked positions; each chunk's key
//! buffer and requested column vectors are loaded and decoded only when the
//! iterator enters that chunk.

use std::collections::{HashMap, HashSet};

use basalt_core::column::ColumnType;
use basalt_core::error::{BasaltError, Result};
use basalt_core::keycode;
use basalt_core::schema::Schema;
use basalt_core::value::IngestValue;
use basalt_core::vector::ValueVector;

use crate::chunk::{self, ChunkId, ChunkMeta};
use crate::meta::Dataset;
use crate::store::{SegmentRef, SegmentStore};
use crate::summary::SegmentSummary;

/// One logical row of a segment read.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRow {
    /// Decoded key value.
    pub key: IngestValue,
    /// Values projected to the requested columns, in request order. Columns
    /// a chunk does not carry read as null.
    pub values: Vec<IngestValue>,
}

/// Streams segments back out of a [`SegmentStore`].
pub struct SegmentReader<'a, S: SegmentStore + ?Sized> {
    store: &'a S,
    dataset: &'a Dataset,
    schema: &'a Schema,
}

impl<'a, S: SegmentStore + ?Sized> SegmentReader<'a, S> {
    pub fn new(store: &'a S, dataset: &'a Dataset, schema: &'a Schema) -> Self {
        Self {
            store,
            dataset,
            schema,
        }
    }

    /// Stream one segment's live rows, projected to `columns`.
    pub fn read(
        &self,
        partition: &str,
        segment: &str,
        columns: &[String],
    ) -> Result<RowIter<'a, S>> {
        let column_types: Vec<(String, ColumnType)> = columns
            .iter()
            .map(|name| {
                self.schema
                    .get(name)
                    .map(|column| (name.clone(), column.column_type))
                    .ok_or_else(|| {
                        BasaltError::InvalidRow(format!(
                            "column '{name}' is not in the effective schema"
                        ))
                    })
            })
            .collect::<Result<_>>()?;

        let segment_ref = SegmentRef::new(
            self.dataset.name.clone(),
            partition.to_string(),
            segment.to_string(),
        );

        let summary = match self.store.load_summary(&segment_ref)? {
            Some((_, bytes)) => SegmentSummary::from_bytes(&bytes)?,
            None => SegmentSummary::empty(),
        };

        let plans = plan_chunks(self.store, &segment_ref, &summary)?;

        Ok(RowIter {
            store: self.store,
            segment: segment_ref,
            key_type: self.dataset.key_type,
            columns: column_types,
            plans,
            current: 0,
            loaded: None,
            position: 0,
        })
    }

    /// Live rows of every segment of a partition, in segment-id order.
    pub fn read_partition(
        &self,
        partition: &str,
        columns: &[String],
    ) -> Result<Vec<SegmentRow>> {
        let mut rows = Vec::new();
        for segment in self.store.segments_of(&self.dataset.name, partition)? {
            for row in self.read(partition, &segment, columns)? {
                rows.push(row?);
            }
        }
        Ok(rows)
    }

    /// Live rows whose key falls in `[from, to]` (inclusive). Only the
    /// segments whose key range intersects the bounds are touched; segment
    /// ids sort lexically in key-range order, so the pruning is a string
    /// comparison.
    pub fn read_range(
        &self,
        partition: &str,
        from: &IngestValue,
        to: &IngestValue,
        columns: &[String],
    ) -> Result<Vec<SegmentRow>> {
        let low_segment = self.dataset.segmenting.segment_of(from)?;
        let high_segment = self.dataset.segmenting.segment_of(to)?;
        let from_key = keycode::encode_key(from, self.dataset.key_type)?;
        let to_key = keycode::encode_key(to, self.dataset.key_type)?;

        let mut rows = Vec::new();
        for segment in self.store.segments_of(&self.dataset.name, partition)? {
            if segment < low_segment || segment > high_segment {
                continue;
            }
            for row in self.read(partition, &segment, columns)? {
                let row = row?;
                let key = keycode::encode_key(&row.key, self.dataset.key_type)?;
                if key >= from_key && key <= to_key {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }
}

/// Per-chunk read plan: row count and the mask of superseded positions,
/// both derived from metadata buffers alone.
#[derive(Debug)]
struct ChunkPlan {
    id: ChunkId,
    num_rows: u32,
    masked: HashSet<u32>,
}

/// Column vectors and keys of the chunk currently being streamed.
#[derive(Debug)]
struct LoadedChunk {
    keys: Vec<Vec<u8>>,
    /// Decoded values per requested column, `None` for columns the chunk
    /// does not carry.
    columns: Vec<Option<Vec<IngestValue>>>,
}

fn plan_chunks<S: SegmentStore + ?Sized>(
    store: &S,
    segment: &SegmentRef,
    summary: &SegmentSummary,
) -> Result<Vec<ChunkPlan>> {
    let ids: Vec<ChunkId> = summary.chunk_ids().collect();
    let known: HashSet<ChunkId> = ids.iter().copied().collect();

    let mut masks: HashMap<ChunkId, HashSet<u32>> = HashMap::new();
    let mut row_counts: HashMap<ChunkId, u32> = HashMap::new();

    for id in &ids {
        let meta = ChunkMeta::from_bytes(&store.load_chunk_meta(segment, *id)?)?;
        row_counts.insert(*id, meta.num_rows);
        for (prior, positions) in meta.overrides {
            if !known.contains(&prior) {
                return Err(BasaltError::MissingChunk {
                    segment: segment.to_string(),
                    chunk: prior.to_string(),
                });
            }
            masks.entry(prior).or_default().extend(positions);
        }
    }

    Ok(ids
        .into_iter()
        .map(|id| ChunkPlan {
            id,
            num_rows: row_counts[&id],
            masked: masks.remove(&id).unwrap_or_default(),
        })
        .collect())
}

/// Streaming iterator over a segment's live rows.
pub struct RowIter<'a, S: SegmentStore + ?Sized> {
    store: &'a S,
    segment: SegmentRef,
    key_type: ColumnType,
    columns: Vec<(String, ColumnType)>,
    plans: Vec<ChunkPlan>,
    current: usize,
    loaded: Option<LoadedChunk>,
    position: u32,
}

impl<S: SegmentStore + ?Sized> std::fmt::Debug for RowIter<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIter")
            .field("segment", &self.segment)
            .field("key_type", &self.key_type)
            .field("columns", &self.columns)
            .field("plans", &self.plans)
            .field("current", &self.current)
            .field("loaded", &self.loaded)
            .field("position", &self.position)
            .finish()
    }
}

impl<S: SegmentStore + ?Sized> RowIter<'_, S> {
    fn load_current(&mut self) -> Result<()> {
        let plan = &self.plans[self.current];
        let keys = chunk::decode_keys(&self.store.load_chunk_keys(&self.segment, plan.id)?)?;

        let names: Vec<String> = self.columns.iter().map(|(name, _)| name.clone()).collect();
        let mut fetched: HashMap<String, Vec<u8>> = self
            .store
            .load_chunk_columns(&self.segment, plan.id, &names)?
            .into_iter()
            .collect();

        let mut columns = Vec::with_capacity(self.columns.len());
        for (name, column_type) in &self.columns {
            match fetched.remove(name) {
                Some(bytes) => columns.push(Some(ValueVector::decode(*column_type, &bytes)?)),
                None => columns.push(None),
            }
        }

        self.loaded = Some(LoadedChunk { keys, columns });
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<SegmentRow>> {
        loop {
            let plan = match self.plans.get(self.current) {
                Some(plan) => plan,
                None => return Ok(None),
            };

            if self.position >= plan.num_rows {
                self.current += 1;
                self.position = 0;
                self.loaded = None;
                continue;
            }

            let position = self.position;
            self.position += 1;
            if plan.masked.contains(&position) {
                continue;
            }

            if self.loaded.is_none() {
                self.load_current()?;
            }
            let loaded = self.loaded.as_ref().expect("chunk loaded above");

            let key_bytes = loaded.keys.get(position as usize).ok_or_else(|| {
                BasaltError::Metadata(format!(
                    "chunk {} key buffer is shorter than its row count",
                    self.plans[self.current].id
                ))
            })?;
            let key = keycode::decode_key(key_bytes, self.key_type)?;

            let values = loaded
                .columns
                .iter()
                .map(|vector| match vector {
                    Some(values) => values
                        .get(position as usize)
                        .cloned()
                        .unwrap_or(IngestValue::Null),
                    None => IngestValue::Null,
                })
                .collect();

            return Ok(Some(SegmentRow { key, values }));
        }
    }
}

impl<S: SegmentStore + ?Sized> Iterator for RowIter<'_, S> {
    type Item = Result<SegmentRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
