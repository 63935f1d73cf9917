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

//! The flush protocol: optimistic, lock-free commits of one batch into one
//! segment.
//!
//! ```text
//! load (version, summary) ──► digest prefilter ──► fetch candidate keys
//!        ▲                                                │
//!        │                                                ▼
//!     retry ◄── CAS failed ◄── cas summary ◄── write chunk + extend summary
//! ```
//!
//! Every committed chunk's overrides were computed against the exact
//! snapshot of prior chunks it is appended to: two flushers racing on the
//! same summary version cannot both win the CAS, and the loser recomputes
//! from a fresh load. A chunk written ahead of a failed CAS stays
//! unreferenced and invisible; its id is never reused.

use tracing::{debug, trace};

use basalt_core::error::{BasaltError, Result};
use basalt_core::schema::Schema;
use basalt_core::value::IngestValue;
use basalt_core::vector::ValueVector;

use crate::chunk::{self, Chunk, ChunkIdGenerator};
use crate::meta::Dataset;
use crate::store::{SegmentRef, SegmentStore, SummaryVersion};
use crate::summary::SegmentSummary;

/// One key-ordered, deduplicated batch of rows bound for a single segment.
#[derive(Debug, Clone)]
pub struct SegmentBatch {
    pub partition: String,
    pub segment: String,
    /// Column names, indexing into each row's values.
    pub columns: Vec<String>,
    /// `(encoded key, row values)` pairs. Need not be sorted or unique; the
    /// flush sorts and deduplicates (last write wins).
    pub rows: Vec<(Vec<u8>, Vec<IngestValue>)>,
}

/// Flushes batches into segments with compare-and-swap commits.
pub struct SegmentFlusher<'a, S: SegmentStore + ?Sized> {
    store: &'a S,
    dataset: &'a Dataset,
    schema: &'a Schema,
    ids: &'a ChunkIdGenerator,
}

impl<'a, S: SegmentStore + ?Sized> SegmentFlusher<'a, S> {
    pub fn new(
        store: &'a S,
        dataset: &'a Dataset,
        schema: &'a Schema,
        ids: &'a ChunkIdGenerator,
    ) -> Self {
        Self {
            store,
            dataset,
            schema,
            ids,
        }
    }

    /// One optimistic flush attempt. `Ok(true)` committed; `Ok(false)` lost
    /// the CAS race and the caller should retry with a fresh attempt.
    pub fn flush(&self, batch: &SegmentBatch) -> Result<bool> {
        let segment = SegmentRef::new(
            self.dataset.name.clone(),
            batch.partition.clone(),
            batch.segment.clone(),
        );

        // Step 1: load the current summary snapshot and its version.
        let (version, summary) = match self.store.load_summary(&segment)? {
            Some((version, bytes)) => (Some(version), SegmentSummary::from_bytes(&bytes)?),
            None => (None, SegmentSummary::empty()),
        };

        // Last write wins within the batch; row order becomes key order.
        let rows = dedup_rows(batch);
        let keys: Vec<Vec<u8>> = rows.iter().map(|(key, _)| (*key).clone()).collect();

        // Steps 2-4: digest prefilter, then exact positions over the
        // candidates' real key lists. No candidates skips the fetches.
        let candidates = summary.possible_overrides(&keys);
        let overrides = if candidates.is_empty() {
            Vec::new()
        } else {
            let mut fetched = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let key_bytes = self.store.load_chunk_keys(&segment, candidate)?;
                fetched.push((candidate, chunk::decode_keys(&key_bytes)?));
            }
            summary.actual_overrides(&keys, &fetched)
        };

        // Step 5: mint an id strictly greater than every committed chunk,
        // even ones committed by other processes, and assemble the chunk.
        if let Some(latest) = summary.latest_chunk_id() {
            self.ids.observe(latest);
        }
        let chunk_id = self.ids.next();
        let vectors = self.encode_vectors(&batch.columns, &rows)?;
        let chunk = Chunk::new(chunk_id, keys, batch.columns.clone(), vectors, overrides)?;

        // Step 6: extend the summary; the original snapshot stays intact
        // for the retry path.
        let new_summary = summary.with_keys(chunk_id, &chunk.keys);

        // Step 7: stage the chunk, then publish it with the CAS. A failed
        // CAS leaves the staged chunk unreferenced and invisible.
        let named: Vec<(String, Vec<u8>)> = chunk
            .columns
            .iter()
            .cloned()
            .zip(chunk.vectors.iter().cloned())
            .collect();
        self.store
            .write_chunk(&segment, chunk_id, &chunk.meta_bytes(), &chunk.key_bytes(), &named)?;

        let new_version = version.map(SummaryVersion::next).unwrap_or(SummaryVersion::FIRST);
        let committed =
            self.store
                .cas_summary(&segment, version, new_version, &new_summary.to_bytes())?;
        if committed {
            trace!(segment = %segment, chunk = %chunk_id, rows = chunk.num_rows, "flush committed");
        } else {
            debug!(segment = %segment, chunk = %chunk_id, "flush lost cas race, discarding chunk");
        }
        Ok(committed)
    }

    /// Retry `flush` until it commits or `max_attempts` is exhausted.
    /// Returns whether a commit happened.
    pub fn flush_until_committed(&self, batch: &SegmentBatch, max_attempts: usize) -> Result<bool> {
        for _ in 0..max_attempts {
            if self.flush(batch)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn encode_vectors(
        &self,
        columns: &[String],
        rows: &[(&Vec<u8>, &Vec<IngestValue>)],
    ) -> Result<Vec<Vec<u8>>> {
        columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let column = self.schema.get(name).ok_or_else(|| {
                    BasaltError::InvalidRow(format!(
                        "column '{name}' is not in the effective schema"
                    ))
                })?;
                let values: Vec<IngestValue> =
                    rows.iter().map(|(_, row)| row[idx].clone()).collect();
                ValueVector::encode(column.column_type, &values)
            })
            .collect()
    }
}

/// Sort by key and keep the last occurrence of each duplicate.
fn dedup_rows(batch: &SegmentBatch) -> Vec<(&Vec<u8>, &Vec<IngestValue>)> {
    let mut deduped: std::collections::BTreeMap<&Vec<u8>, &Vec<IngestValue>> =
        std::collections::BTreeMap::new();
    for (key, row) in &batch.rows {
        deduped.insert(key, row);
    }
    deduped.into_iter().collect()
}

/// Flush every buffered segment of a memtable, clearing the ones that
/// commit. Returns the number of committed segments.
pub fn flush_memtable<S: SegmentStore + ?Sized>(
    flusher: &SegmentFlusher<'_, S>,
    memtable: &mut crate::memtable::MemTable,
    max_attempts: usize,
) -> Result<usize> {
    let mut committed = 0;
    for batch in memtable.batches() {
        if flusher.flush_until_committed(&batch, max_attempts)? {
            memtable.clear_segment(&batch.partition, &batch.segment);
            committed += 1;
        }
    }
    Ok(committed)
}
