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

//! In-memory reference implementation of [`SegmentStore`].
//!
//! One map row per segment, guarded by a single `RwLock`; `cas_summary`
//! takes the write lock so the version check and the summary replacement are
//! one atomic step with respect to every other flusher. Staged chunks live
//! in the row before the CAS but are only reachable once a committed summary
//! references them, mirroring the visibility rule of a real wide-column
//! backend.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use basalt_core::error::{BasaltError, Result};

use crate::chunk::ChunkId;
use crate::store::{
    partition_token, ring_splits, ScanSplit, SegmentRef, SegmentStore, SummaryVersion,
};

#[derive(Debug, Default)]
struct StoredChunk {
    meta: Vec<u8>,
    keys: Vec<u8>,
    columns: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct SegmentRow {
    /// `None` until the first successful CAS.
    version: Option<SummaryVersion>,
    summary: Vec<u8>,
    chunks: HashMap<ChunkId, StoredChunk>,
}

/// In-memory [`SegmentStore`] for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemSegmentStore {
    rows: RwLock<HashMap<SegmentRef, SegmentRow>>,
}

impl MemSegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing_chunk(segment: &SegmentRef, chunk_id: ChunkId) -> BasaltError {
        BasaltError::MissingChunk {
            segment: segment.to_string(),
            chunk: chunk_id.to_string(),
        }
    }
}

impl SegmentStore for MemSegmentStore {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        self.rows.write().clear();
        Ok(())
    }

    fn delete_dataset_data(&self, dataset: &str) -> Result<()> {
        self.rows.write().retain(|seg, _| seg.dataset != dataset);
        Ok(())
    }

    fn load_summary(&self, segment: &SegmentRef) -> Result<Option<(SummaryVersion, Vec<u8>)>> {
        let rows = self.rows.read();
        Ok(rows.get(segment).and_then(|row| {
            row.version.map(|version| (version, row.summary.clone()))
        }))
    }

    fn cas_summary(
        &self,
        segment: &SegmentRef,
        expected: Option<SummaryVersion>,
        new_version: SummaryVersion,
        summary: &[u8],
    ) -> Result<bool> {
        let mut rows = self.rows.write();
        let row = rows.entry(segment.clone()).or_default();
        if row.version != expected {
            debug!(segment = %segment, ?expected, current = ?row.version, "summary cas conflict");
            return Ok(false);
        }
        row.version = Some(new_version);
        row.summary = summary.to_vec();
        Ok(true)
    }

    fn write_chunk(
        &self,
        segment: &SegmentRef,
        chunk_id: ChunkId,
        meta: &[u8],
        keys: &[u8],
        columns: &[(String, Vec<u8>)],
    ) -> Result<()> {
        let mut rows = self.rows.write();
        let row = rows.entry(segment.clone()).or_default();
        row.chunks.insert(
            chunk_id,
            StoredChunk {
                meta: meta.to_vec(),
                keys: keys.to_vec(),
                columns: columns.iter().cloned().collect(),
            },
        );
        Ok(())
    }

    fn load_chunk_meta(&self, segment: &SegmentRef, chunk_id: ChunkId) -> Result<Vec<u8>> {
        let rows = self.rows.read();
        rows.get(segment)
            .and_then(|row| row.chunks.get(&chunk_id))
            .map(|chunk| chunk.meta.clone())
            .ok_or_else(|| Self::missing_chunk(segment, chunk_id))
    }

    fn load_chunk_keys(&self, segment: &SegmentRef, chunk_id: ChunkId) -> Result<Vec<u8>> {
        let rows = self.rows.read();
        rows.get(segment)
            .and_then(|row| row.chunks.get(&chunk_id))
            .map(|chunk| chunk.keys.clone())
            .ok_or_else(|| Self::missing_chunk(segment, chunk_id))
    }

    fn load_chunk_columns(
        &self,
        segment: &SegmentRef,
        chunk_id: ChunkId,
        columns: &[String],
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let rows = self.rows.read();
        let chunk = rows
            .get(segment)
            .and_then(|row| row.chunks.get(&chunk_id))
            .ok_or_else(|| Self::missing_chunk(segment, chunk_id))?;

        Ok(columns
            .iter()
            .filter_map(|name| {
                chunk
                    .columns
                    .get(name)
                    .map(|bytes| (name.clone(), bytes.clone()))
            })
            .collect())
    }

    fn scan_splits(
        &self,
        min_tokens_per_split: u64,
        max_tokens_per_split: u64,
    ) -> Result<Vec<ScanSplit>> {
        Ok(ring_splits(min_tokens_per_split, max_tokens_per_split))
    }

    fn partitions_in(&self, dataset: &str, split: &ScanSplit) -> Result<Vec<String>> {
        let rows = self.rows.read();
        let mut partitions: Vec<String> = rows
            .iter()
            .filter(|(seg, row)| {
                seg.dataset == dataset
                    && row.version.is_some()
                    && split.contains(partition_token(&seg.partition))
            })
            .map(|(seg, _)| seg.partition.clone())
            .collect();
        partitions.sort();
        partitions.dedup();
        Ok(partitions)
    }

    fn segments_of(&self, dataset: &str, partition: &str) -> Result<Vec<String>> {
        let rows = self.rows.read();
        let mut segments: Vec<String> = rows
            .iter()
            .filter(|(seg, row)| {
                seg.dataset == dataset && seg.partition == partition && row.version.is_some()
            })
            .map(|(seg, _)| seg.segment.clone())
            .collect();
        segments.sort();
        Ok(segments)
    }
}
