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

//! The persistent-store seam.
//!
//! The engine never owns storage: it talks to a key-addressable wide-column
//! tier through [`SegmentStore`]. The trait is synchronous and `Send + Sync`
//! so flushers and readers parallelize freely across threads; every call is
//! a potential blocking point on the backing store.
//!
//! The one piece of shared mutable state per `(dataset, partition, segment)`
//! is the summary row `(version, summary bytes)`, guarded exclusively by
//! [`SegmentStore::cas_summary`]. Chunk writes that precede a failed CAS are
//! unreferenced and invisible; visibility is gated on the CAS alone.

use crate::chunk::ChunkId;
use basalt_core::error::Result;

/// Opaque, monotonically increasing MVCC token for one segment's summary
/// row. Produced by the flusher as `expected.next()`; compared by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SummaryVersion(u64);

impl SummaryVersion {
    /// Version of the first committed summary of a segment.
    pub const FIRST: SummaryVersion = SummaryVersion(0);

    pub fn next(self) -> SummaryVersion {
        SummaryVersion(self.0 + 1)
    }
}

/// Fully qualified segment address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentRef {
    pub dataset: String,
    pub partition: String,
    pub segment: String,
}

impl SegmentRef {
    pub fn new(
        dataset: impl Into<String>,
        partition: impl Into<String>,
        segment: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            partition: partition.into(),
            segment: segment.into(),
        }
    }
}

impl std::fmt::Display for SegmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.dataset, self.partition, self.segment)
    }
}

/// One contiguous range of the u64 partition-token ring, both ends
/// inclusive. Parallel readers each take a split and scan the partitions
/// hashing into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSplit {
    pub start_token: u64,
    pub end_token: u64,
}

impl ScanSplit {
    pub fn contains(&self, token: u64) -> bool {
        token >= self.start_token && token <= self.end_token
    }
}

/// Deterministic position of a partition key on the token ring (FNV-1a).
pub fn partition_token(partition: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in partition.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Cover the full token ring with contiguous splits of at most
/// `max_tokens_per_split` tokens each (and at least `min_tokens_per_split`,
/// except possibly the last).
pub fn ring_splits(min_tokens_per_split: u64, max_tokens_per_split: u64) -> Vec<ScanSplit> {
    let width = max_tokens_per_split.max(min_tokens_per_split).max(1);
    let mut splits = Vec::new();
    let mut start: u64 = 0;
    loop {
        let end = start.saturating_add(width - 1);
        splits.push(ScanSplit {
            start_token: start,
            end_token: end,
        });
        if end == u64::MAX {
            return splits;
        }
        start = end + 1;
    }
}

/// Key-addressable persistence for summaries and chunks.
///
/// Implementations map a `SegmentRef` to one summary row and a set of chunk
/// cells. Errors from the backing store propagate unchanged; this layer
/// never retries.
pub trait SegmentStore: Send + Sync {
    /// Prepare backing structures (tables, directories). Idempotent.
    fn initialize(&self) -> Result<()>;

    /// Drop every row of every dataset. Test and tooling hook.
    fn clear_all(&self) -> Result<()>;

    /// Drop all segment data belonging to one dataset.
    fn delete_dataset_data(&self, dataset: &str) -> Result<()>;

    /// The segment's `(version, summary bytes)`, or `None` if no summary has
    /// ever been committed.
    fn load_summary(&self, segment: &SegmentRef) -> Result<Option<(SummaryVersion, Vec<u8>)>>;

    /// Atomically replace the summary row if its current version equals
    /// `expected` (`None` = row must not exist yet). Returns whether the
    /// swap happened. `false` is the normal concurrent-flush outcome, not an
    /// error.
    fn cas_summary(
        &self,
        segment: &SegmentRef,
        expected: Option<SummaryVersion>,
        new_version: SummaryVersion,
        summary: &[u8],
    ) -> Result<bool>;

    /// Stage a chunk's buffers. The chunk stays invisible until a summary
    /// referencing it is committed via `cas_summary`.
    fn write_chunk(
        &self,
        segment: &SegmentRef,
        chunk_id: ChunkId,
        meta: &[u8],
        keys: &[u8],
        columns: &[(String, Vec<u8>)],
    ) -> Result<()>;

    /// The metadata buffer of a committed chunk.
    fn load_chunk_meta(&self, segment: &SegmentRef, chunk_id: ChunkId) -> Result<Vec<u8>>;

    /// The key buffer of a committed chunk.
    fn load_chunk_keys(&self, segment: &SegmentRef, chunk_id: ChunkId) -> Result<Vec<u8>>;

    /// The named column buffers of a committed chunk, restricted to
    /// `columns`. Columns the chunk does not carry are omitted from the
    /// result (the reader treats them as all-null).
    fn load_chunk_columns(
        &self,
        segment: &SegmentRef,
        chunk_id: ChunkId,
        columns: &[String],
    ) -> Result<Vec<(String, Vec<u8>)>>;

    /// Token-ring splits for parallel scans.
    fn scan_splits(
        &self,
        min_tokens_per_split: u64,
        max_tokens_per_split: u64,
    ) -> Result<Vec<ScanSplit>>;

    /// Partitions of `dataset` with a committed summary whose token falls in
    /// `split`.
    fn partitions_in(&self, dataset: &str, split: &ScanSplit) -> Result<Vec<String>>;

    /// Segment ids of a partition with a committed summary, in id order.
    fn segments_of(&self, dataset: &str, partition: &str) -> Result<Vec<String>>;
}
