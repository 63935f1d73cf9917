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

//! Per-segment summaries: the ordered chunk index with one key digest per
//! chunk.
//!
//! The summary is the prefilter for override detection: an incoming key set
//! is first tested against every chunk's digest (`possible_overrides`, no
//! false negatives), and only the digest hits have their key buffers fetched
//! for the exact position computation (`actual_overrides`).
//!
//! Summaries are copy-on-write: `with_keys` returns a new summary with the
//! chunk appended; the original is untouched. The MVCC version token is not
//! part of the summary bytes; it belongs to the store row holding them.

use std::collections::HashSet;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use basalt_core::error::Result;
use basalt_core::wire;

use crate::chunk::ChunkId;
use crate::digest::KeyDigest;

/// Compact per-chunk record: key digest plus row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub digest: KeyDigest,
    pub num_rows: u32,
}

/// Ordered `(chunk id, summary)` sequence for one segment, in commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentSummary {
    chunks: Vec<(ChunkId, ChunkSummary)>,
}

impl SegmentSummary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk ids in commit order.
    pub fn chunk_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunks.iter().map(|(id, _)| *id)
    }

    pub fn chunk_summary(&self, id: ChunkId) -> Option<&ChunkSummary> {
        self.chunks
            .iter()
            .find(|(chunk_id, _)| *chunk_id == id)
            .map(|(_, summary)| summary)
    }

    /// The most recently committed chunk id, if any.
    pub fn latest_chunk_id(&self) -> Option<ChunkId> {
        self.chunks.last().map(|(id, _)| *id)
    }

    /// Chunks whose digest claims membership for at least one incoming key.
    /// Digests never false-negative, so the result is a superset of the
    /// chunks with real overlaps; any positive hit count qualifies.
    pub fn possible_overrides(&self, incoming_keys: &[Vec<u8>]) -> Vec<ChunkId> {
        self.chunks
            .iter()
            .filter_map(|(id, summary)| {
                let hits = incoming_keys
                    .iter()
                    .filter(|key| summary.digest.contains(key))
                    .count();
                (hits > 0).then_some(*id)
            })
            .collect()
    }

    /// Exact override positions: for each fetched chunk's key list, the
    /// positions whose key equals any incoming key. Entries with no matches
    /// are omitted.
    pub fn actual_overrides(
        &self,
        incoming_keys: &[Vec<u8>],
        fetched: &[(ChunkId, Vec<Vec<u8>>)],
    ) -> Vec<(ChunkId, Vec<u32>)> {
        let incoming: HashSet<&[u8]> = incoming_keys.iter().map(|k| k.as_slice()).collect();

        fetched
            .iter()
            .filter_map(|(id, chunk_keys)| {
                let positions: Vec<u32> = chunk_keys
                    .iter()
                    .enumerate()
                    .filter(|(_, key)| incoming.contains(key.as_slice()))
                    .map(|(pos, _)| pos as u32)
                    .collect();
                (!positions.is_empty()).then(|| (*id, positions))
            })
            .collect()
    }

    /// A new summary with `(chunk_id, digest(keys))` appended. `self` is not
    /// mutated.
    pub fn with_keys(&self, chunk_id: ChunkId, keys: &[Vec<u8>]) -> SegmentSummary {
        let mut chunks = self.chunks.clone();
        chunks.push((
            chunk_id,
            ChunkSummary {
                digest: KeyDigest::build(keys),
                num_rows: keys.len() as u32,
            },
        ));
        SegmentSummary { chunks }
    }

    /// Upper-bound serialized size, for storage provisioning.
    pub fn size(&self) -> usize {
        4 + self
            .chunks
            .iter()
            .map(|(_, summary)| ChunkId::SIZE + 8 + summary.digest.size_bytes())
            .sum::<usize>()
    }

    /// Wire form: `i32 count`, then per chunk
    /// `16B chunk id | i32 digest_len | digest | i32 num_rows`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.write_i32::<BigEndian>(self.chunks.len() as i32)
            .expect("vec write");
        for (id, summary) in &self.chunks {
            buf.extend_from_slice(&id.to_bytes());
            wire::write_blob(&mut buf, &summary.digest.to_bytes());
            buf.write_i32::<BigEndian>(summary.num_rows as i32)
                .expect("vec write");
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SegmentSummary> {
        let mut cursor = Cursor::new(bytes);
        let count = wire::read_len(&mut cursor)?;

        let mut chunks = Vec::new();
        for _ in 0..count {
            let id_bytes = wire::take(&mut cursor, ChunkId::SIZE)?;
            let id = ChunkId::from_bytes(&id_bytes)?;
            let digest_bytes = wire::read_blob(&mut cursor)?;
            let digest = KeyDigest::from_bytes(&digest_bytes)?;
            let num_rows = cursor.read_i32::<BigEndian>().map_err(wire::truncated)? as u32;
            chunks.push((id, ChunkSummary { digest, num_rows }));
        }
        Ok(SegmentSummary { chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkIdGenerator;

    fn encoded(names: &[&str]) -> Vec<Vec<u8>> {
        names.iter().map(|n| n.as_bytes().to_vec()).collect()
    }

    #[test]
    fn empty_summary_has_no_candidates() {
        let summary = SegmentSummary::empty();
        assert_eq!(summary.num_chunks(), 0);
        assert!(summary.possible_overrides(&encoded(&["Rodney"])).is_empty());
    }

    #[test]
    fn possible_overrides_finds_overlapping_chunks() {
        let ids = ChunkIdGenerator::new();
        let first = ids.next();
        let second = ids.next();

        let summary = SegmentSummary::empty()
            .with_keys(first, &encoded(&["Rodney", "Khalil"]))
            .with_keys(second, &encoded(&["Peyton"]));

        let candidates = summary.possible_overrides(&encoded(&["Khalil", "Jerry"]));
        assert!(candidates.contains(&first));
        // A single overlapping key is enough to qualify a chunk.
        assert!(!candidates.is_empty());
    }

    #[test]
    fn disjoint_keys_yield_no_candidates() {
        let ids = ChunkIdGenerator::new();
        let summary =
            SegmentSummary::empty().with_keys(ids.next(), &encoded(&["Rodney", "Khalil"]));
        // Digests may false-positive, but on two keys at 1% the probability
        // of any hit here is negligible for this fixed key set.
        assert!(summary
            .possible_overrides(&encoded(&["Ndamukong", "Terrance"]))
            .is_empty());
    }

    #[test]
    fn actual_overrides_reports_exact_positions() {
        let ids = ChunkIdGenerator::new();
        let first = ids.next();
        let second = ids.next();
        let summary = SegmentSummary::empty();

        let fetched = vec![
            (first, encoded(&["Rodney", "Ndamukong", "Khalil", "Terrance"])),
            (second, encoded(&["Jerry", "Peyton"])),
        ];
        let overrides =
            summary.actual_overrides(&encoded(&["Rodney", "Ndamukong", "Zed"]), &fetched);

        // Only the first chunk matches; empty entries are omitted.
        assert_eq!(overrides, vec![(first, vec![0, 1])]);
    }

    #[test]
    fn with_keys_leaves_original_untouched() {
        let ids = ChunkIdGenerator::new();
        let original = SegmentSummary::empty();
        let extended = original.with_keys(ids.next(), &encoded(&["Rodney"]));

        assert_eq!(original.num_chunks(), 0);
        assert_eq!(extended.num_chunks(), 1);
    }

    #[test]
    fn chunk_list_preserves_commit_order() {
        let ids = ChunkIdGenerator::new();
        let first = ids.next();
        let second = ids.next();
        let summary = SegmentSummary::empty()
            .with_keys(first, &encoded(&["a"]))
            .with_keys(second, &encoded(&["b"]));

        let listed: Vec<ChunkId> = summary.chunk_ids().collect();
        assert_eq!(listed, vec![first, second]);
        assert_eq!(summary.latest_chunk_id(), Some(second));
    }

    #[test]
    fn wire_roundtrip() {
        let ids = ChunkIdGenerator::new();
        let summary = SegmentSummary::empty()
            .with_keys(ids.next(), &encoded(&["Rodney", "Khalil"]))
            .with_keys(ids.next(), &encoded(&["Peyton"]));

        let restored = SegmentSummary::from_bytes(&summary.to_bytes()).unwrap();
        assert_eq!(restored, summary);
    }

    #[test]
    fn empty_wire_roundtrip() {
        let bytes = SegmentSummary::empty().to_bytes();
        assert_eq!(bytes, 0i32.to_be_bytes().to_vec());
        assert!(SegmentSummary::from_bytes(&bytes).unwrap().is_empty());
    }

    #[test]
    fn size_bounds_serialized_length() {
        let ids = ChunkIdGenerator::new();
        let summary = SegmentSummary::empty()
            .with_keys(ids.next(), &encoded(&["Rodney", "Khalil", "Jerry"]));
        assert!(summary.size() >= summary.to_bytes().len());
    }
}
