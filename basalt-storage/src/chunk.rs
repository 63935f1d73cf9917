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

//! Immutable chunks and their time-ordered identifiers.
//!
//! A chunk is one flushed batch of rows: keys, per-column byte vectors, and
//! an override map declaring which positions in earlier chunks this chunk
//! supersedes. Chunks never change after commit.
//!
//! ## Chunk ids
//!
//! `ChunkId` is 128 bits: the high 64 bits are a hybrid-logical-clock
//! timestamp (`millis << 20 | logical counter`), the low 64 bits are random
//! per-process node bits. Numeric order, byte order and time order all
//! agree, and [`ChunkIdGenerator`] guarantees strictly increasing ids within
//! a process even if the wall clock regresses.
//!
//! ## Wire forms
//!
//! Metadata buffer:
//! `i32 override_count | {16B prior id, i32 pos_count, i32 positions...}... | i32 num_rows`
//!
//! Key buffer: `i32 key_count | {i32 byte_len, key payload}...`
//!
//! Both decode independently of the column vectors, so readers can compute
//! masks and enumerate keys without touching column payloads.

use std::fmt;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use basalt_core::error::{BasaltError, Result};
use basalt_core::wire;

/// Bits of the id timestamp reserved for the logical counter. Millisecond
/// physical time plus 20 logical bits keeps the whole timestamp inside 64
/// bits for the next few centuries.
const LOGICAL_BITS: u32 = 20;

/// Time-ordered 128-bit chunk identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(u128);

impl ChunkId {
    pub const SIZE: usize = 16;

    pub fn from_parts(timestamp: u64, node: u64) -> Self {
        Self(((timestamp as u128) << 64) | node as u128)
    }

    /// The hybrid-logical-clock timestamp in the high 64 bits.
    pub fn timestamp(&self) -> u64 {
        (self.0 >> 64) as u64
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; Self::SIZE] = bytes
            .try_into()
            .map_err(|_| BasaltError::Metadata("chunk id must be 16 bytes".into()))?;
        Ok(Self(u128::from_be_bytes(raw)))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Hands out strictly increasing chunk ids within a process.
///
/// Physical time regression falls back to the logical counter; allocation is
/// a single CAS loop on the last issued timestamp.
#[derive(Debug)]
pub struct ChunkIdGenerator {
    last_ts: AtomicU64,
    node: u64,
}

impl ChunkIdGenerator {
    pub fn new() -> Self {
        Self {
            last_ts: AtomicU64::new(Self::now_physical() << LOGICAL_BITS),
            node: rand::random::<u64>(),
        }
    }

    #[inline]
    fn now_physical() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_millis() as u64
    }

    /// Mint the next id, strictly greater than every id this generator has
    /// issued before. When the wall clock is behind the last issued
    /// timestamp the logical counter in the low bits advances instead.
    pub fn next(&self) -> ChunkId {
        loop {
            let physical = Self::now_physical() << LOGICAL_BITS;
            let last = self.last_ts.load(Ordering::Acquire);
            let new_ts = if physical > last { physical } else { last + 1 };

            if self
                .last_ts
                .compare_exchange_weak(last, new_ts, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return ChunkId::from_parts(new_ts, self.node);
            }
        }
    }

    /// Advance the clock past an id observed elsewhere, so the next minted
    /// id is strictly greater than it. Used when a loaded summary carries
    /// chunks committed by another process.
    pub fn observe(&self, id: ChunkId) {
        let seen = id.timestamp();
        loop {
            let last = self.last_ts.load(Ordering::Acquire);
            if seen <= last {
                return;
            }
            if self
                .last_ts
                .compare_exchange_weak(last, seen, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }
}

impl Default for ChunkIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded chunk metadata: the override map and the row count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMeta {
    /// `(prior chunk id, ascending positions superseded in that chunk)`.
    pub overrides: Vec<(ChunkId, Vec<u32>)>,
    pub num_rows: u32,
}

impl ChunkMeta {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(self.overrides.len() as i32)
            .expect("vec write");
        for (prior, positions) in &self.overrides {
            buf.extend_from_slice(&prior.to_bytes());
            buf.write_i32::<BigEndian>(positions.len() as i32)
                .expect("vec write");
            for pos in positions {
                buf.write_i32::<BigEndian>(*pos as i32).expect("vec write");
            }
        }
        buf.write_i32::<BigEndian>(self.num_rows as i32)
            .expect("vec write");
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ChunkMeta> {
        let mut cursor = Cursor::new(bytes);
        let count = wire::read_len(&mut cursor)?;

        // Counts come off the wire; let the vectors grow instead of trusting
        // them for preallocation.
        let mut overrides = Vec::new();
        for _ in 0..count {
            let id_bytes = wire::take(&mut cursor, ChunkId::SIZE)?;
            let prior = ChunkId::from_bytes(&id_bytes)?;
            let pos_count = wire::read_len(&mut cursor)?;
            let mut positions = Vec::new();
            for _ in 0..pos_count {
                positions.push(cursor.read_i32::<BigEndian>().map_err(wire::truncated)? as u32);
            }
            overrides.push((prior, positions));
        }
        let num_rows = cursor.read_i32::<BigEndian>().map_err(wire::truncated)? as u32;
        Ok(ChunkMeta { overrides, num_rows })
    }
}

/// One immutable flushed batch of rows.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    /// Encoded row keys, one per row, in row order.
    pub keys: Vec<Vec<u8>>,
    /// Column names, parallel to `vectors`.
    pub columns: Vec<String>,
    /// Opaque encoded column payloads, parallel to `columns`.
    pub vectors: Vec<Vec<u8>>,
    pub num_rows: u32,
    pub overrides: Vec<(ChunkId, Vec<u32>)>,
}

impl Chunk {
    /// Construct a chunk, enforcing the construction contract: one key per
    /// row, one vector per column, override targets strictly earlier than
    /// this chunk with ascending position lists.
    pub fn new(
        id: ChunkId,
        keys: Vec<Vec<u8>>,
        columns: Vec<String>,
        vectors: Vec<Vec<u8>>,
        overrides: Vec<(ChunkId, Vec<u32>)>,
    ) -> Result<Chunk> {
        if columns.len() != vectors.len() {
            return Err(BasaltError::InvalidRow(format!(
                "{} columns but {} vectors",
                columns.len(),
                vectors.len()
            )));
        }
        for (prior, positions) in &overrides {
            if *prior >= id {
                return Err(BasaltError::InvalidRow(format!(
                    "override target {prior} is not earlier than chunk {id}"
                )));
            }
            if positions.windows(2).any(|w| w[0] >= w[1]) {
                return Err(BasaltError::InvalidRow(format!(
                    "override positions for {prior} are not strictly ascending"
                )));
            }
        }
        let num_rows = keys.len() as u32;
        Ok(Chunk {
            id,
            keys,
            columns,
            vectors,
            num_rows,
            overrides,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        ChunkMeta {
            overrides: self.overrides.clone(),
            num_rows: self.num_rows,
        }
    }

    pub fn meta_bytes(&self) -> Vec<u8> {
        self.meta().to_bytes()
    }

    /// Encode the key buffer.
    pub fn key_bytes(&self) -> Vec<u8> {
        encode_keys(&self.keys)
    }
}

/// Encode a key list into the key-buffer wire form.
pub fn encode_keys(keys: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_i32::<BigEndian>(keys.len() as i32).expect("vec write");
    for key in keys {
        wire::write_blob(&mut buf, key);
    }
    buf
}

/// Decode a key buffer back into its key list.
pub fn decode_keys(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut cursor = Cursor::new(bytes);
    let count = wire::read_len(&mut cursor)?;
    let mut keys = Vec::new();
    for _ in 0..count {
        keys.push(wire::read_blob(&mut cursor)?);
    }
    Ok(keys)
}
