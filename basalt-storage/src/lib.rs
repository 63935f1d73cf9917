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

//! Basalt Storage Layer
//!
//! The segment engine of the basalt columnar store. Rows ingest into a
//! [`memtable::MemTable`], flush into immutable [`chunk::Chunk`]s grouped
//! into per-partition segments, and read back through a masked streaming
//! scan that reconstructs the logical current view.
//!
//! ## Write path
//!
//! ```text
//! rows ──► MemTable ──► SegmentBatch ──► SegmentFlusher
//!                                           │ load (version, summary)
//!                                           │ digest prefilter
//!                                           │ exact override positions
//!                                           │ write chunk
//!                                           ▼
//!                                    cas summary ──► committed / retry
//! ```
//!
//! The only concurrency control is the compare-and-swap on the segment's
//! summary version: two flushes racing on one segment cannot both win, and
//! the loser recomputes against a fresh snapshot. There are no locks.
//!
//! ## Read path
//!
//! [`reader::SegmentReader`] enumerates a segment's chunks in write order,
//! folds every later chunk's override map into per-chunk masks (metadata
//! buffers only), and streams unmasked rows with column vectors decoded
//! lazily per chunk.
//!
//! ## Collaborator seams
//!
//! - [`store::SegmentStore`]: the key-addressable wide-column persistence
//!   tier; [`memstore::MemSegmentStore`] is the in-memory reference.
//! - [`meta::MetaStore`]: datasets and versioned column records;
//!   [`meta::MemMetaStore`] is the in-memory reference.

pub mod chunk;
pub mod digest;
pub mod flush;
pub mod memstore;
pub mod memtable;
pub mod meta;
pub mod reader;
pub mod store;
pub mod summary;

pub use chunk::{Chunk, ChunkId, ChunkIdGenerator, ChunkMeta};
pub use digest::KeyDigest;
pub use flush::{flush_memtable, SegmentBatch, SegmentFlusher};
pub use memstore::MemSegmentStore;
pub use memtable::{MemTable, DEFAULT_PARTITION};
pub use meta::{Dataset, MemMetaStore, MetaStore, Segmenting};
pub use reader::{SegmentReader, SegmentRow};
pub use store::{ScanSplit, SegmentRef, SegmentStore, SummaryVersion};
pub use summary::{ChunkSummary, SegmentSummary};
