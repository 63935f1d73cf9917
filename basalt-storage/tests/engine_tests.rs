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

//! End-to-end engine tests: ingest through the memtable, flush through the
//! CAS protocol, read back the logical view, and race concurrent flushers.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use basalt_core::column::{Column, ColumnType};
use basalt_core::error::Result;
use basalt_core::keycode;
use basalt_core::schema::Schema;
use basalt_core::value::IngestValue;
use basalt_storage::{
    flush_memtable, ChunkIdGenerator, ChunkMeta, Dataset, MemMetaStore, MemSegmentStore, MemTable,
    MetaStore, SegmentBatch, SegmentFlusher, SegmentReader, SegmentRef, SegmentSummary,
    SegmentStore, DEFAULT_PARTITION,
};

fn players_dataset() -> Dataset {
    Dataset::new("players", "first", ColumnType::String)
}

fn players_schema() -> Schema {
    Schema::fold(vec![
        Column::new("first", "players", 0, ColumnType::String),
        Column::new("age", "players", 0, ColumnType::Int),
    ])
}

fn player_row(first: &str, age: i32) -> Vec<IngestValue> {
    vec![IngestValue::Str(first.into()), IngestValue::Int(age)]
}

fn string_key(first: &str) -> Vec<u8> {
    keycode::encode_key(&IngestValue::Str(first.into()), ColumnType::String).unwrap()
}

fn batch_of(rows: &[(&str, i32)]) -> SegmentBatch {
    SegmentBatch {
        partition: DEFAULT_PARTITION.into(),
        segment: "0".into(),
        columns: vec!["first".into(), "age".into()],
        rows: rows
            .iter()
            .map(|(first, age)| (string_key(first), player_row(first, *age)))
            .collect(),
    }
}

#[test]
fn out_of_order_ingest_reads_in_key_order_after_flush() {
    let store = MemSegmentStore::new();
    let dataset = players_dataset();
    let schema = players_schema();
    let ids = ChunkIdGenerator::new();

    let names = ["Rodney", "Ndamukong", "Khalil", "Terrance", "Jerry", "Peyton"];
    let mut memtable =
        MemTable::new(dataset.clone(), vec!["first".into(), "age".into()]).unwrap();
    memtable
        .ingest(names.iter().map(|n| player_row(n, 30)).collect())
        .unwrap();

    // Memtable read is already key-ordered.
    let buffered: Vec<String> = memtable
        .read_rows(DEFAULT_PARTITION)
        .into_iter()
        .map(|(key, _)| key.to_string())
        .collect();
    let mut expected: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    expected.sort();
    assert_eq!(buffered, expected);

    // Flush and read the segment back: same order, memtable drained.
    let flusher = SegmentFlusher::new(&store, &dataset, &schema, &ids);
    assert_eq!(flush_memtable(&flusher, &mut memtable, 3).unwrap(), 1);
    assert!(memtable.is_empty());

    let reader = SegmentReader::new(&store, &dataset, &schema);
    let read: Vec<String> = reader
        .read_partition(DEFAULT_PARTITION, &["first".to_string()])
        .unwrap()
        .into_iter()
        .map(|row| row.key.to_string())
        .collect();
    assert_eq!(read, expected);
}

#[test]
fn overwrite_keeps_one_live_row_per_key() {
    let store = MemSegmentStore::new();
    let dataset = players_dataset();
    let schema = players_schema();
    let ids = ChunkIdGenerator::new();
    let flusher = SegmentFlusher::new(&store, &dataset, &schema, &ids);

    assert!(flusher
        .flush(&batch_of(&[
            ("Jerry", 41),
            ("Khalil", 27),
            ("Rodney", 30),
            ("Terrance", 29),
        ]))
        .unwrap());
    assert!(flusher
        .flush(&batch_of(&[("Jerry", 1), ("Khalil", 2)]))
        .unwrap());

    let seg = SegmentRef::new("players", DEFAULT_PARTITION, "0");
    let (_, bytes) = store.load_summary(&seg).unwrap().unwrap();
    let summary = SegmentSummary::from_bytes(&bytes).unwrap();
    assert_eq!(summary.num_chunks(), 2);

    let chunk_ids: Vec<_> = summary.chunk_ids().collect();
    let second_meta =
        ChunkMeta::from_bytes(&store.load_chunk_meta(&seg, chunk_ids[1]).unwrap()).unwrap();
    assert_eq!(second_meta.overrides, vec![(chunk_ids[0], vec![0, 1])]);

    let reader = SegmentReader::new(&store, &dataset, &schema);
    let rows: Vec<_> = reader
        .read_partition(DEFAULT_PARTITION, &["first".to_string(), "age".to_string()])
        .unwrap();
    assert_eq!(rows.len(), 4);

    let ages: HashMap<String, i32> = rows
        .iter()
        .map(|row| match (&row.key, &row.values[1]) {
            (IngestValue::Str(name), IngestValue::Int(age)) => (name.clone(), *age),
            other => panic!("unexpected row shape: {other:?}"),
        })
        .collect();
    assert_eq!(ages["Jerry"], 1);
    assert_eq!(ages["Khalil"], 2);
    assert_eq!(ages["Rodney"], 30);
    assert_eq!(ages["Terrance"], 29);
}

#[test]
fn concurrent_flushers_serialize_through_the_cas() {
    let store = Arc::new(MemSegmentStore::new());
    let dataset = Arc::new(players_dataset());
    let schema = Arc::new(players_schema());
    let ids = Arc::new(ChunkIdGenerator::new());

    let threads: usize = 4;
    let flushes_per_thread: usize = 8;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let dataset = Arc::clone(&dataset);
            let schema = Arc::clone(&schema);
            let ids = Arc::clone(&ids);
            thread::spawn(move || -> Result<()> {
                let flusher = SegmentFlusher::new(store.as_ref(), &dataset, &schema, &ids);
                for i in 0..flushes_per_thread {
                    let name = format!("player-{t}-{i}");
                    let committed = flusher.flush_until_committed(
                        &batch_of(&[(name.as_str(), (t * 100 + i) as i32)]),
                        64,
                    )?;
                    assert!(committed, "flush exhausted its retries");
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Every flush committed exactly one chunk; ids are strictly increasing
    // in commit order and the version advanced once per commit.
    let seg = SegmentRef::new("players", DEFAULT_PARTITION, "0");
    let (version, bytes) = store.load_summary(&seg).unwrap().unwrap();
    let summary = SegmentSummary::from_bytes(&bytes).unwrap();

    let total = threads * flushes_per_thread;
    assert_eq!(summary.num_chunks(), total);
    assert_eq!(version, expected_version(total));

    let chunk_ids: Vec<_> = summary.chunk_ids().collect();
    for pair in chunk_ids.windows(2) {
        assert!(pair[0] < pair[1]);
    }

    // And the logical view holds exactly one row per key.
    let reader = SegmentReader::new(store.as_ref(), &dataset, &schema);
    let rows = reader
        .read_partition(DEFAULT_PARTITION, &["first".to_string()])
        .unwrap();
    assert_eq!(rows.len(), total);
}

fn expected_version(commits: usize) -> basalt_storage::SummaryVersion {
    let mut version = basalt_storage::SummaryVersion::FIRST;
    for _ in 1..commits {
        version = version.next();
    }
    version
}

#[test]
fn cas_loser_retries_with_a_greater_chunk_id() {
    let store = MemSegmentStore::new();
    let dataset = players_dataset();
    let schema = players_schema();

    // Two flushers with separate id generators, both starting from the same
    // empty-summary snapshot.
    let winner_ids = ChunkIdGenerator::new();
    let loser_ids = ChunkIdGenerator::new();
    let winner = SegmentFlusher::new(&store, &dataset, &schema, &winner_ids);
    let loser = SegmentFlusher::new(&store, &dataset, &schema, &loser_ids);

    // The winner commits first; the loser's first attempt raced it and lost,
    // which flush_until_committed absorbs by reloading and recomputing.
    assert!(winner.flush(&batch_of(&[("Rodney", 30)])).unwrap());
    assert!(loser
        .flush_until_committed(&batch_of(&[("Khalil", 27)]), 8)
        .unwrap());

    let seg = SegmentRef::new("players", DEFAULT_PARTITION, "0");
    let (_, bytes) = store.load_summary(&seg).unwrap().unwrap();
    let summary = SegmentSummary::from_bytes(&bytes).unwrap();
    let chunk_ids: Vec<_> = summary.chunk_ids().collect();
    assert_eq!(chunk_ids.len(), 2);
    assert!(chunk_ids[1] > chunk_ids[0]);
}

#[test]
fn override_soundness_and_completeness_over_random_batches() {
    use rand::prelude::*;

    let store = MemSegmentStore::new();
    let dataset = Dataset::new("events", "id", ColumnType::Long);
    let schema = Schema::fold(vec![
        Column::new("id", "events", 0, ColumnType::Long),
        Column::new("score", "events", 0, ColumnType::Double),
    ]);
    let ids = ChunkIdGenerator::new();
    let flusher = SegmentFlusher::new(&store, &dataset, &schema, &ids);

    let mut rng = StdRng::seed_from_u64(17);
    let mut latest: HashMap<i64, f64> = HashMap::new();

    for _ in 0..12 {
        let count = rng.gen_range(1..40);
        let rows: Vec<(Vec<u8>, Vec<IngestValue>)> = (0..count)
            .map(|_| {
                let id = rng.gen_range(0..120i64);
                let score = rng.gen_range(0.0..100.0);
                (
                    keycode::encode_key(&IngestValue::Long(id), ColumnType::Long).unwrap(),
                    vec![IngestValue::Long(id), IngestValue::Double(score)],
                )
            })
            .collect();
        for (_, row) in &rows {
            if let (IngestValue::Long(id), IngestValue::Double(score)) = (&row[0], &row[1]) {
                latest.insert(*id, *score);
            }
        }
        let batch = SegmentBatch {
            partition: DEFAULT_PARTITION.into(),
            segment: "0".into(),
            columns: vec!["id".into(), "score".into()],
            rows,
        };
        assert!(flusher.flush_until_committed(&batch, 4).unwrap());
    }

    // Soundness and completeness, checked against the raw chunk buffers.
    let seg = SegmentRef::new("events", DEFAULT_PARTITION, "0");
    let (_, bytes) = store.load_summary(&seg).unwrap().unwrap();
    let summary = SegmentSummary::from_bytes(&bytes).unwrap();
    let chunk_ids: Vec<_> = summary.chunk_ids().collect();

    let keys_of: HashMap<_, Vec<Vec<u8>>> = chunk_ids
        .iter()
        .map(|id| {
            let raw = store.load_chunk_keys(&seg, *id).unwrap();
            (*id, basalt_storage::chunk::decode_keys(&raw).unwrap())
        })
        .collect();
    let metas: HashMap<_, ChunkMeta> = chunk_ids
        .iter()
        .map(|id| {
            let raw = store.load_chunk_meta(&seg, *id).unwrap();
            (*id, ChunkMeta::from_bytes(&raw).unwrap())
        })
        .collect();

    for (idx, chunk_id) in chunk_ids.iter().enumerate() {
        let incoming: std::collections::HashSet<&Vec<u8>> = keys_of[chunk_id].iter().collect();
        for (prior, positions) in &metas[chunk_id].overrides {
            // Soundness: targets are earlier chunks, positions hold a key
            // that the later chunk re-wrote.
            let prior_idx = chunk_ids.iter().position(|c| c == prior).unwrap();
            assert!(prior_idx < idx);
            for pos in positions {
                assert!(incoming.contains(&keys_of[prior][*pos as usize]));
            }
        }
        // Completeness: every overlapping position of every earlier chunk
        // is recorded.
        for earlier in &chunk_ids[..idx] {
            let recorded: std::collections::HashSet<u32> = metas[chunk_id]
                .overrides
                .iter()
                .filter(|(prior, _)| prior == earlier)
                .flat_map(|(_, positions)| positions.iter().copied())
                .collect();
            for (pos, key) in keys_of[earlier].iter().enumerate() {
                if incoming.contains(key) {
                    assert!(recorded.contains(&(pos as u32)));
                }
            }
        }
    }

    // Read masking: exactly one live row per key, carrying its latest value.
    let reader = SegmentReader::new(&store, &dataset, &schema);
    let rows = reader
        .read_partition(DEFAULT_PARTITION, &["id".to_string(), "score".to_string()])
        .unwrap();
    assert_eq!(rows.len(), latest.len());
    for row in rows {
        match (&row.key, &row.values[1]) {
            (IngestValue::Long(id), IngestValue::Double(score)) => {
                assert_eq!(latest[id], *score);
            }
            other => panic!("unexpected row shape: {other:?}"),
        }
    }
}

#[test]
fn metadata_tier_drives_the_schema_for_flushes() {
    let meta = MemMetaStore::new();
    meta.new_dataset(players_dataset()).unwrap();
    meta.insert_column(Column::new("first", "players", 1, ColumnType::String))
        .unwrap();
    meta.insert_column(Column::new("age", "players", 1, ColumnType::Int))
        .unwrap();

    // Below the horizon the schema is empty; at it, both columns appear.
    assert!(meta.get_schema("players", 0).unwrap().is_empty());
    let schema = meta.get_schema("players", 1).unwrap();
    assert_eq!(schema.len(), 2);

    let store = MemSegmentStore::new();
    let dataset = meta.get_dataset("players").unwrap();
    let ids = ChunkIdGenerator::new();
    let flusher = SegmentFlusher::new(&store, &dataset, &schema, &ids);
    assert!(flusher.flush(&batch_of(&[("Rodney", 30)])).unwrap());

    let reader = SegmentReader::new(&store, &dataset, &schema);
    let rows = reader
        .read_partition(DEFAULT_PARTITION, &["age".to_string()])
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values, vec![IngestValue::Int(30)]);
}
