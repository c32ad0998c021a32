//! Shared data generators for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tristore_core::config::EngineConfig;
use tristore_core::id::ValueId;
use tristore_core::table::IdTable;
use tristore_core::vocab::{LocalVocab, LocalVocabBuilder};
use tristore_io::FsStorage;
use tristore_mem::Storage;

pub fn id(v: u64) -> ValueId {
    ValueId::new(v)
}

/// Random `(s, p, o)` triples, all values defined. Few predicates, so the
/// predicate-keyed permutations get large relations.
pub fn random_triples(seed: u64, count: usize, subjects: u64, predicates: u64) -> Vec<[ValueId; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            [
                id(rng.gen_range(1..=subjects)),
                id(rng.gen_range(1..=predicates)),
                id(rng.gen_range(1..=subjects)),
            ]
        })
        .collect()
}

/// Two-column table sorted on column 0, keys drawn from `1..=keys`.
pub fn sorted_pairs(seed: u64, rows: usize, keys: u64) -> IdTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data: Vec<[u64; 2]> = (0..rows)
        .map(|i| [rng.gen_range(1..=keys), i as u64 + 1])
        .collect();
    data.sort();
    IdTable::from_rows(2, &data).expect("sorted pairs")
}

/// A local vocabulary holding exactly `words`.
pub fn vocab(words: &[&str]) -> LocalVocab {
    let mut builder = LocalVocabBuilder::new();
    for w in words {
        builder.add(*w);
    }
    builder.finalize()
}

/// Small blocks and a small sorter so a few thousand rows exercise spills
/// and exclusive blocks.
pub fn small_config(spill_dir: &str) -> EngineConfig {
    EngineConfig {
        block_size_bytes: 64 * 16,
        sorter_memory_bytes: 256 * 24,
        sort_page_rows: 32,
        join_chunk_size: 50,
        spill_dir: spill_dir.to_string(),
        ..EngineConfig::default()
    }
}

pub fn fs_storage() -> Arc<dyn Storage> {
    Arc::new(FsStorage::new())
}
