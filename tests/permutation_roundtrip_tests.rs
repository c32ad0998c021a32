//! Build permutations, persist them, and read them back through scans.

mod test_data_gen;

use std::sync::Arc;

use test_data_gen::{fs_storage, id, random_triples, small_config};
use tristore_core::block::BlockSource;
use tristore_core::error::Error;
use tristore_core::permutation::Permutation;
use tristore_index::{PermutationBuilder, PermutationScan, RelationSegmenter};
use tristore_io::{MemoryStorage, PermutationFileReader, PermutationFileWriter};
use tristore_mem::{Codec, MemoryBudgetImpl, Storage};

fn replay(scan: &PermutationScan) -> Vec<[u64; 3]> {
    let mut out = Vec::new();
    for table in scan.scan_all() {
        let table = table.expect("scan table");
        out.extend(table.rows().map(|r| [r[0].get(), r[1].get(), r[2].get()]));
    }
    out
}

#[test]
fn built_pair_survives_the_filesystem() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_str().expect("utf8").to_string();
    let storage = fs_storage();
    let spill = format!("{root}/spill");
    let builder = PermutationBuilder::new(
        small_config(&spill),
        MemoryBudgetImpl::unbounded(),
        Arc::clone(&storage),
    )
    .expect("builder");

    let triples = random_triples(11, 3_000, 200, 4);
    let primary =
        PermutationFileWriter::create(Arc::clone(&storage), root.as_str(), "pso", 2, Codec::None)
            .expect("pso writer");
    let twin =
        PermutationFileWriter::create(Arc::clone(&storage), root.as_str(), "pos", 2, Codec::None)
            .expect("pos writer");
    let (pair, stats) = builder
        .build(triples.clone(), Permutation::Pso, primary, twin)
        .expect("build");
    assert_eq!(stats.input_triples, 3_000);
    assert!(stats.runs_written > 1);

    let (pso_catalog, pso_writer) = pair.primary.into_catalog();
    let (pos_catalog, pos_writer) = pair.twin.into_catalog();
    pso_writer.finish(&pso_catalog).expect("finish pso");
    pos_writer.finish(&pos_catalog).expect("finish pos");

    let mut expected: Vec<[u64; 3]> = triples
        .iter()
        .map(|t| Permutation::Pso.apply(*t).map(|v| v.get()))
        .collect();
    expected.sort();
    expected.dedup();
    assert_eq!(stats.unique_triples, expected.len() as u64);

    let (reader, catalog) =
        PermutationFileReader::open(Arc::clone(&storage), &root, "pso").expect("open pso");
    assert_eq!(catalog.blocks, pso_catalog.blocks);
    let scan = PermutationScan::new(catalog, Arc::new(reader));
    assert_eq!(replay(&scan), expected);

    let mut twin_expected: Vec<[u64; 3]> = expected.iter().map(|t| [t[0], t[2], t[1]]).collect();
    twin_expected.sort();
    let (reader, catalog) = PermutationFileReader::open(storage, &root, "pos").expect("open pos");
    let twin_scan = PermutationScan::new(catalog, Arc::new(reader));
    assert_eq!(replay(&twin_scan), twin_expected);

    // Column 2 multiplicities of one side are column 1 multiplicities of the other.
    for (a, b) in pso_catalog.relations.iter().zip(&pos_catalog.relations) {
        assert_eq!(a.key, b.key);
        assert_eq!(a.multiplicity_col2, b.multiplicity_col1);
        assert_eq!(a.multiplicity_col1, b.multiplicity_col2);
    }
}

#[test]
fn one_large_relation_fills_exclusive_blocks() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let writer = PermutationFileWriter::create(Arc::clone(&storage), "idx", "pso", 2, Codec::None)
        .expect("writer");
    let mut seg = RelationSegmenter::new(writer, "pso", 2, 100, &MemoryBudgetImpl::unbounded())
        .expect("segmenter");
    for i in 0..1_000_000u64 {
        seg.push(id(7), &[id(i + 1), id(1)]).expect("push");
    }
    let (catalog, writer) = seg.finish().expect("finish").into_catalog();
    writer.finish(&catalog).expect("persist");

    assert_eq!(catalog.blocks.len(), 10_000);
    assert!(catalog.blocks.iter().all(|b| b.num_rows == 100));
    assert_eq!(catalog.relations.len(), 1);
    let rel = &catalog.relations[0];
    assert_eq!(rel.num_rows, 1_000_000);
    assert!(!rel.is_embedded());
    assert!(rel.is_functional());

    let (reader, reopened) = PermutationFileReader::open(storage, "idx", "pso").expect("open");
    let scan = PermutationScan::new(reopened, Arc::new(reader));
    let mut blocks = scan.scan_key(id(7));
    let rows: usize = blocks
        .by_ref()
        .map(|s| s.expect("slice").tails.num_rows())
        .sum();
    assert_eq!(rows, 1_000_000);
    assert_eq!(blocks.progress().blocks_read, 10_000);
}

#[test]
fn multiplicity_matches_the_distinct_count() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let writer = PermutationFileWriter::create(Arc::clone(&storage), "idx", "spo", 2, Codec::None)
        .expect("writer");
    let mut seg = RelationSegmenter::new(writer, "spo", 2, 64, &MemoryBudgetImpl::unbounded())
        .expect("segmenter");
    // 10 rows over 3 distinct first tail values.
    for (c1, n) in [(1u64, 4u64), (2, 3), (3, 3)] {
        for j in 0..n {
            seg.push(id(5), &[id(c1), id(j + 1)]).expect("push");
        }
    }
    let (catalog, writer) = seg.finish().expect("finish").into_catalog();
    writer.finish(&catalog).expect("persist");

    let (_, reopened) = PermutationFileReader::open(storage, "idx", "spo").expect("open");
    let rel = reopened.relation(id(5)).expect("relation");
    assert!((rel.multiplicity_col1 - 10.0 / 3.0).abs() < 1e-6);
    assert!(rel.is_embedded());
}

#[test]
fn corrupted_block_fails_the_scan() {
    let memory = MemoryStorage::new();
    let storage: Arc<dyn Storage> = Arc::new(memory.clone());
    let writer = PermutationFileWriter::create(Arc::clone(&storage), "idx", "osp", 2, Codec::None)
        .expect("writer");
    let mut seg = RelationSegmenter::new(writer, "osp", 2, 4, &MemoryBudgetImpl::unbounded())
        .expect("segmenter");
    for i in 0..12u64 {
        seg.push(id(1), &[id(i + 1), id(i + 100)]).expect("push");
    }
    let (catalog, writer) = seg.finish().expect("finish").into_catalog();
    writer.finish(&catalog).expect("persist");
    let second = catalog.blocks[1].offset as usize;
    assert!(memory.corrupt_byte("idx/osp.blocks", second + 1));

    let (reader, reopened) = PermutationFileReader::open(storage, "idx", "osp").expect("open");
    assert!(reader.read_block(&reopened.blocks[0]).is_ok());
    let scan = PermutationScan::new(reopened, Arc::new(reader));
    let mut it = scan.scan_key(id(1));
    assert!(it.next().expect("first").is_ok());
    let err = it.next().expect("second").expect_err("corrupt block");
    assert!(matches!(
        tristore_core::error::Error::from(err),
        Error::Corrupt(_)
    ));
    assert!(it.next().is_none());
}
