//! Joins in arbitrary caller layouts against a nested-loop reference.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tristore_core::cancel::CancellationHandle;
use tristore_core::config::EngineConfig;
use tristore_core::table::IdTable;
use tristore_exec::{JoinInput, JoinRequest, LazyJoinOrchestrator};
use tristore_mem::MemoryBudgetImpl;
use tristore_operators::{JoinColumnMapping, UndefPolicy};

fn random_table(rng: &mut StdRng, width: usize, rows: usize, domain: u64) -> Vec<Vec<u64>> {
    (0..rows)
        .map(|_| (0..width).map(|_| rng.gen_range(1..=domain)).collect())
        .collect()
}

fn to_table(width: usize, rows: &[Vec<u64>]) -> IdTable {
    IdTable::from_rows(width, rows).expect("table")
}

fn sorted_on(width: usize, rows: &[Vec<u64>], cols: &[usize]) -> IdTable {
    let mut t = to_table(width, rows);
    t.sort_by_columns(cols).expect("sort");
    t
}

fn nested_loop(
    left: &[Vec<u64>],
    right: &[Vec<u64>],
    pairs: &[(usize, usize)],
    keep: bool,
) -> Vec<Vec<u64>> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if pairs.iter().all(|&(a, b)| l[a] == r[b]) {
                let mut row: Vec<u64> = l
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| keep || !pairs.iter().any(|p| p.0 == *i))
                    .map(|(_, v)| *v)
                    .collect();
                row.extend(
                    r.iter()
                        .enumerate()
                        .filter(|(i, _)| !pairs.iter().any(|p| p.1 == *i))
                        .map(|(_, v)| *v),
                );
                out.push(row);
            }
        }
    }
    out.sort();
    out
}

fn rows_of(t: &IdTable) -> Vec<Vec<u64>> {
    let mut rows: Vec<Vec<u64>> = t.rows().map(|r| r.iter().map(|v| v.get()).collect()).collect();
    rows.sort();
    rows
}

fn orchestrator() -> LazyJoinOrchestrator {
    LazyJoinOrchestrator::new(
        EngineConfig {
            gallop_threshold: 8,
            ..EngineConfig::default()
        },
        MemoryBudgetImpl::unbounded(),
    )
    .expect("orchestrator")
}

#[test]
fn layouts_match_the_reference_join() {
    let mut rng = StdRng::seed_from_u64(42);
    let cases: &[(&[(usize, usize)], usize, usize)] = &[
        (&[(0, 2)], 2, 3),
        (&[(1, 1)], 3, 2),
        (&[(2, 0), (0, 1)], 3, 3),
        (&[(3, 0)], 4, 1),
        (&[(0, 1), (1, 0)], 2, 2),
        // one left column equal to two right columns
        (&[(0, 0), (0, 1)], 2, 3),
        // no pairs: cross product
        (&[], 2, 2),
    ];
    for (round, &(pairs, nl, nr)) in cases.iter().cycle().take(28).enumerate() {
        let keep = round % 2 == 0;
        let left = random_table(&mut rng, nl, 60, 6);
        let right = random_table(&mut rng, nr, 40, 6);
        let lcols: Vec<usize> = pairs.iter().map(|p| p.0).collect();
        let rcols: Vec<usize> = pairs.iter().map(|p| p.1).collect();

        let request = JoinRequest::new(pairs.to_vec(), nl, nr).with_keep_join_columns(keep);
        let out = orchestrator()
            .join_eager(
                &request,
                JoinInput::materialized(sorted_on(nl, &left, &lcols)),
                JoinInput::materialized(sorted_on(nr, &right, &rcols)),
                &CancellationHandle::new(),
            )
            .expect("join");
        assert_eq!(
            out.table.num_columns(),
            request.mapping().expect("mapping").num_result_columns()
        );
        assert_eq!(
            rows_of(&out.table),
            nested_loop(&left, &right, pairs, keep),
            "pairs {pairs:?}, keep {keep}"
        );
    }
}

#[test]
fn galloping_path_matches_the_reference_join() {
    let mut rng = StdRng::seed_from_u64(5);
    let small = random_table(&mut rng, 2, 5, 500);
    let large = random_table(&mut rng, 3, 400, 500);
    let pairs = [(1usize, 2usize)];
    let request = JoinRequest::new(pairs.to_vec(), 2, 3)
        .with_undef_policies(UndefPolicy::NeverUndefined, UndefPolicy::NeverUndefined);
    let out = orchestrator()
        .join_eager(
            &request,
            JoinInput::materialized(sorted_on(2, &small, &[1])),
            JoinInput::materialized(sorted_on(3, &large, &[2])),
            &CancellationHandle::new(),
        )
        .expect("join");
    assert_eq!(rows_of(&out.table), nested_loop(&small, &large, &pairs, true));
}

#[test]
fn undefined_join_values_match_nothing() {
    let left = vec![vec![0, 1], vec![3, 2]];
    let right = vec![vec![0, 7], vec![3, 8]];
    let out = orchestrator()
        .join_eager(
            &JoinRequest::new(vec![(0, 0)], 2, 2),
            JoinInput::materialized(to_table(2, &left)),
            JoinInput::materialized(to_table(2, &right)),
            &CancellationHandle::new(),
        )
        .expect("join");
    assert_eq!(rows_of(&out.table), vec![vec![3, 2, 8]]);
}

#[test]
fn mapping_inverts_through_the_canonical_layout() {
    let mut rng = StdRng::seed_from_u64(8);
    let m = JoinColumnMapping::compute(&[(2, 1), (0, 3)], 4, 4, true).expect("mapping");
    let left = to_table(4, &random_table(&mut rng, 4, 10, 100));
    let canonical = m.left_to_canonical(&left).expect("canonical");
    assert_eq!(canonical.num_columns(), 4);
    for (orig, canon) in left.rows().zip(canonical.rows()) {
        assert_eq!(canon[0], orig[2]);
        assert_eq!(canon[1], orig[0]);
        assert_eq!(&canon[2..], &[orig[1], orig[3]]);
    }
    assert_eq!(m.num_canonical_columns(), 6);
    assert_eq!(m.num_result_columns(), 6);
}
