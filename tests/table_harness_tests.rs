//! Randomized model checks of every container: blocks, block-based tables,
//! plain tables and memtables.

mod common;

use std::sync::Arc;

use common::{check, constructors, init_logger, Model};
use tablestore::comparator::{BytewiseComparator, Comparator, ReverseBytewiseComparator};

fn comparators() -> Vec<(Arc<dyn Comparator>, bool)> {
    vec![(Arc::new(BytewiseComparator), true), (Arc::new(ReverseBytewiseComparator), false)]
}

fn run_all(model_of: impl Fn(Arc<dyn Comparator>, u64) -> Model) {
    init_logger();
    for (cmp, bytewise_order) in comparators() {
        for (i, constructor) in constructors(bytewise_order).iter().enumerate() {
            let seed = 301 + i as u64;
            let model = model_of(Arc::clone(&cmp), seed);
            check(constructor.as_ref(), &model, seed);
        }
    }
}

#[test]
fn test_empty() {
    run_all(|cmp, _| Model::new(cmp, Vec::new()));
}

#[test]
fn test_empty_key() {
    run_all(|cmp, _| Model::new(cmp, vec![(Vec::new(), b"v".to_vec())]));
}

#[test]
fn test_single_ff_key() {
    run_all(|cmp, _| Model::new(cmp, vec![(b"\xff\xff".to_vec(), b"v3".to_vec())]));
}

#[test]
fn test_simple_special_keys() {
    run_all(|cmp, _| {
        Model::new(
            cmp,
            vec![
                (b"\xff\xff".to_vec(), b"v3".to_vec()),
                (b"abc".to_vec(), b"v1".to_vec()),
                (b"abd".to_vec(), Vec::new()),
                (Vec::new(), b"v0".to_vec()),
            ],
        )
    });
}

#[test]
fn test_randomized() {
    for n in [1, 10, 97, 500, 2000] {
        run_all(|cmp, seed| Model::random(cmp, &mut common::rng(seed * 31 + n as u64), n));
    }
}

#[test]
fn test_large_values() {
    run_all(|cmp, seed| {
        let mut rng = common::rng(seed);
        let entries = (0..50)
            .map(|i| (format!("k{:03}", i).into_bytes(), common::random_value(&mut rng, 5000)))
            .collect();
        Model::new(cmp, entries)
    });
}
