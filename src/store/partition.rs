//! Block-cyclic fold assignment.
//!
//! The indicator is built from `floor(n / k)` whole blocks of `0..k` plus one
//! partial block `0..n % k`, each shuffled independently. Pairing the
//! indicator with the (optionally shuffled) row order gives every fold a test
//! share of `n / k` rows, one more for folds below `n % k`.

use rand::seq::SliceRandom;
use rand::Rng;

/// The row positions a fold trains and tests on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Row order for folding: `0..n`, shuffled on request.
pub fn row_order<R: Rng + ?Sized>(n: usize, shuffle: bool, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    if shuffle {
        order.shuffle(rng);
    }
    order
}

/// Per-position fold indicator over `n` rows for `k` folds.
pub fn fold_indicator<R: Rng + ?Sized>(n: usize, k: usize, rng: &mut R) -> Vec<usize> {
    let mut indicator = Vec::with_capacity(n);
    for _ in 0..n / k {
        let mut block: Vec<usize> = (0..k).collect();
        block.shuffle(rng);
        indicator.extend(block);
    }
    let mut partial: Vec<usize> = (0..n % k).collect();
    partial.shuffle(rng);
    indicator.extend(partial);
    indicator
}

/// Split `order` into fold `k`'s training and test rows: test rows are those
/// whose indicator equals `k`. An empty training set (k = 1) falls back to
/// the test set.
pub fn split(order: &[usize], indicator: &[usize], k: usize) -> FoldSplit {
    debug_assert_eq!(order.len(), indicator.len());
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (&row, &at) in order.iter().zip(indicator) {
        if at == k {
            test.push(row);
        } else {
            train.push(row);
        }
    }
    if train.is_empty() {
        train = test.clone();
    }
    FoldSplit { train, test }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
