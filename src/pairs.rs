use std::fmt;

use itertools::structs::TupleCombinations;
use itertools::Itertools;

use crate::catalog::Entity;

/// Order-independent identity of a drug pair: the two unique ids, sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    lo: String,
    hi: String,
}

impl PairKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            PairKey { lo: a, hi: b }
        } else {
            PairKey { lo: b, hi: a }
        }
    }

    pub fn of(a: &Entity, b: &Entity) -> Self {
        PairKey::new(a.unique_id.as_str(), b.unique_id.as_str())
    }

    pub fn lo(&self) -> &str {
        &self.lo
    }

    pub fn hi(&self) -> &str {
        &self.hi
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.lo, self.hi)
    }
}

/// Number of unordered pairs over `n` items.
pub fn pair_count(n: usize) -> u64 {
    let n = n as u64;
    n * n.saturating_sub(1) / 2
}

/// Lazy i < j combinations over a catalog, in source order.
///
/// Restart by building a new `Pairs` from the same slice; the order is
/// fully determined by the catalog.
pub struct Pairs<'a> {
    inner: TupleCombinations<std::slice::Iter<'a, Entity>, (&'a Entity, &'a Entity)>,
    remaining: u64,
}

impl<'a> Pairs<'a> {
    pub fn new(catalog: &'a [Entity]) -> Self {
        Pairs {
            inner: catalog.iter().tuple_combinations(),
            remaining: pair_count(catalog.len()),
        }
    }

    pub fn total(catalog: &[Entity]) -> u64 {
        pair_count(catalog.len())
    }
}

impl<'a> Iterator for Pairs<'a> {
    type Item = (&'a Entity, &'a Entity);

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.inner.next()?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Pairs<'_> {}
