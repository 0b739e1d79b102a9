// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! End-to-end reduction drivers.
//!
//! Each strategy walks the deletion universe with an injected
//! [`Evaluator`] and returns the set of items found deletable. All of
//! them re-evaluate their final configuration once more so the last
//! recorded trial is the reported result.

use crate::dd::{minus, DeltaDebug};
use crate::{ConfigOracle, Evaluator, Outcome, Verdict};
use itertools::Itertools;
use log::{debug, info, warn};
use std::fmt;

/// Single pass over the universe: tentatively add each item to the
/// running deletion set and keep it iff the variant still passes.
pub fn linear_search<I, E>(evaluator: &mut E, universe: &[I]) -> Vec<I>
where
    I: Clone + Ord + fmt::Display,
    E: Evaluator<I>,
{
    let mut to_delete: Vec<I> = Vec::new();
    for item in universe {
        info!("linear: trying {item}");
        let mut candidate = to_delete.clone();
        candidate.push(item.clone());
        if evaluator.evaluate(&candidate).is_pass() {
            to_delete = candidate;
        }
    }
    info!(
        "linear: re-testing final configuration of {} items",
        to_delete.len()
    );
    evaluator.evaluate(&to_delete);
    to_delete
}

/// Recursive halving: accept a whole half if deleting it passes,
/// otherwise recurse into both halves and re-validate the combined
/// result. A combined result that fails is a known heuristic gap and
/// only logged. Recursion depth is bounded by ceil(log2(universe)).
pub fn bisect_search<I, E>(evaluator: &mut E, universe: &[I]) -> Vec<I>
where
    I: Clone + Ord + fmt::Display,
    E: Evaluator<I>,
{
    let to_delete = bisect(evaluator, universe);
    info!(
        "bisect: re-testing final configuration of {} items",
        to_delete.len()
    );
    if !evaluator.evaluate(&to_delete).is_pass() && !to_delete.is_empty() {
        warn!("bisect: final configuration does not pass; result is unreliable");
    }
    to_delete
}

fn bisect<I, E>(evaluator: &mut E, items: &[I]) -> Vec<I>
where
    I: Clone + Ord + fmt::Display,
    E: Evaluator<I>,
{
    if items.is_empty() {
        return Vec::new();
    }
    debug!(
        "bisect: trying {}",
        items.iter().map(|i| i.to_string()).join(" ")
    );
    if evaluator.evaluate(items).is_pass() {
        return items.to_vec();
    }
    if items.len() == 1 {
        return Vec::new();
    }
    let midpoint = items.len() / 2;
    let mut subset = bisect(evaluator, &items[..midpoint]);
    subset.extend(bisect(evaluator, &items[midpoint..]));
    if subset.len() > 1 {
        debug!("bisect: re-testing combined result of {} items", subset.len());
        if !evaluator.evaluate(&subset).is_pass() {
            warn!(
                "bisect: combined subset unexpectedly fails: {}",
                subset.iter().map(|i| i.to_string()).join(" ")
            );
        }
    }
    subset
}

/// Adapts the "behavior preserved?" evaluator into delta debugging's
/// failure-seeking polarity: a kept-set FAILs for the engine exactly when
/// deleting its complement passes the external tests.
struct InvertedOracle<'a, I, E> {
    universe: &'a [I],
    evaluator: &'a mut E,
}

impl<I, E> ConfigOracle<I> for InvertedOracle<'_, I, E>
where
    I: Clone + Ord,
    E: Evaluator<I>,
{
    fn test(&mut self, kept: &[I]) -> Outcome {
        let delete = minus(self.universe, kept);
        match self.evaluator.evaluate(&delete) {
            Verdict::Pass => Outcome::Fail,
            Verdict::Fail => Outcome::Pass,
        }
    }
}

/// DD-driven search: runs `ddmin` over the kept-set space and reports the
/// complement of the 1-minimal surviving set as deletable.
pub fn delta_search<I, E>(evaluator: &mut E, universe: &[I]) -> Vec<I>
where
    I: Clone + Ord + fmt::Display,
    E: Evaluator<I>,
{
    if evaluator.evaluate(universe).is_pass() {
        info!("delta: deleting the entire universe still passes");
        return universe.to_vec();
    }

    let kept = {
        let oracle = InvertedOracle {
            universe,
            evaluator: &mut *evaluator,
        };
        let mut dd = DeltaDebug::new(oracle);
        let kept = dd.ddmin(universe.to_vec());
        let stats = dd.cache_stats();
        debug!(
            "delta: cache {} hits, {} misses over {} entries",
            stats.hits, stats.misses, stats.entries
        );
        kept
    };
    info!(
        "delta: {} items are essential: {}",
        kept.len(),
        kept.iter().sorted().map(|i| i.to_string()).join(" ")
    );

    let to_delete = minus(universe, &kept);
    info!(
        "delta: re-testing final configuration of {} items",
        to_delete.len()
    );
    evaluator.evaluate(&to_delete);
    to_delete
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// Passes while no essential item has been deleted.
    struct EssentialEvaluator {
        essential: BTreeSet<char>,
        calls: usize,
    }

    impl EssentialEvaluator {
        fn new(essential: &[char]) -> Self {
            EssentialEvaluator {
                essential: essential.iter().copied().collect(),
                calls: 0,
            }
        }
    }

    impl Evaluator<char> for EssentialEvaluator {
        fn evaluate(&mut self, delete: &[char]) -> Verdict {
            self.calls += 1;
            if delete.iter().any(|i| self.essential.contains(i)) {
                Verdict::Fail
            } else {
                Verdict::Pass
            }
        }
    }

    #[test]
    fn test_linear_keeps_only_safe_deletions() {
        let universe = vec!['a', 'b', 'c', 'd', 'e'];
        let mut evaluator = EssentialEvaluator::new(&['c']);
        let deleted = linear_search(&mut evaluator, &universe);
        assert_eq!(deleted, vec!['a', 'b', 'd', 'e']);
        // One trial per item plus the final confirmation.
        assert_eq!(evaluator.calls, 6);
    }

    #[test]
    fn test_bisect_accepts_whole_half_without_recursing() {
        let universe: Vec<char> = "abcdefgh".chars().collect();
        let mut evaluator = EssentialEvaluator::new(&[]);
        let deleted = bisect_search(&mut evaluator, &universe);
        assert_eq!(deleted, universe);
        // Whole universe passes at once: one trial plus the confirmation.
        assert_eq!(evaluator.calls, 2);
    }

    #[test]
    fn test_bisect_narrows_around_essential_item() {
        let universe: Vec<char> = "abcdefgh".chars().collect();
        let mut evaluator = EssentialEvaluator::new(&['d']);
        let deleted = bisect_search(&mut evaluator, &universe);
        let expected: Vec<char> = "abcefgh".chars().collect();
        assert_eq!(
            deleted.iter().copied().sorted().collect::<Vec<_>>(),
            expected
        );
    }

    #[test]
    fn test_delta_search_isolates_essential_block() {
        // The program only works while block A is present.
        let universe = vec!['A', 'B', 'C', 'D'];
        let mut evaluator = EssentialEvaluator::new(&['A']);
        let deleted = delta_search(&mut evaluator, &universe);
        assert_eq!(
            deleted.iter().copied().sorted().collect::<Vec<_>>(),
            vec!['B', 'C', 'D']
        );
    }

    #[test]
    fn test_delta_search_short_circuits_when_everything_is_deletable() {
        let universe = vec!['a', 'b', 'c'];
        let mut evaluator = EssentialEvaluator::new(&[]);
        let deleted = delta_search(&mut evaluator, &universe);
        assert_eq!(deleted, universe);
    }

    #[test]
    fn test_polarity_round_trip() {
        // oracle(kept) == FAIL  <=>  evaluate(universe \ kept) == PASS
        let universe = vec!['a', 'b', 'c', 'd'];
        let kept_sets: Vec<Vec<char>> = vec![
            vec![],
            vec!['a'],
            vec!['b', 'c'],
            vec!['a', 'b', 'c', 'd'],
        ];
        for kept in kept_sets {
            let mut evaluator = EssentialEvaluator::new(&['b']);
            let expected = evaluator.evaluate(&minus(&universe, &kept));
            let mut oracle = InvertedOracle {
                universe: &universe,
                evaluator: &mut evaluator,
            };
            let inverted = oracle.test(&kept);
            assert_eq!(inverted == Outcome::Fail, expected == Verdict::Pass);
        }
    }
}
