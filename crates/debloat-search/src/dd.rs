// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Delta debugging engine (Zeller's ddmin/dddiff family).
//!
//! The engine is generic over the item type and operates on
//! order-preserving configurations; every set operation filters against
//! the first operand so splits stay deterministic. All oracle queries go
//! through the session's bounded [`OutcomeCache`].

use crate::cache::{CacheStats, OutcomeCache};
use crate::{ConfigOracle, Direction, Outcome};
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fmt;

/// Result of [`DeltaDebug::dddiff`]: a minimal failure-inducing
/// difference `delta` between a passing and a failing configuration.
#[derive(Clone, Debug)]
pub struct DeltaDiff<I> {
    pub delta: Vec<I>,
    pub passing: Vec<I>,
    pub failing: Vec<I>,
}

/// One minimization session over an injected oracle.
pub struct DeltaDebug<I, O> {
    oracle: O,
    cache: OutcomeCache<I>,
    minimize: bool,
    maximize: bool,
    /// The full configuration `ddgen` was started with; complement
    /// probing is relative to this.
    universe: Vec<I>,
}

impl<I, O> DeltaDebug<I, O>
where
    I: Clone + Ord + fmt::Display,
    O: ConfigOracle<I>,
{
    pub fn new(oracle: O) -> Self {
        DeltaDebug::with_cache(oracle, OutcomeCache::new())
    }

    pub fn with_cache(oracle: O, cache: OutcomeCache<I>) -> Self {
        DeltaDebug {
            oracle,
            cache,
            minimize: true,
            maximize: false,
            universe: Vec::new(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn into_oracle(self) -> O {
        self.oracle
    }

    /// Tests a configuration through the cache.
    pub fn test_config(&mut self, config: &[I]) -> Outcome {
        if let Some(outcome) = self.cache.get(config) {
            return outcome;
        }
        let outcome = self.oracle.test(config);
        self.cache.insert(config, outcome);
        outcome
    }

    /// Computes a 1-minimal failing subset of `c`.
    pub fn ddmin(&mut self, c: Vec<I>) -> Vec<I> {
        self.ddgen(c, true, false)
    }

    /// Computes a maximal passing superset boundary by complement probing.
    pub fn ddmax(&mut self, c: Vec<I>) -> Vec<I> {
        self.ddgen(c, false, true)
    }

    /// Combines forward and complement probing.
    pub fn ddmix(&mut self, c: Vec<I>) -> Vec<I> {
        self.ddgen(c, true, true)
    }

    /// The generalized minimizing algorithm; `minimize` and `maximize`
    /// select which of the two probes in each round contribute progress.
    pub fn ddgen(&mut self, c: Vec<I>, minimize: bool, maximize: bool) -> Vec<I> {
        self.minimize = minimize;
        self.maximize = maximize;
        self.universe = c.clone();

        let empty = self.test_config(&[]);
        if empty != Outcome::Pass {
            warn!("dd: the empty configuration does not pass ({empty:?}); nothing to minimize against");
        }
        self.do_dd(c, 2)
    }

    fn do_dd(&mut self, mut c: Vec<I>, mut n: usize) -> Vec<I> {
        let mut run = 1usize;
        let mut cbar_offset = 0usize;
        let mut last_reported = usize::MAX;

        loop {
            let tc = self.test_config(&c);
            if tc == Outcome::Pass {
                warn!("dd: current configuration unexpectedly passes; returning it");
                return c;
            }
            let stats = self.cache.stats();
            debug!(
                "dd: cache {} hits, {} misses, {} entries",
                stats.hits, stats.misses, stats.entries
            );

            if n > c.len() {
                info!("dd: done");
                return c;
            }
            report_progress(&c, &mut last_reported);

            let mut cs = split(&c, n);
            info!(
                "dd (run #{run}): trying {}",
                cs.iter().map(|s| s.len().to_string()).join("+")
            );

            let mut c_failed = false;
            let mut cbar_failed = false;
            let mut next_c = c.clone();
            let mut next_n = n;

            // Does some part alone reproduce the failure?
            for part in cs.iter_mut() {
                let (t, reduced) = self.test_mix(part.clone(), &c, Direction::Remove);
                *part = reduced;
                if t == Outcome::Fail {
                    debug!("dd: found failing part of {} deltas", part.len());
                    c_failed = true;
                    next_c = part.clone();
                    next_n = 2;
                    cbar_offset = 0;
                    report_progress(&next_c, &mut last_reported);
                    break;
                }
            }

            // Else, does some complement? Start at the round-robin offset
            // so we do not keep re-probing the same index first.
            if !c_failed {
                for j in 0..n {
                    let i = (j + cbar_offset) % n;
                    let complement = minus(&c, &cs[i]);
                    let (t, complement) = self.test_mix(complement, &c, Direction::Add);

                    let doubled = intersect(&complement, &cs[i]);
                    if !doubled.is_empty() {
                        cs[i] = minus(&cs[i], &doubled);
                    }

                    if t == Outcome::Fail {
                        debug!("dd: reduced to complement of {} deltas", complement.len());
                        cbar_failed = true;
                        next_c = intersect(&next_c, &complement);
                        next_n = next_n.saturating_sub(1).max(2);
                        cbar_offset = i;
                        report_progress(&next_c, &mut last_reported);
                        break;
                    }
                }
            }

            if !c_failed && !cbar_failed {
                if n >= c.len() {
                    info!("dd: done");
                    return c;
                }
                next_n = (n * 2).min(c.len());
                info!("dd: increase granularity to {next_n}");
                cbar_offset = (cbar_offset * next_n) / n;
            }

            c = next_c;
            n = next_n;
            run += 1;
        }
    }

    /// Computes a minimal failing difference between the empty (passing)
    /// configuration and `c` (failing).
    pub fn dddiff(&mut self, c: Vec<I>) -> DeltaDiff<I> {
        self.minimize = true;
        self.maximize = false;
        self.universe = c.clone();
        self.do_dddiff(Vec::new(), c, 2)
    }

    fn do_dddiff(&mut self, mut c1: Vec<I>, mut c2: Vec<I>, mut n: usize) -> DeltaDiff<I> {
        let mut run = 1usize;
        let mut cbar_offset = 0usize;
        let mut last_reported = usize::MAX;

        loop {
            debug_assert!(subseteq(&c1, &c2));
            let c = minus(&c2, &c1);

            if n > c.len() {
                info!("dd: done");
                return DeltaDiff {
                    delta: c,
                    passing: c1,
                    failing: c2,
                };
            }
            report_progress(&c, &mut last_reported);

            let cs = split(&c, n);
            info!(
                "dd (run #{run}): trying {}",
                cs.iter().map(|s| s.len().to_string()).join("+")
            );

            let mut progress = false;
            let mut next_c1 = c1.clone();
            let mut next_c2 = c2.clone();
            let mut next_n = n;

            for j in 0..n {
                let i = (j + cbar_offset) % n;

                // Subset probe: c1 + cs[i].
                let (t, csub) = self.test_and_resolve(&cs[i], &c1, &c, Direction::Remove);
                let csub = union(&c1, &csub);
                if t == Outcome::Fail {
                    progress = true;
                    next_c2 = csub;
                    next_n = 2;
                    cbar_offset = 0;
                    debug!("dd: reduce c2 to {} deltas", next_c2.len());
                    break;
                }
                if t == Outcome::Pass {
                    progress = true;
                    next_c1 = csub;
                    next_n = next_n.saturating_sub(1).max(2);
                    cbar_offset = i;
                    debug!("dd: increase c1 to {} deltas", next_c1.len());
                    break;
                }

                // Complement probe: c1 + (c \ cs[i]).
                let complement = minus(&c, &cs[i]);
                let (t, csub) = self.test_and_resolve(&complement, &c1, &c, Direction::Add);
                let csub = union(&c1, &csub);
                if t == Outcome::Pass {
                    progress = true;
                    next_c1 = csub;
                    next_n = 2;
                    cbar_offset = 0;
                    debug!("dd: increase c1 to {} deltas", next_c1.len());
                    break;
                }
                if t == Outcome::Fail {
                    progress = true;
                    next_c2 = csub;
                    next_n = next_n.saturating_sub(1).max(2);
                    cbar_offset = i;
                    debug!("dd: reduce c2 to {} deltas", next_c2.len());
                    break;
                }
            }

            if progress {
                let remaining = minus(&next_c2, &next_c1);
                report_progress(&remaining, &mut last_reported);
            } else {
                if n >= c.len() {
                    info!("dd: done");
                    return DeltaDiff {
                        delta: c,
                        passing: c1,
                        failing: c2,
                    };
                }
                next_n = (n * 2).min(c.len());
                info!("dd: increase granularity to {next_n}");
                cbar_offset = (cbar_offset * next_n) / n;
            }

            c1 = next_c1;
            c2 = next_c2;
            n = next_n;
            run += 1;
        }
    }

    /// One probe, honouring the `minimize`/`maximize` switches. With
    /// `maximize` the complement of the trial is tested against the
    /// complement of `c` and the outcome polarity is inverted.
    fn test_mix(&mut self, mut csub: Vec<I>, c: &[I], direction: Direction) -> (Outcome, Vec<I>) {
        let mut t = Outcome::Unresolved;
        if self.minimize {
            let (tm, reduced) = self.test_and_resolve(&csub, &[], c, direction);
            t = tm;
            csub = reduced;
            if t == Outcome::Fail {
                return (t, csub);
            }
        }
        if self.maximize {
            let universe = self.universe.clone();
            let csubbar = minus(&universe, &csub);
            let cbar = minus(&universe, c);
            let (tbar, csubbar) =
                self.test_and_resolve(&csubbar, &[], &cbar, direction.flipped());
            csub = minus(&universe, &csubbar);
            t = match tbar {
                Outcome::Pass => Outcome::Fail,
                Outcome::Fail => Outcome::Pass,
                Outcome::Unresolved => Outcome::Unresolved,
            };
        }
        (t, csub)
    }

    /// Tests `csub + r`, repeatedly asking the oracle's `resolve` hook to
    /// repair unresolved trials. Gives up once the adjusted trial
    /// degenerates to one of the already-tested baselines.
    fn test_and_resolve(
        &mut self,
        csub: &[I],
        r: &[I],
        c: &[I],
        direction: Direction,
    ) -> (Outcome, Vec<I>) {
        let initial: Vec<I> = csub.to_vec();
        let c2 = union(r, c);
        let mut csubr = union(csub, r);
        let mut t = self.test_config(&csubr);

        while t == Outcome::Unresolved {
            let Some(adjusted) = self.oracle.resolve(&csubr, c, direction) else {
                return (Outcome::Unresolved, initial);
            };
            if adjusted.len() >= c2.len() || adjusted.len() <= r.len() {
                // Degenerated to the full union or the fixed subset,
                // both of which have been tested already.
                return (Outcome::Unresolved, initial);
            }
            csubr = adjusted;
            t = self.test_config(&csubr);
        }
        (t, minus(&csubr, r))
    }
}

/// Splits `c` into `n` contiguous parts of near-equal size; when the
/// length is not divisible by `n`, the earlier parts receive the larger
/// share. Deterministic given `c`'s order.
pub fn split<I: Clone>(c: &[I], n: usize) -> Vec<Vec<I>> {
    let n = n.max(1);
    let quota = c.len() / n;
    let rest = c.len() % n;
    let mut parts = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = quota + usize::from(i < rest);
        parts.push(c[start..start + size].to_vec());
        start += size;
    }
    parts
}

fn report_progress<I: fmt::Display + Ord>(c: &[I], last_reported: &mut usize) {
    if c.len() != *last_reported {
        info!("dd: {} deltas left", c.len());
        debug!("dd: {}", c.iter().sorted().map(|i| i.to_string()).join(" "));
        *last_reported = c.len();
    }
}

/// Elements of `a` not in `b`, in `a`'s order.
pub(crate) fn minus<I: Clone + Ord>(a: &[I], b: &[I]) -> Vec<I> {
    let exclude: BTreeSet<&I> = b.iter().collect();
    a.iter().filter(|x| !exclude.contains(x)).cloned().collect()
}

/// Elements common to `a` and `b`, in `a`'s order.
fn intersect<I: Clone + Ord>(a: &[I], b: &[I]) -> Vec<I> {
    let keep: BTreeSet<&I> = b.iter().collect();
    a.iter().filter(|x| keep.contains(x)).cloned().collect()
}

/// `a` followed by the elements of `b` not already in `a`.
fn union<I: Clone + Ord>(a: &[I], b: &[I]) -> Vec<I> {
    let mut result = a.to_vec();
    let have: BTreeSet<&I> = a.iter().collect();
    result.extend(b.iter().filter(|x| !have.contains(x)).cloned());
    result
}

fn subseteq<I: Ord>(a: &[I], b: &[I]) -> bool {
    let superset: BTreeSet<&I> = b.iter().collect();
    a.iter().all(|x| superset.contains(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// Fails exactly when every needed item is in the configuration.
    struct SubsetFailOracle {
        needed: BTreeSet<u32>,
        calls: usize,
    }

    impl SubsetFailOracle {
        fn new(needed: &[u32]) -> Self {
            SubsetFailOracle {
                needed: needed.iter().copied().collect(),
                calls: 0,
            }
        }
    }

    impl ConfigOracle<u32> for SubsetFailOracle {
        fn test(&mut self, config: &[u32]) -> Outcome {
            self.calls += 1;
            let config: BTreeSet<u32> = config.iter().copied().collect();
            if self.needed.is_subset(&config) {
                Outcome::Fail
            } else {
                Outcome::Pass
            }
        }
    }

    #[test]
    fn test_split_gives_earlier_parts_the_larger_share() {
        let c: Vec<u32> = (0..10).collect();
        let parts = split(&c, 3);
        assert_eq!(
            parts.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );
        assert_eq!(parts.concat(), c);

        let parts = split(&c[..5], 2);
        assert_eq!(parts.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn test_ddmin_isolates_conjunctive_cause() {
        let universe: Vec<u32> = (0..12).collect();
        let mut dd = DeltaDebug::new(SubsetFailOracle::new(&[2, 5, 8]));
        let minimal = dd.ddmin(universe);
        assert_eq!(minimal.iter().copied().sorted().collect::<Vec<_>>(), vec![2, 5, 8]);
    }

    #[test]
    fn test_ddmin_result_is_one_minimal() {
        let universe: Vec<u32> = (0..9).collect();
        let mut dd = DeltaDebug::new(SubsetFailOracle::new(&[1, 4, 7]));
        let minimal = dd.ddmin(universe);

        let mut check = SubsetFailOracle::new(&[1, 4, 7]);
        assert_eq!(check.test(&minimal), Outcome::Fail);
        for drop in &minimal {
            let without: Vec<u32> = minimal.iter().filter(|x| *x != drop).copied().collect();
            assert_ne!(check.test(&without), Outcome::Fail);
        }
    }

    #[test]
    fn test_cached_queries_do_not_hit_the_oracle_twice() {
        let mut dd = DeltaDebug::new(SubsetFailOracle::new(&[1]));
        dd.test_config(&[3, 1, 2]);
        dd.test_config(&[1, 2, 3]);
        dd.test_config(&[2, 1, 3]);
        assert_eq!(dd.cache_stats().hits, 2);
        assert_eq!(dd.into_oracle().calls, 1);
    }

    #[test]
    fn test_ddmax_isolates_single_cause_by_complements() {
        let universe: Vec<u32> = (0..8).collect();
        let mut dd = DeltaDebug::new(SubsetFailOracle::new(&[5]));
        let result = dd.ddmax(universe);
        assert_eq!(result, vec![5]);
    }

    #[test]
    fn test_dddiff_finds_singleton_delta() {
        let universe: Vec<u32> = (0..8).collect();
        let mut dd = DeltaDebug::new(SubsetFailOracle::new(&[3]));
        let diff = dd.dddiff(universe);
        assert_eq!(diff.delta, vec![3]);
        let mut check = SubsetFailOracle::new(&[3]);
        assert_eq!(check.test(&diff.passing), Outcome::Pass);
        assert_eq!(check.test(&diff.failing), Outcome::Fail);
    }

    /// Item 4 only makes sense in configurations that also carry item 2;
    /// alone it is unresolved. `resolve` repairs accordingly.
    struct PairedOracle;

    impl ConfigOracle<u32> for PairedOracle {
        fn test(&mut self, config: &[u32]) -> Outcome {
            let config: BTreeSet<u32> = config.iter().copied().collect();
            if config.contains(&4) && !config.contains(&2) {
                Outcome::Unresolved
            } else if config.contains(&4) && config.contains(&2) {
                Outcome::Fail
            } else {
                Outcome::Pass
            }
        }

        fn resolve(&mut self, trial: &[u32], _c: &[u32], direction: Direction) -> Option<Vec<u32>> {
            match direction {
                Direction::Remove => Some(trial.iter().filter(|x| **x != 4).copied().collect()),
                Direction::Add => {
                    let mut adjusted = trial.to_vec();
                    if !adjusted.contains(&2) {
                        adjusted.push(2);
                    }
                    Some(adjusted)
                }
            }
        }
    }

    #[test]
    fn test_resolve_hook_repairs_unresolved_trials() {
        let mut dd = DeltaDebug::new(PairedOracle);
        let minimal = dd.ddmin(vec![1, 2, 3, 4]);
        assert_eq!(minimal.iter().copied().sorted().collect::<Vec<_>>(), vec![2, 4]);
    }
}
