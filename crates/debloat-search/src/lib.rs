// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Item-agnostic minimization machinery: the delta debugging engine with
//! its bounded result cache, and the linear/bisect/delta search strategies
//! that drive a build-and-test oracle towards a maximal deletable set.
//!
//! Nothing in this crate knows about program snapshots; items are opaque
//! ordered values and the oracle is an injected collaborator.

pub mod cache;
pub mod dd;
pub mod strategy;

pub use cache::{CacheStats, OutcomeCache};
pub use dd::{DeltaDebug, DeltaDiff};
pub use strategy::{bisect_search, delta_search, linear_search};

/// Three-valued result of testing one configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
    /// The trial could not be decided (e.g. an inconsistent intermediate
    /// configuration); `resolve` hooks may repair it.
    Unresolved,
}

/// Which way a `resolve` hook should adjust an unresolved trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Add items to the trial.
    Add,
    /// Remove items from the trial.
    Remove,
}

impl Direction {
    pub fn flipped(self) -> Direction {
        match self {
            Direction::Add => Direction::Remove,
            Direction::Remove => Direction::Add,
        }
    }
}

/// Two-valued answer of the build-and-test adapter: does the variant
/// still behave correctly?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        self == Verdict::Pass
    }
}

/// The oracle seam of the delta debugging engine. Configurations are
/// order-preserving slices of items; implementations must be
/// deterministic for caching to be sound.
pub trait ConfigOracle<I> {
    fn test(&mut self, config: &[I]) -> Outcome;

    /// Domain-specific repair of an unresolved trial; the default knows
    /// no repairs.
    fn resolve(&mut self, _trial: &[I], _config: &[I], _direction: Direction) -> Option<Vec<I>> {
        None
    }
}

/// The strategy-facing oracle seam: build and test the variant obtained
/// by deleting `items` from the base snapshot.
pub trait Evaluator<I> {
    fn evaluate(&mut self, delete: &[I]) -> Verdict;
}
