// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! External collaborators of the reducer: the printer/compiler pipeline
//! that turns a snapshot into an executable, the wall-clock-limited test
//! harness, and the oracle adapter that combines both into a single
//! pass/fail predicate over deletion sets.

pub mod builder;
pub mod oracle;
pub mod runner;
pub mod tester;

pub use builder::{BuildError, BuildOptions, Builder};
pub use oracle::{SavePolicy, TrialOracle};
pub use tester::{HarnessError, TestHarness, TestOptions};
