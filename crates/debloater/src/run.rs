// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Wires the snapshot, the build/test oracle and a search strategy into
//! one reduction run.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use debloat_build::{Builder, SavePolicy, TestHarness, TrialOracle};
use debloat_ir::model::Addr;
use debloat_ir::{loader, DeleteTarget};
use debloat_search::strategy;
use itertools::Itertools;
use log::info;
use std::fmt;
use std::fs;
use std::time::Instant;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Delete individual basic blocks
    Blocks,
    /// Delete whole functions
    Functions,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Blocks => write!(f, "blocks"),
            Mode::Functions => write!(f, "functions"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// One keep-iff-passing pass over the universe
    Linear,
    /// Recursive halving with whole-half acceptance
    Bisect,
    /// Delta debugging over the kept-set space
    Delta,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Linear => write!(f, "linear"),
            Strategy::Bisect => write!(f, "bisect"),
            Strategy::Delta => write!(f, "delta"),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
#[clap(next_help_heading = "Search Options")]
pub struct RunOptions {
    /// Deletion granularity
    #[clap(long, value_enum, default_value_t = Mode::Functions)]
    pub mode: Mode,

    /// Search strategy
    #[clap(long, value_enum, default_value_t = Strategy::Delta)]
    pub strategy: Strategy,

    /// Which per-trial directories to keep
    #[clap(long, value_enum, default_value_t = SavePolicy::None)]
    pub save: SavePolicy,

    /// Items never offered for deletion, matched by display name
    #[clap(
        long = "keep",
        value_name = "NAME",
        default_values_t = [String::from("main"), String::from("_start")]
    )]
    pub keep: Vec<String>,
}

pub fn execute(args: crate::Args) -> Result<()> {
    let ir = loader::load_ir(&args.input)?;
    info!(
        "loaded `{}`: {} blocks in {} modules",
        args.input.display(),
        ir.block_count(),
        ir.modules.len()
    );
    fs::create_dir_all(&args.workdir).with_context(|| {
        format!("cannot create working directory `{}`", args.workdir.display())
    })?;

    let harness = TestHarness::load(&args.test)?;
    if harness.case_count() == 0 {
        bail!(
            "no test cases found under `{}`",
            args.test.tests_dir.display()
        );
    }
    info!("{} test cases loaded", harness.case_count());

    let builder = Builder::new(args.build.clone());
    let fail_fast = !args.test.exhaustive;

    match args.run.mode {
        Mode::Blocks => run_search::<Addr>(ir, builder, harness, fail_fast, &args),
        Mode::Functions => run_search::<String>(ir, builder, harness, fail_fast, &args),
    }
}

fn run_search<T: DeleteTarget>(
    ir: debloat_ir::Ir,
    builder: Builder,
    harness: TestHarness,
    fail_fast: bool,
    args: &crate::Args,
) -> Result<()> {
    let mut oracle = TrialOracle::<T>::new(
        ir,
        builder,
        harness,
        args.workdir.clone(),
        args.run.save,
        fail_fast,
    );
    oracle.baseline()?;

    let mut universe = oracle.universe();
    universe.retain(|item| !args.run.keep.contains(&item.to_string()));
    if universe.is_empty() {
        bail!("nothing to delete: the {} universe is empty", T::KIND);
    }
    info!("universe: {} {}s", universe.len(), T::KIND);

    let start = Instant::now();
    let to_delete = match args.run.strategy {
        Strategy::Linear => strategy::linear_search(&mut oracle, &universe),
        Strategy::Bisect => strategy::bisect_search(&mut oracle, &universe),
        Strategy::Delta => strategy::delta_search(&mut oracle, &universe),
    };
    let runtime = start.elapsed();

    info!(
        "deletable {}s: {}",
        T::KIND,
        to_delete.iter().sorted().map(|i| i.to_string()).join(" ")
    );
    let (passed, failed) = oracle.tally();
    info!(
        "{} of {} {}s deletable after {} trials ({passed} passing, {failed} failing) in {runtime:?}",
        to_delete.len(),
        universe.len(),
        T::KIND,
        oracle.trials(),
    );

    let (variant, report) = oracle.reduce(&to_delete);
    info!("final edit: {report}");
    loader::save_ir(&variant, &args.out)?;
    info!("reduced snapshot written to `{}`", args.out.display());
    Ok(())
}
