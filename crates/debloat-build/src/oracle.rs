// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! The build-and-test oracle.
//!
//! One [`TrialOracle`] owns the immutable base snapshot for the whole
//! run. Every evaluation clones it, applies the requested deletions,
//! builds the variant in a fresh numbered directory and runs the recorded
//! test suite against it. Build and test failures are absorbed into a
//! `Fail` verdict; they never abort the search.

use crate::builder::{Builder, BIN_NAME};
use crate::tester::TestHarness;
use anyhow::{anyhow, bail, Context, Result};
use debloat_ir::{DeleteTarget, EditReport, Ir};
use debloat_search::{Evaluator, Verdict};
use itertools::Itertools;
use log::{debug, error, info, warn};
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SavePolicy {
    /// Keep no per-trial directories
    None,
    /// Keep the directories of passing trials
    Passing,
    /// Keep every trial directory
    All,
}

impl std::fmt::Display for SavePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SavePolicy::None => "none",
            SavePolicy::Passing => "passing",
            SavePolicy::All => "all",
        };
        write!(f, "{name}")
    }
}

pub struct TrialOracle<T> {
    base: Ir,
    builder: Builder,
    harness: TestHarness,
    workdir: PathBuf,
    save: SavePolicy,
    fail_fast: bool,
    trials: usize,
    passed_trials: usize,
    failed_trials: usize,
    original_size: Option<u64>,
    _items: PhantomData<T>,
}

impl<T: DeleteTarget> TrialOracle<T> {
    pub fn new(
        base: Ir,
        builder: Builder,
        harness: TestHarness,
        workdir: PathBuf,
        save: SavePolicy,
        fail_fast: bool,
    ) -> Self {
        TrialOracle {
            base,
            builder,
            harness,
            workdir,
            save,
            fail_fast,
            trials: 0,
            passed_trials: 0,
            failed_trials: 0,
            original_size: None,
            _items: PhantomData,
        }
    }

    /// The fixed deletion universe of the base snapshot.
    pub fn universe(&self) -> Vec<T> {
        T::universe(&self.base)
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    /// `(passing, failing)` trial counts so far.
    pub fn tally(&self) -> (usize, usize) {
        (self.passed_trials, self.failed_trials)
    }

    pub fn original_size(&self) -> Option<u64> {
        self.original_size
    }

    /// Applies the deletion set to a fresh clone of the base snapshot.
    pub fn reduce(&self, items: &[T]) -> (Ir, EditReport) {
        let mut variant = self.base.clone();
        let report = T::delete(&mut variant, items);
        (variant, report)
    }

    /// Builds and tests the unmodified base snapshot, recording the
    /// original executable size. A base that does not build, or fails
    /// its own suite, leaves no reference behavior to preserve: fatal.
    pub fn baseline(&mut self) -> Result<()> {
        info!("building baseline");
        let dir = tempfile::Builder::new()
            .prefix("baseline-")
            .tempdir_in(&self.workdir)
            .context("cannot create baseline working directory")?;
        let exe = self
            .builder
            .build(&self.base, dir.path(), BIN_NAME)
            .map_err(|e| anyhow!("baseline build failed: {e}"))?;
        let size = fs::metadata(&exe)
            .context("cannot stat baseline executable")?
            .len();
        let (passed, failed) = self.harness.run_tests(&exe, self.fail_fast);
        if failed != 0 {
            bail!("baseline fails its own test suite ({passed} passed, {failed} failed)");
        }
        info!("baseline: {size} bytes, {passed} tests pass");
        self.original_size = Some(size);
        Ok(())
    }

    fn finish(&mut self, dir: Option<tempfile::TempDir>, verdict: Verdict) -> Verdict {
        let label = match verdict {
            Verdict::Pass => {
                self.passed_trials += 1;
                "pass"
            }
            Verdict::Fail => {
                self.failed_trials += 1;
                "fail"
            }
        };
        info!(
            "{} (passed: {}, failed: {})",
            label.to_uppercase(),
            self.passed_trials,
            self.failed_trials
        );
        if let Some(dir) = dir {
            let keep = match self.save {
                SavePolicy::All => true,
                SavePolicy::Passing => verdict == Verdict::Pass,
                SavePolicy::None => false,
            };
            if keep {
                let dst = self.workdir.join(label).join(self.trials.to_string());
                if let Err(e) = copy_dir_all(dir.path(), &dst) {
                    error!(
                        "error copying {} to {}: {e}",
                        dir.path().display(),
                        dst.display()
                    );
                }
            }
        }
        verdict
    }
}

impl<T: DeleteTarget> Evaluator<T> for TrialOracle<T> {
    fn evaluate(&mut self, delete: &[T]) -> Verdict {
        self.trials += 1;
        let trial = self.trials;
        info!("trial #{trial}: deleting {} {}s", delete.len(), T::KIND);
        let listing = delete.iter().sorted().map(|i| i.to_string()).join(" ");
        debug!("trial #{trial}: {listing}");

        let (variant, report) = self.reduce(delete);
        debug!("trial #{trial}: {report}");

        let dir = match tempfile::Builder::new()
            .prefix(&format!("{trial}-"))
            .tempdir_in(&self.workdir)
        {
            Ok(dir) => dir,
            Err(e) => {
                error!("trial #{trial}: cannot create working directory: {e}");
                return self.finish(None, Verdict::Fail);
            }
        };
        if let Err(e) = fs::write(dir.path().join("deleted.txt"), format!("{listing}\n")) {
            warn!("trial #{trial}: cannot record deletion list: {e}");
        }

        let verdict = match self.builder.build(&variant, dir.path(), BIN_NAME) {
            Err(e) => {
                info!("trial #{trial}: {e}");
                Verdict::Fail
            }
            Ok(exe) => {
                let (_, failed) = self.harness.run_tests(&exe, self.fail_fast);
                if failed != 0 {
                    debug!("trial #{trial}: {failed} tests fail");
                    Verdict::Fail
                } else {
                    if let (Ok(meta), Some(original)) =
                        (fs::metadata(&exe), self.original_size)
                    {
                        info!(
                            "trial #{trial}: new size {} bytes, {:.2}% of original",
                            meta.len(),
                            meta.len() as f64 / original as f64 * 100.0
                        );
                    }
                    Verdict::Pass
                }
            }
        };
        self.finish(Some(dir), verdict)
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
