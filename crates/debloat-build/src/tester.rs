// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Recorded-oracle test harness.
//!
//! A test case is a directory `tests_dir/<id>/` holding `args`
//! (whitespace-separated, optional), an optional `input` fed to stdin,
//! and the recorded `stdout`, `stderr` and `returncode` the candidate
//! binary must reproduce. Every case runs under the wall-clock limit
//! wrapper so a wedged variant cannot stall the whole reduction.

use crate::runner;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

#[derive(clap::Args, Debug, Clone)]
#[clap(next_help_heading = "Test Options")]
pub struct TestOptions {
    /// Directory of recorded test cases
    #[clap(long = "tests-dir", default_value = "tests")]
    pub tests_dir: PathBuf,

    /// Wall-clock limiting wrapper the tests run under
    #[clap(long = "limit-bin", default_value = "limit")]
    pub limit_bin: PathBuf,

    /// Per-test wall-clock limit in seconds
    #[clap(long = "test-limit", default_value_t = 1)]
    pub limit_secs: u64,

    /// Keep running a trial's tests after the first failure
    #[clap(long = "exhaustive")]
    pub exhaustive: bool,
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("could not run limit wrapper `{0}`: {1}; is it built and on PATH?")]
    LimitUnavailable(String, String),
    #[error("could not scan tests directory `{0}`: {1}")]
    Scan(String, String),
    #[error("malformed test case `{0}`: {1}")]
    Case(String, String),
}

#[derive(Debug, Clone)]
struct TestCase {
    id: String,
    args: Vec<String>,
    input: Option<PathBuf>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    returncode: i32,
    /// Total size of the recorded files; cheap tests run first.
    weight: u64,
}

impl TestCase {
    fn load(dir: &Path) -> Result<TestCase, HarnessError> {
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let read = |name: &str| {
            fs::read(dir.join(name)).map_err(|e| {
                HarnessError::Case(id.clone(), format!("cannot read `{name}`: {e}"))
            })
        };
        let stdout = read("stdout")?;
        let stderr = read("stderr")?;
        let returncode = String::from_utf8_lossy(&read("returncode")?)
            .trim()
            .parse::<i32>()
            .map_err(|e| HarnessError::Case(id.clone(), format!("bad returncode: {e}")))?;
        let args = fs::read_to_string(dir.join("args"))
            .map(|text| text.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let input_path = dir.join("input");
        let input = input_path.is_file().then_some(input_path);
        let weight = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0);
        Ok(TestCase {
            id,
            args,
            input,
            stdout,
            stderr,
            returncode,
            weight,
        })
    }
}

#[derive(Debug)]
pub struct TestHarness {
    limit_bin: String,
    limit_secs: u64,
    cases: Vec<TestCase>,
}

impl TestHarness {
    /// Loads every case under the tests directory, probing the limit
    /// wrapper once up front. A wrapper that cannot be invoked at all
    /// aborts the whole run before any search starts.
    pub fn load(options: &TestOptions) -> Result<TestHarness, HarnessError> {
        let limit_bin = options.limit_bin.display().to_string();
        if let Err(e) = runner::run(&[limit_bin.clone()]) {
            return Err(HarnessError::LimitUnavailable(limit_bin, e.to_string()));
        }

        let dir = &options.tests_dir;
        let entries = fs::read_dir(dir)
            .map_err(|e| HarnessError::Scan(dir.display().to_string(), e.to_string()))?;
        let mut cases = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| HarnessError::Scan(dir.display().to_string(), e.to_string()))?;
            if entry.path().is_dir() {
                cases.push(TestCase::load(&entry.path())?);
            }
        }
        cases.sort_by(|a, b| (a.weight, &a.id).cmp(&(b.weight, &b.id)));
        debug!("loaded {} test cases from {}", cases.len(), dir.display());
        Ok(TestHarness {
            limit_bin,
            limit_secs: options.limit_secs,
            cases,
        })
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// Runs the suite against `binary`, returning `(passed, failed)`.
    pub fn run_tests(&self, binary: &Path, fail_fast: bool) -> (usize, usize) {
        let mut passed = 0;
        let mut failed = 0;
        for case in &self.cases {
            if self.run_one(binary, case) {
                debug!("{}: ok", case.id);
                passed += 1;
            } else {
                debug!("{}: FAIL", case.id);
                failed += 1;
                if fail_fast {
                    break;
                }
            }
        }
        debug!("passed: {passed}, failed: {failed}");
        (passed, failed)
    }

    fn run_one(&self, binary: &Path, case: &TestCase) -> bool {
        let mut args = vec![
            self.limit_bin.clone(),
            self.limit_secs.to_string(),
            binary.display().to_string(),
        ];
        args.extend(case.args.iter().cloned());

        let stdin = match &case.input {
            Some(path) => match fs::File::open(path) {
                Ok(file) => Stdio::from(file),
                Err(e) => {
                    warn!("{}: cannot open input: {e}", case.id);
                    return false;
                }
            },
            None => Stdio::null(),
        };

        // The wrapper enforces the real limit; the margin here is only a
        // backstop against a wedged wrapper.
        let timeout = Duration::from_secs(self.limit_secs + 30);
        match runner::run_with_timeout(&args, stdin, timeout) {
            Ok(output) => {
                output.status.code() == Some(case.returncode)
                    && output.stdout == case.stdout
                    && output.stderr == case.stderr
            }
            Err(e) => {
                warn!("{}: could not run test: {e}", case.id);
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// A pass-through limit wrapper: drops the seconds argument and execs
    /// the command.
    fn fake_limit(dir: &Path) -> PathBuf {
        let path = dir.join("limit");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"#!/bin/sh\nshift\nexec \"$@\"\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn write_case(dir: &Path, id: &str, args: &str, stdout: &[u8], returncode: &str) {
        let case = dir.join(id);
        fs::create_dir_all(&case).unwrap();
        fs::write(case.join("args"), args).unwrap();
        fs::write(case.join("stdout"), stdout).unwrap();
        fs::write(case.join("stderr"), b"").unwrap();
        fs::write(case.join("returncode"), returncode).unwrap();
    }

    fn harness(root: &Path) -> TestHarness {
        let options = TestOptions {
            tests_dir: root.join("cases"),
            limit_bin: fake_limit(root),
            limit_secs: 1,
            exhaustive: false,
        };
        TestHarness::load(&options).unwrap()
    }

    #[test]
    fn test_matching_output_passes() {
        let root = tempfile::tempdir().unwrap();
        write_case(&root.path().join("cases"), "hello", "hello", b"hello\n", "0");
        let harness = harness(root.path());
        assert_eq!(harness.case_count(), 1);
        assert_eq!(harness.run_tests(Path::new("/bin/echo"), true), (1, 0));
    }

    #[test]
    fn test_mismatching_output_fails_fast() {
        let root = tempfile::tempdir().unwrap();
        let cases = root.path().join("cases");
        write_case(&cases, "bad", "x", b"not what echo prints\n", "0");
        write_case(&cases, "zz-good", "ok this is long enough", b"ok this is long enough\n", "0");
        let harness = harness(root.path());
        // The cheap failing case runs first and stops the suite.
        assert_eq!(harness.run_tests(Path::new("/bin/echo"), true), (0, 1));
        // Exhaustive mode keeps going.
        assert_eq!(harness.run_tests(Path::new("/bin/echo"), false), (1, 1));
    }

    #[test]
    fn test_unavailable_limit_wrapper_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("cases")).unwrap();
        let options = TestOptions {
            tests_dir: root.path().join("cases"),
            limit_bin: root.path().join("no-such-limit"),
            limit_secs: 1,
            exhaustive: false,
        };
        match TestHarness::load(&options) {
            Err(HarnessError::LimitUnavailable(..)) => {}
            other => panic!("expected LimitUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_case_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let case = root.path().join("cases").join("broken");
        fs::create_dir_all(&case).unwrap();
        fs::write(case.join("stdout"), b"").unwrap();
        let options = TestOptions {
            tests_dir: root.path().join("cases"),
            limit_bin: fake_limit(root.path()),
            limit_secs: 1,
            exhaustive: false,
        };
        match TestHarness::load(&options) {
            Err(HarnessError::Case(id, _)) => assert_eq!(id, "broken"),
            other => panic!("expected Case error, got {other:?}"),
        }
    }
}
