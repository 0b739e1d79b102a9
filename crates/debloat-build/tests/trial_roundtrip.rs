// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! End-to-end oracle check against stub external tools: a printer that
//! copies the snapshot and a "compiler" that emits a shell script whose
//! behavior depends on whether the `greet` symbol survived the edit.

#![cfg(unix)]

use debloat_build::{BuildOptions, Builder, SavePolicy, TestHarness, TestOptions, TrialOracle};
use debloat_ir::model::{Addr, Ir, Module, SymbolKind};
use debloat_search::{Evaluator, Verdict};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn stub_tools(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let pprinter = dir.join("stub-pprinter");
    write_script(&pprinter, "#!/bin/sh\ncp \"$2\" \"$4\"\n");

    let compiler = dir.join("stub-cc");
    write_script(
        &compiler,
        concat!(
            "#!/bin/sh\n",
            "asm=\"$2\"\n",
            "out=\"\"\n",
            "prev=\"\"\n",
            "for a in \"$@\"; do\n",
            "  if [ \"$prev\" = \"-o\" ]; then out=\"$a\"; fi\n",
            "  prev=\"$a\"\n",
            "done\n",
            "if grep -q greet \"$asm\"; then\n",
            "  printf '#!/bin/sh\\necho hello\\n' > \"$out\"\n",
            "else\n",
            "  printf '#!/bin/sh\\ntrue\\n' > \"$out\"\n",
            "fi\n",
            "chmod +x \"$out\"\n",
        ),
    );

    let limit = dir.join("stub-limit");
    write_script(&limit, "#!/bin/sh\nshift\nexec \"$@\"\n");

    (pprinter, compiler, limit)
}

fn sample_ir() -> Ir {
    let mut module = Module::new("m");
    let greet = module.add_block(Addr(0x100), 32);
    let unused = module.add_block(Addr(0x200), 16);
    module.add_symbol("greet", Some(greet), SymbolKind::Global);
    module.add_symbol("unused", Some(unused), SymbolKind::Global);
    Ir::with_module(module)
}

fn oracle_in(root: &Path, expected_stdout: &[u8]) -> TrialOracle<Addr> {
    let tools = root.join("tools");
    fs::create_dir_all(&tools).unwrap();
    let (pprinter, compiler, limit) = stub_tools(&tools);

    let trampoline = root.join("trampoline.o");
    fs::write(&trampoline, b"").unwrap();

    let cases = root.join("cases");
    let hello = cases.join("hello");
    fs::create_dir_all(&hello).unwrap();
    fs::write(hello.join("stdout"), expected_stdout).unwrap();
    fs::write(hello.join("stderr"), b"").unwrap();
    fs::write(hello.join("returncode"), b"0").unwrap();

    let harness = TestHarness::load(&TestOptions {
        tests_dir: cases,
        limit_bin: limit,
        limit_secs: 5,
        exhaustive: false,
    })
    .unwrap();

    let builder = Builder::new(BuildOptions {
        pprinter: pprinter.display().to_string(),
        compiler: compiler.display().to_string(),
        trampoline,
        build_flags: Vec::new(),
        build_timeout: 30,
    });

    let workdir = root.join("work");
    fs::create_dir_all(&workdir).unwrap();
    TrialOracle::new(
        sample_ir(),
        builder,
        harness,
        workdir,
        SavePolicy::All,
        true,
    )
}

#[test]
fn test_trials_pass_and_fail_by_deleted_symbol() {
    let root = tempfile::tempdir().unwrap();
    let mut oracle = oracle_in(root.path(), b"hello\n");

    oracle.baseline().unwrap();
    assert!(oracle.original_size().is_some());

    // Deleting the unused block keeps `greet` alive: still passes.
    assert_eq!(oracle.evaluate(&[Addr(0x200)]), Verdict::Pass);
    // Deleting the greeting block breaks the recorded behavior.
    assert_eq!(oracle.evaluate(&[Addr(0x100)]), Verdict::Fail);
    assert_eq!(oracle.tally(), (1, 1));

    // SavePolicy::All persisted both numbered trial directories.
    let work = root.path().join("work");
    assert!(work.join("pass").join("1").join("deleted.txt").is_file());
    assert!(work.join("fail").join("2").join("out.ir").is_file());
}

#[test]
fn test_baseline_failure_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    // Record an expectation the baseline can never meet.
    let mut oracle = oracle_in(root.path(), b"goodbye\n");
    assert!(oracle.baseline().is_err());
}
