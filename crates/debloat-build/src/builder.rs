// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Turning a snapshot into an executable.
//!
//! The variant is serialized to the snapshot format, handed to the
//! external printer for assembly output, and linked together with the
//! trampoline stub object by the compiler driver. Every failure mode is a
//! value; callers decide whether a failed build is fatal.

use crate::runner;
use debloat_ir::{loader, Ir};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

/// Base name for per-trial artifacts: `out.ir`, `out.S`, `out`.
pub const BIN_NAME: &str = "out";

#[derive(clap::Args, Debug, Clone)]
#[clap(next_help_heading = "Build Options")]
pub struct BuildOptions {
    /// Printer command that renders a snapshot file to assembly
    #[clap(long = "pprinter", default_value = "ir-pprinter")]
    pub pprinter: String,

    /// Compiler driver used to assemble and link variants
    #[clap(long = "compiler", default_value = "gcc")]
    pub compiler: String,

    /// Object file supplying the trampoline stub body
    #[clap(long = "trampoline")]
    pub trampoline: PathBuf,

    /// Extra flags passed to the compiler driver
    #[clap(long = "build-flag", value_name = "FLAG")]
    pub build_flags: Vec<String>,

    /// Hard per-tool timeout for printer and compiler, in seconds
    #[clap(long = "build-timeout", default_value_t = 300)]
    pub build_timeout: u64,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(String),
    #[error("printer failed: {0}")]
    Printer(String),
    #[error("compiler failed: {0}")]
    Compiler(String),
}

pub struct Builder {
    options: BuildOptions,
}

impl Builder {
    pub fn new(options: BuildOptions) -> Self {
        Builder { options }
    }

    /// Creates `{name}.ir`, `{name}.S` and the executable `{name}` in
    /// `dir`, returning the executable path.
    pub fn build(&self, ir: &Ir, dir: &Path, name: &str) -> Result<PathBuf, BuildError> {
        let ir_file = dir.join(format!("{name}.ir"));
        let asm_file = dir.join(format!("{name}.S"));
        let exe_file = dir.join(name);
        let timeout = Duration::from_secs(self.options.build_timeout);

        debug!("serializing snapshot to {}", ir_file.display());
        loader::save_ir(ir, &ir_file).map_err(|e| BuildError::Serialize(e.to_string()))?;

        debug!("generating assembly");
        let printer_args = vec![
            self.options.pprinter.clone(),
            "-i".to_string(),
            ir_file.display().to_string(),
            "-o".to_string(),
            asm_file.display().to_string(),
        ];
        let output = runner::run_with_timeout(&printer_args, Stdio::null(), timeout)
            .map_err(|e| BuildError::Printer(e.to_string()))?;
        if !output.status.success() {
            return Err(BuildError::Printer(format!(
                "exit {} while printing {}",
                output.status,
                ir_file.display()
            )));
        }

        debug!("compiling");
        let mut build_args = vec![
            self.options.compiler.clone(),
            "-no-pie".to_string(),
            asm_file.display().to_string(),
            self.options.trampoline.display().to_string(),
        ];
        build_args.extend(self.options.build_flags.iter().cloned());
        build_args.push("-o".to_string());
        build_args.push(exe_file.display().to_string());
        let output = runner::run_with_timeout(&build_args, Stdio::null(), timeout)
            .map_err(|e| BuildError::Compiler(e.to_string()))?;
        if !output.status.success() {
            return Err(BuildError::Compiler(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        if !exe_file.exists() {
            return Err(BuildError::Compiler(format!(
                "no executable produced at {}",
                exe_file.display()
            )));
        }
        Ok(exe_file)
    }
}
