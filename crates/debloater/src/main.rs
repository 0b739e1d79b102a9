// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::*;
use colored::Colorize;
use debloat_build::{BuildOptions, TestOptions};
use log::{debug, LevelFilter};
use run::RunOptions;
use simplelog::{Config, SimpleLogger, TermLogger, TerminalMode, WriteLogger};

mod run;

#[derive(Parser)]
#[clap(
    name = env!("CARGO_BIN_NAME"),
    about = "Reduces a program snapshot to a smaller variant that still passes its recorded test suite, by iteratively deleting blocks or functions and re-validating",
    rename_all = "kebab-case",
    author,
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Args {
    /// Input program snapshot
    #[clap(long = "input", short = 'i')]
    pub input: PathBuf,

    /// Where to write the reduced snapshot
    #[clap(long = "out", short = 'o', default_value = "out.ir")]
    pub out: PathBuf,

    /// Working directory for per-trial artifacts
    #[clap(long = "workdir", short = 'w', default_value = "debloat-work")]
    pub workdir: PathBuf,

    /// Log level (off, error, warn, info, debug, trace)
    #[clap(long = "log-level", default_value = "info")]
    pub log_level: LevelFilter,

    /// Log file; logs go to the terminal otherwise
    #[clap(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Search options
    #[clap(flatten)]
    pub run: RunOptions,

    /// External build pipeline options
    #[clap(flatten)]
    pub build: BuildOptions,

    /// Test harness options
    #[clap(flatten)]
    pub test: TestOptions,
}

fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file `{}`", path.display()))?;
            WriteLogger::init(level, Config::default(), file)?;
        }
        None => {
            TermLogger::init(level, Config::default(), TerminalMode::Mixed)
                .or_else(|_| SimpleLogger::init(level, Config::default()))?;
        }
    }
    Ok(())
}

fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).unwrap();

    let args = Args::parse();

    if let Err(err) = init_logging(args.log_level, args.log_file.as_deref()) {
        eprintln!("{}", format!("{err:?}").bold().red());
        std::process::exit(1);
    }
    debug!("debloater version {}", env!("CARGO_PKG_VERSION"));

    match run::execute(args) {
        Ok(()) => (),
        Err(err) => {
            let err = format!("{err:?}");
            eprintln!("{}", err.bold().red());
            std::process::exit(1);
        }
    }
}
