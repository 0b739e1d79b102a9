// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Snapshot (de)serialization.
//!
//! The on-disk snapshot format is JSON; the textual assembly form is
//! produced by the external printer tool, not here.

use crate::model::Ir;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub fn load_ir(path: &Path) -> Result<Ir> {
    let file =
        File::open(path).with_context(|| format!("cannot open snapshot `{}`", path.display()))?;
    read_ir(BufReader::new(file))
        .with_context(|| format!("cannot parse snapshot `{}`", path.display()))
}

pub fn save_ir(ir: &Ir, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("cannot create `{}`", path.display()))?;
    write_ir(ir, BufWriter::new(file))
        .with_context(|| format!("cannot write snapshot `{}`", path.display()))
}

pub fn read_ir(reader: impl Read) -> Result<Ir> {
    let ir: Ir = serde_json::from_reader(reader)?;
    Ok(ir)
}

pub fn write_ir(ir: &Ir, mut writer: impl Write) -> Result<()> {
    serde_json::to_writer(&mut writer, ir)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Addr, EdgeKind, Module, SymbolKind};

    #[test]
    fn test_snapshot_survives_save_and_load() {
        let mut module = Module::new("m");
        let a = module.add_block(Addr(0x1000), 16);
        let b = module.add_block(Addr(0x1010), 8);
        module.add_edge(a, b, EdgeKind::Fallthrough);
        module.add_symbol("f", Some(a), SymbolKind::Global);
        module.add_function(&[a], &[a, b]);
        let ir = Ir::with_module(module);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.ir");
        save_ir(&ir, &path).unwrap();
        let loaded = load_ir(&path).unwrap();

        assert_eq!(loaded.block_count(), 2);
        assert_eq!(loaded.modules[0].edge_count(), 1);
        loaded.check_consistency().unwrap();
    }

    #[test]
    fn test_missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_ir(&dir.path().join("absent.ir")).is_err());
    }
}
