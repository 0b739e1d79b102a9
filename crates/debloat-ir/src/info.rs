// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Read-only queries over a snapshot: deletion universes and the symbol
//! name to function resolution used by function-level deletion.

use crate::model::{Addr, FunctionId, Ir, Module};
use std::collections::BTreeSet;

/// All deletable block addresses, in stable module/creation order. Proxy
/// blocks have no address and are excluded.
pub fn block_addresses(ir: &Ir) -> Vec<Addr> {
    let mut addresses = Vec::new();
    for module in &ir.modules {
        addresses.extend(module.blocks().filter_map(|(_, b)| b.address));
    }
    addresses
}

/// Resolves a symbol name to the function whose entry-block set contains
/// the symbol's referent, within one module.
pub fn resolve_function(module: &Module, name: &str) -> Option<FunctionId> {
    let referent = module
        .symbols()
        .find(|(_, s)| s.name == name)
        .and_then(|(_, s)| s.referent)?;
    module
        .function_entries()
        .iter()
        .find(|(_, entries)| entries.contains(&referent))
        .map(|(id, _)| *id)
}

/// Names of all functions in the snapshot: every symbol whose referent is
/// an entry block of some function, in stable order.
pub fn function_names(ir: &Ir) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = BTreeSet::new();
    for module in &ir.modules {
        for (_, symbol) in module.symbols() {
            let Some(referent) = symbol.referent else {
                continue;
            };
            let is_entry = module
                .function_entries()
                .values()
                .any(|entries| entries.contains(&referent));
            if is_entry && seen.insert(symbol.name.clone()) {
                names.push(symbol.name.clone());
            }
        }
    }
    names
}

/// Addresses of every member block of the named function, across all
/// modules. Empty when the name resolves to no function.
pub fn function_block_addresses(ir: &Ir, name: &str) -> BTreeSet<Addr> {
    let mut addresses = BTreeSet::new();
    for module in &ir.modules {
        let Some(function) = resolve_function(module, name) else {
            continue;
        };
        if let Some(members) = module.function_blocks().get(&function) {
            addresses.extend(
                members
                    .iter()
                    .filter_map(|id| module.block(*id).and_then(|b| b.address)),
            );
        }
    }
    addresses
}
