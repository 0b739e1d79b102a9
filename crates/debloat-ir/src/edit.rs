// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Consistency-preserving deletion of blocks and functions.
//!
//! `remove_blocks` is the single mutation primitive: it deletes blocks by
//! address and rewrites everything that referred to them, so that a variant
//! handed to the printer never contains a dangling reference. Requested
//! addresses that do not exist are skipped with a warning; the procedure
//! has no other failure mode.

use crate::info;
use crate::model::{Addr, BlockId, Edge, EdgeId, FunctionId, Ir, Module, SymbolId, SymbolicExpr};
use itertools::Itertools;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What one edit removed and rewrote. Also the `(removedEdges,
/// removedSymbols)` half of the editor contract; the variant itself is the
/// mutated snapshot.
#[derive(Clone, Debug, Default)]
pub struct EditReport {
    /// Addresses of the blocks actually deleted.
    pub removed_blocks: BTreeSet<Addr>,
    /// Edges deleted because an endpoint went away.
    pub removed_edges: Vec<Edge>,
    /// Names of symbols deleted because their referent went away.
    pub removed_symbols: Vec<String>,
    /// Single-symbol references repointed at the trampoline.
    pub redirected_refs: usize,
    /// Locations of dual-symbol references deleted outright.
    pub dropped_refs: BTreeSet<Addr>,
    /// Functions purged because their entry set became empty.
    pub purged_functions: usize,
    /// Requested addresses that matched no block (warned, non-fatal).
    pub skipped: BTreeSet<Addr>,
    /// Requested function names that resolved to no function.
    pub skipped_names: BTreeSet<String>,
}

impl fmt::Display for EditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks, {} edges, {} symbols removed; {} refs redirected, {} dropped; {} functions purged",
            self.removed_blocks.len(),
            self.removed_edges.len(),
            self.removed_symbols.len(),
            self.redirected_refs,
            self.dropped_refs.len(),
            self.purged_functions,
        )?;
        if !self.skipped.is_empty() || !self.skipped_names.is_empty() {
            write!(
                f,
                "; {} items skipped",
                self.skipped.len() + self.skipped_names.len()
            )?;
        }
        Ok(())
    }
}

/// Bidirectional incidence index over a module's edges. Built once per
/// edit so removing a block costs O(degree) instead of a full edge-list
/// rescan.
struct Adjacency {
    incoming: BTreeMap<BlockId, BTreeSet<EdgeId>>,
    outgoing: BTreeMap<BlockId, BTreeSet<EdgeId>>,
}

impl Adjacency {
    fn build(module: &Module) -> Self {
        let mut incoming: BTreeMap<BlockId, BTreeSet<EdgeId>> = BTreeMap::new();
        let mut outgoing: BTreeMap<BlockId, BTreeSet<EdgeId>> = BTreeMap::new();
        for (id, edge) in module.edges() {
            outgoing.entry(edge.source).or_default().insert(id);
            incoming.entry(edge.target).or_default().insert(id);
        }
        Adjacency { incoming, outgoing }
    }

    /// Pulls all edges incident to `block` out of the index, unlinking
    /// them from the neighbours' entries, and returns their ids.
    fn detach(&mut self, block: BlockId, edges: &BTreeMap<EdgeId, Edge>) -> BTreeSet<EdgeId> {
        let mut incident = BTreeSet::new();
        incident.extend(self.outgoing.remove(&block).unwrap_or_default());
        incident.extend(self.incoming.remove(&block).unwrap_or_default());
        for id in &incident {
            if let Some(edge) = edges.get(id) {
                if let Some(out) = self.outgoing.get_mut(&edge.source) {
                    out.remove(id);
                }
                if let Some(inc) = self.incoming.get_mut(&edge.target) {
                    inc.remove(id);
                }
            }
        }
        incident
    }
}

/// Deletes the blocks with the given addresses from the snapshot, keeping
/// it structurally consistent: incident edges and stale symbols are
/// removed, single-symbol references into deleted code are redirected to
/// the module trampoline, dual-symbol references are dropped, and emptied
/// functions are purged from the bookkeeping maps.
pub fn remove_blocks(ir: &mut Ir, addresses: &BTreeSet<Addr>) -> EditReport {
    let mut report = EditReport::default();
    if addresses.is_empty() {
        return report;
    }
    debug!(
        "removing blocks {}",
        addresses.iter().map(|a| a.to_string()).join(" ")
    );
    let mut found = BTreeSet::new();
    for module in &mut ir.modules {
        remove_module_blocks(module, addresses, &mut found, &mut report);
    }
    for addr in addresses.difference(&found) {
        warn!("no block with address {addr} found");
        report.skipped.insert(*addr);
    }
    report
}

fn remove_module_blocks(
    module: &mut Module,
    addresses: &BTreeSet<Addr>,
    found: &mut BTreeSet<Addr>,
    report: &mut EditReport,
) {
    let by_addr = module.blocks_by_address();
    let mut adjacency = Adjacency::build(module);

    let mut removed: BTreeSet<BlockId> = BTreeSet::new();
    let mut removed_edges: BTreeSet<EdgeId> = BTreeSet::new();
    for addr in addresses {
        let Some(&block) = by_addr.get(addr) else {
            continue;
        };
        found.insert(*addr);
        report.removed_blocks.insert(*addr);
        removed.insert(block);
        removed_edges.extend(adjacency.detach(block, &module.edges));
    }
    if removed.is_empty() {
        return;
    }

    // Symbols whose referent is going away are deleted before the blocks
    // themselves; the reference pass below keys off this set.
    let stale_symbols: BTreeMap<SymbolId, String> = module
        .symbols
        .iter()
        .filter(|(_, s)| s.referent.is_some_and(|r| removed.contains(&r)))
        .map(|(id, s)| (*id, s.name.clone()))
        .collect();
    for id in stale_symbols.keys() {
        module.symbols.remove(id);
    }

    // Single-symbol references into deleted code get the trampoline; a
    // dual-symbol reference encodes an address difference that no single
    // substitute can preserve, so it is dropped entirely.
    let mut redirect = Vec::new();
    let mut dropped = Vec::new();
    for (at, expr) in &module.symbolic_exprs {
        match expr {
            SymbolicExpr::SymAddr { symbol, .. } if stale_symbols.contains_key(symbol) => {
                redirect.push(*at);
            }
            SymbolicExpr::SymAddrDiff {
                minuend,
                subtrahend,
                ..
            } if stale_symbols.contains_key(minuend)
                || stale_symbols.contains_key(subtrahend) =>
            {
                dropped.push(*at);
            }
            _ => {}
        }
    }
    if !redirect.is_empty() {
        let trampoline = module.trampoline_symbol();
        for at in &redirect {
            if let Some(SymbolicExpr::SymAddr { symbol, .. }) = module.symbolic_exprs.get_mut(at) {
                *symbol = trampoline;
            }
        }
    }
    for at in &dropped {
        module.symbolic_exprs.remove(at);
    }

    // Structural commit.
    for block in &removed {
        module.blocks.remove(block);
    }
    for id in &removed_edges {
        if let Some(edge) = module.edges.remove(id) {
            report.removed_edges.push(edge);
        }
    }

    // Function bookkeeping: subtract the removed blocks, then purge any
    // function whose entry set became empty. Surviving non-entry members
    // of a purged function stay in the CFG.
    for members in module.function_blocks.values_mut() {
        members.retain(|b| !removed.contains(b));
    }
    let mut purged: Vec<FunctionId> = Vec::new();
    for (id, entries) in module.function_entries.iter_mut() {
        entries.retain(|b| !removed.contains(b));
        if entries.is_empty() {
            purged.push(*id);
        }
    }
    for id in &purged {
        module.function_entries.remove(id);
        module.function_blocks.remove(id);
        debug!("purged emptied function {id}");
    }

    report.removed_symbols.extend(stale_symbols.into_values());
    report.redirected_refs += redirect.len();
    report.dropped_refs.extend(dropped);
    report.purged_functions += purged.len();
}

/// Deletes whole functions by name: each name is resolved to its function
/// and expanded to the full member-block set, then everything goes through
/// `remove_blocks` at once. Unresolvable names are warned and skipped.
pub fn remove_functions(ir: &mut Ir, names: &[String]) -> EditReport {
    let mut delete = BTreeSet::new();
    let mut skipped_names = BTreeSet::new();
    for name in names {
        let addresses = info::function_block_addresses(ir, name);
        if addresses.is_empty() {
            warn!("no function named `{name}` found");
            skipped_names.insert(name.clone());
        } else {
            delete.extend(addresses);
        }
    }
    let mut report = remove_blocks(ir, &delete);
    report.skipped_names = skipped_names;
    report
}

/// A deletable item kind: block addresses or function names. Strategies
/// and the oracle are generic over this, so block-level and function-level
/// runs share all of the search machinery.
pub trait DeleteTarget: Clone + Ord + fmt::Display {
    /// Noun used in logs and reports.
    const KIND: &'static str;

    /// The fixed deletion universe of a snapshot, in stable order.
    fn universe(ir: &Ir) -> Vec<Self>;

    /// Deletes the given items from the snapshot.
    fn delete(ir: &mut Ir, items: &[Self]) -> EditReport;
}

impl DeleteTarget for Addr {
    const KIND: &'static str = "block";

    fn universe(ir: &Ir) -> Vec<Addr> {
        info::block_addresses(ir)
    }

    fn delete(ir: &mut Ir, items: &[Addr]) -> EditReport {
        remove_blocks(ir, &items.iter().copied().collect())
    }
}

impl DeleteTarget for String {
    const KIND: &'static str = "function";

    fn universe(ir: &Ir) -> Vec<String> {
        info::function_names(ir)
    }

    fn delete(ir: &mut Ir, items: &[String]) -> EditReport {
        remove_functions(ir, items)
    }
}
