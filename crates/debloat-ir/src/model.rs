// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Entity model for program snapshots.
//!
//! A snapshot ([`Ir`]) owns a list of [`Module`]s. Each module is a small
//! arena: blocks, edges, symbols and symbolic references live in maps keyed
//! by module-scoped ids, and every cross-entity relation is expressed
//! through those ids rather than through embedded references.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Name of the synthesized external symbol that stale references are
/// redirected to. The concrete no-op body is supplied at link time by the
/// trampoline stub object.
pub const TRAMPOLINE_SYMBOL: &str = "__debloat_trampoline";

/// Stable address of a code block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Addr(pub u64);

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Module-scoped block id. Identifies both regular and proxy blocks.
    BlockId, "b"
);
define_id!(
    /// Module-scoped control-flow edge id.
    EdgeId, "e"
);
define_id!(
    /// Module-scoped symbol id.
    SymbolId, "s"
);
define_id!(
    /// Module-scoped function id.
    FunctionId, "f"
);

/// A unit of code. Blocks with `address == None` are proxy placeholders for
/// external control-flow targets; they are never deletion candidates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub address: Option<Addr>,
    pub size: u64,
}

impl Block {
    pub fn is_proxy(&self) -> bool {
        self.address.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    Fallthrough,
    Branch,
    Call,
    Return,
}

/// Directed control-flow relation between two blocks. Multiple edges may
/// connect the same pair of blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: BlockId,
    pub target: BlockId,
    pub kind: EdgeKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Local,
    Global,
    Extern,
}

/// A named reference to a block, or to nothing (external/undefined).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub referent: Option<BlockId>,
    pub kind: SymbolKind,
}

/// Instruction-level symbolic use, keyed by the address it occurs at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolicExpr {
    /// Address-of one symbol, plus a constant offset.
    SymAddr { symbol: SymbolId, offset: i64 },
    /// Difference of two symbols' addresses, plus a constant offset.
    SymAddrDiff {
        minuend: SymbolId,
        subtrahend: SymbolId,
        offset: i64,
    },
}

/// One linkage unit of the snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub(crate) blocks: BTreeMap<BlockId, Block>,
    pub(crate) edges: BTreeMap<EdgeId, Edge>,
    pub(crate) symbols: BTreeMap<SymbolId, Symbol>,
    pub(crate) symbolic_exprs: BTreeMap<Addr, SymbolicExpr>,
    /// Function id -> all member blocks.
    pub(crate) function_blocks: BTreeMap<FunctionId, BTreeSet<BlockId>>,
    /// Function id -> entry blocks (non-empty subset of the member blocks).
    pub(crate) function_entries: BTreeMap<FunctionId, BTreeSet<BlockId>>,
    /// Lazily created redirection target, at most one per module.
    pub(crate) trampoline: Option<SymbolId>,
    next_block: u32,
    next_edge: u32,
    next_symbol: u32,
    next_function: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_block(&mut self, address: Addr, size: u64) -> BlockId {
        self.insert_block(Block {
            address: Some(address),
            size,
        })
    }

    pub fn add_proxy(&mut self) -> BlockId {
        self.insert_block(Block {
            address: None,
            size: 0,
        })
    }

    fn insert_block(&mut self, block: Block) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.insert(id, block);
        id
    }

    pub fn add_edge(&mut self, source: BlockId, target: BlockId, kind: EdgeKind) -> EdgeId {
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(id, Edge { source, target, kind });
        id
    }

    pub fn add_symbol(
        &mut self,
        name: impl Into<String>,
        referent: Option<BlockId>,
        kind: SymbolKind,
    ) -> SymbolId {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        self.symbols.insert(
            id,
            Symbol {
                name: name.into(),
                referent,
                kind,
            },
        );
        id
    }

    /// Records the symbolic reference in use at `location`, replacing any
    /// previous one (each location holds at most one reference).
    pub fn set_symbolic_expr(&mut self, location: Addr, expr: SymbolicExpr) {
        self.symbolic_exprs.insert(location, expr);
    }

    /// Registers a function with the given entry and member blocks. Entry
    /// blocks are members by definition and need not be repeated.
    pub fn add_function(&mut self, entries: &[BlockId], members: &[BlockId]) -> FunctionId {
        let id = FunctionId(self.next_function);
        self.next_function += 1;
        let entry_set: BTreeSet<BlockId> = entries.iter().copied().collect();
        let mut member_set: BTreeSet<BlockId> = members.iter().copied().collect();
        member_set.extend(entry_set.iter().copied());
        self.function_entries.insert(id, entry_set);
        self.function_blocks.insert(id, member_set);
        id
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().map(|(id, b)| (*id, b))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().map(|(id, e)| (*id, e))
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter().map(|(id, s)| (*id, s))
    }

    pub fn symbolic_exprs(&self) -> impl Iterator<Item = (Addr, &SymbolicExpr)> {
        self.symbolic_exprs.iter().map(|(at, e)| (*at, e))
    }

    pub fn symbolic_expr_at(&self, location: Addr) -> Option<&SymbolicExpr> {
        self.symbolic_exprs.get(&location)
    }

    pub fn function_blocks(&self) -> &BTreeMap<FunctionId, BTreeSet<BlockId>> {
        &self.function_blocks
    }

    pub fn function_entries(&self) -> &BTreeMap<FunctionId, BTreeSet<BlockId>> {
        &self.function_entries
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Address -> block id index over the non-proxy blocks.
    pub fn blocks_by_address(&self) -> BTreeMap<Addr, BlockId> {
        self.blocks
            .iter()
            .filter_map(|(id, b)| b.address.map(|a| (a, *id)))
            .collect()
    }

    /// Returns the module's trampoline symbol, creating it on first use.
    pub fn trampoline_symbol(&mut self) -> SymbolId {
        if let Some(id) = self.trampoline {
            return id;
        }
        let id = self.add_symbol(TRAMPOLINE_SYMBOL, None, SymbolKind::Extern);
        self.trampoline = Some(id);
        id
    }

    pub fn trampoline(&self) -> Option<SymbolId> {
        self.trampoline
    }

    /// Checks the structural invariants that must hold after every edit:
    /// no edge or symbol references a missing block, every symbolic
    /// reference resolves, and function bookkeeping is closed over the
    /// block set with non-empty entry sets.
    pub fn check_consistency(&self) -> Result<(), String> {
        for (id, edge) in &self.edges {
            for endpoint in [edge.source, edge.target] {
                if !self.blocks.contains_key(&endpoint) {
                    return Err(format!("edge {id} references missing block {endpoint}"));
                }
            }
        }
        for (id, symbol) in &self.symbols {
            if let Some(referent) = symbol.referent {
                if !self.blocks.contains_key(&referent) {
                    return Err(format!(
                        "symbol {id} `{}` references missing block {referent}",
                        symbol.name
                    ));
                }
            }
        }
        for (at, expr) in &self.symbolic_exprs {
            let sides = match expr {
                SymbolicExpr::SymAddr { symbol, .. } => vec![*symbol],
                SymbolicExpr::SymAddrDiff {
                    minuend,
                    subtrahend,
                    ..
                } => vec![*minuend, *subtrahend],
            };
            for side in sides {
                match self.symbols.get(&side) {
                    None => {
                        return Err(format!("reference at {at} uses missing symbol {side}"));
                    }
                    Some(symbol) => {
                        if let Some(referent) = symbol.referent {
                            if !self.blocks.contains_key(&referent) {
                                return Err(format!(
                                    "reference at {at} resolves to missing block {referent}"
                                ));
                            }
                        }
                    }
                }
            }
        }
        if self.function_blocks.keys().ne(self.function_entries.keys()) {
            return Err("function member and entry maps disagree on keys".to_string());
        }
        for (id, entries) in &self.function_entries {
            if entries.is_empty() {
                return Err(format!("function {id} has an empty entry set"));
            }
            let members = &self.function_blocks[id];
            if !entries.is_subset(members) {
                return Err(format!("function {id} has entries outside its member set"));
            }
            for block in members {
                if !self.blocks.contains_key(block) {
                    return Err(format!("function {id} lists missing block {block}"));
                }
            }
        }
        Ok(())
    }
}

/// A whole program snapshot. The base snapshot stays immutable for a run;
/// per-trial variants are plain clones of it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ir {
    pub modules: Vec<Module>,
}

impl Ir {
    pub fn new() -> Self {
        Ir::default()
    }

    pub fn with_module(module: Module) -> Self {
        Ir {
            modules: vec![module],
        }
    }

    pub fn block_count(&self) -> usize {
        self.modules.iter().map(Module::block_count).sum()
    }

    pub fn check_consistency(&self) -> Result<(), String> {
        for module in &self.modules {
            module.check_consistency()?;
        }
        Ok(())
    }
}
