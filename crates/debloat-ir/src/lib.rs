// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! In-memory model of a program snapshot (blocks, control-flow edges,
//! symbols, symbolic references, function membership) plus the
//! consistency-preserving deletion editor that produces reduced variants.
//!
//! The model is value-semantic: every entity is addressed by a stable
//! integer id inside its module, so cloning a snapshot into a per-trial
//! variant is a plain value copy and mutating the variant can never alias
//! the base.

pub mod edit;
pub mod info;
pub mod loader;
pub mod model;

pub use edit::{remove_blocks, remove_functions, DeleteTarget, EditReport};
pub use model::{Addr, Block, BlockId, Edge, EdgeId, EdgeKind, FunctionId, Ir, Module, Symbol, SymbolId, SymbolKind, SymbolicExpr};
