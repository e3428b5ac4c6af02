//! Core data model for the CompiScript compiler backend.
//!
//! This crate holds everything shared by the two compilation passes:
//!
//! - [`parse_tree`]: the contract with the external front-end — node
//!   kinds, accessors, and the visitor dispatch both passes implement
//! - [`DataType`]: the closed value-type lattice
//! - [`Symbol`]/[`Scope`]/[`SymbolTable`]: the flat symbol table built by
//!   analysis and read by code generation
//! - [`CompileError`]: the unified error taxonomy

pub mod parse_tree;

mod data_type;
mod error;
mod ids;
mod symbol;
mod table;

pub use data_type::DataType;
pub use error::CompileError;
pub use ids::{ScopeId, SymbolId};
pub use symbol::{ClassState, Scope, Symbol, SymbolKind, SymbolTag, VarRole};
pub use table::SymbolTable;
