//! The two compilation passes of the CompiScript backend.
//!
//! [`analyzer`] runs first: one traversal that builds the symbol table
//! and type-checks the program, aborting on the first error. [`codegen`]
//! runs second over the validated tree, replaying the recorded scopes
//! and emitting the final instruction set.

pub mod analyzer;
pub mod codegen;

pub use analyzer::SemanticAnalyzer;
pub use codegen::IntermediateCodeGenerator;

use compiscript_core::CompileError;

pub type Result<T> = std::result::Result<T, CompileError>;
