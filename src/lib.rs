//! CompiScript compiler backend.
//!
//! Takes a parse tree from the external front-end through semantic
//! analysis and intermediate code generation:
//!
//! ```
//! use compiscript::compile;
//! use compiscript_core::parse_tree::build;
//!
//! let tree = build::program(vec![build::print_stmt(build::number_expr(42))]);
//! let compilation = compile(&tree).unwrap();
//! assert!(compilation.code.contains("syscall"));
//! ```
//!
//! The first semantic error aborts the compilation; no artifact is
//! produced. See [`CompileError`] for the taxonomy.

pub use compiscript_compiler::{IntermediateCodeGenerator, SemanticAnalyzer};
pub use compiscript_core::parse_tree;
pub use compiscript_core::{CompileError, DataType, SymbolTable};

/// The artifacts of a successful compilation.
#[derive(Debug)]
pub struct Compilation {
    /// The instruction set: data section, main routine, function blocks.
    pub code: String,
    /// The finished symbol table; [`SymbolTable::render_table`] gives
    /// the debug grid.
    pub table: SymbolTable,
}

/// Run both passes over a parse tree.
pub fn compile(tree: &parse_tree::Node) -> Result<Compilation, CompileError> {
    let table = SemanticAnalyzer::analyze(tree)?;
    let code = IntermediateCodeGenerator::generate(tree, &table)?;
    Ok(Compilation { code, table })
}
