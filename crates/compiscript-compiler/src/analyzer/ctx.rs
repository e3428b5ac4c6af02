//! Traversal context for semantic analysis.
//!
//! Instead of ambient "current class/current function" fields mutated in
//! place, an explicit context value is threaded through the recursion.
//! Sibling call sites therefore cannot observe each other's state.

use compiscript_core::{ScopeId, SymbolId};

/// Where the analyzer currently is in the program structure.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ctx {
    /// The enclosing class declaration, if any.
    pub class: Option<SymbolId>,
    /// The scope holding the enclosing class's members.
    pub class_scope: Option<ScopeId>,
    /// The enclosing function or method, if any.
    pub function: Option<SymbolId>,
    /// Inside the constructor (`init`) of `class`.
    pub in_init: bool,
    /// Inside a `print` expression; `-` is rejected here.
    pub in_print: bool,
}

impl Ctx {
    /// Context for the body of a class declaration.
    pub fn in_class(self, class: SymbolId, scope: ScopeId) -> Self {
        Self {
            class: Some(class),
            class_scope: Some(scope),
            function: None,
            in_init: false,
            in_print: false,
        }
    }

    /// Context for the body of a function or method.
    pub fn in_function(self, function: SymbolId, is_init: bool) -> Self {
        Self {
            function: Some(function),
            in_init: is_init,
            ..self
        }
    }

    /// Context for a print expression.
    pub fn in_print(self) -> Self {
        Self {
            in_print: true,
            ..self
        }
    }
}
