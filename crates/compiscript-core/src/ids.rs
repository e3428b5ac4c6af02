//! Typed indices into the flat symbol table.

use std::fmt::{self, Display, Formatter};

/// Index of a symbol in the flat [`crate::SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

/// Index of a scope record in the [`crate::SymbolTable`].
///
/// Scope indices are assigned in creation order during analysis and are
/// never reused, so they double as the scope's creation-order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl SymbolId {
    /// The raw index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ScopeId {
    /// The raw index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for SymbolId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "sym#{}", self.0)
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}
