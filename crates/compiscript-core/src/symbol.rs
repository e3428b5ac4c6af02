//! Symbol and scope records.
//!
//! Symbols are created during semantic analysis, live in the flat
//! [`crate::SymbolTable`] arena for the whole compilation, and are
//! read-only during code generation. Class attributes and methods are
//! ordinary Variable/Function symbols shared (by id) between the flat
//! table and the owning class record.

use std::fmt::{self, Display, Formatter};

use crate::{DataType, ScopeId, SymbolId};

/// A lexical scope: program, class, function, or control-flow block.
///
/// Scopes form a strict stack during both traversals. Each scope carries
/// a running byte offset for the variables declared directly in it, so
/// successive declarations get monotonically non-decreasing offsets.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Scope name ("global", a class or function name, "if", "while", ...).
    pub name: String,
    /// Creation-order index; strictly increasing, never reused.
    pub index: u32,
    /// Running byte offset of locally declared variables.
    pub offset: u32,
}

impl Scope {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
            offset: 0,
        }
    }
}

/// What a variable symbol stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRole {
    /// A `var` declaration.
    Local,
    /// A function or method parameter.
    Parameter,
    /// A class attribute, defined by `this.attr = ...` in a constructor.
    Attribute,
}

impl Display for VarRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            VarRole::Local => write!(f, "var"),
            VarRole::Parameter => write!(f, "param"),
            VarRole::Attribute => write!(f, "attr"),
        }
    }
}

/// Completion state of a class.
///
/// A class whose attributes all have concrete types completes at the end
/// of its declaration. A class with `Any`-typed attributes stays
/// `Incomplete` until its first instantiation binds them; the size only
/// exists once the class is `Complete`, so "infer once" is structural
/// rather than a flag convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassState {
    /// Attribute types not yet fully resolved; no meaningful size.
    Incomplete,
    /// Layout fixed; `size` is the sum of all attribute sizes.
    Complete {
        /// Total instance size in bytes.
        size: u32,
    },
}

/// Kind-specific payload of a symbol.
#[derive(Debug, Clone)]
pub enum SymbolKind {
    Variable {
        /// Whether the variable has been assigned a value.
        initialized: bool,
        /// Local, parameter, or class attribute.
        role: VarRole,
    },
    Function {
        /// Parameter symbols, in declaration order.
        params: Vec<SymbolId>,
        /// Return type; defaults to Nil until the first `return` fixes it.
        return_type: DataType,
        /// Whether a `return` statement has fixed the return type.
        ///
        /// A function calling itself before this is set types as `Any`
        /// to break the inference cycle.
        return_fixed: bool,
    },
    Class {
        /// Attribute symbols, in declaration order (inherited first).
        attributes: Vec<SymbolId>,
        /// Method symbols, in declaration order (inherited first).
        methods: Vec<SymbolId>,
        /// Parent class, if any (single inheritance).
        parent: Option<SymbolId>,
        /// Completion state; see [`ClassState`].
        state: ClassState,
    },
}

/// Discriminant of [`SymbolKind`], used for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolTag {
    Variable,
    Function,
    Class,
}

impl Display for SymbolTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SymbolTag::Variable => write!(f, "var"),
            SymbolTag::Function => write!(f, "fun"),
            SymbolTag::Class => write!(f, "class"),
        }
    }
}

/// A named, scoped entity in the flat symbol table.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Source-level identifier.
    pub name: String,
    /// Owning scope.
    pub scope: ScopeId,
    /// Byte offset within the owning scope (variables) or 0.
    pub offset: u32,
    /// Inferred data type (functions: Nil; classes: Instance of self).
    pub data_type: DataType,
    /// Copied from a parent class and not yet overridden.
    pub inherited: bool,
    /// Kind payload.
    pub kind: SymbolKind,
}

impl Symbol {
    /// A variable symbol with type and role; offset and scope are filled
    /// in by the table at declaration time.
    pub fn variable(name: impl Into<String>, data_type: DataType, role: VarRole) -> Self {
        Self {
            name: name.into(),
            scope: ScopeId(0),
            offset: 0,
            data_type,
            inherited: false,
            kind: SymbolKind::Variable {
                initialized: false,
                role,
            },
        }
    }

    /// A function symbol with an empty parameter list and a Nil return
    /// type awaiting its first `return`.
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: ScopeId(0),
            offset: 0,
            data_type: DataType::Nil,
            inherited: false,
            kind: SymbolKind::Function {
                params: Vec::new(),
                return_type: DataType::Nil,
                return_fixed: false,
            },
        }
    }

    /// An incomplete class symbol.
    pub fn class(name: impl Into<String>, parent: Option<SymbolId>) -> Self {
        Self {
            name: name.into(),
            scope: ScopeId(0),
            offset: 0,
            data_type: DataType::Nil,
            inherited: false,
            kind: SymbolKind::Class {
                attributes: Vec::new(),
                methods: Vec::new(),
                parent,
                state: ClassState::Incomplete,
            },
        }
    }

    /// The kind discriminant.
    pub fn tag(&self) -> SymbolTag {
        match self.kind {
            SymbolKind::Variable { .. } => SymbolTag::Variable,
            SymbolKind::Function { .. } => SymbolTag::Function,
            SymbolKind::Class { .. } => SymbolTag::Class,
        }
    }
}
