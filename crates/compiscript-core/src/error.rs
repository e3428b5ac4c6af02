//! Unified error types for CompiScript compilation.
//!
//! Every error raised by semantic analysis is unrecoverable for that
//! compilation: there is no resynchronization and no accumulation, the
//! first error aborts the pass. The code generator assumes a successful
//! analysis; internal lookup failures there are implementation defects
//! and panic rather than surfacing here.

use thiserror::Error;

/// Errors raised while compiling a CompiScript program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A name was re-declared in the currently open scope.
    ///
    /// Shadowing across nesting levels is permitted; re-declaration
    /// within one scope is not.
    #[error("'{name}' is already declared in scope '{scope}'")]
    DuplicateSymbol {
        /// The re-declared name.
        name: String,
        /// The scope holding the original declaration.
        scope: String,
    },

    /// An identifier, attribute, or method lookup failed.
    #[error("undefined {kind} '{name}'")]
    UndefinedSymbol {
        /// What was being looked up ("variable", "function", "attribute", "method").
        kind: &'static str,
        /// The name that wasn't found.
        name: String,
    },

    /// An undeclared class was named as a parent or instantiation target.
    #[error("unknown class '{name}'")]
    UnknownClass {
        /// The class name that wasn't found.
        name: String,
    },

    /// Argument count does not match the parameter count of the callee.
    #[error("'{name}' expects {expected} argument(s), got {found}")]
    Arity {
        /// The callee name.
        name: String,
        /// Declared parameter count.
        expected: usize,
        /// Argument count at the call site.
        found: usize,
    },

    /// An operator was applied to operands of incompatible types.
    #[error("{message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A construct appeared outside its valid context
    /// (`this`/`super` outside a class, `return` outside a function
    /// or inside a constructor).
    #[error("{message}")]
    InvalidContext {
        /// Description of what's invalid.
        message: String,
    },

    /// The `-` operator appeared inside a print expression.
    ///
    /// A preserved source-language rule: print expressions may not
    /// subtract.
    #[error("operator '-' is not allowed inside a print expression")]
    InvalidPrintOperator,

    /// The front-end handed over a tree that violates the grammar
    /// contract (missing mandatory children, unknown operators).
    #[error("malformed parse tree: {message}")]
    MalformedTree {
        /// Description of the violation.
        message: String,
    },
}

impl CompileError {
    /// Convenience constructor for [`CompileError::TypeMismatch`].
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        CompileError::TypeMismatch {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`CompileError::InvalidContext`].
    pub fn invalid_context(message: impl Into<String>) -> Self {
        CompileError::InvalidContext {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`CompileError::MalformedTree`].
    pub fn malformed(message: impl Into<String>) -> Self {
        CompileError::MalformedTree {
            message: message.into(),
        }
    }
}
