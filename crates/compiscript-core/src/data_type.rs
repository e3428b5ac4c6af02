//! The CompiScript value-type lattice.
//!
//! CompiScript has no type annotations; every type is inferred bottom-up
//! from literals and operators. The lattice is a closed set of variants,
//! each with a byte size on the simplified load/store target:
//!
//! | Type     | Size | Notes                                        |
//! |----------|------|----------------------------------------------|
//! | Number   | 4    | one machine word                             |
//! | String   | 4    | word-sized handle; backing storage dynamic   |
//! | Boolean  | 1    |                                              |
//! | Nil      | 0    |                                              |
//! | Any      | 8    | placeholder for types not yet resolvable     |
//! | Instance | sum  | sum of the class's attribute sizes           |
//!
//! `Any` is the escape hatch of the inference scheme: parameters,
//! uninitialized variables, and recursion cycles all type as `Any` and
//! pass every operator check.

use std::fmt::{self, Display, Formatter};

use crate::SymbolId;

/// A CompiScript value type.
///
/// `Copy` so types flow through the analyzer without allocation.
/// `Instance` identifies its class by symbol id; the instance size is
/// derived from the class record via [`crate::SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Numeric value, one word.
    Number,
    /// String handle; the storage behind it is dynamically sized.
    String,
    /// Boolean value.
    Boolean,
    /// The nil value.
    Nil,
    /// Placeholder for a type that could not be resolved yet.
    Any,
    /// An instance of the class identified by the symbol id.
    Instance(SymbolId),
}

impl DataType {
    /// Byte size of a value of this type, excluding instances.
    ///
    /// Instance sizes depend on the class layout; use
    /// [`crate::SymbolTable::type_size`] when instances may occur.
    pub fn scalar_size(&self) -> u32 {
        match self {
            DataType::Number => 4,
            DataType::String => 4,
            DataType::Boolean => 1,
            DataType::Nil => 0,
            DataType::Any => 8,
            DataType::Instance(_) => 0,
        }
    }

    /// Whether this type is acceptable where a `Number` is required.
    ///
    /// `Any` passes every operator check by design.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Number | DataType::Any)
    }

    /// Whether this type is acceptable where a `Boolean` is required.
    pub fn is_boolean(&self) -> bool {
        matches!(self, DataType::Boolean | DataType::Any)
    }

    /// Whether this type is the `Any` placeholder.
    pub fn is_any(&self) -> bool {
        matches!(self, DataType::Any)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Number => write!(f, "num"),
            DataType::String => write!(f, "str"),
            DataType::Boolean => write!(f, "bool"),
            DataType::Nil => write!(f, "nil"),
            DataType::Any => write!(f, "any"),
            DataType::Instance(_) => write!(f, "instance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sizes() {
        assert_eq!(DataType::Number.scalar_size(), 4);
        assert_eq!(DataType::String.scalar_size(), 4);
        assert_eq!(DataType::Boolean.scalar_size(), 1);
        assert_eq!(DataType::Nil.scalar_size(), 0);
        assert_eq!(DataType::Any.scalar_size(), 8);
    }

    #[test]
    fn any_passes_operator_checks() {
        assert!(DataType::Any.is_numeric());
        assert!(DataType::Any.is_boolean());
        assert!(!DataType::String.is_numeric());
        assert!(!DataType::Number.is_boolean());
    }
}
