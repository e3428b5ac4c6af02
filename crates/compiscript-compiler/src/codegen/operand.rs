//! Lowered expression values.

use compiscript_core::{DataType, SymbolId};

use super::registers::Slot;

/// A literal value carried through lowering until it has to be
/// materialized.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(i64),
    Str(String),
    Bool(bool),
    Nil,
}

/// Where a sub-expression's result currently lives. Every evaluation
/// yields one of these; normalization to a register happens only when
/// an instruction actually needs one.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Already in a register or stack slot.
    Register(Slot),
    /// Still bound to a symbol's memory location.
    Symbol(SymbolId),
    /// A literal that has not been materialized yet.
    Literal(Value),
}

/// An operand together with its resolved type; the type drives the
/// add-versus-concatenate decision and the print mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Lowered {
    pub operand: Operand,
    pub data_type: DataType,
}

impl Lowered {
    pub fn new(operand: Operand, data_type: DataType) -> Self {
        Self { operand, data_type }
    }

    pub fn register(slot: Slot, data_type: DataType) -> Self {
        Self::new(Operand::Register(slot), data_type)
    }
}
