//! Register allocation for the intermediate code.
//!
//! Four fixed register classes plus an unbounded stack fallback. Slots
//! are recycled through per-class LIFO free lists; a live-value map
//! remembers which symbol a slot currently holds so repeated reads of
//! the same variable can skip the `load`.

use compiscript_core::SymbolId;
use rustc_hash::FxHashMap;
use std::fmt;

const TEMP_COUNT: u8 = 10;
const SAVE_COUNT: u8 = 7;
const ARG_COUNT: u8 = 3;

/// A storage location the generator can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Temporary register, `$t0..$t9`.
    Temp(u8),
    /// Callee-preserved register, `$s0..$s6`.
    Save(u8),
    /// Argument register, `$a0..$a2`.
    Arg(u8),
    /// The dedicated method-receiver register, `$a3`.
    SelfRef,
    /// The return-value register, `$v0`.
    Return,
    /// The constant-zero register.
    Zero,
    /// Stack-relative fallback, `off($sp)`.
    Stack(u32),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Temp(n) => write!(f, "$t{n}"),
            Slot::Save(n) => write!(f, "$s{n}"),
            Slot::Arg(n) => write!(f, "$a{n}"),
            Slot::SelfRef => write!(f, "$a3"),
            Slot::Return => write!(f, "$v0"),
            Slot::Zero => write!(f, "$zero"),
            Slot::Stack(off) => write!(f, "{off}($sp)"),
        }
    }
}

/// Pooled allocator over the register classes.
///
/// Invariant: an allocatable slot is either on its class free list or
/// handed out (possibly with a live-value entry), never both.
#[derive(Debug)]
pub struct RegisterController {
    /// Free temporaries; the top of the stack is handed out next, so a
    /// freed register is reused before a fresh index is minted.
    free_temps: Vec<u8>,
    free_saves: Vec<u8>,
    /// Monotonic stack offset; slots are never reclaimed within one
    /// compilation.
    stack_offset: u32,
    /// Which symbol's value currently resides in which slot.
    live: FxHashMap<Slot, SymbolId>,
}

impl RegisterController {
    pub fn new() -> Self {
        Self {
            free_temps: (0..TEMP_COUNT).rev().collect(),
            free_saves: (0..SAVE_COUNT).rev().collect(),
            stack_offset: 0,
            live: FxHashMap::default(),
        }
    }

    /// Allocate a temporary, spilling to the stack when all ten are out.
    pub fn new_temp(&mut self, size: u32) -> Slot {
        match self.free_temps.pop() {
            Some(n) => Slot::Temp(n),
            None => self.stack_slot(size),
        }
    }

    /// Allocate a callee-preserved register.
    pub fn new_save(&mut self, size: u32) -> Slot {
        match self.free_saves.pop() {
            Some(n) => Slot::Save(n),
            None => self.stack_slot(size),
        }
    }

    /// The conventional slot for the argument at `position` of a call;
    /// the fourth argument onward spills to the stack. Positions are
    /// counted by each call site itself, so a call lowered inside
    /// another call's argument list cannot shift the outer slots.
    pub fn argument_slot(&mut self, position: usize, size: u32) -> Slot {
        if position < ARG_COUNT as usize {
            let slot = Slot::Arg(position as u8);
            self.live.remove(&slot);
            slot
        } else {
            self.stack_slot(size)
        }
    }

    fn stack_slot(&mut self, size: u32) -> Slot {
        let slot = Slot::Stack(self.stack_offset);
        self.stack_offset += size;
        slot
    }

    /// Return a slot to its free list and clear its live-value entry.
    /// Non-pooled slots only lose their live-value entry.
    pub fn free(&mut self, slot: Slot) {
        self.live.remove(&slot);
        match slot {
            Slot::Temp(n) => self.free_temps.push(n),
            Slot::Save(n) => self.free_saves.push(n),
            _ => {}
        }
    }

    /// Record that `slot` now holds the value of `symbol`, evicting any
    /// stale slot previously holding it.
    pub fn bind(&mut self, slot: Slot, symbol: SymbolId) {
        if let Some(stale) = self.register_holding(symbol)
            && stale != slot
        {
            self.live.remove(&stale);
        }
        self.live.insert(slot, symbol);
    }

    /// Forget every live-value entry. Values only reside in registers
    /// within one function block; bindings must not cross into the next.
    pub fn clear_live(&mut self) {
        self.live.clear();
    }

    /// Reverse lookup: the slot already holding `symbol`, if any.
    pub fn register_holding(&self, symbol: SymbolId) -> Option<Slot> {
        self.live
            .iter()
            .find(|&(_, &held)| held == symbol)
            .map(|(&slot, _)| slot)
    }

    /// Run `f` with a freshly acquired temporary; the slot is released
    /// on every exit path.
    pub fn with_temp<R>(&mut self, size: u32, f: impl FnOnce(&mut Self, Slot) -> R) -> R {
        let slot = self.new_temp(size);
        let result = f(self, slot);
        self.free(slot);
        result
    }
}

impl Default for RegisterController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temps_hand_out_in_order() {
        let mut regs = RegisterController::new();
        assert_eq!(regs.new_temp(4), Slot::Temp(0));
        assert_eq!(regs.new_temp(4), Slot::Temp(1));
    }

    #[test]
    fn freed_temp_is_reused_before_a_fresh_one() {
        let mut regs = RegisterController::new();
        let a = regs.new_temp(4);
        let _b = regs.new_temp(4);
        regs.free(a);
        assert_eq!(regs.new_temp(4), a);
    }

    #[test]
    fn temps_spill_to_stack_when_exhausted() {
        let mut regs = RegisterController::new();
        for _ in 0..10 {
            regs.new_temp(4);
        }
        assert_eq!(regs.new_temp(4), Slot::Stack(0));
        assert_eq!(regs.new_temp(4), Slot::Stack(4));
    }

    #[test]
    fn fourth_argument_spills() {
        let mut regs = RegisterController::new();
        assert_eq!(regs.argument_slot(0, 4), Slot::Arg(0));
        assert_eq!(regs.argument_slot(1, 4), Slot::Arg(1));
        assert_eq!(regs.argument_slot(2, 4), Slot::Arg(2));
        assert!(matches!(regs.argument_slot(3, 4), Slot::Stack(_)));
        assert_eq!(regs.argument_slot(0, 4), Slot::Arg(0));
    }

    #[test]
    fn argument_slots_depend_only_on_position() {
        let mut regs = RegisterController::new();
        let outer = regs.argument_slot(0, 4);
        // an inner call assembles its own list in between
        assert_eq!(regs.argument_slot(0, 4), Slot::Arg(0));
        assert_eq!(regs.argument_slot(1, 4), Slot::Arg(1));
        assert_eq!(outer, Slot::Arg(0));
        assert_eq!(regs.argument_slot(1, 4), Slot::Arg(1));
    }

    #[test]
    fn stack_offsets_are_monotonic_across_classes() {
        let mut regs = RegisterController::new();
        for _ in 0..10 {
            regs.new_temp(4);
        }
        assert_eq!(regs.new_temp(4), Slot::Stack(0));
        assert_eq!(regs.argument_slot(3, 1), Slot::Stack(4));
        assert_eq!(regs.new_temp(4), Slot::Stack(5));
    }

    #[test]
    fn live_value_reverse_lookup() {
        let mut regs = RegisterController::new();
        let slot = regs.new_temp(4);
        regs.bind(slot, SymbolId(7));
        assert_eq!(regs.register_holding(SymbolId(7)), Some(slot));
        regs.free(slot);
        assert_eq!(regs.register_holding(SymbolId(7)), None);
    }

    #[test]
    fn clear_live_forgets_all_bindings() {
        let mut regs = RegisterController::new();
        regs.bind(Slot::Arg(0), SymbolId(1));
        let t = regs.new_temp(4);
        regs.bind(t, SymbolId(2));
        regs.clear_live();
        assert_eq!(regs.register_holding(SymbolId(1)), None);
        assert_eq!(regs.register_holding(SymbolId(2)), None);
    }

    #[test]
    fn bind_evicts_stale_holder() {
        let mut regs = RegisterController::new();
        let a = regs.new_temp(4);
        let b = regs.new_temp(4);
        regs.bind(a, SymbolId(7));
        regs.bind(b, SymbolId(7));
        assert_eq!(regs.register_holding(SymbolId(7)), Some(b));
    }

    #[test]
    fn with_temp_releases_on_exit() {
        let mut regs = RegisterController::new();
        let seen = regs.with_temp(4, |_, slot| slot);
        assert_eq!(regs.new_temp(4), seen);
    }

    #[test]
    fn slot_rendering() {
        assert_eq!(Slot::Temp(3).to_string(), "$t3");
        assert_eq!(Slot::Save(0).to_string(), "$s0");
        assert_eq!(Slot::Arg(2).to_string(), "$a2");
        assert_eq!(Slot::SelfRef.to_string(), "$a3");
        assert_eq!(Slot::Return.to_string(), "$v0");
        assert_eq!(Slot::Zero.to_string(), "$zero");
        assert_eq!(Slot::Stack(8).to_string(), "8($sp)");
    }
}
