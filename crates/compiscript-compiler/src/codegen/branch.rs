//! Branch-target threading for short-circuit lowering.
//!
//! Conditions never materialize intermediate booleans. Instead the
//! lowering recursion carries an explicit pair of jump destinations;
//! `None` means "fall through". The value is passed down by clone and
//! dropped on return, so a nested condition can never leak its targets
//! into a sibling.

/// The pending jump destinations for the condition being lowered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchTargets {
    /// Branch here when the condition holds; `None` falls through.
    pub on_true: Option<String>,
    /// Branch here when the condition fails; `None` falls through.
    pub on_false: Option<String>,
}

impl BranchTargets {
    pub fn on_true(label: String) -> Self {
        Self {
            on_true: Some(label),
            on_false: None,
        }
    }

    pub fn on_false(label: String) -> Self {
        Self {
            on_true: None,
            on_false: Some(label),
        }
    }

    pub fn both(on_true: String, on_false: String) -> Self {
        Self {
            on_true: Some(on_true),
            on_false: Some(on_false),
        }
    }

    /// Exchange the destinations; this is all `!` has to do.
    pub fn swapped(self) -> Self {
        Self {
            on_true: self.on_false,
            on_false: self.on_true,
        }
    }
}
