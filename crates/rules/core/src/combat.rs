//! Per-round action economy and turn-order helpers.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Action-economy flags cleared at the top of each combatant's round.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RoundFlags: u8 {
        const USED_ATTACK = 1 << 0;
        const USED_MOVE = 1 << 1;
        const USED_SWIFT = 1 << 2;
        const USED_IMMEDIATE = 1 << 3;
    }
}

/// Per-combatant round state: economy flags plus the attack-of-opportunity
/// budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub flags: RoundFlags,
    pub aoo_max: u32,
    pub aoo_used: u32,
}

impl RoundState {
    pub fn new(aoo_max: u32) -> Self {
        Self {
            flags: RoundFlags::empty(),
            aoo_max,
            aoo_used: 0,
        }
    }

    /// Reset at the start of the combatant's round. The AoO budget itself
    /// persists; only its usage clears.
    pub fn reset_round(&mut self) {
        self.flags = RoundFlags::empty();
        self.aoo_used = 0;
    }

    pub fn aoo_available(&self) -> u32 {
        self.aoo_max.saturating_sub(self.aoo_used)
    }

    pub fn spend_aoo(&mut self) -> bool {
        if self.aoo_available() == 0 {
            return false;
        }
        self.aoo_used += 1;
        true
    }
}

/// Initiative slot for a buff's virtual combatant.
///
/// A tracked buff ticks adjacent to its owner: just after the owner's turn
/// when it expires at end of turn, just before otherwise. The offset keeps
/// the virtual slot from colliding with any real combatant.
pub fn buff_initiative(owner_initiative: f64, tick_on_end: bool) -> f64 {
    if tick_on_end {
        owner_initiative - 0.01
    } else {
        owner_initiative + 0.01
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_reset_clears_usage_only() {
        let mut state = RoundState::new(2);
        state.flags |= RoundFlags::USED_ATTACK | RoundFlags::USED_SWIFT;
        assert!(state.spend_aoo());
        assert!(state.spend_aoo());
        assert!(!state.spend_aoo());

        state.reset_round();
        assert!(state.flags.is_empty());
        assert_eq!(state.aoo_available(), 2);
    }

    #[test]
    fn buff_slots_bracket_the_owner() {
        assert!((buff_initiative(14.0, true) - 13.99).abs() < 1e-9);
        assert!((buff_initiative(14.0, false) - 14.01).abs() < 1e-9);
    }
}
