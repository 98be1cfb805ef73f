//! Time advancement over owned items.
//!
//! Advancing time never mutates; it yields [`TimedDirective`]s the runtime
//! applies through the document store, so one clock tick over a whole
//! actor flushes as a single batch.

use crate::model::Item;

/// Outcome of advancing one item's clocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimedDirective {
    /// Timeline advanced without expiring.
    Elapsed { elapsed: u32 },
    /// Timeline expired on an effect that survives expiry: deactivate and
    /// reset elapsed to zero so reactivation starts fresh.
    Deactivate,
    /// Timeline expired on a delete-on-expiry effect.
    Delete,
    /// Recharge timer still counting down.
    RechargeTick { current: u32 },
    /// Recharge timer finished: refill the pool to `value` and clear the
    /// timer.
    RechargeDone { value: u32 },
}

/// Advance all of one item's clocks by `delta` rounds.
///
/// The duration timeline and the recharge timer are independent; an item
/// can produce one directive for each. Items with no enabled clocks
/// produce nothing.
pub fn advance_time(item: &Item, delta: u32) -> Vec<TimedDirective> {
    let mut directives = Vec::new();

    if let Some(timeline) = item.timeline()
        && timeline.enabled
        && item.active
        && timeline.total > 0
    {
        let elapsed = timeline.elapsed.saturating_add(delta);
        if elapsed >= timeline.total {
            directives.push(if timeline.delete_on_expiry {
                TimedDirective::Delete
            } else {
                TimedDirective::Deactivate
            });
        } else {
            directives.push(TimedDirective::Elapsed { elapsed });
        }
    }

    if let Some(recharge) = &item.recharge
        && recharge.enabled
        && recharge.current > 0
    {
        let remaining = recharge.current.saturating_sub(delta);
        if remaining < 1 {
            let max = item.uses.as_ref().map(|uses| uses.max).unwrap_or(0);
            directives.push(TimedDirective::RechargeDone { value: max });
        } else {
            directives.push(TimedDirective::RechargeTick { current: remaining });
        }
    }

    directives
}
