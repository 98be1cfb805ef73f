//! Identifier newtypes for host documents.
//!
//! The host persistence layer owns document identity; the engine only
//! needs stable, copyable keys for actors and their owned items.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u32);

impl core::fmt::Display for ActorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "actor:{}", self.0)
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "item:{}", self.0)
    }
}

/// Build the normalized tag form of a display name: lowercase, spaces and
/// punctuation stripped. `"Sneak Attack"` becomes `sneakattack`.
pub fn create_tag(name: &str) -> String {
    let tag: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if tag.is_empty() { "item".to_string() } else { tag }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized() {
        assert_eq!(create_tag("Sneak Attack"), "sneakattack");
        assert_eq!(create_tag("Fighter"), "fighter");
        assert_eq!(create_tag("!!"), "item");
    }
}
