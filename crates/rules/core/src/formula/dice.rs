//! Dice notation and the injectable randomness source.
//!
//! Every die rolled by the engine flows through [`DiceRoller`], which keeps
//! formula evaluation deterministic under test and replayable in general.

use serde::{Deserialize, Serialize};

/// How a keep/drop modifier selects dice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeepRule {
    KeepHighest,
    KeepLowest,
    DropHighest,
    DropLowest,
}

/// Parsed `NdM` dice term with optional modifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSpec {
    pub count: u32,
    pub sides: u32,
    pub keep: Option<(KeepRule, u32)>,
    /// Reroll (once) any die that comes up at or below this face.
    pub reroll_below: Option<u32>,
}

impl DiceSpec {
    /// Upper bound on dice per term; a malformed formula must not be able
    /// to stall a recompute pass.
    pub const MAX_COUNT: u32 = 1000;

    pub fn new(count: u32, sides: u32) -> Self {
        Self {
            count,
            sides,
            keep: None,
            reroll_below: None,
        }
    }

    /// Roll this term, returning the kept faces and their sum.
    pub fn roll(&self, roller: &mut dyn DiceRoller) -> DiceResult {
        let mut faces: Vec<u32> = (0..self.count)
            .map(|_| {
                let mut face = roller.roll_die(self.sides);
                if let Some(threshold) = self.reroll_below {
                    if face <= threshold {
                        face = roller.roll_die(self.sides);
                    }
                }
                face
            })
            .collect();

        if let Some((rule, n)) = self.keep {
            let n = (n as usize).min(faces.len());
            let mut sorted = faces.clone();
            sorted.sort_unstable();
            // Faces to discard, as a multiset.
            let discarded: Vec<u32> = match rule {
                KeepRule::KeepHighest => sorted[..faces.len() - n].to_vec(),
                KeepRule::KeepLowest => sorted[n..].to_vec(),
                KeepRule::DropHighest => sorted[faces.len() - n..].to_vec(),
                KeepRule::DropLowest => sorted[..n].to_vec(),
            };
            let mut discard = discarded;
            faces.retain(|face| {
                if let Some(idx) = discard.iter().position(|d| d == face) {
                    discard.swap_remove(idx);
                    false
                } else {
                    true
                }
            });
        }

        let total = faces.iter().map(|&f| f as u64).sum::<u64>();
        DiceResult { faces, total }
    }

    pub fn notation(&self) -> String {
        let mut out = format!("{}d{}", self.count, self.sides);
        if let Some((rule, n)) = self.keep {
            let tag = match rule {
                KeepRule::KeepHighest => "kh",
                KeepRule::KeepLowest => "kl",
                KeepRule::DropHighest => "dh",
                KeepRule::DropLowest => "dl",
            };
            out.push_str(&format!("{tag}{n}"));
        }
        if let Some(r) = self.reroll_below {
            out.push_str(&format!("r{r}"));
        }
        out
    }
}

/// Outcome of rolling one dice term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiceResult {
    pub faces: Vec<u32>,
    pub total: u64,
}

/// Source of randomness for dice terms.
///
/// Implementations must be deterministic given their construction state so
/// that rolls can be replayed.
pub trait DiceRoller {
    /// Roll a die with N sides (1..=N).
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// PCG-XSH-RR random number generator.
///
/// Small state, fast, deterministic from its seed, and of good statistical
/// quality. The default roller for the engine.
#[derive(Clone, Copy, Debug)]
pub struct PcgRoller {
    state: u64,
}

impl PcgRoller {
    const MULTIPLIER: u64 = 6364136223846793005;
    const INCREMENT: u64 = 1442695040888963407;

    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        let state = self.state;
        // XSH-RR output permutation.
        let xorshifted = (((state >> 18) ^ state) >> 27) as u32;
        let rot = (state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }
}

impl DiceRoller for PcgRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        if sides == 0 {
            return 0;
        }
        (self.next_u32() % sides) + 1
    }
}

/// Fixed-sequence roller for tests: yields the queued faces in order and
/// repeats the last one when exhausted.
#[derive(Clone, Debug)]
pub struct SequenceRoller {
    faces: Vec<u32>,
    cursor: usize,
}

impl SequenceRoller {
    pub fn new(faces: impl Into<Vec<u32>>) -> Self {
        Self {
            faces: faces.into(),
            cursor: 0,
        }
    }
}

impl DiceRoller for SequenceRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        let face = self
            .faces
            .get(self.cursor)
            .or_else(|| self.faces.last())
            .copied()
            .unwrap_or(1);
        self.cursor += 1;
        face.min(sides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcg_is_deterministic() {
        let mut a = PcgRoller::new(42);
        let mut b = PcgRoller::new(42);
        for _ in 0..16 {
            assert_eq!(a.roll_die(20), b.roll_die(20));
        }
    }

    #[test]
    fn pcg_stays_in_range() {
        let mut roller = PcgRoller::new(7);
        for _ in 0..200 {
            let face = roller.roll_die(6);
            assert!((1..=6).contains(&face));
        }
    }

    #[test]
    fn keep_highest() {
        let mut roller = SequenceRoller::new(vec![3, 6, 1, 5]);
        let spec = {
            let mut spec = DiceSpec::new(4, 6);
            spec.keep = Some((KeepRule::KeepHighest, 3));
            spec
        };
        let result = spec.roll(&mut roller);
        assert_eq!(result.total, 14); // drops the 1
        assert_eq!(result.faces, vec![3, 6, 5]);
    }

    #[test]
    fn reroll_below_rerolls_once() {
        let mut roller = SequenceRoller::new(vec![1, 4]);
        let spec = {
            let mut spec = DiceSpec::new(1, 8);
            spec.reroll_below = Some(1);
            spec
        };
        let result = spec.roll(&mut roller);
        assert_eq!(result.total, 4);
    }
}
