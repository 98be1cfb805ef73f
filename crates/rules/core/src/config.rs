//! World configuration consumed by the recompiler and context builder.
//!
//! Everything here is data, not code: the size chart, the per-class-type
//! saving-throw formulas, the experience table, and the registries. The
//! content crate loads these from TOML; the engine never hardcodes rule
//! tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ClassType, SaveProgression};

/// Saving-throw formulas for one class type, keyed by progression.
///
/// Evaluated with `@level` bound to the class level.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveFormulas {
    pub good: String,
    pub poor: String,
}

impl SaveFormulas {
    pub fn for_progression(&self, progression: SaveProgression) -> &str {
        match progression {
            SaveProgression::Good => &self.good,
            SaveProgression::Poor => &self.poor,
        }
    }
}

/// How hit points are produced when a class level is gained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitDieRule {
    /// Roll the die.
    #[default]
    Roll,
    /// Maximum at first level, rolled afterwards.
    MaxFirst,
    /// Fixed average, rounded up.
    Average,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    pub rule: HitDieRule,
    /// Continuous damage rolls over into lethal at this nonlethal excess.
    pub auto_stabilize: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            rule: HitDieRule::MaxFirst,
            auto_stabilize: false,
        }
    }
}

/// A registered sense key with its display label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenseDef {
    pub key: String,
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageTypeDef {
    pub key: String,
    pub label: String,
    /// Energy types participate in resistance merging.
    pub energy: bool,
}

/// The full rule-table set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Size keys in ascending order; `med` sits at index 4, so the roll
    /// data `size` value is the key's index minus 4.
    pub size_chart: Vec<String>,
    /// Saving-throw formulas per class type.
    pub save_formulas: BTreeMap<ClassType, SaveFormulas>,
    /// Cumulative experience required to reach level `index + 1`.
    pub experience_table: Vec<u64>,
    pub damage_types: Vec<DamageTypeDef>,
    pub senses: Vec<SenseDef>,
    pub health: HealthConfig,
    /// Bonus feat cadence: one slot per this many character levels.
    pub feat_level_divisor: u32,
}

impl WorldConfig {
    /// Relative size value for a chart key, zero for `med` or unknown keys.
    pub fn size_value(&self, key: &str) -> i32 {
        self.size_chart
            .iter()
            .position(|entry| entry == key)
            .map(|index| index as i32 - 4)
            .unwrap_or(0)
    }

    /// Experience threshold for advancing past `level`.
    pub fn xp_for_level(&self, level: u32) -> u64 {
        self.experience_table
            .get(level as usize)
            .copied()
            .unwrap_or(u64::MAX)
    }

    pub fn save_formulas(&self, class_type: ClassType) -> Option<&SaveFormulas> {
        self.save_formulas.get(&class_type)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        let standard_saves = SaveFormulas {
            good: "2 + floor(@level / 2)".to_string(),
            poor: "floor(@level / 3)".to_string(),
        };
        let racial_saves = SaveFormulas {
            good: "2 + floor(@level / 2)".to_string(),
            poor: "floor(@level / 3)".to_string(),
        };
        let mut save_formulas = BTreeMap::new();
        save_formulas.insert(ClassType::Base, standard_saves.clone());
        save_formulas.insert(ClassType::Prestige, standard_saves.clone());
        save_formulas.insert(ClassType::Racial, racial_saves);
        save_formulas.insert(ClassType::Template, standard_saves.clone());
        save_formulas.insert(ClassType::Minion, standard_saves);

        Self {
            size_chart: ["fine", "dim", "tiny", "sm", "med", "lg", "huge", "grg", "col"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            save_formulas,
            experience_table: standard_experience_table(),
            damage_types: Vec::new(),
            senses: Vec::new(),
            health: HealthConfig::default(),
            feat_level_divisor: 3,
        }
    }
}

/// The 3.5e cumulative experience table, levels 1 through 20.
fn standard_experience_table() -> Vec<u64> {
    (0..20u64).map(|level| level * (level + 1) * 500).collect()
}
