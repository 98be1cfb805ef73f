//! Data-driven rule tables and their loaders.
//!
//! This crate houses the default SRD configuration and a TOML loader for
//! world overrides. Content is consumed by the rules engine through
//! [`srd35_core::WorldConfig`] and never appears in actor state.

pub mod loaders;

pub use loaders::{ConfigLoader, LoadResult};

use srd35_core::WorldConfig;

/// The embedded SRD default tables.
const SRD_TOML: &str = include_str!("../data/srd.toml");

/// Built-in default configuration.
///
/// The embedded document is validated by a test, so failure to parse it
/// is a build defect, not a runtime condition.
pub fn srd_defaults() -> WorldConfig {
    toml::from_str(SRD_TOML).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let config: WorldConfig = toml::from_str(SRD_TOML).expect("embedded SRD tables");
        assert_eq!(config.size_chart.len(), 9);
        assert_eq!(config.size_value("med"), 0);
        assert_eq!(config.experience_table.len(), 20);
        assert_eq!(config.xp_for_level(1), 1000);
        assert!(config.save_formulas(srd35_core::model::ClassType::Base).is_some());
    }

    #[test]
    fn defaults_match_the_builtin_fallback() {
        let embedded = srd_defaults();
        assert_eq!(embedded.size_chart, WorldConfig::default().size_chart);
        assert_eq!(
            embedded.experience_table,
            WorldConfig::default().experience_table
        );
    }
}
