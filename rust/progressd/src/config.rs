use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Hours scale by this much per point of gap between a level's reference
/// ability and the student's deviation value.
pub const DEFAULT_ABILITY_SLOPE: f64 = 0.025;

pub const SETTINGS_KEY: &str = "calc.config";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelReference {
    pub name: String,
    pub reference_ability: f64,
}

/// Curriculum level table plus the calibration slope. Levels are kept in
/// ascending difficulty order; that order is what reports use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcConfig {
    pub levels: Vec<LevelReference>,
    #[serde(default = "default_slope")]
    pub ability_slope: f64,
}

fn default_slope() -> f64 {
    DEFAULT_ABILITY_SLOPE
}

impl Default for CalcConfig {
    fn default() -> Self {
        let levels = [("Foundation", 50.0), ("Tier-A", 60.0), ("Tier-B", 70.0), ("Tier-C", 75.0)]
            .into_iter()
            .map(|(name, reference_ability)| LevelReference {
                name: name.to_string(),
                reference_ability,
            })
            .collect();
        Self {
            levels,
            ability_slope: DEFAULT_ABILITY_SLOPE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one curriculum level is required")]
    NoLevels,
    #[error("curriculum level name must not be empty")]
    EmptyName,
    #[error("duplicate curriculum level: {0}")]
    DuplicateLevel(String),
    #[error("reference ability for {0} must be a finite number")]
    BadReference(String),
    #[error("abilitySlope must be a finite number >= 0")]
    BadSlope,
}

impl CalcConfig {
    pub fn reference_ability(&self, level: &str) -> Option<f64> {
        self.levels
            .iter()
            .find(|l| l.name == level)
            .map(|l| l.reference_ability)
    }

    pub fn level_names(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|l| l.name.as_str())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels.is_empty() {
            return Err(ConfigError::NoLevels);
        }
        let mut seen = HashSet::new();
        for l in &self.levels {
            let name = l.name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateLevel(name.to_string()));
            }
            if !l.reference_ability.is_finite() {
                return Err(ConfigError::BadReference(name.to_string()));
            }
        }
        if !self.ability_slope.is_finite() || self.ability_slope < 0.0 {
            return Err(ConfigError::BadSlope);
        }
        Ok(())
    }

    /// Parse a config from the workspace `curriculum_levels.json` layout or
    /// the stored settings value (same shape).
    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let cfg: CalcConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
