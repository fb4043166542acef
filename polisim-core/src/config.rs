use crate::systems::conversion::ModelCurve;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Total policy points a country may allocate across hidden parameters.
    pub policy_point_budget: u32,
    /// Base cooperation allowance before the willingness bonus.
    pub coop_base_allowance: u32,
    /// Willingness value assumed when the parameter was never set.
    pub default_willingness: f64,
    /// How many international events are drawn per round.
    pub international_draw: usize,
    /// Maximum movement of one parameter in the post-intel adjustment.
    pub adjustment_cap: u32,
    /// Paper-to-model conversion curve constants.
    pub curve: ModelCurve,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy_point_budget: 100,
            coop_base_allowance: 20,
            default_willingness: 5.0,
            international_draw: 2,
            adjustment_cap: 5,
            curve: ModelCurve::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.policy_point_budget, 100);
        assert_eq!(config.coop_base_allowance, 20);
        assert_eq!(config.international_draw, 2);
    }
}
