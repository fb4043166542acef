use polisim_data::{Catalog, CountryDef, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type CountryId = String;

/// Session-immutable country attributes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FixedAttributes {
    /// Relative population, already numeric (e.g. 0.6).
    pub labor: f64,
    pub natural_resource_reserves: Tier,
    pub gdp: Tier,
}

/// The paired alignment dials: together they always sum to 10 and consume a
/// flat 10 policy points.
pub const ALIGNMENT_US: &str = "Alignment_US";
pub const ALIGNMENT_CHINA: &str = "Alignment_China";

/// A country's private policy dials for the round.
///
/// Values are numeric in [0, 10]; the point budget is the plain sum of all
/// values (the alignment pair contributes exactly 10 by construction).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiddenParams {
    values: BTreeMap<String, f64>,
}

impl HiddenParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every catalog parameter at its midpoint (5), alignment split 5/5.
    pub fn baseline(catalog: &Catalog) -> Self {
        let mut params = HiddenParams::new();
        for name in catalog.parameters.hidden_names() {
            params.values.insert(name.to_string(), 5.0);
        }
        params.set_alignment(5.0);
        params
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        if name == ALIGNMENT_US || name == ALIGNMENT_CHINA {
            let us = if name == ALIGNMENT_US { value } else { 10.0 - value };
            self.set_alignment(us);
        } else {
            self.values.insert(name.to_string(), value);
        }
    }

    /// Set the paired alignment dials; the China side is always `10 - us`.
    pub fn set_alignment(&mut self, us: f64) {
        self.values.insert(ALIGNMENT_US.to_string(), us);
        self.values.insert(ALIGNMENT_CHINA.to_string(), 10.0 - us);
    }

    /// Total policy points allocated.
    pub fn points_used(&self) -> f64 {
        self.values.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.values
    }
}

/// One country's running state across rounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryState {
    pub id: CountryId,
    pub hidden: HiddenParams,
    pub fixed: FixedAttributes,
    /// Cumulative notable papers; fractional internally, floored for display.
    pub papers: f64,
    /// Cumulative notable models; fractional internally, floored for display.
    pub models: f64,
    /// Baseline papers-per-round, computed at policy confirmation.
    pub growth_rate: Option<i64>,
}

impl CountryState {
    pub fn from_def(def: &CountryDef, catalog: &Catalog) -> CountryState {
        CountryState {
            id: def.name.clone(),
            hidden: HiddenParams::baseline(catalog),
            fixed: FixedAttributes {
                labor: def.labor,
                natural_resource_reserves: def.natural_resource_reserves,
                gdp: def.gdp,
            },
            papers: def.initial_papers,
            models: def.initial_models,
            growth_rate: None,
        }
    }

    pub fn display_papers(&self) -> i64 {
        self.papers.floor() as i64
    }

    pub fn display_models(&self) -> i64 {
        self.models.floor() as i64
    }
}

/// A country's persisted policy document: the frozen hidden parameters plus
/// the fixed attributes and the growth preview, written at confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenDoc {
    pub params: BTreeMap<String, f64>,
    pub fixed: FixedAttributes,
    pub growth_rate: Option<i64>,
}

impl HiddenDoc {
    pub fn new(state: &CountryState) -> HiddenDoc {
        HiddenDoc {
            params: state.hidden.as_map().clone(),
            fixed: state.fixed,
            growth_rate: state.growth_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polisim_data::Catalog;

    #[test]
    fn test_alignment_coupling() {
        let mut params = HiddenParams::new();
        params.set_alignment(7.0);
        assert_eq!(params.get(ALIGNMENT_US), Some(7.0));
        assert_eq!(params.get(ALIGNMENT_CHINA), Some(3.0));

        params.set(ALIGNMENT_CHINA, 8.0);
        assert_eq!(params.get(ALIGNMENT_US), Some(2.0));
        assert_eq!(params.get(ALIGNMENT_CHINA), Some(8.0));
    }

    #[test]
    fn test_baseline_within_budget() {
        let catalog = Catalog::builtin();
        let params = HiddenParams::baseline(catalog);
        assert!(params.points_used() <= 100.0);
        // The alignment pair always contributes exactly 10.
        let pair = params.get(ALIGNMENT_US).unwrap() + params.get(ALIGNMENT_CHINA).unwrap();
        assert_eq!(pair, 10.0);
    }

    #[test]
    fn test_from_def_seeds_initial_stocks() {
        let catalog = Catalog::builtin();
        let def = catalog.scenario.country("Korea").unwrap();
        let state = CountryState::from_def(def, catalog);
        assert_eq!(state.papers, 150.0);
        assert_eq!(state.models, 1.0);
        assert_eq!(state.fixed.natural_resource_reserves, Tier::Low);
        assert_eq!(state.display_papers(), 150);
    }
}
