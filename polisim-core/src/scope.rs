//! Scope construction for formula evaluation.
//!
//! The evaluator never auto-coerces categorical strings; the one coercion
//! policy of the whole engine lives here. Tiered fixed attributes are mapped
//! through the catalog multiplier tables before any formula sees them, and
//! cooperative values coerce Yes/No to 1/0 with unset becoming the typed
//! `None` the evaluator fails closed on.

use crate::state::CountryState;
use crate::systems::coop::CoopRecord;
use polisim_data::ParameterCatalog;
use polisim_formula::Value;
use rustc_hash::FxHashMap;

pub type ParamScope = FxHashMap<String, Value>;

/// A country's own evaluation scope: hidden parameters plus the pre-mapped
/// fixed attributes.
pub fn hidden_scope(state: &CountryState, params: &ParameterCatalog) -> ParamScope {
    let mut scope = ParamScope::default();
    for (name, value) in state.hidden.iter() {
        scope.insert(name.to_string(), Value::Num(value));
    }
    scope.insert("Labor".to_string(), Value::Num(state.fixed.labor));
    scope.insert(
        "Natural_Resource_Reserves".to_string(),
        Value::Num(
            params
                .resource_multipliers
                .factor(state.fixed.natural_resource_reserves),
        ),
    );
    scope.insert(
        "GDP".to_string(),
        Value::Num(params.gdp_multipliers.factor(state.fixed.gdp)),
    );
    scope
}

/// The union scope for one (country, partner) pair: the country's own scope
/// with the coerced bilateral record layered on top.
pub fn bilateral_scope(base: &ParamScope, record: &CoopRecord) -> ParamScope {
    let mut scope = base.clone();
    for (name, value) in record {
        scope.insert(name.clone(), value.as_value());
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::coop::CoopValue;
    use crate::testing::CountryBuilder;
    use polisim_data::Catalog;

    #[test]
    fn test_tiers_are_pre_mapped() {
        let catalog = Catalog::builtin();
        let state = CountryBuilder::new("Korea")
            .fixed(0.6, polisim_data::Tier::Low, polisim_data::Tier::High)
            .build();
        let scope = hidden_scope(&state, &catalog.parameters);

        assert_eq!(scope.get("Labor"), Some(&Value::Num(0.6)));
        assert_eq!(scope.get("Natural_Resource_Reserves"), Some(&Value::Num(1.0)));
        assert_eq!(scope.get("GDP"), Some(&Value::Num(1.2)));
    }

    #[test]
    fn test_bilateral_overlay() {
        let catalog = Catalog::builtin();
        let state = CountryBuilder::new("Korea").build();
        let base = hidden_scope(&state, &catalog.parameters);

        let mut record = CoopRecord::new();
        record.insert("Data_Shared".to_string(), CoopValue::Yes);
        record.insert("Energy_Shared".to_string(), CoopValue::No);
        record.insert("Joint_Project".to_string(), CoopValue::Unset);
        record.insert(
            "AI_Standard_Alignment".to_string(),
            CoopValue::Choice("US".to_string()),
        );

        let scope = bilateral_scope(&base, &record);
        assert_eq!(scope.get("Data_Shared"), Some(&Value::Num(1.0)));
        assert_eq!(scope.get("Energy_Shared"), Some(&Value::Num(0.0)));
        assert_eq!(scope.get("Joint_Project"), Some(&Value::None));
        assert_eq!(
            scope.get("AI_Standard_Alignment"),
            Some(&Value::Str("US".to_string()))
        );
        // The base scope still resolves underneath.
        assert!(scope.contains_key("Semiconductor"));
    }
}
