use crate::state::{FixedAttributes, HiddenParams};
use polisim_data::ParameterCatalog;
use polisim_formula::round_half_even;

/// Deterministic baseline papers-per-round from a country's own dials.
///
/// `round(4 * ((tech_term * human_term + cultural_term) * labor_term * nat * gdp))`
/// where the technical term is a weighted log, the human term a geometric
/// mean, and the cultural term a scaled tanh. Returns `None` when a required
/// parameter is missing or the inputs leave the formula's domain; never
/// panics.
pub fn growth_rate(
    hidden: &HiddenParams,
    fixed: &FixedAttributes,
    params: &ParameterCatalog,
) -> Option<i64> {
    let semiconductor = hidden.get("Semiconductor")?;
    let electricity = hidden.get("Electricity")?;
    let open_source = hidden.get("Open_Source_Adoption")?;
    let investment = hidden.get("AI_Investment_Focus")?;
    let talent = hidden.get("Talent_Index")?;
    let education = hidden.get("Education_Investment")?;
    let literacy = hidden.get("AI_Literacy_Education")?;
    let stability = hidden.get("Democratic_Stability_Index")?;

    let tech_inner = 1.0 + 1.2 * semiconductor + 0.8 * electricity + open_source + 1.5 * investment;
    if tech_inner < 1.0 {
        return None;
    }
    let tech_term = tech_inner.ln().powf(1.2);
    let human_term = ((talent + 1.0) * (education + 1.0)).sqrt();
    let cultural_term = 15.0 * ((0.2 * (literacy + stability)).tanh() + 1.0);
    let labor_term = fixed.labor.powf(0.75);
    let nat = params
        .resource_multipliers
        .factor(fixed.natural_resource_reserves);
    let gdp = params.gdp_multipliers.factor(fixed.gdp);

    let raw = 4.0 * ((tech_term * human_term + cultural_term) * labor_term * nat * gdp);
    if !raw.is_finite() {
        return None;
    }
    Some(round_half_even(raw).max(0.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountryBuilder;
    use polisim_data::{Catalog, Tier};

    fn reference_state() -> crate::state::CountryState {
        CountryBuilder::new("Korea")
            .param("Semiconductor", 6.0)
            .param("Electricity", 5.0)
            .param("Open_Source_Adoption", 5.0)
            .param("AI_Investment_Focus", 6.0)
            .param("Talent_Index", 7.0)
            .param("Education_Investment", 6.0)
            .param("AI_Literacy_Education", 4.0)
            .param("Democratic_Stability_Index", 7.0)
            .fixed(0.6, Tier::Low, Tier::High)
            .build()
    }

    #[test]
    fn test_reference_scenario_regression() {
        let catalog = Catalog::builtin();
        let state = reference_state();
        let growth = growth_rate(&state.hidden, &state.fixed, &catalog.parameters);
        assert_eq!(growth, Some(198));
    }

    #[test]
    fn test_deterministic_and_non_negative() {
        let catalog = Catalog::builtin();
        let state = reference_state();
        let a = growth_rate(&state.hidden, &state.fixed, &catalog.parameters).unwrap();
        let b = growth_rate(&state.hidden, &state.fixed, &catalog.parameters).unwrap();
        assert_eq!(a, b);
        assert!(a >= 0);

        // All-zero dials still produce a whole number >= 0.
        let mut zeroed = CountryBuilder::new("X").build();
        for name in catalog.parameters.hidden_names() {
            zeroed.hidden.set(name, 0.0);
        }
        zeroed.hidden.set_alignment(0.0);
        let g = growth_rate(&zeroed.hidden, &zeroed.fixed, &catalog.parameters).unwrap();
        assert!(g >= 0);
    }

    #[test]
    fn test_missing_key_fails_closed() {
        let catalog = Catalog::builtin();
        let state = CountryBuilder::new("X").build();
        let mut hidden = crate::state::HiddenParams::new();
        hidden.set("Semiconductor", 5.0);
        assert_eq!(
            growth_rate(&hidden, &state.fixed, &catalog.parameters),
            None
        );
    }
}
