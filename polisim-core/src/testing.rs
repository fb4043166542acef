use crate::state::{CountryState, FixedAttributes, HiddenParams};
use polisim_data::{Catalog, Tier};

pub struct CountryBuilder {
    state: CountryState,
}

impl CountryBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            state: CountryState {
                id: id.to_string(),
                hidden: HiddenParams::baseline(Catalog::builtin()),
                fixed: FixedAttributes {
                    labor: 1.0,
                    natural_resource_reserves: Tier::Medium,
                    gdp: Tier::Medium,
                },
                papers: 0.0,
                models: 0.0,
                growth_rate: None,
            },
        }
    }

    pub fn param(mut self, name: &str, value: f64) -> Self {
        self.state.hidden.set(name, value);
        self
    }

    pub fn alignment(mut self, us: f64) -> Self {
        self.state.hidden.set_alignment(us);
        self
    }

    pub fn fixed(mut self, labor: f64, reserves: Tier, gdp: Tier) -> Self {
        self.state.fixed = FixedAttributes {
            labor,
            natural_resource_reserves: reserves,
            gdp,
        };
        self
    }

    pub fn papers(mut self, papers: f64) -> Self {
        self.state.papers = papers;
        self
    }

    pub fn models(mut self, models: f64) -> Self {
        self.state.models = models;
        self
    }

    pub fn build(self) -> CountryState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_methods() {
        let state = CountryBuilder::new("Korea")
            .param("Semiconductor", 8.0)
            .alignment(7.0)
            .fixed(0.6, Tier::Low, Tier::High)
            .papers(150.0)
            .build();

        assert_eq!(state.id, "Korea");
        assert_eq!(state.hidden.get("Semiconductor"), Some(8.0));
        assert_eq!(state.hidden.get("Alignment_China"), Some(3.0));
        assert_eq!(state.fixed.gdp, Tier::High);
        assert_eq!(state.papers, 150.0);
    }
}
