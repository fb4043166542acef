//! Static catalog data for the policy simulation.
//!
//! This crate owns everything that is configuration rather than mechanism:
//! the hidden-parameter groups and their point costs, the
//! category-to-multiplier tables for fixed country attributes, the
//! cooperation-parameter table, the domestic and international event
//! catalogs, and the scenario fixtures (playable countries and the two
//! superpower reference tracks).
//!
//! The catalog documents are JSON files embedded at compile time and parsed
//! once; event formulas are compiled through `polisim-formula` at load, so a
//! defective formula is diagnosed up front (and fails closed at evaluation
//! time) instead of being re-parsed per round.

pub mod error;

pub use error::CatalogError;

use polisim_formula::{Formula, FormulaError, Scope};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

/// A categorical level for fixed country attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Low => write!(f, "Low"),
            Tier::Medium => write!(f, "Medium"),
            Tier::High => write!(f, "High"),
        }
    }
}

/// A tier-to-factor lookup table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTable {
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Medium")]
    pub medium: f64,
    #[serde(rename = "High")]
    pub high: f64,
}

impl TierTable {
    pub fn factor(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Low => self.low,
            Tier::Medium => self.medium,
            Tier::High => self.high,
        }
    }
}

/// A named group of hidden parameters, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterGroup {
    pub name: String,
    pub parameters: Vec<String>,
}

/// What shape a cooperation parameter takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoopKind {
    /// Yes/No.
    Bool,
    /// One option from a list (defaults to "None").
    Select,
    /// A small radio choice (defaults to "None").
    Radio,
}

/// Definition of one cooperation parameter: its shape, point cost, and (for
/// non-boolean kinds) the option list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoopParamDef {
    pub name: String,
    pub description: String,
    pub kind: CoopKind,
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// The hidden-parameter side of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterCatalog {
    pub groups: Vec<ParameterGroup>,
    pub descriptions: BTreeMap<String, String>,
    pub cooperation: Vec<CoopParamDef>,
    pub resource_multipliers: TierTable,
    pub gdp_multipliers: TierTable,
}

impl ParameterCatalog {
    /// All hidden parameter names in catalog order.
    pub fn hidden_names(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.parameters.iter())
            .map(String::as_str)
    }

    /// Look up a cooperation parameter definition by name.
    pub fn coop(&self, name: &str) -> Option<&CoopParamDef> {
        self.cooperation.iter().find(|p| p.name == name)
    }
}

/// A formula carried by a catalog event: the original source string plus its
/// compile result. Compilation failures are kept (not dropped) so that
/// evaluation reports the same diagnostic every round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EventFormula {
    source: String,
    compiled: Result<Formula, FormulaError>,
}

impl From<String> for EventFormula {
    fn from(source: String) -> Self {
        let compiled = Formula::parse(&source);
        if let Err(e) = &compiled {
            log::warn!("catalog formula does not compile ({e}): {source}");
        }
        EventFormula { source, compiled }
    }
}

impl From<EventFormula> for String {
    fn from(f: EventFormula) -> String {
        f.source
    }
}

impl EventFormula {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the formula compiled.
    pub fn is_valid(&self) -> bool {
        self.compiled.is_ok()
    }

    /// Evaluate to an integer delta, or the compile/eval error.
    pub fn eval_delta(&self, scope: &dyn Scope) -> Result<i64, FormulaError> {
        match &self.compiled {
            Ok(formula) => formula.eval_delta(scope),
            Err(e) => Err(e.clone()),
        }
    }
}

/// A domestic event: drawn privately, applied to the drawing country only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomesticEvent {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub delta_papers: EventFormula,
    pub delta_models: EventFormula,
}

impl DomesticEvent {
    /// The neutral substitute for an id missing from the catalog: zero
    /// deltas, never an error.
    pub fn unknown() -> DomesticEvent {
        DomesticEvent {
            id: 0,
            title: "Unknown Event".to_string(),
            description: "No catalog entry for the drawn id".to_string(),
            delta_papers: EventFormula::from("0".to_string()),
            delta_models: EventFormula::from("0".to_string()),
        }
    }
}

/// An international event: drawn once per round globally, applied to every
/// country through its own parameters and cooperation records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternationalEvent {
    pub title: String,
    pub description: String,
    pub delta_papers: EventFormula,
    pub delta_models: EventFormula,
}

/// A playable country's fixed attributes and starting stocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryDef {
    pub name: String,
    pub labor: f64,
    pub natural_resource_reserves: Tier,
    pub gdp: Tier,
    pub initial_papers: f64,
    pub initial_models: f64,
}

/// Starting stocks for one superpower reference track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuperpowerDef {
    pub papers: f64,
    pub models: f64,
}

/// The scenario fixture: playable countries plus the two reference tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub countries: Vec<CountryDef>,
    pub superpowers: SuperpowerDefs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperpowerDefs {
    pub united_states: SuperpowerDef,
    pub china: SuperpowerDef,
}

impl Scenario {
    pub fn country(&self, name: &str) -> Option<&CountryDef> {
        self.countries.iter().find(|c| c.name == name)
    }

    pub fn country_names(&self) -> impl Iterator<Item = &str> {
        self.countries.iter().map(|c| c.name.as_str())
    }
}

/// The full static catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub parameters: ParameterCatalog,
    pub domestic: Vec<DomesticEvent>,
    pub international: Vec<InternationalEvent>,
    pub scenario: Scenario,
}

impl Catalog {
    /// Parse and validate a catalog from its three JSON documents.
    pub fn from_documents(
        parameters: &str,
        domestic: &str,
        international: &str,
        scenario: &str,
    ) -> Result<Catalog, CatalogError> {
        let parameters: ParameterCatalog = serde_json::from_str(parameters)?;
        let domestic: Vec<DomesticEvent> = serde_json::from_str(domestic)?;
        let international: Vec<InternationalEvent> = serde_json::from_str(international)?;
        let scenario: Scenario = serde_json::from_str(scenario)?;

        if domestic.is_empty() {
            return Err(CatalogError::EmptySection("domestic_events"));
        }
        if international.is_empty() {
            return Err(CatalogError::EmptySection("international_events"));
        }
        if parameters.groups.is_empty() {
            return Err(CatalogError::EmptySection("parameter groups"));
        }

        let mut seen = HashSet::new();
        for event in &domestic {
            if !seen.insert(event.id) {
                return Err(CatalogError::DuplicateEventId(event.id));
            }
        }

        for coop in &parameters.cooperation {
            if matches!(coop.kind, CoopKind::Select | CoopKind::Radio) && coop.options.is_none() {
                let kind = match coop.kind {
                    CoopKind::Select => "select",
                    CoopKind::Radio => "radio",
                    CoopKind::Bool => unreachable!(),
                };
                return Err(CatalogError::MissingOptions(coop.name.clone(), kind));
            }
        }

        Ok(Catalog {
            parameters,
            domestic,
            international,
            scenario,
        })
    }

    /// The built-in catalog, loaded once from the embedded documents.
    pub fn builtin() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            Catalog::from_documents(
                include_str!("../data/parameters.json"),
                include_str!("../data/domestic_events.json"),
                include_str!("../data/international_events.json"),
                include_str!("../data/scenario.json"),
            )
            .expect("embedded catalog documents must be valid")
        })
    }

    /// Look up a domestic event by id.
    pub fn domestic_event(&self, id: u32) -> Option<&DomesticEvent> {
        self.domestic.iter().find(|e| e.id == id)
    }
}
