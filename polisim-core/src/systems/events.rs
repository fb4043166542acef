//! Event drawing and delta resolution.
//!
//! Domestic events are private: one uniform draw per country per round.
//! International events are shared: one draw per round globally, persisted
//! first-writer-wins so every session observes the identical sample, and
//! applied per country through that country's own parameters and bilateral
//! cooperation records.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::scope::{bilateral_scope, ParamScope};
use crate::store::{self, keys, SharedStore};
use crate::systems::coop::CoopSheet;
use polisim_data::{Catalog, DomesticEvent, EventFormula, InternationalEvent};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Per-country round progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPhase {
    NotStarted,
    DomesticDrawn,
    EventsApplied,
}

impl std::fmt::Display for EventPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventPhase::NotStarted => write!(f, "not-started"),
            EventPhase::DomesticDrawn => write!(f, "domestic-drawn"),
            EventPhase::EventsApplied => write!(f, "events-applied"),
        }
    }
}

/// The persisted record of a country's private domestic draw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomesticOutcome {
    pub event_id: u32,
    pub title: String,
}

/// The persisted once-per-round global sample of international events,
/// stored as indices into the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternationalDraw {
    pub round: u32,
    pub event_indices: Vec<usize>,
}

/// Deltas accumulated from one resolution step, with the diagnostics of any
/// formula that failed closed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventDeltas {
    pub papers: i64,
    pub models: i64,
    pub diagnostics: Vec<String>,
}

/// Draw a domestic event id uniformly from the catalog range.
pub fn draw_domestic_id(catalog: &Catalog, rng: &mut impl Rng) -> u32 {
    rng.gen_range(1..=catalog.domestic.len() as u32)
}

/// Resolve a drawn id, substituting the neutral unknown event when the id is
/// absent from the catalog.
pub fn domestic_event_or_unknown(catalog: &Catalog, id: u32) -> DomesticEvent {
    match catalog.domestic_event(id) {
        Some(event) => event.clone(),
        None => {
            log::warn!("domestic event id {id} not in catalog, substituting the unknown event");
            DomesticEvent::unknown()
        }
    }
}

/// Obtain this round's global international sample.
///
/// Idempotent across sessions: the first caller persists its draw through
/// exclusive creation, every later caller (and the first, on re-entry) reads
/// the persisted sample back. The RNG is only consulted when no draw exists
/// yet.
#[instrument(skip_all, fields(round = round))]
pub fn international_draw(
    store: &dyn SharedStore,
    catalog: &Catalog,
    config: &EngineConfig,
    round: u32,
    rng: &mut impl Rng,
) -> Result<InternationalDraw, EngineError> {
    let key = keys::international(round);
    if let Some(existing) = store::read_doc(store, &key)? {
        return Ok(existing);
    }
    let sample = rand::seq::index::sample(
        rng,
        catalog.international.len(),
        config.international_draw.min(catalog.international.len()),
    )
    .into_vec();
    let proposal = InternationalDraw {
        round,
        event_indices: sample,
    };
    // A racing session may have created the document between the read and
    // here; first writer still wins.
    let persisted = store::create_or_read(store, &key, &proposal)?;
    Ok(persisted)
}

/// Look up the drawn international events.
pub fn drawn_events<'a>(catalog: &'a Catalog, draw: &InternationalDraw) -> Vec<&'a InternationalEvent> {
    draw.event_indices
        .iter()
        .filter_map(|&idx| catalog.international.get(idx))
        .collect()
}

fn eval_or_zero(
    formula: &EventFormula,
    scope: &ParamScope,
    title: &str,
    which: &str,
    diagnostics: &mut Vec<String>,
) -> i64 {
    match formula.eval_delta(scope) {
        Ok(delta) => delta,
        Err(e) => {
            let diagnostic = format!("{title}/{which}: {e}");
            log::warn!("formula failed closed: {diagnostic}");
            diagnostics.push(diagnostic);
            0
        }
    }
}

/// Apply one domestic event against the country's own scope.
pub fn domestic_deltas(event: &DomesticEvent, scope: &ParamScope) -> EventDeltas {
    let mut out = EventDeltas::default();
    out.papers = eval_or_zero(
        &event.delta_papers,
        scope,
        &event.title,
        "papers",
        &mut out.diagnostics,
    );
    out.models = eval_or_zero(
        &event.delta_models,
        scope,
        &event.title,
        "models",
        &mut out.diagnostics,
    );
    out
}

/// Apply the shared international sample for one country: each event is
/// evaluated once per cooperation partner against the union of the country's
/// own scope and that bilateral record, then summed over partners and
/// events. A country with no partners gets zero deltas; a failing term zeros
/// only itself.
pub fn international_deltas(
    events: &[&InternationalEvent],
    base: &ParamScope,
    sheet: &CoopSheet,
) -> EventDeltas {
    let mut out = EventDeltas::default();
    for event in events {
        for record in sheet.values() {
            let scope = bilateral_scope(base, record);
            out.papers += eval_or_zero(
                &event.delta_papers,
                &scope,
                &event.title,
                "papers",
                &mut out.diagnostics,
            );
            out.models += eval_or_zero(
                &event.delta_models,
                &scope,
                &event.title,
                "models",
                &mut out.diagnostics,
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::hidden_scope;
    use crate::store::MemStore;
    use crate::systems::coop::{CoopRecord, CoopValue};
    use crate::testing::CountryBuilder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_domestic_draw_in_range() {
        let catalog = Catalog::builtin();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let id = draw_domestic_id(catalog, &mut rng);
            assert!((1..=catalog.domestic.len() as u32).contains(&id));
        }
    }

    #[test]
    fn test_missing_id_substitutes_unknown() {
        let catalog = Catalog::builtin();
        let event = domestic_event_or_unknown(catalog, 9_999);
        assert_eq!(event.title, "Unknown Event");
        let scope = ParamScope::default();
        assert_eq!(domestic_deltas(&event, &scope).papers, 0);
    }

    #[test]
    fn test_international_draw_idempotent_across_sessions() {
        let catalog = Catalog::builtin();
        let config = EngineConfig::default();
        let store = MemStore::new();

        // Two sessions with different RNG streams must observe one sample.
        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(2);
        let a = international_draw(&store, catalog, &config, 3, &mut rng_a).unwrap();
        let b = international_draw(&store, catalog, &config, 3, &mut rng_b).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.event_indices.len(), 2);
        assert_ne!(a.event_indices[0], a.event_indices[1]);
    }

    #[test]
    fn test_zero_partners_zero_delta() {
        let catalog = Catalog::builtin();
        let state = CountryBuilder::new("Korea").build();
        let base = hidden_scope(&state, &catalog.parameters);
        let draw = InternationalDraw {
            round: 1,
            event_indices: vec![0, 1],
        };
        let events = drawn_events(catalog, &draw);
        let deltas = international_deltas(&events, &base, &CoopSheet::new());
        assert_eq!(deltas.papers, 0);
        assert_eq!(deltas.models, 0);
    }

    #[test]
    fn test_international_sums_over_partners() {
        let catalog = Catalog::builtin();
        let state = CountryBuilder::new("Korea").build();
        let base = hidden_scope(&state, &catalog.parameters);

        // "Cyberattack on Shared Infrastructure" (index 1) with a confirmed
        // Cybersecurity_Pact and baseline IP_Protection_Strength=5:
        //   papers: round(min(-1, -13*(1 - 1) + 5)) = -1 per partner
        //   models: round(min(0, -2*(1 - 1) + 0.2*5)) = 0 per partner
        let mut record = CoopRecord::new();
        record.insert("Cybersecurity_Pact".to_string(), CoopValue::Yes);
        let mut sheet = CoopSheet::new();
        sheet.insert("Japan".to_string(), record.clone());
        sheet.insert("Taiwan".to_string(), record);

        let draw = InternationalDraw {
            round: 1,
            event_indices: vec![1],
        };
        let events = drawn_events(catalog, &draw);
        let deltas = international_deltas(&events, &base, &sheet);
        assert_eq!(deltas.papers, -2);
        assert_eq!(deltas.models, 0);
        assert!(deltas.diagnostics.is_empty());
    }

    #[test]
    fn test_unset_cooperative_value_zeroes_single_term() {
        let catalog = Catalog::builtin();
        let state = CountryBuilder::new("Korea").build();
        let base = hidden_scope(&state, &catalog.parameters);

        // An entirely unset record: every bool reads as typed None, so the
        // arithmetic formulas fail closed per term rather than erroring the
        // round.
        let mut sheet = CoopSheet::new();
        sheet.insert("Japan".to_string(), CoopRecord::new());

        let draw = InternationalDraw {
            round: 1,
            event_indices: vec![0, 1],
        };
        let events = drawn_events(catalog, &draw);
        let deltas = international_deltas(&events, &base, &sheet);
        assert_eq!(deltas.papers, 0);
        assert_eq!(deltas.models, 0);
        assert!(!deltas.diagnostics.is_empty());
    }
}
