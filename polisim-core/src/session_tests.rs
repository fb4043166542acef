//! End-to-end tests: several country sessions sharing one store across a
//! full round, the way independent player processes would.
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger;
use crate::round::RoundSession;
use crate::state::CountryState;
use crate::store::{self, keys, MemStore};
use crate::systems::coop::{CoopRecord, CoopSheet, CoopValue};
use crate::systems::events::InternationalDraw;
use polisim_data::Catalog;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn scenario_states(catalog: &Catalog) -> Vec<CountryState> {
    catalog
        .scenario
        .countries
        .iter()
        .map(|def| CountryState::from_def(def, catalog))
        .collect()
}

fn friendly_sheet(catalog: &Catalog, me: &str) -> CoopSheet {
    let mut record = CoopRecord::new();
    record.insert("Cybersecurity_Pact".to_string(), CoopValue::Yes);
    record.insert("Talent_Exchange".to_string(), CoopValue::Yes);
    let mut sheet = CoopSheet::new();
    for partner in catalog.scenario.country_names().filter(|n| *n != me) {
        sheet.insert(partner.to_string(), record.clone());
    }
    sheet
}

#[test]
fn test_full_round_across_four_sessions() {
    let catalog = Catalog::builtin();
    let config = EngineConfig::default();
    let store = MemStore::new();

    // Each country runs in its own session with its own RNG stream, the way
    // independent player processes would.
    let mut sessions: Vec<RoundSession> = scenario_states(catalog)
        .into_iter()
        .map(|country| RoundSession::new(&store, catalog, &config, 1, country))
        .collect();

    for session in &mut sessions {
        session.confirm_policy().unwrap();
    }

    let sheets: Vec<CoopSheet> = sessions
        .iter()
        .map(|s| friendly_sheet(catalog, &s.country.id))
        .collect();
    for (session, sheet) in sessions.iter().zip(&sheets) {
        session.submit_cooperation(sheet).unwrap();
    }
    for (session, sheet) in sessions.iter().zip(&sheets) {
        session.confirm_cooperation(sheet).unwrap();
    }

    for (i, session) in sessions.iter_mut().enumerate() {
        let mut rng = StdRng::seed_from_u64(100 + i as u64);
        session.draw_domestic(&mut rng).unwrap();
        session.apply_events(&sheets[i], &mut rng).unwrap();
    }

    // Every session observed the same persisted international sample.
    let draw: InternationalDraw =
        store::read_doc(&store, &keys::international(1)).unwrap().unwrap();
    assert_eq!(draw.event_indices.len(), 2);

    // Assemble and append the ledger record; the round reconstructs exactly.
    let ids: Vec<String> = sessions.iter().map(|s| s.country.id.clone()).collect();
    let mut rng = StdRng::seed_from_u64(7);
    let record =
        ledger::collect(&store, &catalog.scenario, &config.curve, 1, &ids, &mut rng).unwrap();
    ledger::append(&store, &record).unwrap();

    let restored = ledger::read(&store, 1).unwrap().unwrap();
    assert_eq!(restored.checksum(), record.checksum());
    for session in &sessions {
        let entry = &restored.countries[&session.country.id];
        assert_eq!(entry.papers, session.country.papers);
        assert_eq!(entry.models, session.country.models);
    }

    // Re-appending the same round is the loud duplicate error.
    let err = ledger::append(&store, &record).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateRound(1)));
}

#[test]
fn test_sessions_disagree_then_renegotiate() {
    let catalog = Catalog::builtin();
    let config = EngineConfig::default();
    let store = MemStore::new();

    let states = scenario_states(catalog);
    let (korea_state, japan_state) = (states[0].clone(), states[1].clone());
    let korea = RoundSession::new(&store, catalog, &config, 1, korea_state);
    let japan = RoundSession::new(&store, catalog, &config, 1, japan_state);

    let mut korea_sheet = CoopSheet::new();
    let mut toward_japan = CoopRecord::new();
    toward_japan.insert("Data_Shared".to_string(), CoopValue::Yes);
    korea_sheet.insert(japan.country.id.clone(), toward_japan);

    let mut japan_sheet = CoopSheet::new();
    let mut toward_korea = CoopRecord::new();
    toward_korea.insert("Data_Shared".to_string(), CoopValue::No);
    japan_sheet.insert(korea.country.id.clone(), toward_korea);

    korea.submit_cooperation(&korea_sheet).unwrap();

    // Japan has not written yet: Korea sees "waiting", not a rejection, for
    // every partner without a persisted sheet.
    let err = korea.confirm_cooperation(&korea_sheet).unwrap_err();
    assert!(err.is_waiting());

    japan.submit_cooperation(&japan_sheet).unwrap();
    // Taiwan and Mongolia still have no sheets, so mismatches alone decide:
    // Korea's Yes against Japan's No.
    let err = korea.confirm_cooperation(&korea_sheet).unwrap_err();
    match err {
        EngineError::AgreementMismatch { mismatches } => {
            assert!(mismatches
                .contains(&(japan.country.id.clone(), "Data_Shared".to_string())));
        }
        other => panic!("expected mismatch, got {other}"),
    }

    // Japan rewrites matching terms; with every sheet present the pair
    // confirms.
    let mut matching = CoopRecord::new();
    matching.insert("Data_Shared".to_string(), CoopValue::Yes);
    let mut japan_fixed = CoopSheet::new();
    japan_fixed.insert(korea.country.id.clone(), matching);
    japan.submit_cooperation(&japan_fixed).unwrap();

    for other in &states[2..] {
        let session = RoundSession::new(&store, catalog, &config, 1, other.clone());
        session.submit_cooperation(&CoopSheet::new()).unwrap();
    }
    let cost = korea.confirm_cooperation(&korea_sheet).unwrap();
    assert_eq!(cost, 3);
}

#[test]
fn test_international_draw_shared_between_late_and_early_sessions() {
    let catalog = Catalog::builtin();
    let config = EngineConfig::default();
    let store = MemStore::new();

    let states = scenario_states(catalog);
    let mut first = RoundSession::new(&store, catalog, &config, 2, states[0].clone());
    let mut second = RoundSession::new(&store, catalog, &config, 2, states[1].clone());

    let mut rng_first = StdRng::seed_from_u64(1);
    let mut rng_second = StdRng::seed_from_u64(999);

    first.confirm_policy().unwrap();
    second.confirm_policy().unwrap();
    first.draw_domestic(&mut rng_first).unwrap();
    second.draw_domestic(&mut rng_second).unwrap();

    let entry_first = first.apply_events(&CoopSheet::new(), &mut rng_first).unwrap();
    let entry_second = second.apply_events(&CoopSheet::new(), &mut rng_second).unwrap();

    // Both countries resolved against one persisted draw even though their
    // RNG streams differ; with no partners the international delta is zero.
    assert_eq!(entry_first.breakdown.international_papers, 0);
    assert_eq!(entry_second.breakdown.international_papers, 0);
    let draw: InternationalDraw =
        store::read_doc(&store, &keys::international(2)).unwrap().unwrap();
    assert_eq!(draw.round, 2);
}
