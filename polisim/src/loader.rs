use anyhow::Result;
use polisim_core::{CoopRecord, CoopSheet, CoopValue, CountryState};
use polisim_data::Catalog;
use rand::Rng;

/// Build the initial country states from the scenario fixture.
pub fn load_initial_states(catalog: &Catalog) -> Vec<CountryState> {
    catalog
        .scenario
        .countries
        .iter()
        .map(|def| CountryState::from_def(def, catalog))
        .collect()
}

/// Nudge a country's baseline dials so runs differ per seed while staying
/// inside the policy budget: a few random parameters move down one point,
/// a few move up into the freed room.
pub fn randomize_policy(state: &mut CountryState, catalog: &Catalog, rng: &mut impl Rng) {
    let names: Vec<String> = catalog
        .parameters
        .hidden_names()
        .filter(|n| !n.starts_with("Alignment_"))
        .map(str::to_string)
        .collect();
    for _ in 0..4 {
        let down = &names[rng.gen_range(0..names.len())];
        let up = &names[rng.gen_range(0..names.len())];
        let down_val = state.hidden.get(down).unwrap_or(5.0);
        let up_val = state.hidden.get(up).unwrap_or(5.0);
        if down_val >= 1.0 && up_val <= 9.0 {
            state.hidden.set(down, down_val - 1.0);
            state.hidden.set(up, up_val + 1.0);
        }
    }
    state.hidden.set_alignment(rng.gen_range(0..=10) as f64);
}

/// The scripted negotiation stance for a driver run: every country proposes
/// the same modest terms toward every partner, so the symmetric-equality
/// confirmation succeeds by construction.
pub fn scripted_sheet(catalog: &Catalog, me: &str) -> Result<CoopSheet> {
    let mut record = CoopRecord::new();
    record.insert("Cybersecurity_Pact".to_string(), CoopValue::Yes);
    record.insert("Data_Shared".to_string(), CoopValue::Yes);
    record.insert("Emergency_Pact".to_string(), CoopValue::Yes);

    let mut sheet = CoopSheet::new();
    for partner in catalog.scenario.country_names().filter(|n| *n != me) {
        sheet.insert(partner.to_string(), record.clone());
    }
    anyhow::ensure!(!sheet.is_empty(), "scenario has no partners for {me}");
    Ok(sheet)
}
