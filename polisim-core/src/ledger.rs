//! The append-only round ledger.
//!
//! One record per round, keyed by round number through the shared store's
//! exclusive-create primitive: appending an existing round number is a loud
//! [`EngineError::DuplicateRound`], never a silent overwrite. Records are
//! assembled from the per-country result documents each session persisted,
//! so any prior round reconstructs exactly from storage with no
//! recomputation.

use crate::error::EngineError;
use crate::state::CountryId;
use crate::store::{self, keys, SharedStore, StoreError};
use crate::systems::conversion::ModelCurve;
use polisim_data::Scenario;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Per-country delta breakdown for one round.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeltaBreakdown {
    pub base_growth: i64,
    pub domestic_papers: i64,
    pub domestic_models: i64,
    pub international_papers: i64,
    pub international_models: i64,
    /// Conversion-curve contribution; the only fractional delta.
    pub models_from_papers: f64,
}

/// One country's totals and breakdown after a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryRoundEntry {
    pub papers: f64,
    pub models: f64,
    pub breakdown: DeltaBreakdown,
}

/// The shared superpower reference track for one round, drawn once globally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperpowerTrack {
    pub us_papers: f64,
    pub us_models: f64,
    pub china_papers: f64,
    pub china_models: f64,
}

impl SuperpowerTrack {
    pub fn initial(scenario: &Scenario) -> SuperpowerTrack {
        SuperpowerTrack {
            us_papers: scenario.superpowers.united_states.papers,
            us_models: scenario.superpowers.united_states.models,
            china_papers: scenario.superpowers.china.papers,
            china_models: scenario.superpowers.china.models,
        }
    }

    /// Advance one round: uniform paper gains, model counts re-estimated
    /// from the conversion curve.
    pub fn advance(&self, curve: &ModelCurve, rng: &mut impl Rng) -> SuperpowerTrack {
        let us_papers = self.us_papers + rng.gen_range(150..=250) as f64;
        let china_papers = self.china_papers + rng.gen_range(200..=300) as f64;
        SuperpowerTrack {
            us_papers,
            us_models: curve.display_estimate(us_papers),
            china_papers,
            china_models: curve.display_estimate(china_papers),
        }
    }
}

/// The definitive record of one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub countries: BTreeMap<CountryId, CountryRoundEntry>,
    pub superpowers: SuperpowerTrack,
}

impl RoundRecord {
    /// Deterministic checksum over the record, for drift detection when a
    /// round is reconstructed from storage.
    pub fn checksum(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.round.hash(&mut hasher);
        for (country, entry) in &self.countries {
            country.hash(&mut hasher);
            entry.papers.to_bits().hash(&mut hasher);
            entry.models.to_bits().hash(&mut hasher);
            entry.breakdown.base_growth.hash(&mut hasher);
            entry.breakdown.domestic_papers.hash(&mut hasher);
            entry.breakdown.domestic_models.hash(&mut hasher);
            entry.breakdown.international_papers.hash(&mut hasher);
            entry.breakdown.international_models.hash(&mut hasher);
            entry.breakdown.models_from_papers.to_bits().hash(&mut hasher);
        }
        self.superpowers.us_papers.to_bits().hash(&mut hasher);
        self.superpowers.us_models.to_bits().hash(&mut hasher);
        self.superpowers.china_papers.to_bits().hash(&mut hasher);
        self.superpowers.china_models.to_bits().hash(&mut hasher);
        hasher.finish()
    }
}

/// Append a record; refusing a round number that already exists.
pub fn append(store: &dyn SharedStore, record: &RoundRecord) -> Result<(), EngineError> {
    match store::create_doc(store, &keys::ledger(record.round), record) {
        Ok(()) => Ok(()),
        Err(StoreError::AlreadyExists(_)) => Err(EngineError::DuplicateRound(record.round)),
        Err(e) => Err(e.into()),
    }
}

/// Read a prior round's record back, exactly as stored.
pub fn read(store: &dyn SharedStore, round: u32) -> Result<Option<RoundRecord>, EngineError> {
    Ok(store::read_doc(store, &keys::ledger(round))?)
}

/// Assemble a round's record from the per-country result documents.
///
/// Every listed country must have persisted its result; otherwise the
/// missing ones are reported as [`EngineError::DataNotReady`]. The
/// superpower track is drawn here if no session drew it yet
/// (first-writer-wins like the international draw).
pub fn collect(
    store: &dyn SharedStore,
    scenario: &Scenario,
    curve: &ModelCurve,
    round: u32,
    countries: &[CountryId],
    rng: &mut impl Rng,
) -> Result<RoundRecord, EngineError> {
    let mut entries = BTreeMap::new();
    let mut waiting = Vec::new();
    for country in countries {
        match store::read_doc::<CountryRoundEntry>(store, &keys::result(round, country))? {
            Some(entry) => {
                entries.insert(country.clone(), entry);
            }
            None => waiting.push(country.clone()),
        }
    }
    if !waiting.is_empty() {
        return Err(EngineError::DataNotReady {
            waiting_on: waiting,
        });
    }

    let superpowers = superpower_track(store, scenario, curve, round, rng)?;
    Ok(RoundRecord {
        round,
        countries: entries,
        superpowers,
    })
}

/// This round's shared superpower track: first caller draws and persists,
/// everyone else reads the same draw.
pub fn superpower_track(
    store: &dyn SharedStore,
    scenario: &Scenario,
    curve: &ModelCurve,
    round: u32,
    rng: &mut impl Rng,
) -> Result<SuperpowerTrack, EngineError> {
    let key = keys::superpowers(round);
    if let Some(existing) = store::read_doc(store, &key)? {
        return Ok(existing);
    }
    let previous = match round.checked_sub(1).filter(|r| *r >= 1) {
        Some(prev_round) => match read(store, prev_round)? {
            Some(record) => record.superpowers,
            None => SuperpowerTrack::initial(scenario),
        },
        None => SuperpowerTrack::initial(scenario),
    };
    let candidate = previous.advance(curve, rng);
    Ok(store::create_or_read(store, &key, &candidate)?)
}
