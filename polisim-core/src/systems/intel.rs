//! Noisy disclosure of rival parameters, gated by the Intelligence dial.
//!
//! Accuracy follows a logistic curve centred at score 5 and bounded inside
//! (0.5, 0.9). A correct reveal centres an asymmetric range on the true
//! value; a wrong reveal centres it on a deliberately offset fake, biased
//! 70% toward overestimation. Higher scores unlock narrower margins and
//! more specific query slots.

use crate::error::EngineError;
use crate::state::{CountryId, HiddenDoc};
use crate::store::{self, keys, SharedStore};
use crate::systems::coop::{CoopSheet, CoopValue};
use polisim_data::{CoopParamDef, ParameterCatalog};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Probability that a disclosure is centred on the truth.
///
/// `0.4 * sigmoid(1.5 * (score - 5)) + 0.5`: strictly above 0.5, strictly
/// below 0.9.
pub fn accuracy_probability(intelligence: f64) -> f64 {
    0.4 * sigmoid(1.5 * (intelligence - 5.0)) + 0.5
}

/// A disclosed value range for a numeric hidden parameter, clamped to the
/// parameter domain [0, 10].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRange {
    pub low: u8,
    pub high: u8,
}

impl ParamRange {
    pub const FULL: ParamRange = ParamRange { low: 0, high: 10 };
}

impl std::fmt::Display for ParamRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}~{}", self.low, self.high)
        }
    }
}

/// Margin candidates per score tier; higher scores narrow the band.
fn margin_candidates(intel_score: f64) -> [u32; 2] {
    if intel_score <= 2.0 {
        [4, 2]
    } else if intel_score <= 5.0 {
        [3, 2]
    } else if intel_score <= 7.0 {
        [3, 1]
    } else if intel_score <= 9.0 {
        [2, 1]
    } else {
        [1, 0]
    }
}

fn binomial(n: u32, p: f64, rng: &mut impl Rng) -> u32 {
    (0..n).filter(|_| rng.gen::<f64>() < p).count() as u32
}

fn split_around(center: i64, margin: u32, rng: &mut impl Rng) -> ParamRange {
    // Asymmetric split: the right side tends wider.
    let left = binomial(margin, 0.3, rng) as i64;
    let right = margin as i64 - left;
    ParamRange {
        low: (center - left).max(0) as u8,
        high: (center + right).min(10) as u8,
    }
}

/// Disclose a range for a numeric hidden parameter.
///
/// At score 0 (or below) the range is always the full domain `0~10`,
/// complete uncertainty, regardless of the RNG.
pub fn hidden_param_range(true_value: f64, intel_score: f64, rng: &mut impl Rng) -> ParamRange {
    if intel_score <= 0.0 {
        return ParamRange::FULL;
    }
    let margin = *margin_candidates(intel_score).choose(rng).unwrap();
    let correct = rng.gen::<f64>() < accuracy_probability(intel_score);

    if correct {
        split_around(true_value as i64, margin, rng)
    } else {
        // Wrong centre: 70% overestimate, offset just past the margin,
        // wrapped back into the domain.
        let direction: i64 = if rng.gen::<f64>() < 0.7 { 1 } else { -1 };
        let offset = rng.gen_range(margin + 1..=margin + 2) as i64;
        let fake = (true_value as i64 + direction * offset).rem_euclid(11);
        let fake_margin = rng.gen_range(1..=2);
        split_around(fake, fake_margin, rng)
    }
}

/// Disclose a cooperative value: accuracy gates truth against a uniformly
/// chosen wrong alternative (option lists for categorical parameters, a flip
/// for booleans).
pub fn coop_claim(
    true_value: &CoopValue,
    def: &CoopParamDef,
    intel_score: f64,
    rng: &mut impl Rng,
) -> CoopValue {
    let correct = rng.gen::<f64>() < accuracy_probability(intel_score);
    if let Some(options) = &def.options {
        if correct {
            true_value.clone()
        } else {
            let truth = true_value.display();
            let others: Vec<&String> = options.iter().filter(|o| o.as_str() != truth).collect();
            match others.choose(rng) {
                Some(pick) => CoopValue::from((*pick).clone()),
                None => true_value.clone(),
            }
        }
    } else if correct {
        true_value.clone()
    } else if matches!(true_value, CoopValue::Yes) {
        CoopValue::No
    } else {
        CoopValue::Yes
    }
}

/// The progressively unlocked query slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntelSlot {
    /// A random rival and a random parameter; always available.
    RandomSweep,
    /// A chosen rival, random parameter.
    ChosenCountry,
    /// A chosen rival and a chosen cooperative parameter.
    ChosenCooperative,
    /// A chosen rival and a specific hidden parameter.
    ChosenHidden,
}

impl IntelSlot {
    pub fn min_score(self) -> f64 {
        match self {
            IntelSlot::RandomSweep => 0.0,
            IntelSlot::ChosenCountry => 2.0,
            IntelSlot::ChosenCooperative => 6.0,
            IntelSlot::ChosenHidden => 9.0,
        }
    }

    pub fn available(self, intel_score: f64) -> bool {
        intel_score >= self.min_score()
    }
}

/// The slots a score unlocks, in unlock order.
pub fn available_slots(intel_score: f64) -> Vec<IntelSlot> {
    [
        IntelSlot::RandomSweep,
        IntelSlot::ChosenCountry,
        IntelSlot::ChosenCooperative,
        IntelSlot::ChosenHidden,
    ]
    .into_iter()
    .filter(|slot| slot.available(intel_score))
    .collect()
}

/// What a query revealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntelFinding {
    Range { parameter: String, range: ParamRange },
    Claim { parameter: String, value: CoopValue },
}

/// One revealed query; immutable for the round once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelReport {
    pub slot: IntelSlot,
    pub country: CountryId,
    pub finding: IntelFinding,
}

fn read_hidden_doc(
    store: &dyn SharedStore,
    round: u32,
    target: &str,
) -> Result<HiddenDoc, EngineError> {
    store::read_doc(store, &keys::hidden(round, target))?.ok_or_else(|| {
        EngineError::DataNotReady {
            waiting_on: vec![target.to_string()],
        }
    })
}

fn read_coop_sheet(
    store: &dyn SharedStore,
    round: u32,
    target: &str,
) -> Result<CoopSheet, EngineError> {
    store::read_doc(store, &keys::cooperation(round, target))?.ok_or_else(|| {
        EngineError::DataNotReady {
            waiting_on: vec![target.to_string()],
        }
    })
}

/// Probe a target with a random parameter: hidden or cooperative at even
/// odds, mirroring the sweep the briefing always opens with.
fn probe_random(
    store: &dyn SharedStore,
    params: &ParameterCatalog,
    round: u32,
    me: &str,
    target: &str,
    slot: IntelSlot,
    intel_score: f64,
    rng: &mut impl Rng,
) -> Result<IntelReport, EngineError> {
    if rng.gen_bool(0.5) {
        let doc = read_hidden_doc(store, round, target)?;
        let names: Vec<&String> = doc.params.keys().collect();
        let parameter = names
            .choose(rng)
            .map(|name| (*name).clone())
            .ok_or_else(|| EngineError::InvalidParameter("<empty hidden document>".to_string()))?;
        let true_value = doc.params.get(&parameter).copied().unwrap_or(0.0);
        Ok(IntelReport {
            slot,
            country: target.to_string(),
            finding: IntelFinding::Range {
                range: hidden_param_range(true_value, intel_score, rng),
                parameter,
            },
        })
    } else {
        let sheet = read_coop_sheet(store, round, target)?;
        let def = params.cooperation.choose(rng).ok_or_else(|| {
            EngineError::InvalidParameter("<empty cooperation catalog>".to_string())
        })?;
        let true_value = sheet
            .get(me)
            .and_then(|record| record.get(&def.name))
            .cloned()
            .unwrap_or_default();
        Ok(IntelReport {
            slot,
            country: target.to_string(),
            finding: IntelFinding::Claim {
                parameter: def.name.clone(),
                value: coop_claim(&true_value, def, intel_score, rng),
            },
        })
    }
}

/// Slot 1: a random rival, random parameter. Always available.
pub fn random_sweep(
    store: &dyn SharedStore,
    params: &ParameterCatalog,
    round: u32,
    me: &str,
    rivals: &[CountryId],
    intel_score: f64,
    rng: &mut impl Rng,
) -> Result<IntelReport, EngineError> {
    let target = rivals
        .choose(rng)
        .ok_or_else(|| EngineError::UnknownCountry("<no rivals>".to_string()))?;
    probe_random(
        store,
        params,
        round,
        me,
        target,
        IntelSlot::RandomSweep,
        intel_score,
        rng,
    )
}

/// Slot 2 (score >= 2): chosen rival, random parameter.
pub fn chosen_country_probe(
    store: &dyn SharedStore,
    params: &ParameterCatalog,
    round: u32,
    me: &str,
    target: &str,
    intel_score: f64,
    rng: &mut impl Rng,
) -> Result<IntelReport, EngineError> {
    probe_random(
        store,
        params,
        round,
        me,
        target,
        IntelSlot::ChosenCountry,
        intel_score,
        rng,
    )
}

/// Slot 3 (score >= 6): chosen rival, chosen cooperative parameter (what
/// the target has recorded toward *me*).
pub fn chosen_cooperative_probe(
    store: &dyn SharedStore,
    params: &ParameterCatalog,
    round: u32,
    me: &str,
    target: &str,
    parameter: &str,
    intel_score: f64,
    rng: &mut impl Rng,
) -> Result<IntelReport, EngineError> {
    let def = params
        .coop(parameter)
        .ok_or_else(|| EngineError::InvalidParameter(parameter.to_string()))?;
    let sheet = read_coop_sheet(store, round, target)?;
    let true_value = sheet
        .get(me)
        .and_then(|record| record.get(parameter))
        .cloned()
        .unwrap_or_default();
    Ok(IntelReport {
        slot: IntelSlot::ChosenCooperative,
        country: target.to_string(),
        finding: IntelFinding::Claim {
            parameter: parameter.to_string(),
            value: coop_claim(&true_value, def, intel_score, rng),
        },
    })
}

/// Slot 4 (score >= 9): chosen rival, specific hidden parameter.
pub fn chosen_hidden_probe(
    store: &dyn SharedStore,
    round: u32,
    target: &str,
    parameter: &str,
    intel_score: f64,
    rng: &mut impl Rng,
) -> Result<IntelReport, EngineError> {
    let doc = read_hidden_doc(store, round, target)?;
    let true_value = doc.params.get(parameter).copied().unwrap_or(0.0);
    Ok(IntelReport {
        slot: IntelSlot::ChosenHidden,
        country: target.to_string(),
        finding: IntelFinding::Range {
            parameter: parameter.to_string(),
            range: hidden_param_range(true_value, intel_score, rng),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HiddenDoc;
    use crate::store::{self, keys, MemStore};
    use crate::testing::CountryBuilder;
    use polisim_data::Catalog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_accuracy_bounds() {
        for score in 0..=10 {
            let p = accuracy_probability(score as f64);
            assert!(p > 0.5 && p < 0.9, "accuracy {p} out of bounds at {score}");
        }
        assert!((accuracy_probability(5.0) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_score_zero_always_full_range() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..200 {
            let range = hidden_param_range(7.0, 0.0, &mut rng);
            assert_eq!(range, ParamRange::FULL);
        }
    }

    #[test]
    fn test_range_always_within_domain() {
        let mut rng = StdRng::seed_from_u64(7);
        for score in 1..=10 {
            for true_value in 0..=10 {
                for _ in 0..50 {
                    let range = hidden_param_range(true_value as f64, score as f64, &mut rng);
                    assert!(range.low <= range.high);
                    assert!(range.high <= 10);
                }
            }
        }
    }

    #[test]
    fn test_high_score_narrows_margin() {
        let mut rng = StdRng::seed_from_u64(3);
        // At score 10 the candidate margins are {1, 0}: a correct reveal can
        // span at most 2 values, a wrong one at most 3.
        for _ in 0..200 {
            let range = hidden_param_range(5.0, 10.0, &mut rng);
            assert!(range.high - range.low <= 2);
        }
    }

    #[test]
    fn test_slot_gating() {
        assert_eq!(available_slots(0.0), vec![IntelSlot::RandomSweep]);
        assert_eq!(
            available_slots(2.0),
            vec![IntelSlot::RandomSweep, IntelSlot::ChosenCountry]
        );
        assert_eq!(available_slots(9.5).len(), 4);
        assert!(!IntelSlot::ChosenCooperative.available(5.9));
        assert!(IntelSlot::ChosenCooperative.available(6.0));
    }

    #[test]
    fn test_coop_claim_boolean_flip() {
        let catalog = Catalog::builtin();
        let def = catalog.parameters.coop("Data_Shared").unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let mut saw_truth = false;
        let mut saw_flip = false;
        for _ in 0..500 {
            match coop_claim(&CoopValue::Yes, def, 5.0, &mut rng) {
                CoopValue::Yes => saw_truth = true,
                CoopValue::No => saw_flip = true,
                other => panic!("boolean claim produced {other:?}"),
            }
        }
        assert!(saw_truth && saw_flip);
    }

    #[test]
    fn test_coop_claim_categorical_wrong_is_alternative() {
        let catalog = Catalog::builtin();
        let def = catalog.parameters.coop("Joint_Project").unwrap();
        let truth = CoopValue::Choice("Energy".to_string());
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..500 {
            let claim = coop_claim(&truth, def, 1.0, &mut rng);
            assert!(def
                .options
                .as_ref()
                .unwrap()
                .iter()
                .any(|o| o.as_str() == claim.display()));
        }
    }

    #[test]
    fn test_missing_rival_documents_are_waiting() {
        let catalog = Catalog::builtin();
        let store = MemStore::new();
        let mut rng = StdRng::seed_from_u64(17);
        let err = chosen_hidden_probe(&store, 1, "Japan", "Semiconductor", 9.0, &mut rng)
            .unwrap_err();
        assert!(err.is_waiting());

        let err = chosen_cooperative_probe(
            &store,
            &catalog.parameters,
            1,
            "Korea",
            "Japan",
            "Data_Shared",
            6.0,
            &mut rng,
        )
        .unwrap_err();
        assert!(err.is_waiting());
    }

    #[test]
    fn test_probe_reads_persisted_documents() {
        let store = MemStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        let japan = CountryBuilder::new("Japan").param("Semiconductor", 8.0).build();
        store::write_doc(&store, &keys::hidden(1, "Japan"), &HiddenDoc::new(&japan)).unwrap();

        let report =
            chosen_hidden_probe(&store, 1, "Japan", "Semiconductor", 10.0, &mut rng).unwrap();
        assert_eq!(report.country, "Japan");
        match report.finding {
            IntelFinding::Range { parameter, range } => {
                assert_eq!(parameter, "Semiconductor");
                assert!(range.high <= 10);
            }
            other => panic!("expected a range, got {other:?}"),
        }
    }
}
