//! Bilateral cooperation: proposal sheets, point costing, and the
//! symmetric-equality confirmation protocol.
//!
//! Each country unilaterally persists its own sheet (its proposed terms per
//! partner). Nothing takes effect until confirmation finds both sides'
//! records for the same (pair, parameter) exactly equal and the proposer's
//! activated cost within budget. There is no shared transaction anywhere:
//! a partner that has not written yet is a distinct "waiting" condition.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::state::{CountryId, HiddenParams};
use crate::store::{self, keys, SharedStore};
use polisim_data::ParameterCatalog;
use polisim_formula::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// One proposed cooperative term.
///
/// Persisted as the plain strings the negotiation produces: `"Yes"`, `"No"`,
/// `"None"` (unset), or a category name such as `"Energy"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CoopValue {
    #[default]
    Unset,
    No,
    Yes,
    Choice(String),
}

impl From<String> for CoopValue {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "None" | "" => CoopValue::Unset,
            "No" => CoopValue::No,
            "Yes" => CoopValue::Yes,
            _ => CoopValue::Choice(raw),
        }
    }
}

impl From<CoopValue> for String {
    fn from(value: CoopValue) -> String {
        value.display().to_string()
    }
}

impl CoopValue {
    pub fn display(&self) -> &str {
        match self {
            CoopValue::Unset => "None",
            CoopValue::No => "No",
            CoopValue::Yes => "Yes",
            CoopValue::Choice(s) => s,
        }
    }

    /// Whether this entry consumes its parameter's point cost.
    pub fn is_active(&self) -> bool {
        matches!(self, CoopValue::Yes | CoopValue::Choice(_))
    }

    /// Coerce for formula evaluation: Yes/No become 1/0, a category stays a
    /// string, unset becomes the typed `None` the evaluator fails closed on.
    pub fn as_value(&self) -> Value {
        match self {
            CoopValue::Unset => Value::None,
            CoopValue::No => Value::Num(0.0),
            CoopValue::Yes => Value::Num(1.0),
            CoopValue::Choice(s) => Value::Str(s.clone()),
        }
    }
}

/// One bilateral record: parameter name -> proposed value.
pub type CoopRecord = BTreeMap<String, CoopValue>;

/// A country's full proposal sheet: partner -> bilateral record.
pub type CoopSheet = BTreeMap<CountryId, CoopRecord>;

/// Total activated-point cost of a sheet, summed across all partners.
pub fn sheet_cost(sheet: &CoopSheet, params: &ParameterCatalog) -> u32 {
    sheet
        .values()
        .flat_map(|record| record.iter())
        .filter(|(_, value)| value.is_active())
        .filter_map(|(name, _)| params.coop(name).map(|def| def.points))
        .sum()
}

/// Cooperation budget: base allowance plus the willingness dial.
pub fn coop_budget(hidden: &HiddenParams, config: &EngineConfig) -> u32 {
    let willingness = hidden
        .get("Willing_to_Cooperate")
        .unwrap_or(config.default_willingness);
    config.coop_base_allowance + willingness as u32
}

/// Persist this country's own proposal sheet for the round.
pub fn submit_sheet(
    store: &dyn SharedStore,
    round: u32,
    country: &str,
    sheet: &CoopSheet,
) -> Result<(), EngineError> {
    store::write_doc(store, &keys::cooperation(round, country), sheet)?;
    Ok(())
}

/// Run the confirmation protocol for `me` against every partner.
///
/// Checks, in order: activated cost within budget; symmetric equality of
/// every (partner, parameter) pair against the partner's persisted record;
/// presence of every partner's sheet. Mismatches are reported with the exact
/// offending pairs; absent partners are the separate
/// [`EngineError::DataNotReady`] condition so callers can render "waiting"
/// instead of "rejected". On success returns the activated cost.
#[instrument(skip_all, fields(country = %me, round = round))]
pub fn confirm_cooperation(
    store: &dyn SharedStore,
    params: &ParameterCatalog,
    config: &EngineConfig,
    round: u32,
    me: &str,
    partners: &[CountryId],
    sheet: &CoopSheet,
    hidden: &HiddenParams,
) -> Result<u32, EngineError> {
    let limit = coop_budget(hidden, config);
    let used = sheet_cost(sheet, params);
    if used > limit {
        return Err(EngineError::BudgetExceeded { used, limit });
    }

    let mut mismatches = Vec::new();
    let mut waiting = Vec::new();
    let empty = CoopRecord::new();

    for partner in partners {
        let theirs: Option<CoopSheet> =
            store::read_doc(store, &keys::cooperation(round, partner))?;
        let Some(theirs) = theirs else {
            waiting.push(partner.clone());
            continue;
        };
        let their_record = theirs.get(me).unwrap_or(&empty);
        let my_record = sheet.get(partner).unwrap_or(&empty);
        for def in &params.cooperation {
            let mine = my_record.get(&def.name).cloned().unwrap_or_default();
            let their = their_record.get(&def.name).cloned().unwrap_or_default();
            if mine != their {
                mismatches.push((partner.clone(), def.name.clone()));
            }
        }
    }

    if !mismatches.is_empty() {
        return Err(EngineError::AgreementMismatch { mismatches });
    }
    if !waiting.is_empty() {
        return Err(EngineError::DataNotReady {
            waiting_on: waiting,
        });
    }
    Ok(used)
}
