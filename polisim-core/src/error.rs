use crate::state::CountryId;
use crate::store::StoreError;
use crate::systems::events::EventPhase;
use crate::systems::intel::IntelSlot;
use thiserror::Error;

/// The engine's recoverable error taxonomy.
///
/// Nothing here terminates a session: formula failures zero a single delta,
/// budget and mismatch failures send the caller back to negotiation, and
/// data-not-ready is a "check again later" signal, not a rejection.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("formula evaluation failed: {0}")]
    Formula(#[from] polisim_formula::FormulaError),

    #[error("cooperation cost {used} exceeds budget {limit}")]
    BudgetExceeded { used: u32, limit: u32 },

    #[error("agreement mismatch on {mismatches:?}")]
    AgreementMismatch {
        /// The exact (partner, parameter) pairs whose stored values differ.
        mismatches: Vec<(CountryId, String)>,
    },

    #[error("waiting for data from {waiting_on:?}")]
    DataNotReady { waiting_on: Vec<CountryId> },

    #[error("round {0} is already recorded in the ledger")]
    DuplicateRound(u32),

    #[error("policy points {used} exceed the {limit}-point budget")]
    PolicyBudgetExceeded { used: u32, limit: u32 },

    #[error("hidden parameter '{0}' is missing or out of domain")]
    InvalidParameter(String),

    #[error("adjustment of '{parameter}' to {value} is outside the allowed window")]
    InvalidAdjustment { parameter: String, value: f64 },

    #[error("the policy adjustment was already used this round")]
    AdjustmentSpent,

    #[error("intel slot {slot:?} requires intelligence {required}, have {actual}")]
    IntelUnavailable {
        slot: IntelSlot,
        required: f64,
        actual: f64,
    },

    #[error("round is in phase {actual}, expected {expected}")]
    WrongPhase {
        expected: EventPhase,
        actual: EventPhase,
    },

    #[error("unknown country '{0}'")]
    UnknownCountry(CountryId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether the caller should present a "waiting" state and retry later.
    pub fn is_waiting(&self) -> bool {
        matches!(self, EngineError::DataNotReady { .. })
    }
}
