//! Per-round resolution systems.

pub mod conversion;
pub mod coop;
pub mod events;
pub mod growth;
pub mod intel;

pub use conversion::ModelCurve;
pub use coop::{confirm_cooperation, coop_budget, sheet_cost, CoopRecord, CoopSheet, CoopValue};
pub use events::{international_draw, EventPhase};
pub use growth::growth_rate;
pub use intel::{accuracy_probability, available_slots, IntelReport, IntelSlot};
