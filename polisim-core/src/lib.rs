//! # Policy Simulation Core
//!
//! The event and growth resolution engine for a multi-party, round-based AI
//! policy game. Each country is an independent session: it allocates policy
//! points into hidden parameters, negotiates bilateral cooperation terms,
//! and is then subjected to one private domestic event and a shared set of
//! international events whose magnitude depends on those parameters.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────┐
//! │   Catalog    │────▶│ RoundSession  │────▶│ SharedStore  │
//! │ (static data)│     │ (one country) │     │ (documents)  │
//! └──────────────┘     └──────┬────────┘     └──────┬───────┘
//!                             │ deltas              │ first-writer-wins
//!                      ┌──────▼────────┐     ┌──────▼───────┐
//!                      │   systems     │     │ Round Ledger │
//!                      │ growth/events │     │ (append-only)│
//!                      │ coop/intel    │     └──────────────┘
//!                      └───────────────┘
//! ```
//!
//! There is no coordinator and no locking: sessions share only the durable
//! store, races are resolved by existence-check-before-create, and anything
//! waiting on another country is a [`EngineError::DataNotReady`] re-checked
//! on the next interaction. All stochastic entry points take an explicit
//! RNG, so a fixed seed replays a round exactly.
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`RoundSession`] | One country's walk through a round |
//! | [`CountryState`] | Dials, fixed attributes, running totals |
//! | [`SharedStore`] | Keyed JSON documents shared across sessions |
//! | [`RoundRecord`] | Definitive append-only per-round snapshot |
//! | [`EngineError`] | The recoverable error taxonomy |

pub mod config;
pub mod error;
pub mod ledger;
pub mod round;
pub mod scope;
pub mod state;
pub mod store;
pub mod systems;
pub mod testing;

pub use config::EngineConfig;
pub use error::EngineError;
pub use ledger::{CountryRoundEntry, DeltaBreakdown, RoundRecord, SuperpowerTrack};
pub use round::RoundSession;
pub use scope::{bilateral_scope, hidden_scope, ParamScope};
pub use state::{CountryId, CountryState, FixedAttributes, HiddenDoc, HiddenParams};
pub use store::{JsonFileStore, MemStore, SharedStore, StoreError};
pub use systems::conversion::ModelCurve;
pub use systems::coop::{CoopRecord, CoopSheet, CoopValue};
pub use systems::events::{EventPhase, InternationalDraw};
pub use systems::growth::growth_rate;
pub use systems::intel::{IntelFinding, IntelReport, IntelSlot, ParamRange};
