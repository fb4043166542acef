//! Per-country round orchestration.
//!
//! A [`RoundSession`] walks one country through a round: policy
//! confirmation, cooperation, the private domestic draw, intelligence
//! queries, the optional one-parameter adjustment, and event application.
//! Sessions never block on each other: anything that depends on another
//! country's data surfaces [`EngineError::DataNotReady`] and is simply
//! retried on the next interaction.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::{CountryRoundEntry, DeltaBreakdown};
use crate::scope::hidden_scope;
use crate::state::{CountryId, CountryState, HiddenDoc, ALIGNMENT_CHINA, ALIGNMENT_US};
use crate::store::{self, keys, SharedStore};
use crate::systems::coop::{self, CoopSheet};
use crate::systems::events::{self, DomesticOutcome, EventPhase};
use crate::systems::growth::growth_rate;
use crate::systems::intel::{self, IntelReport, IntelSlot};
use polisim_data::{Catalog, DomesticEvent};
use rand::Rng;
use tracing::instrument;

pub struct RoundSession<'a> {
    store: &'a dyn SharedStore,
    catalog: &'a Catalog,
    config: &'a EngineConfig,
    pub round: u32,
    pub country: CountryState,
    phase: EventPhase,
    adjustment_used: bool,
    intel_reports: Vec<IntelReport>,
}

impl<'a> RoundSession<'a> {
    pub fn new(
        store: &'a dyn SharedStore,
        catalog: &'a Catalog,
        config: &'a EngineConfig,
        round: u32,
        country: CountryState,
    ) -> RoundSession<'a> {
        RoundSession {
            store,
            catalog,
            config,
            round,
            country,
            phase: EventPhase::NotStarted,
            adjustment_used: false,
            intel_reports: Vec::new(),
        }
    }

    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    /// Reveals so far this round; append-only, a revealed slot never
    /// changes.
    pub fn intel_reports(&self) -> &[IntelReport] {
        &self.intel_reports
    }

    fn rivals(&self) -> Vec<CountryId> {
        self.catalog
            .scenario
            .country_names()
            .filter(|name| *name != self.country.id)
            .map(str::to_string)
            .collect()
    }

    /// Validate and freeze this round's hidden parameters, compute the
    /// growth preview, and persist the policy document.
    pub fn confirm_policy(&mut self) -> Result<i64, EngineError> {
        for (name, value) in self.country.hidden.iter() {
            if !(0.0..=10.0).contains(&value) {
                return Err(EngineError::InvalidParameter(name.to_string()));
            }
        }
        let used = self.country.hidden.points_used();
        let limit = self.config.policy_point_budget;
        if used > limit as f64 {
            return Err(EngineError::PolicyBudgetExceeded {
                used: used as u32,
                limit,
            });
        }

        let growth = growth_rate(
            &self.country.hidden,
            &self.country.fixed,
            &self.catalog.parameters,
        )
        .ok_or_else(|| EngineError::InvalidParameter("growth-rate inputs".to_string()))?;
        self.country.growth_rate = Some(growth);

        store::write_doc(
            self.store,
            &keys::hidden(self.round, &self.country.id),
            &HiddenDoc::new(&self.country),
        )?;
        Ok(growth)
    }

    /// Persist this country's proposal sheet (its own document; partners
    /// only ever read it).
    pub fn submit_cooperation(&self, sheet: &CoopSheet) -> Result<(), EngineError> {
        coop::submit_sheet(self.store, self.round, &self.country.id, sheet)
    }

    /// Run the confirmation protocol against every rival.
    pub fn confirm_cooperation(&self, sheet: &CoopSheet) -> Result<u32, EngineError> {
        coop::confirm_cooperation(
            self.store,
            &self.catalog.parameters,
            self.config,
            self.round,
            &self.country.id,
            &self.rivals(),
            sheet,
            &self.country.hidden,
        )
    }

    /// Draw this country's private domestic event and persist the outcome.
    pub fn draw_domestic(&mut self, rng: &mut impl Rng) -> Result<DomesticEvent, EngineError> {
        if self.phase != EventPhase::NotStarted {
            return Err(EngineError::WrongPhase {
                expected: EventPhase::NotStarted,
                actual: self.phase,
            });
        }
        let id = events::draw_domestic_id(self.catalog, rng);
        let event = events::domestic_event_or_unknown(self.catalog, id);
        store::write_doc(
            self.store,
            &keys::domestic(self.round, &self.country.id),
            &DomesticOutcome {
                event_id: event.id,
                title: event.title.clone(),
            },
        )?;
        self.phase = EventPhase::DomesticDrawn;
        Ok(event)
    }

    fn intel_score(&self) -> f64 {
        self.country
            .hidden
            .get("Intelligence")
            .unwrap_or(self.config.default_willingness)
    }

    fn check_slot(&self, slot: IntelSlot) -> Result<(), EngineError> {
        let actual = self.intel_score();
        if !slot.available(actual) {
            return Err(EngineError::IntelUnavailable {
                slot,
                required: slot.min_score(),
                actual,
            });
        }
        Ok(())
    }

    fn existing_report(&self, slot: IntelSlot) -> Option<IntelReport> {
        self.intel_reports
            .iter()
            .find(|r| r.slot == slot)
            .cloned()
    }

    /// Slot 1: random rival, random parameter. Re-requesting returns the
    /// already-revealed report unchanged.
    pub fn intel_random_sweep(&mut self, rng: &mut impl Rng) -> Result<IntelReport, EngineError> {
        if let Some(report) = self.existing_report(IntelSlot::RandomSweep) {
            return Ok(report);
        }
        let report = intel::random_sweep(
            self.store,
            &self.catalog.parameters,
            self.round,
            &self.country.id,
            &self.rivals(),
            self.intel_score(),
            rng,
        )?;
        self.intel_reports.push(report.clone());
        Ok(report)
    }

    /// Slot 2: chosen rival, random parameter.
    pub fn intel_chosen_country(
        &mut self,
        target: &str,
        rng: &mut impl Rng,
    ) -> Result<IntelReport, EngineError> {
        self.check_slot(IntelSlot::ChosenCountry)?;
        if let Some(report) = self.existing_report(IntelSlot::ChosenCountry) {
            return Ok(report);
        }
        let report = intel::chosen_country_probe(
            self.store,
            &self.catalog.parameters,
            self.round,
            &self.country.id,
            target,
            self.intel_score(),
            rng,
        )?;
        self.intel_reports.push(report.clone());
        Ok(report)
    }

    /// Slot 3: chosen rival, chosen cooperative parameter.
    pub fn intel_chosen_cooperative(
        &mut self,
        target: &str,
        parameter: &str,
        rng: &mut impl Rng,
    ) -> Result<IntelReport, EngineError> {
        self.check_slot(IntelSlot::ChosenCooperative)?;
        if let Some(report) = self.existing_report(IntelSlot::ChosenCooperative) {
            return Ok(report);
        }
        let report = intel::chosen_cooperative_probe(
            self.store,
            &self.catalog.parameters,
            self.round,
            &self.country.id,
            target,
            parameter,
            self.intel_score(),
            rng,
        )?;
        self.intel_reports.push(report.clone());
        Ok(report)
    }

    /// Slot 4: chosen rival, specific hidden parameter.
    pub fn intel_chosen_hidden(
        &mut self,
        target: &str,
        parameter: &str,
        rng: &mut impl Rng,
    ) -> Result<IntelReport, EngineError> {
        self.check_slot(IntelSlot::ChosenHidden)?;
        if let Some(report) = self.existing_report(IntelSlot::ChosenHidden) {
            return Ok(report);
        }
        let report = intel::chosen_hidden_probe(
            self.store,
            self.round,
            target,
            parameter,
            self.intel_score(),
            rng,
        )?;
        self.intel_reports.push(report.clone());
        Ok(report)
    }

    /// Post-intel adjustment: move exactly one parameter by at most
    /// `min(adjustment_cap, remaining points)`, once per round. With no
    /// points remaining the adjustment is consumed as a no-op. Adjusting
    /// `Alignment_US` re-couples the China side and is exempt from the cap
    /// (the pair's cost never changes).
    pub fn adjust_policy(&mut self, parameter: &str, value: f64) -> Result<(), EngineError> {
        if self.adjustment_used {
            return Err(EngineError::AdjustmentSpent);
        }
        if !(0.0..=10.0).contains(&value) {
            return Err(EngineError::InvalidAdjustment {
                parameter: parameter.to_string(),
                value,
            });
        }
        if parameter == ALIGNMENT_CHINA {
            return Err(EngineError::InvalidAdjustment {
                parameter: parameter.to_string(),
                value,
            });
        }

        let remaining =
            self.config.policy_point_budget as f64 - self.country.hidden.points_used();
        if remaining <= 0.0 && parameter != ALIGNMENT_US {
            self.adjustment_used = true;
            return Ok(());
        }

        if parameter == ALIGNMENT_US {
            self.country.hidden.set_alignment(value);
        } else {
            let current = self
                .country
                .hidden
                .get(parameter)
                .ok_or_else(|| EngineError::InvalidParameter(parameter.to_string()))?;
            let cap = (self.config.adjustment_cap as f64).min(remaining);
            let low = (current - cap).max(0.0);
            let high = (current + cap).min(10.0);
            if !(low..=high).contains(&value) {
                return Err(EngineError::InvalidAdjustment {
                    parameter: parameter.to_string(),
                    value,
                });
            }
            self.country.hidden.set(parameter, value);
        }
        self.adjustment_used = true;

        // Re-freeze the policy document with the adjusted dials; the growth
        // preview stays as computed at confirmation.
        store::write_doc(
            self.store,
            &keys::hidden(self.round, &self.country.id),
            &HiddenDoc::new(&self.country),
        )?;
        Ok(())
    }

    /// Resolve the round for this country: the persisted domestic outcome,
    /// the shared international sample, growth, and the conversion curve,
    /// folded into the running totals and persisted as this country's
    /// result document.
    #[instrument(skip_all, fields(country = %self.country.id, round = self.round))]
    pub fn apply_events(
        &mut self,
        sheet: &CoopSheet,
        rng: &mut impl Rng,
    ) -> Result<CountryRoundEntry, EngineError> {
        if self.phase != EventPhase::DomesticDrawn {
            return Err(EngineError::WrongPhase {
                expected: EventPhase::DomesticDrawn,
                actual: self.phase,
            });
        }

        let outcome: DomesticOutcome = store::read_doc(
            self.store,
            &keys::domestic(self.round, &self.country.id),
        )?
        .ok_or_else(|| EngineError::DataNotReady {
            waiting_on: vec![self.country.id.clone()],
        })?;
        let domestic = events::domestic_event_or_unknown(self.catalog, outcome.event_id);

        let base_scope = hidden_scope(&self.country, &self.catalog.parameters);
        let domestic_deltas = events::domestic_deltas(&domestic, &base_scope);

        let draw =
            events::international_draw(self.store, self.catalog, self.config, self.round, rng)?;
        let drawn = events::drawn_events(self.catalog, &draw);
        let international_deltas = events::international_deltas(&drawn, &base_scope, sheet);

        for diagnostic in domestic_deltas
            .diagnostics
            .iter()
            .chain(international_deltas.diagnostics.iter())
        {
            log::debug!("{}: {diagnostic}", self.country.id);
        }

        let base_growth = self.country.growth_rate.unwrap_or(0);
        let old_papers = self.country.papers;
        let new_papers = old_papers
            + base_growth as f64
            + domestic_deltas.papers as f64
            + international_deltas.papers as f64;
        let models_from_papers = self.config.curve.model_delta(old_papers, new_papers);

        self.country.papers = new_papers;
        self.country.models += domestic_deltas.models as f64
            + international_deltas.models as f64
            + models_from_papers;

        let entry = CountryRoundEntry {
            papers: self.country.papers,
            models: self.country.models,
            breakdown: DeltaBreakdown {
                base_growth,
                domestic_papers: domestic_deltas.papers,
                domestic_models: domestic_deltas.models,
                international_papers: international_deltas.papers,
                international_models: international_deltas.models,
                models_from_papers,
            },
        };
        store::write_doc(
            self.store,
            &keys::result(self.round, &self.country.id),
            &entry,
        )?;
        self.phase = EventPhase::EventsApplied;
        Ok(entry)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
