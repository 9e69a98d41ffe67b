//! Top-level run loop: epic selection, scout intake, finalization.
//!
//! One invocation works the project forward until it either finishes the
//! bundle it picked up (`InProgress`), runs out of epics (`Finalized`), or
//! hits a halt the operator must resolve. In continuous mode the loop keeps
//! advancing across epics instead of returning after each bundle.

use anyhow::Result;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::collab::Collaborators;
use crate::core::types::{Epic, EventOp, HaltReason, PrdView, Receipt};
use crate::decision::validate_proposal;
use crate::io::config::AutopilotConfig;
use crate::io::ledger::{EventLedger, load_view};
use crate::io::paths::ProjectLayout;
use crate::io::receipts::ReceiptStore;
use crate::io::run_id::resolve_run_id;
use crate::io::sandbox::Sandbox;
use crate::orchestrator::{EpicStep, Orchestrator, check_ledger_write, seed_ledger_from_view};

/// Terminal state of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AutopilotOutcome {
    /// Work was committed and open work remains.
    InProgress,
    /// Every epic is done; a `RUN_FINALIZED` receipt was emitted.
    Finalized,
    Halted(HaltReason),
}

/// One configured invocation against a project root.
pub struct Autopilot<'a> {
    pub layout: &'a ProjectLayout,
    pub config: &'a AutopilotConfig,
    pub collab: &'a Collaborators<'a>,
}

impl Autopilot<'_> {
    /// Drive the project forward until a terminal state for this invocation.
    #[instrument(skip_all)]
    pub fn run(&self) -> Result<AutopilotOutcome> {
        let run_id = resolve_run_id(self.config.run_id_override.as_deref());
        let store = ReceiptStore::open(self.layout, &run_id)?;
        let ledger = EventLedger::new(self.layout);
        let mut sandbox = Sandbox::new(self.layout.root.clone());
        sandbox.policy = self.config.sandbox_policy.clone();
        sandbox.timeout = self.config.strategy_timeout;

        let orchestrator = Orchestrator {
            layout: self.layout,
            ledger: &ledger,
            store: &store,
            sandbox: &sandbox,
            collab: self.collab,
            role: self.config.role.clone(),
            bundle_max: self.config.bundle_max,
        };

        loop {
            match orchestrator.execute_epic()? {
                EpicStep::Completed { task_ids } => {
                    info!(completed = task_ids.len(), "bundle complete");
                    match self.advance(&ledger, &store)? {
                        Advance::MoreWork if self.config.continuous => {}
                        Advance::MoreWork => return Ok(AutopilotOutcome::InProgress),
                        Advance::Halted(halt) => return Ok(AutopilotOutcome::Halted(halt)),
                        Advance::Finalized => return Ok(AutopilotOutcome::Finalized),
                    }
                }
                EpicStep::Halted(HaltReason::NoActiveEpic) => {
                    if let Some(halt) = self.consult_scout(&ledger, &store)? {
                        return Ok(AutopilotOutcome::Halted(halt));
                    }
                }
                EpicStep::Halted(HaltReason::ActiveEpicAlreadyDone) => {
                    match self.advance(&ledger, &store)? {
                        Advance::MoreWork => {}
                        Advance::Halted(halt) => return Ok(AutopilotOutcome::Halted(halt)),
                        Advance::Finalized => return Ok(AutopilotOutcome::Finalized),
                    }
                }
                EpicStep::Halted(halt) => {
                    warn!(halt = %halt, "run halted");
                    return Ok(AutopilotOutcome::Halted(halt));
                }
            }
        }
    }

    /// After committed work or a spent epic: point the ledger at the next
    /// open epic, or finalize the run when none remains.
    fn advance(&self, ledger: &EventLedger, store: &ReceiptStore) -> Result<Advance> {
        let view = match load_view(self.layout) {
            Ok(view) => view.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "materialized view unreadable");
                return Ok(Advance::Halted(HaltReason::PrdInvalidJson));
            }
        };
        let has_open = |epic: &Epic| epic.tasks.iter().any(|task| !task.done);
        if let Some(active) = &view.active_epic_id
            && view.epic(active).is_some_and(has_open)
        {
            return Ok(Advance::MoreWork);
        }
        match view.epics.iter().find(|epic| has_open(epic)) {
            Some(next) => {
                info!(epic_id = %next.id, "advancing to next epic");
                self.select_epic(ledger, &view, &next.id)?;
                Ok(Advance::MoreWork)
            }
            None => {
                store.emit(Receipt::RunFinalized)?;
                info!("run finalized");
                Ok(Advance::Finalized)
            }
        }
    }

    /// With no active epic, ask the scout for one. A validated proposal is
    /// applied through the ledger; a contract violation is receipted and
    /// halts the run.
    fn consult_scout(
        &self,
        ledger: &EventLedger,
        store: &ReceiptStore,
    ) -> Result<Option<HaltReason>> {
        let Some(scout) = self.collab.scout else {
            return Ok(Some(HaltReason::NoActiveEpic));
        };
        let view = match load_view(self.layout) {
            Ok(view) => view.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "materialized view unreadable");
                return Ok(Some(HaltReason::PrdInvalidJson));
            }
        };
        let raw = scout.propose(&view)?;
        let proposal = match validate_proposal(&raw)? {
            Ok(proposal) => proposal,
            Err(detail) => {
                warn!(detail, "scout proposal rejected");
                store.emit(Receipt::ScoutContractViolation {
                    detail: detail.clone(),
                })?;
                return Ok(Some(HaltReason::ScoutContractViolation(detail)));
            }
        };

        check_ledger_write(self.layout, &self.config.role)?;
        if !ledger.exists() {
            seed_ledger_from_view(ledger, &view)?;
        }
        for task in &proposal.tasks {
            let upsert = serde_json::to_value(task.to_upsert(&proposal.epic_id))?;
            ledger.append(EventOp::TaskUpsert, &task.id, upsert)?;
        }
        ledger.append(EventOp::EpicSelected, &proposal.epic_id, Value::Null)?;
        ledger.build_views(self.layout)?;
        info!(epic_id = %proposal.epic_id, "scout proposal applied");
        Ok(None)
    }

    fn select_epic(&self, ledger: &EventLedger, view: &PrdView, epic_id: &str) -> Result<()> {
        check_ledger_write(self.layout, &self.config.role)?;
        if !ledger.exists() {
            seed_ledger_from_view(ledger, view)?;
        }
        ledger.append(EventOp::EpicSelected, epic_id, Value::Null)?;
        ledger.build_views(self.layout)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Advance {
    MoreWork,
    Halted(HaltReason),
    Finalized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{
        ReceiptingIntegrationChecker, ReceiptingOracleReviewer, ReceiptingUxSimulator,
    };
    use crate::test_support::{FixedContext, TestProject};

    #[test]
    fn advancing_over_a_corrupt_view_halts_with_prd_invalid_json() {
        let project = TestProject::new();
        std::fs::write(&project.layout.prd_path, "{not json").expect("write prd");

        let config = AutopilotConfig::default();
        let context = FixedContext::grounded("body", "docs/a.md");
        let collab = Collaborators {
            context: &context,
            integration: &ReceiptingIntegrationChecker,
            ux: &ReceiptingUxSimulator,
            oracle: &ReceiptingOracleReviewer,
            scout: None,
        };
        let pilot = Autopilot {
            layout: &project.layout,
            config: &config,
            collab: &collab,
        };
        let ledger = EventLedger::new(&project.layout);
        let store = ReceiptStore::open(&project.layout, "run-advance").expect("open store");

        let step = pilot.advance(&ledger, &store).expect("advance");
        assert_eq!(step, Advance::Halted(HaltReason::PrdInvalidJson));
    }
}
