//! Epic-level orchestration: structural checks, bundling, the commit gate.
//!
//! One call works the active epic for one step: derive the open tasks, pick
//! an artifact-disjoint bundle, run each task through the gate machine, and
//! commit completions to the ledger only after the receipt chain for the
//! task is independently re-verified. The view on disk is rebuilt from the
//! ledger after every commit.

use anyhow::{Result, bail};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::collab::Collaborators;
use crate::core::bundle::select_bundle;
use crate::core::policy::{Decision, RolePolicy, ToolRequest};
use crate::core::types::{
    Epic, EventOp, HaltReason, PrdView, Receipt, Task, TaskDone, TaskUpsert,
};
use crate::core::verify::receipt_chain_complete;
use crate::io::ledger::{EventLedger, load_view};
use crate::io::paths::ProjectLayout;
use crate::io::receipts::ReceiptStore;
use crate::io::sandbox::Sandbox;
use crate::machine::{TaskMachine, TaskRun};

/// Outcome of one epic step.
#[derive(Debug, Clone, PartialEq)]
pub enum EpicStep {
    /// Every bundled task committed; ids in completion order.
    Completed { task_ids: Vec<String> },
    Halted(HaltReason),
}

/// Drives the active epic one bundle at a time.
pub struct Orchestrator<'a> {
    pub layout: &'a ProjectLayout,
    pub ledger: &'a EventLedger,
    pub store: &'a ReceiptStore,
    pub sandbox: &'a Sandbox,
    pub collab: &'a Collaborators<'a>,
    pub role: String,
    pub bundle_max: usize,
}

impl Orchestrator<'_> {
    /// Work the active epic for one bundle.
    #[instrument(skip_all, fields(run_id = %self.store.run_id()))]
    pub fn execute_epic(&self) -> Result<EpicStep> {
        let view = match load_view(self.layout) {
            Ok(Some(view)) => view,
            Ok(None) => return Ok(EpicStep::Halted(HaltReason::PrdNotFound)),
            Err(err) => {
                warn!(error = %err, "materialized view unreadable");
                return Ok(EpicStep::Halted(HaltReason::PrdInvalidJson));
            }
        };

        let epic = match active_epic(&view) {
            Ok(epic) => epic.clone(),
            Err(halt) => return Ok(EpicStep::Halted(halt)),
        };

        let open: Vec<&Task> = epic.tasks.iter().filter(|task| !task.done).collect();
        if open.is_empty() {
            return Ok(EpicStep::Halted(HaltReason::ActiveEpicAlreadyDone));
        }
        self.store.emit(Receipt::EpicTasksDerived {
            epic_id: epic.id.clone(),
            task_ids: open.iter().map(|task| task.id.clone()).collect(),
        })?;

        let bundle = select_bundle(&open, self.bundle_max);
        let machine = TaskMachine {
            sandbox: self.sandbox,
            collab: self.collab,
            store: self.store,
        };

        let mut completed = Vec::with_capacity(bundle.len());
        for task in bundle {
            if task.requires_input == Some(true) {
                let reason = task
                    .requires_input_reason
                    .clone()
                    .unwrap_or_else(|| "task requires outside input".to_string());
                let halt = HaltReason::InputRequired(reason);
                self.store.emit(Receipt::HaltAndAsk {
                    reason: halt.to_string(),
                })?;
                return Ok(EpicStep::Halted(halt));
            }

            if let TaskRun::Halted(halt) = machine.run_task(task)? {
                return Ok(EpicStep::Halted(halt));
            }

            let receipts = match self.store.read_receipts() {
                Ok(receipts) => receipts,
                Err(err) => {
                    warn!(error = %err, "receipt file unreadable");
                    return Ok(EpicStep::Halted(HaltReason::ReceiptsInvalid));
                }
            };
            if !receipt_chain_complete(&receipts, task) {
                return Ok(EpicStep::Halted(HaltReason::VerificationRequired));
            }

            self.commit_task(&view, &epic, task)?;
            completed.push(task.id.clone());
        }

        info!(epic_id = %epic.id, tasks = completed.len(), "bundle committed");
        Ok(EpicStep::Completed {
            task_ids: completed,
        })
    }

    /// Commit one verified task: append `task_upsert` for every task of the
    /// epic (carrying its flags), `epic_selected`, and `task_done`, then
    /// rebuild the views. Upserts merge, so re-appending them is idempotent
    /// and keeps the ledger self-contained even when `prd.json` predates it.
    fn commit_task(&self, view: &PrdView, epic: &Epic, task: &Task) -> Result<()> {
        check_ledger_write(self.layout, &self.role)?;
        if !self.ledger.exists() {
            seed_ledger_from_view(self.ledger, view)?;
        }
        for sibling in &epic.tasks {
            let upsert = serde_json::to_value(upsert_for(&epic.id, sibling))?;
            self.ledger.append(EventOp::TaskUpsert, &sibling.id, upsert)?;
        }
        self.ledger
            .append(EventOp::EpicSelected, &epic.id, Value::Null)?;
        let done = serde_json::to_value(TaskDone {
            epic_id: epic.id.clone(),
        })?;
        self.ledger.append(EventOp::TaskDone, &task.id, done)?;
        self.ledger.build_views(self.layout)?;
        self.store.emit(Receipt::TaskCompleted {
            task_id: task.id.clone(),
        })?;
        Ok(())
    }

}

/// Gate every ledger mutation behind the role policy. Callers run this before
/// the first append of any write sequence (commit, scout application, epic
/// advancement).
pub(crate) fn check_ledger_write(layout: &ProjectLayout, role: &str) -> Result<()> {
    let policy = RolePolicy::new(&layout.root);
    let request = ToolRequest::AppendFile {
        path: layout.events_path.clone(),
    };
    match policy.evaluate(role, &request) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            bail!("role '{role}' may not write the ledger: {reason}")
        }
    }
}

/// Translate a materialized view into ledger events, preserving the active
/// pointer and every task's fields. Used when a hand-authored `prd.json`
/// predates the ledger, so a later replay reproduces the current view.
pub(crate) fn seed_ledger_from_view(ledger: &EventLedger, view: &PrdView) -> Result<()> {
    for epic in &view.epics {
        for task in &epic.tasks {
            let upsert = serde_json::to_value(upsert_for(&epic.id, task))?;
            ledger.append(EventOp::TaskUpsert, &task.id, upsert)?;
            if task.done {
                let done = serde_json::to_value(TaskDone {
                    epic_id: epic.id.clone(),
                })?;
                ledger.append(EventOp::TaskDone, &task.id, done)?;
            }
        }
    }
    if let Some(active) = &view.active_epic_id {
        ledger.append(EventOp::EpicSelected, active, Value::Null)?;
    }
    info!("ledger seeded from materialized view");
    Ok(())
}

/// The `task_upsert` payload that reproduces `task` under `epic_id`.
fn upsert_for(epic_id: &str, task: &Task) -> TaskUpsert {
    TaskUpsert {
        epic_id: epic_id.to_string(),
        noop: task.noop,
        requires_input: task.requires_input,
        requires_input_reason: task.requires_input_reason.clone(),
        requires_integration_check: task.requires_integration_check,
        requires_oracle_review: task.requires_oracle_review,
        ux_sensitive: task.ux_sensitive,
        artifacts_to_touch: task.artifacts_to_touch.clone(),
        strategy: task.strategy.clone(),
    }
}

fn active_epic(view: &PrdView) -> std::result::Result<&Epic, HaltReason> {
    let Some(active_id) = &view.active_epic_id else {
        return Err(HaltReason::NoActiveEpic);
    };
    let Some(epic) = view.epic(active_id) else {
        return Err(HaltReason::ActiveEpicNotFound);
    };
    if epic.done {
        return Err(HaltReason::ActiveEpicAlreadyDone);
    }
    if epic.tasks.is_empty() {
        return Err(HaltReason::EpicTasksMissing);
    }
    if epic.tasks.iter().any(|task| task.id.trim().is_empty()) {
        return Err(HaltReason::EpicTaskIdsMissing);
    }
    Ok(epic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EpicStatus;

    fn epic(id: &str, done: bool, tasks: Vec<Task>) -> Epic {
        Epic {
            id: id.to_string(),
            done,
            status: if done {
                EpicStatus::Done
            } else {
                EpicStatus::InProgress
            },
            tasks,
        }
    }

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            ..Task::default()
        }
    }

    #[test]
    fn structural_halts_in_order() {
        let mut view = PrdView::default();
        assert_eq!(active_epic(&view).unwrap_err(), HaltReason::NoActiveEpic);

        view.active_epic_id = Some("EPIC-9".to_string());
        assert_eq!(
            active_epic(&view).unwrap_err(),
            HaltReason::ActiveEpicNotFound
        );

        view.epics.push(epic("EPIC-9", true, vec![task("TASK-1")]));
        assert_eq!(
            active_epic(&view).unwrap_err(),
            HaltReason::ActiveEpicAlreadyDone
        );

        view.epics[0].done = false;
        view.epics[0].tasks.clear();
        assert_eq!(
            active_epic(&view).unwrap_err(),
            HaltReason::EpicTasksMissing
        );

        view.epics[0].tasks.push(task("  "));
        assert_eq!(
            active_epic(&view).unwrap_err(),
            HaltReason::EpicTaskIdsMissing
        );

        view.epics[0].tasks[0] = task("TASK-1");
        assert_eq!(active_epic(&view).expect("epic").id, "EPIC-9");
    }
}
