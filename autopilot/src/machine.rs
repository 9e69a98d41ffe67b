//! Receipt-gated execution pipeline for a single task.
//!
//! The machine advances one task through the fixed gate sequence: resolve
//! identity, gather grounding context, execute the strategy in the sandbox,
//! verify the completion packet, then run the conditional collaborator gates.
//! Every stop condition is a returned halt, never a panic, so the caller can
//! record it and move on.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::collab::Collaborators;
use crate::core::journeys::derive_journeys;
use crate::core::types::{
    HaltReason, Receipt, Task, TaskCompletionPacket, UNKNOWN_TASK_ID, WorkPacket, truncate_chars,
};
use crate::core::verify::{verify_quality, verify_spec};
use crate::io::receipts::ReceiptStore;
use crate::io::sandbox::Sandbox;

/// Strategy failure details are capped before entering a halt code.
const STRATEGY_DETAIL_LIMIT: usize = 60;

/// Outcome of one task run. `Done` carries the evidence packet the commit
/// gate re-verifies; `Halted` names the stop condition.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRun {
    Done(TaskCompletionPacket),
    Halted(HaltReason),
}

/// Drives one task through the gate sequence.
pub struct TaskMachine<'a> {
    pub sandbox: &'a Sandbox,
    pub collab: &'a Collaborators<'a>,
    pub store: &'a ReceiptStore,
}

impl TaskMachine<'_> {
    /// Run one task to completion or halt.
    ///
    /// Noop tasks short-circuit first: no context, no sandbox, no emitted
    /// receipts. The commit gate still demands a full receipt chain before
    /// marking any task done, noops included.
    #[instrument(skip_all, fields(task_id = %task.id))]
    pub fn run_task(&self, task: &Task) -> Result<TaskRun> {
        if task.is_noop() {
            debug!("noop task, skipping gates");
            return Ok(TaskRun::Done(TaskCompletionPacket {
                task_id: task.id.clone(),
                execution: Vec::new(),
                tests: None,
                files_changed: None,
            }));
        }
        if task.id.trim().is_empty() || task.id == UNKNOWN_TASK_ID {
            return Ok(TaskRun::Halted(HaltReason::TaskIdMissing));
        }

        let context = self.collab.context.provide(task)?;
        if context.context_pack.trim().is_empty() || context.citations.is_empty() {
            warn!("task has no citation-backed context");
            return Ok(TaskRun::Halted(HaltReason::ContextPackRequired));
        }
        let packet = WorkPacket {
            task_id: task.id.clone(),
            intent: format!("Complete task {}", task.id),
            context_pack: context.context_pack,
            citations: context.citations,
            strategy: task.strategy_commands().to_vec(),
        };

        let completion = match self.execute_strategy(task, &packet) {
            Ok(completion) => completion,
            Err(detail) => {
                return Ok(TaskRun::Halted(HaltReason::TaskStrategyFailed(detail)));
            }
        };
        self.store.emit(Receipt::ExecutorCompleted {
            task_id: task.id.clone(),
            packet: completion.clone(),
        })?;

        let spec = verify_spec(&task.id, &completion);
        self.store.emit(Receipt::VerifierSpec {
            task_id: spec.task_id.clone(),
            passed: spec.passed,
        })?;
        if !spec.passed {
            return Ok(TaskRun::Halted(HaltReason::SpecVerificationFailed));
        }

        let quality = verify_quality(&task.id, &completion);
        self.store.emit(Receipt::VerifierQuality {
            task_id: quality.task_id.clone(),
            passed: quality.passed,
        })?;
        if !quality.passed {
            return Ok(TaskRun::Halted(HaltReason::QualityVerificationFailed));
        }

        if task.requires_integration_check == Some(true) {
            self.collab.integration.check(task, self.store)?;
        }
        if task.ux_sensitive == Some(true) {
            let journeys = derive_journeys(&packet);
            self.collab.ux.simulate(task, &journeys, self.store)?;
        }
        if task.requires_oracle_review == Some(true) {
            self.collab.oracle.review(task, self.store)?;
        }

        info!("task gates passed");
        Ok(TaskRun::Done(completion))
    }

    /// Run every strategy command, accumulating digest-bound records. The
    /// first failing command aborts with a bounded detail string.
    fn execute_strategy(
        &self,
        task: &Task,
        packet: &WorkPacket,
    ) -> std::result::Result<TaskCompletionPacket, String> {
        let mut execution = Vec::with_capacity(packet.strategy.len());
        let mut evidence = Vec::with_capacity(packet.strategy.len());
        for command in &packet.strategy {
            match self.sandbox.run(command) {
                Ok(outcome) => {
                    evidence.push(outcome.evidence);
                    execution.push(outcome.record);
                }
                Err(err) => {
                    warn!(command = %command, error = %err, "strategy command failed");
                    return Err(truncate_chars(&err.to_string(), STRATEGY_DETAIL_LIMIT));
                }
            }
        }

        let files_changed = task.artifacts_to_touch.clone().filter(|a| !a.is_empty());
        Ok(TaskCompletionPacket {
            task_id: task.id.clone(),
            execution,
            tests: (!evidence.is_empty()).then_some(evidence),
            files_changed,
        })
    }
}
