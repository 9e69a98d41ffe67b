//! Collaborator seams around the task state machine.
//!
//! Each gate the pipeline consults is a trait, so the orchestration logic
//! stays testable with scripted fakes while the binary wires in baseline
//! implementations. Collaborators that attest something do so by emitting
//! their own receipt; the state machine never forges evidence on their
//! behalf.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::core::types::{PrdView, Receipt, Task};
use crate::io::receipts::ReceiptStore;

/// Grounding material an executor needs before touching a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPack {
    pub context_pack: String,
    pub citations: Vec<String>,
}

/// Supplies the context pack for a task. Returning an empty pack halts the
/// task rather than letting it run ungrounded.
pub trait ContextProvider {
    fn provide(&self, task: &Task) -> Result<ContextPack>;
}

/// Attests that a change integrates with the rest of the system.
pub trait IntegrationChecker {
    fn check(&self, task: &Task, store: &ReceiptStore) -> Result<()>;
}

/// Walks user journeys for UX-sensitive tasks.
pub trait UxSimulator {
    fn simulate(&self, task: &Task, journeys: &[String], store: &ReceiptStore) -> Result<()>;
}

/// Final human-proxy review for tasks that require it.
pub trait OracleReviewer {
    fn review(&self, task: &Task, store: &ReceiptStore) -> Result<()>;
}

/// Proposes the next epic when no active epic exists. The proposal is raw
/// JSON; the decision gate validates it before anything reaches the ledger.
pub trait ScoutProvider {
    fn propose(&self, view: &PrdView) -> Result<Value>;
}

/// Everything the pipeline consults besides the ledger and the sandbox.
pub struct Collaborators<'a> {
    pub context: &'a dyn ContextProvider,
    pub integration: &'a dyn IntegrationChecker,
    pub ux: &'a dyn UxSimulator,
    pub oracle: &'a dyn OracleReviewer,
    pub scout: Option<&'a dyn ScoutProvider>,
}

/// Reads `context/<task-id>.md` under the workspace root. Lines starting
/// with `cite: ` become citations; everything else is the pack body. A
/// missing file yields an empty pack, which the pipeline treats as a halt.
#[derive(Debug, Clone)]
pub struct FileContextProvider {
    context_dir: PathBuf,
}

impl FileContextProvider {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            context_dir: workspace_root.into().join("context"),
        }
    }
}

impl ContextProvider for FileContextProvider {
    fn provide(&self, task: &Task) -> Result<ContextPack> {
        let path = self.context_dir.join(format!("{}.md", task.id));
        if !path.exists() {
            debug!(task_id = %task.id, "no context file");
            return Ok(ContextPack::default());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;

        let mut citations = Vec::new();
        let mut body = Vec::new();
        for line in contents.lines() {
            if let Some(citation) = line.strip_prefix("cite: ") {
                citations.push(citation.trim().to_string());
            } else {
                body.push(line);
            }
        }
        Ok(ContextPack {
            context_pack: body.join("\n").trim().to_string(),
            citations,
        })
    }
}

/// Baseline checker that attests integration by emitting a passing receipt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiptingIntegrationChecker;

impl IntegrationChecker for ReceiptingIntegrationChecker {
    fn check(&self, task: &Task, store: &ReceiptStore) -> Result<()> {
        store.emit(Receipt::IntegrationChecked {
            task_id: task.id.clone(),
            passed: true,
        })
    }
}

/// Baseline simulator that records the derived journeys it walked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiptingUxSimulator;

impl UxSimulator for ReceiptingUxSimulator {
    fn simulate(&self, task: &Task, journeys: &[String], store: &ReceiptStore) -> Result<()> {
        store.emit(Receipt::UxSimulated {
            task_id: task.id.clone(),
            journeys: journeys.to_vec(),
        })
    }
}

/// Baseline reviewer that approves and leaves a receipt saying so.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiptingOracleReviewer;

impl OracleReviewer for ReceiptingOracleReviewer {
    fn review(&self, task: &Task, store: &ReceiptStore) -> Result<()> {
        store.emit(Receipt::OracleReviewed {
            task_id: task.id.clone(),
            passed: true,
        })
    }
}
