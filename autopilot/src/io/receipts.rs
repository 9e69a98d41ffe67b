//! Run-scoped receipt storage and run-lifecycle bookkeeping.
//!
//! Receipts are append-only evidence: never edited, only accumulated within a
//! run. Every emission also appends a `run_updated` entry to the shared
//! `_ledger/runs.jsonl`, whose `run_started` entry appears exactly once per
//! run id.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{Receipt, ReceiptEnvelope};
use crate::io::ledger::now_iso;
use crate::io::log::{AppendLog, JsonlLog};
use crate::io::paths::ProjectLayout;

/// Run-lifecycle entry in `_ledger/runs.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub ts: String,
    pub run_id: String,
    pub event: RunEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted,
    RunUpdated,
}

/// Append-only receipt store for one run.
#[derive(Debug, Clone)]
pub struct ReceiptStore {
    run_id: String,
    receipts: JsonlLog,
    runs: JsonlLog,
}

impl ReceiptStore {
    /// Open the store for `run_id`, recording `run_started` in the runs log
    /// the first time this run id is seen.
    pub fn open(layout: &ProjectLayout, run_id: &str) -> Result<Self> {
        let store = Self {
            run_id: run_id.to_string(),
            receipts: JsonlLog::new(layout.receipts_path(run_id)),
            runs: JsonlLog::new(layout.runs_log_path.clone()),
        };
        if !store.run_already_started()? {
            store.append_run_event(RunEventKind::RunStarted)?;
        }
        Ok(store)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one receipt envelope and a `run_updated` lifecycle entry.
    pub fn emit(&self, receipt: Receipt) -> Result<()> {
        let envelope = ReceiptEnvelope {
            ts: now_iso(),
            run_id: self.run_id.clone(),
            receipt,
        };
        let line = serde_json::to_string(&envelope).context("serialize receipt envelope")?;
        self.receipts.append(&line)?;
        self.append_run_event(RunEventKind::RunUpdated)?;
        debug!(run_id = %self.run_id, "receipt emitted");
        Ok(())
    }

    /// Read every receipt envelope for this run, in emission order.
    ///
    /// Parsing is strict: a malformed line is an error so the ledger keeper
    /// can classify the file as invalid rather than silently skipping
    /// evidence.
    pub fn read_all(&self) -> Result<Vec<ReceiptEnvelope>> {
        let lines = self.receipts.read_all()?;
        let mut envelopes = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            let envelope: ReceiptEnvelope = serde_json::from_str(line)
                .with_context(|| format!("parse receipt line {}", index + 1))?;
            envelopes.push(envelope);
        }
        Ok(envelopes)
    }

    /// Receipts only, unwrapped from their envelopes.
    pub fn read_receipts(&self) -> Result<Vec<Receipt>> {
        Ok(self
            .read_all()?
            .into_iter()
            .map(|envelope| envelope.receipt)
            .collect())
    }

    fn run_already_started(&self) -> Result<bool> {
        for line in self.runs.read_all()? {
            let Ok(event) = serde_json::from_str::<RunEvent>(&line) else {
                continue;
            };
            if event.run_id == self.run_id && event.event == RunEventKind::RunStarted {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn append_run_event(&self, kind: RunEventKind) -> Result<()> {
        let event = RunEvent {
            ts: now_iso(),
            run_id: self.run_id.clone(),
            event: kind,
        };
        let line = serde_json::to_string(&event).context("serialize run event")?;
        self.runs.append(&line)
    }
}
