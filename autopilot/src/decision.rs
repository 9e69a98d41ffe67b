//! Validation gate between the scout and the ledger.
//!
//! Scout proposals are untrusted JSON. Before anything derived from one
//! reaches the ledger it must pass schema conformance (Draft 2020-12) and a
//! handful of semantic checks the schema cannot express. A violation never
//! aborts the process; it is returned as a detail string so the caller can
//! record a contract-violation receipt and halt.

use anyhow::{Context, Result};
use jsonschema::Draft;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::types::{TaskUpsert, truncate_chars};

const EPIC_PROPOSAL_SCHEMA: &str = include_str!("../schemas/epic_proposal.schema.json");

/// How many characters of a violation survive into the receipt detail.
const VIOLATION_DETAIL_LIMIT: usize = 200;

/// A validated scout proposal, safe to translate into ledger events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicProposal {
    pub epic_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub tasks: Vec<ProposedTask>,
}

/// One task inside a proposal: an id plus the optional fields a
/// `task_upsert` may carry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedTask {
    pub id: String,
    #[serde(default)]
    pub noop: Option<bool>,
    #[serde(default)]
    pub requires_input: Option<bool>,
    #[serde(default)]
    pub requires_input_reason: Option<String>,
    #[serde(default)]
    pub requires_integration_check: Option<bool>,
    #[serde(default)]
    pub requires_oracle_review: Option<bool>,
    #[serde(default)]
    pub ux_sensitive: Option<bool>,
    #[serde(default)]
    pub artifacts_to_touch: Option<Vec<String>>,
    #[serde(default)]
    pub strategy: Option<Vec<String>>,
}

impl ProposedTask {
    /// The `task_upsert` payload this task contributes under `epic_id`.
    pub fn to_upsert(&self, epic_id: &str) -> TaskUpsert {
        TaskUpsert {
            epic_id: epic_id.to_string(),
            noop: self.noop,
            requires_input: self.requires_input,
            requires_input_reason: self.requires_input_reason.clone(),
            requires_integration_check: self.requires_integration_check,
            requires_oracle_review: self.requires_oracle_review,
            ux_sensitive: self.ux_sensitive,
            artifacts_to_touch: self.artifacts_to_touch.clone(),
            strategy: self.strategy.clone(),
        }
    }
}

/// Validate a raw scout proposal.
///
/// `Ok(Err(detail))` is a contract violation (bounded detail string for the
/// receipt); `Err` is an internal failure such as an uncompilable schema.
pub fn validate_proposal(raw: &Value) -> Result<std::result::Result<EpicProposal, String>> {
    if let Some(detail) = schema_violations(raw)? {
        return Ok(Err(detail));
    }
    let proposal: EpicProposal =
        serde_json::from_value(raw.clone()).context("parse validated proposal")?;
    if let Some(detail) = semantic_violation(&proposal) {
        return Ok(Err(detail));
    }
    debug!(epic_id = %proposal.epic_id, tasks = proposal.tasks.len(), "proposal accepted");
    Ok(Ok(proposal))
}

/// Validate against the embedded JSON Schema (Draft 2020-12).
fn schema_violations(instance: &Value) -> Result<Option<String>> {
    let schema: Value =
        serde_json::from_str(EPIC_PROPOSAL_SCHEMA).context("parse proposal schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile proposal schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        Ok(None)
    } else {
        Ok(Some(truncate_chars(
            &format!("schema: {}", messages.join("; ")),
            VIOLATION_DETAIL_LIMIT,
        )))
    }
}

/// Checks the schema cannot express: blank ids and duplicate task ids.
fn semantic_violation(proposal: &EpicProposal) -> Option<String> {
    if proposal.epic_id.trim().is_empty() {
        return Some("epic id is blank".to_string());
    }
    let mut seen = std::collections::HashSet::new();
    for task in &proposal.tasks {
        if task.id.trim().is_empty() {
            return Some("task id is blank".to_string());
        }
        if !seen.insert(task.id.as_str()) {
            return Some(format!("duplicate task id '{}'", task.id));
        }
    }
    None
}
