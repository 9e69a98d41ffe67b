//! Shared contract types for the autopilot core.
//!
//! These types define the persisted wire formats (ledger events, materialized
//! views, receipts) and the structured halt taxonomy. Field names follow the
//! on-disk format exactly (`schemaVersion`, `taskId`, `files_changed`), so
//! serde renames are part of the contract and must not drift.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version stamped on every ledger event. A reader that encounters a
/// different version must fail loudly rather than guess.
pub const SCHEMA_VERSION: u32 = 1;

/// Sentinel task identifier produced when a work packet cannot resolve a
/// real task id.
pub const UNKNOWN_TASK_ID: &str = "unknown-task";

/// Role permitted to write ledger and view paths.
pub const LEDGER_KEEPER_ROLE: &str = "ledger-keeper";

/// Ledger event operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOp {
    EpicSelected,
    TaskUpsert,
    TaskDone,
}

/// One schema-stamped ledger entry (`_ledger/prd.events.jsonl`, one per line).
///
/// Immutable once appended. `id` is the epic id for `epic_selected` and the
/// task id for task events; task events carry their owning epic in
/// `data.epicId` so replay does not depend on the active-epic pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub ts: String,
    pub schema_version: u32,
    pub op: EventOp,
    pub id: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Payload of a `task_upsert` event: the owning epic plus the optional task
/// fields to merge. Absent fields leave the existing task untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpsert {
    pub epic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_input: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_input_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_integration_check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_oracle_review: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ux_sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_to_touch: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Vec<String>>,
}

/// Payload of a `task_done` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDone {
    pub epic_id: String,
}

/// A single unit of gated work within an epic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_input: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_input_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_integration_check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_oracle_review: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ux_sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_to_touch: Option<Vec<String>>,
    /// Bounded command list the sandbox executes for this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Vec<String>>,
}

impl Task {
    pub fn is_noop(&self) -> bool {
        self.noop == Some(true)
    }

    pub fn artifacts(&self) -> &[String] {
        self.artifacts_to_touch.as_deref().unwrap_or(&[])
    }

    pub fn strategy_commands(&self) -> &[String] {
        self.strategy.as_deref().unwrap_or(&[])
    }
}

/// Aggregate epic status derived from task completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicStatus {
    InProgress,
    Done,
}

/// Derived epic view. Never stored except as part of the materialized view;
/// rebuilt entirely by replaying events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epic {
    pub id: String,
    pub tasks: Vec<Task>,
    pub done: bool,
    pub status: EpicStatus,
}

/// Materialized epic/task view (`prd.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrdView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_epic_id: Option<String>,
    #[serde(default)]
    pub epics: Vec<Epic>,
}

impl PrdView {
    pub fn epic(&self, id: &str) -> Option<&Epic> {
        self.epics.iter().find(|epic| epic.id == id)
    }
}

/// Evidence of one sandboxed command execution. `output_digest` must equal
/// `sha256(output_summary)`; a summary without a matching digest is treated
/// as fabricated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub command: String,
    pub exit_code: i64,
    pub output_summary: String,
    pub output_digest: String,
}

/// Completion evidence produced by the state machine for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletionPacket {
    pub task_id: String,
    pub execution: Vec<ExecutionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<String>>,
    #[serde(
        default,
        rename = "files_changed",
        skip_serializing_if = "Option::is_none"
    )]
    pub files_changed: Option<Vec<String>>,
}

/// Verdict produced by a verifier. Must echo the `taskId` of the packet it
/// verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPacket {
    pub task_id: String,
    pub passed: bool,
}

/// Citation-backed work packet the state machine executes against.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkPacket {
    pub task_id: String,
    pub intent: String,
    pub context_pack: String,
    pub citations: Vec<String>,
    pub strategy: Vec<String>,
}

/// Append-only evidence record for one step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Receipt {
    #[serde(rename_all = "camelCase")]
    ExecutorCompleted {
        task_id: String,
        packet: TaskCompletionPacket,
    },
    #[serde(rename_all = "camelCase")]
    VerifierSpec { task_id: String, passed: bool },
    #[serde(rename_all = "camelCase")]
    VerifierQuality { task_id: String, passed: bool },
    #[serde(rename_all = "camelCase")]
    IntegrationChecked { task_id: String, passed: bool },
    #[serde(rename_all = "camelCase")]
    UxSimulated {
        task_id: String,
        journeys: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    OracleReviewed { task_id: String, passed: bool },
    #[serde(rename_all = "camelCase")]
    EpicTasksDerived {
        epic_id: String,
        task_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    TaskCompleted { task_id: String },
    RunFinalized,
    #[serde(rename_all = "camelCase")]
    HaltAndAsk { reason: String },
    #[serde(rename_all = "camelCase")]
    ScoutContractViolation { detail: String },
}

/// Envelope around a receipt as persisted in
/// `_ledger/runs/<runId>/receipts.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptEnvelope {
    pub ts: String,
    pub run_id: String,
    pub receipt: Receipt,
}

/// Terminal stop condition for the current task or run. Halts are returned as
/// values, never panics; the caller must correct the cause and re-invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    TaskIdMissing,
    ContextPackRequired,
    /// Detail is pre-truncated to at most 60 characters.
    TaskStrategyFailed(String),
    SpecVerificationFailed,
    QualityVerificationFailed,
    PrdNotFound,
    PrdInvalidJson,
    NoActiveEpic,
    ActiveEpicNotFound,
    ActiveEpicAlreadyDone,
    EpicTasksMissing,
    EpicTaskIdsMissing,
    /// A task declared it cannot proceed without outside input.
    InputRequired(String),
    VerificationRequired,
    ReceiptsInvalid,
    ScoutContractViolation(String),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskIdMissing => write!(f, "TASK_ID_MISSING"),
            Self::ContextPackRequired => write!(f, "CONTEXT_PACK_REQUIRED"),
            Self::TaskStrategyFailed(detail) => {
                write!(f, "TASK_STRATEGY_FAILED: {detail}")
            }
            Self::SpecVerificationFailed => write!(f, "SPEC_VERIFICATION_FAILED"),
            Self::QualityVerificationFailed => write!(f, "QUALITY_VERIFICATION_FAILED"),
            Self::PrdNotFound => write!(f, "PRD_NOT_FOUND"),
            Self::PrdInvalidJson => write!(f, "PRD_INVALID_JSON"),
            Self::NoActiveEpic => write!(f, "NO_ACTIVE_EPIC"),
            Self::ActiveEpicNotFound => write!(f, "ACTIVE_EPIC_NOT_FOUND"),
            Self::ActiveEpicAlreadyDone => write!(f, "ACTIVE_EPIC_ALREADY_DONE"),
            Self::EpicTasksMissing => write!(f, "EPIC_TASKS_MISSING"),
            Self::EpicTaskIdsMissing => write!(f, "EPIC_TASK_IDS_MISSING"),
            Self::InputRequired(reason) => write!(f, "INPUT_REQUIRED: {reason}"),
            Self::VerificationRequired => write!(f, "VERIFICATION_REQUIRED"),
            Self::ReceiptsInvalid => write!(f, "RECEIPTS_INVALID"),
            Self::ScoutContractViolation(detail) => {
                write!(f, "SCOUT_CONTRACT_VIOLATION: {detail}")
            }
        }
    }
}

/// Truncate to at most `max` characters on a character boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
