//! Receipt-gated epic and task autopilot.
//!
//! The autopilot drives a project through its epics one verified task at a
//! time. All durable state flows through an append-only event ledger; the
//! epic/task view (`prd.json`, `progress.txt`) is materialized by replaying
//! it. Nothing is marked done without a complete receipt chain behind it.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (event folding, verification,
//!   bundling, write policy). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (ledger storage, receipts,
//!   sandboxed subprocesses, environment). Isolated to enable fakes in tests.
//!
//! Orchestration modules ([`machine`], [`orchestrator`], [`autopilot`])
//! coordinate core logic with I/O; [`collab`] defines the collaborator seams
//! the pipeline consults along the way.

pub mod autopilot;
pub mod collab;
pub mod core;
pub mod decision;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod machine;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
