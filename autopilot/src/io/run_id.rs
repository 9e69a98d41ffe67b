//! Process-scoped run identity.
//!
//! A run id is resolved once per process so that every receipt and ledger
//! entry from one invocation is attributable to one run, even if environment
//! state changes mid-run. The override path is injectable for tests; the
//! fallback is cached in a process-level `OnceLock` and resets only at
//! process exit.

use std::process;
use std::sync::OnceLock;

use chrono::Utc;

static PROCESS_RUN_ID: OnceLock<String> = OnceLock::new();

/// Resolve the run id for this invocation.
///
/// An explicit override (typically from configuration) wins; otherwise a
/// process-derived id is minted once and reused for the process lifetime.
pub fn resolve_run_id(override_id: Option<&str>) -> String {
    if let Some(id) = override_id {
        return id.to_string();
    }
    PROCESS_RUN_ID.get_or_init(derive_process_run_id).clone()
}

fn derive_process_run_id() -> String {
    format!(
        "run-{}-{}",
        process::id(),
        Utc::now().format("%Y%m%d%H%M%S")
    )
}
