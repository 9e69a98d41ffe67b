//! Verification gates over task completion evidence.
//!
//! Both verifiers are pure functions of their inputs so the ledger keeper can
//! re-run them at commit time and reach the same verdict as the in-process
//! gate. The spec verifier demands rigorous, digest-bound evidence; the
//! quality verifier only confirms that *some* trace of work exists.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::core::types::{Receipt, Task, TaskCompletionPacket, VerificationPacket};

/// Maximum length of an execution output summary, in characters.
pub const SUMMARY_LIMIT_CHARS: usize = 200;

/// Evidence strings produced by the sandbox carry this prefix.
pub const EXECUTED_PREFIX: &str = "executed:";

// Heuristics, not exhaustive classification: the intent is "concrete,
// checkable evidence", and these shapes are tunable in one place.
static TEST_FILE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.(test|spec)\.[a-z0-9]+|_test\.[a-z0-9]+)$").expect("valid regex")
});
static FILE_PATH_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S*/\S*\.[A-Za-z0-9]+$").expect("valid regex"));

/// Hex-encoded SHA-256 of a summary string.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Spec verifier: passes only when every execution record is meaningful and
/// all declared test/file evidence looks real. An empty execution list always
/// fails.
pub fn verify_spec(task_id: &str, packet: &TaskCompletionPacket) -> VerificationPacket {
    let passed = packet.task_id == task_id
        && !packet.execution.is_empty()
        && packet.execution.iter().all(record_is_meaningful)
        && packet
            .tests
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .all(|entry| looks_like_test_evidence(entry))
        && packet
            .files_changed
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .all(|entry| looks_like_file_path(entry));

    VerificationPacket {
        task_id: packet.task_id.clone(),
        passed,
    }
}

/// Quality verifier: evidence-permissive by design. Passes when the task id
/// matches and at least one `tests` or `files_changed` entry is non-blank.
pub fn verify_quality(task_id: &str, packet: &TaskCompletionPacket) -> VerificationPacket {
    let has_trace = packet
        .tests
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .chain(packet.files_changed.as_deref().unwrap_or(&[]))
        .any(|entry| !entry.trim().is_empty());

    VerificationPacket {
        task_id: packet.task_id.clone(),
        passed: packet.task_id == task_id && has_trace,
    }
}

fn record_is_meaningful(record: &crate::core::types::ExecutionRecord) -> bool {
    !record.command.trim().is_empty()
        && record.exit_code == 0
        && !record.output_summary.is_empty()
        && record.output_summary.chars().count() <= SUMMARY_LIMIT_CHARS
        && record.output_digest == sha256_hex(&record.output_summary)
}

fn looks_like_test_evidence(entry: &str) -> bool {
    entry.starts_with(EXECUTED_PREFIX) || TEST_FILE_SUFFIX.is_match(entry)
}

fn looks_like_file_path(entry: &str) -> bool {
    FILE_PATH_SHAPE.is_match(entry)
}

/// Commit-time check that a run's receipt stream contains the full evidence
/// chain for `task`: an `EXECUTOR_COMPLETED`, a passing `VERIFIER_SPEC`, a
/// passing `VERIFIER_QUALITY`, and the integration/ux/oracle receipts the
/// task's flags demand.
pub fn receipt_chain_complete(receipts: &[Receipt], task: &Task) -> bool {
    let id = task.id.as_str();

    let executor = receipts.iter().any(
        |receipt| matches!(receipt, Receipt::ExecutorCompleted { task_id, .. } if task_id == id),
    );
    let spec = receipts.iter().any(|receipt| {
        matches!(receipt, Receipt::VerifierSpec { task_id, passed } if task_id == id && *passed)
    });
    let quality = receipts.iter().any(|receipt| {
        matches!(receipt, Receipt::VerifierQuality { task_id, passed } if task_id == id && *passed)
    });

    let integration = task.requires_integration_check != Some(true)
        || receipts.iter().any(|receipt| {
            matches!(receipt, Receipt::IntegrationChecked { task_id, .. } if task_id == id)
        });
    let ux = task.ux_sensitive != Some(true)
        || receipts
            .iter()
            .any(|receipt| matches!(receipt, Receipt::UxSimulated { task_id, .. } if task_id == id));
    let oracle = task.requires_oracle_review != Some(true)
        || receipts.iter().any(|receipt| {
            matches!(receipt, Receipt::OracleReviewed { task_id, .. } if task_id == id)
        });

    executor && spec && quality && integration && ux && oracle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ExecutionRecord;

    fn record(command: &str, summary: &str) -> ExecutionRecord {
        ExecutionRecord {
            command: command.to_string(),
            exit_code: 0,
            output_summary: summary.to_string(),
            output_digest: sha256_hex(summary),
        }
    }

    fn packet(task_id: &str, execution: Vec<ExecutionRecord>) -> TaskCompletionPacket {
        TaskCompletionPacket {
            task_id: task_id.to_string(),
            execution,
            tests: None,
            files_changed: None,
        }
    }

    #[test]
    fn spec_passes_with_digest_bound_records() {
        let packet = packet("TASK-1", vec![record("node run.js", "ok")]);
        let verdict = verify_spec("TASK-1", &packet);
        assert_eq!(verdict.task_id, "TASK-1");
        assert!(verdict.passed);
    }

    #[test]
    fn spec_fails_on_empty_execution_list() {
        assert!(!verify_spec("TASK-1", &packet("TASK-1", Vec::new())).passed);
    }

    #[test]
    fn spec_fails_on_digest_mismatch() {
        let mut bad = record("node run.js", "ok");
        bad.output_digest = sha256_hex("tampered");
        assert!(!verify_spec("TASK-1", &packet("TASK-1", vec![bad])).passed);
    }

    #[test]
    fn spec_fails_on_nonzero_exit() {
        let mut bad = record("node run.js", "ok");
        bad.exit_code = 1;
        assert!(!verify_spec("TASK-1", &packet("TASK-1", vec![bad])).passed);
    }

    #[test]
    fn spec_fails_on_oversized_summary() {
        let long = "x".repeat(SUMMARY_LIMIT_CHARS + 1);
        let bad = record("node run.js", &long);
        assert!(!verify_spec("TASK-1", &packet("TASK-1", vec![bad])).passed);
    }

    #[test]
    fn spec_fails_on_task_id_mismatch() {
        let packet = packet("TASK-2", vec![record("node run.js", "ok")]);
        assert!(!verify_spec("TASK-1", &packet).passed);
    }

    #[test]
    fn spec_rejects_fake_test_evidence() {
        let mut p = packet("TASK-1", vec![record("node run.js", "ok")]);
        p.tests = Some(vec!["trust me".to_string()]);
        assert!(!verify_spec("TASK-1", &p).passed);

        p.tests = Some(vec![
            "executed:node run.js: ok".to_string(),
            "src/views.test.ts".to_string(),
            "core/fold_test.rs".to_string(),
        ]);
        assert!(verify_spec("TASK-1", &p).passed);
    }

    #[test]
    fn spec_rejects_non_path_files_changed() {
        let mut p = packet("TASK-1", vec![record("node run.js", "ok")]);
        p.files_changed = Some(vec!["not a path".to_string()]);
        assert!(!verify_spec("TASK-1", &p).passed);

        p.files_changed = Some(vec!["src/core/types.rs".to_string()]);
        assert!(verify_spec("TASK-1", &p).passed);
    }

    #[test]
    fn quality_needs_only_some_trace() {
        let mut p = packet("TASK-1", Vec::new());
        assert!(!verify_quality("TASK-1", &p).passed);

        p.tests = Some(vec!["  ".to_string()]);
        assert!(!verify_quality("TASK-1", &p).passed);

        p.files_changed = Some(vec!["src/lib.rs".to_string()]);
        assert!(verify_quality("TASK-1", &p).passed);
        assert!(!verify_quality("TASK-9", &p).passed);
    }

    #[test]
    fn chain_requires_all_three_base_receipts() {
        let task = Task {
            id: "TASK-1".to_string(),
            ..Task::default()
        };
        let mut receipts = vec![
            Receipt::ExecutorCompleted {
                task_id: "TASK-1".to_string(),
                packet: packet("TASK-1", Vec::new()),
            },
            Receipt::VerifierSpec {
                task_id: "TASK-1".to_string(),
                passed: true,
            },
        ];
        assert!(!receipt_chain_complete(&receipts, &task));

        receipts.push(Receipt::VerifierQuality {
            task_id: "TASK-1".to_string(),
            passed: true,
        });
        assert!(receipt_chain_complete(&receipts, &task));
    }

    #[test]
    fn chain_rejects_failing_verifier_receipts() {
        let task = Task {
            id: "TASK-1".to_string(),
            ..Task::default()
        };
        let receipts = vec![
            Receipt::ExecutorCompleted {
                task_id: "TASK-1".to_string(),
                packet: packet("TASK-1", Vec::new()),
            },
            Receipt::VerifierSpec {
                task_id: "TASK-1".to_string(),
                passed: false,
            },
            Receipt::VerifierQuality {
                task_id: "TASK-1".to_string(),
                passed: true,
            },
        ];
        assert!(!receipt_chain_complete(&receipts, &task));
    }

    #[test]
    fn chain_demands_conditional_receipts_when_flagged() {
        let task = Task {
            id: "TASK-1".to_string(),
            requires_integration_check: Some(true),
            ux_sensitive: Some(true),
            ..Task::default()
        };
        let mut receipts = vec![
            Receipt::ExecutorCompleted {
                task_id: "TASK-1".to_string(),
                packet: packet("TASK-1", Vec::new()),
            },
            Receipt::VerifierSpec {
                task_id: "TASK-1".to_string(),
                passed: true,
            },
            Receipt::VerifierQuality {
                task_id: "TASK-1".to_string(),
                passed: true,
            },
        ];
        assert!(!receipt_chain_complete(&receipts, &task));

        receipts.push(Receipt::IntegrationChecked {
            task_id: "TASK-1".to_string(),
            passed: true,
        });
        receipts.push(Receipt::UxSimulated {
            task_id: "TASK-1".to_string(),
            journeys: vec!["task:TASK-1".to_string()],
        });
        assert!(receipt_chain_complete(&receipts, &task));
    }
}
