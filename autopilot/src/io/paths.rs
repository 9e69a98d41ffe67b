//! Canonical persisted layout relative to a project root.

use std::path::{Path, PathBuf};

/// Every path the autopilot persists, per the fixed on-disk layout:
///
/// ```text
/// prd.json                          materialized epic/task view
/// progress.txt                      plain-text progress listing
/// _ledger/prd.events.jsonl          append-only event log
/// _ledger/runs.jsonl                run-lifecycle events
/// _ledger/runs/<runId>/receipts.jsonl
/// build-log/prd.snapshots.log       pre-rebuild snapshots
/// build-log/progress.snapshots.log
/// ```
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub prd_path: PathBuf,
    pub progress_path: PathBuf,
    pub ledger_dir: PathBuf,
    pub events_path: PathBuf,
    pub runs_dir: PathBuf,
    pub runs_log_path: PathBuf,
    pub build_log_dir: PathBuf,
    pub prd_snapshots_path: PathBuf,
    pub progress_snapshots_path: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ledger_dir = root.join("_ledger");
        let build_log_dir = root.join("build-log");
        Self {
            prd_path: root.join("prd.json"),
            progress_path: root.join("progress.txt"),
            events_path: ledger_dir.join("prd.events.jsonl"),
            runs_dir: ledger_dir.join("runs"),
            runs_log_path: ledger_dir.join("runs.jsonl"),
            prd_snapshots_path: build_log_dir.join("prd.snapshots.log"),
            progress_snapshots_path: build_log_dir.join("progress.snapshots.log"),
            ledger_dir,
            build_log_dir,
            root,
        }
    }

    /// Receipt file for one run.
    pub fn receipts_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id).join("receipts.jsonl")
    }
}

/// Convenience constructor used by tests and the binary.
pub fn layout_for(root: &Path) -> ProjectLayout {
    ProjectLayout::new(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_stable() {
        let layout = ProjectLayout::new("/project");
        assert_eq!(layout.prd_path, PathBuf::from("/project/prd.json"));
        assert_eq!(
            layout.events_path,
            PathBuf::from("/project/_ledger/prd.events.jsonl")
        );
        assert_eq!(
            layout.receipts_path("run-7"),
            PathBuf::from("/project/_ledger/runs/run-7/receipts.jsonl")
        );
        assert_eq!(
            layout.progress_snapshots_path,
            PathBuf::from("/project/build-log/progress.snapshots.log")
        );
    }
}
