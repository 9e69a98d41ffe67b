//! Event ledger storage and view materialization.
//!
//! The ledger exclusively owns `_ledger/prd.events.jsonl` and is the only
//! legitimate writer of the materialized views. Everything else reads views
//! or writes run-scoped receipts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::types::{Event, EventOp, PrdView, SCHEMA_VERSION};
use crate::core::views::{fold_events, render_progress};
use crate::io::log::{AppendLog, JsonlLog};
use crate::io::paths::ProjectLayout;

/// Append-only, schema-versioned event log.
#[derive(Debug, Clone)]
pub struct EventLedger {
    log: JsonlLog,
}

impl EventLedger {
    pub fn new(layout: &ProjectLayout) -> Self {
        Self {
            log: JsonlLog::new(layout.events_path.clone()),
        }
    }

    pub fn exists(&self) -> bool {
        self.log.exists()
    }

    /// Append one schema-stamped event line. Never rewrites existing lines.
    pub fn append(&self, op: EventOp, id: &str, data: Value) -> Result<()> {
        let event = Event {
            ts: now_iso(),
            schema_version: SCHEMA_VERSION,
            op,
            id: id.to_string(),
            data,
        };
        let line = serde_json::to_string(&event).context("serialize event")?;
        self.log.append(&line)?;
        debug!(op = ?op, id, "ledger event appended");
        Ok(())
    }

    /// Read the full log in file order.
    ///
    /// Any line whose `schemaVersion` differs from [`SCHEMA_VERSION`] is a
    /// hard failure: the reader must not guess at foreign formats.
    pub fn read_events(&self) -> Result<Vec<Event>> {
        let lines = self.log.read_all()?;
        let mut events = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            let event: Event = serde_json::from_str(line)
                .with_context(|| format!("parse ledger line {}", index + 1))?;
            if event.schema_version != SCHEMA_VERSION {
                bail!(
                    "ledger schema version mismatch on line {}: expected {}, found {}",
                    index + 1,
                    SCHEMA_VERSION,
                    event.schema_version
                );
            }
            events.push(event);
        }
        Ok(events)
    }

    /// Replay the full log and rewrite both materialized artifacts.
    ///
    /// Current file contents are appended to the timestamped snapshot logs
    /// before being overwritten (a missing prior file is fine). Rebuilding
    /// twice with no new events produces byte-identical output.
    #[instrument(skip_all)]
    pub fn build_views(&self, layout: &ProjectLayout) -> Result<PrdView> {
        let events = self.read_events()?;
        let view = fold_events(&events)?;

        let mut prd = serde_json::to_string_pretty(&view).context("serialize prd view")?;
        prd.push('\n');
        let progress = render_progress(&view);

        snapshot_before_overwrite(&layout.prd_path, &layout.prd_snapshots_path)?;
        snapshot_before_overwrite(&layout.progress_path, &layout.progress_snapshots_path)?;

        write_file(&layout.prd_path, &prd)?;
        write_file(&layout.progress_path, &progress)?;
        info!(events = events.len(), epics = view.epics.len(), "views rebuilt");
        Ok(view)
    }
}

/// Load the materialized PRD view without replaying the ledger.
pub fn load_view(layout: &ProjectLayout) -> Result<Option<PrdView>> {
    if !layout.prd_path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&layout.prd_path)
        .with_context(|| format!("read {}", layout.prd_path.display()))?;
    let view = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", layout.prd_path.display()))?;
    Ok(Some(view))
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn snapshot_before_overwrite(source: &Path, snapshot_log: &Path) -> Result<()> {
    let Ok(contents) = fs::read_to_string(source) else {
        return Ok(());
    };
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let log = JsonlLog::new(snapshot_log);
    let mut entry = format!("=== {} {} ===\n{contents}", now_iso(), name);
    if entry.ends_with('\n') {
        entry.pop();
    }
    log.append(&entry)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::paths::ProjectLayout;

    fn ledger_with_layout() -> (tempfile::TempDir, ProjectLayout, EventLedger) {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = ProjectLayout::new(temp.path());
        let ledger = EventLedger::new(&layout);
        (temp, layout, ledger)
    }

    #[test]
    fn append_then_read_round_trips_events() {
        let (_temp, _layout, ledger) = ledger_with_layout();
        ledger
            .append(EventOp::EpicSelected, "EPIC-1", Value::Null)
            .expect("append");
        ledger
            .append(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            )
            .expect("append");

        let events = ledger.read_events().expect("read");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].op, EventOp::EpicSelected);
        assert_eq!(events[0].schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn mismatched_schema_version_fails_loudly() {
        let (_temp, layout, ledger) = ledger_with_layout();
        let line = r#"{"ts":"2026-01-01T00:00:00Z","schemaVersion":99,"op":"epic_selected","id":"EPIC-1"}"#;
        fs::create_dir_all(&layout.ledger_dir).expect("mkdir");
        fs::write(&layout.events_path, format!("{line}\n")).expect("seed");

        let err = ledger.read_events().unwrap_err();
        assert!(err.to_string().contains("schema version mismatch"));
    }

    #[test]
    fn rebuild_twice_is_byte_identical() {
        let (_temp, layout, ledger) = ledger_with_layout();
        ledger
            .append(EventOp::EpicSelected, "EPIC-1", Value::Null)
            .expect("append");
        ledger
            .append(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            )
            .expect("append");
        ledger
            .append(
                EventOp::TaskDone,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            )
            .expect("append");

        ledger.build_views(&layout).expect("first rebuild");
        let prd_first = fs::read_to_string(&layout.prd_path).expect("read prd");
        let progress_first = fs::read_to_string(&layout.progress_path).expect("read progress");

        ledger.build_views(&layout).expect("second rebuild");
        let prd_second = fs::read_to_string(&layout.prd_path).expect("read prd");
        let progress_second = fs::read_to_string(&layout.progress_path).expect("read progress");

        assert_eq!(prd_first, prd_second);
        assert_eq!(progress_first, progress_second);
        assert_eq!(progress_first, "EPIC-1\n- [x] TASK-1\n");
    }

    #[test]
    fn rebuild_snapshots_prior_contents() {
        let (_temp, layout, ledger) = ledger_with_layout();
        ledger
            .append(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            )
            .expect("append");

        // First rebuild: no prior files, snapshot logs stay absent.
        ledger.build_views(&layout).expect("rebuild");
        assert!(!layout.prd_snapshots_path.exists());

        ledger.build_views(&layout).expect("rebuild again");
        let snapshots = fs::read_to_string(&layout.prd_snapshots_path).expect("read snapshots");
        assert!(snapshots.contains("prd.json"));
        assert!(snapshots.contains("TASK-1"));
    }

    #[test]
    fn load_view_distinguishes_missing_from_invalid() {
        let (_temp, layout, _ledger) = ledger_with_layout();
        assert!(load_view(&layout).expect("missing ok").is_none());

        fs::write(&layout.prd_path, "{not-json").expect("seed");
        assert!(load_view(&layout).is_err());
    }
}
