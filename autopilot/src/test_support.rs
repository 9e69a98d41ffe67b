//! Test-only helpers: throwaway projects and scripted collaborators.

use anyhow::Result;
use serde_json::{Value, json};

use crate::collab::{ContextPack, ContextProvider, ScoutProvider};
use crate::core::types::{EventOp, PrdView, Receipt, Task, TaskCompletionPacket};
use crate::io::ledger::EventLedger;
use crate::io::paths::ProjectLayout;
use crate::io::receipts::ReceiptStore;

/// A temporary project root with the standard layout. The directory is
/// removed on drop.
pub struct TestProject {
    pub temp: tempfile::TempDir,
    pub layout: ProjectLayout,
}

impl TestProject {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = ProjectLayout::new(temp.path());
        Self { temp, layout }
    }

    pub fn ledger(&self) -> EventLedger {
        EventLedger::new(&self.layout)
    }

    /// Append one event and rebuild both materialized views.
    pub fn append_and_rebuild(&self, op: EventOp, id: &str, data: Value) -> PrdView {
        let ledger = self.ledger();
        ledger.append(op, id, data).expect("append event");
        ledger.build_views(&self.layout).expect("rebuild views")
    }

    /// Seed a context file so `FileContextProvider` grounds `task_id`.
    pub fn write_context(&self, task_id: &str, body: &str, citations: &[&str]) {
        let dir = self.temp.path().join("context");
        std::fs::create_dir_all(&dir).expect("mkdir context");
        let mut contents = String::from(body);
        contents.push('\n');
        for citation in citations {
            contents.push_str(&format!("cite: {citation}\n"));
        }
        std::fs::write(dir.join(format!("{task_id}.md")), contents).expect("write context");
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit the executor and passing verifier receipts that let the commit gate
/// accept `task_id` without running its gates.
pub fn seed_passing_chain(store: &ReceiptStore, task_id: &str) {
    let packet = TaskCompletionPacket {
        task_id: task_id.to_string(),
        execution: Vec::new(),
        tests: None,
        files_changed: None,
    };
    store
        .emit(Receipt::ExecutorCompleted {
            task_id: task_id.to_string(),
            packet,
        })
        .expect("emit executor receipt");
    store
        .emit(Receipt::VerifierSpec {
            task_id: task_id.to_string(),
            passed: true,
        })
        .expect("emit spec receipt");
    store
        .emit(Receipt::VerifierQuality {
            task_id: task_id.to_string(),
            passed: true,
        })
        .expect("emit quality receipt");
}

/// Minimal `task_upsert` payload owned by `epic_id`.
pub fn upsert_data(epic_id: &str) -> Value {
    json!({"epicId": epic_id})
}

/// `task_upsert` payload for a noop task.
pub fn noop_upsert_data(epic_id: &str) -> Value {
    json!({"epicId": epic_id, "noop": true})
}

/// Context provider that always returns the same pack.
pub struct FixedContext(pub ContextPack);

impl FixedContext {
    pub fn grounded(body: &str, citation: &str) -> Self {
        Self(ContextPack {
            context_pack: body.to_string(),
            citations: vec![citation.to_string()],
        })
    }
}

impl ContextProvider for FixedContext {
    fn provide(&self, _task: &Task) -> Result<ContextPack> {
        Ok(self.0.clone())
    }
}

/// Scout that replays a fixed proposal regardless of the view.
pub struct ScriptedScout(pub Value);

impl ScoutProvider for ScriptedScout {
    fn propose(&self, _view: &PrdView) -> Result<Value> {
        Ok(self.0.clone())
    }
}
