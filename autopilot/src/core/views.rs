//! Deterministic fold of ledger events into the materialized view.
//!
//! Pure logic only: reading the log, snapshotting, and writing files live in
//! `io::ledger`. Epics and tasks keep first-seen order so that replaying the
//! same log always yields byte-identical serialized output.

use anyhow::{Context, Result};

use crate::core::types::{Epic, EpicStatus, Event, EventOp, PrdView, Task, TaskDone, TaskUpsert};

/// Fold events in file order into a materialized view.
///
/// `task_upsert` merges fields onto an existing or newly created task,
/// `task_done` is a one-way transition to `done=true`, and `epic_selected`
/// moves the active-epic pointer. Aggregate `done`/`status` are derived after
/// the fold.
pub fn fold_events(events: &[Event]) -> Result<PrdView> {
    let mut view = PrdView::default();

    for event in events {
        match event.op {
            EventOp::EpicSelected => {
                ensure_epic(&mut view, &event.id);
                view.active_epic_id = Some(event.id.clone());
            }
            EventOp::TaskUpsert => {
                let upsert: TaskUpsert = serde_json::from_value(event.data.clone())
                    .with_context(|| format!("parse task_upsert data for '{}'", event.id))?;
                let epic = ensure_epic(&mut view, &upsert.epic_id);
                let task = ensure_task(epic, &event.id);
                merge_task(task, &upsert);
            }
            EventOp::TaskDone => {
                let done: TaskDone = serde_json::from_value(event.data.clone())
                    .with_context(|| format!("parse task_done data for '{}'", event.id))?;
                let epic = ensure_epic(&mut view, &done.epic_id);
                ensure_task(epic, &event.id).done = true;
            }
        }
    }

    for epic in &mut view.epics {
        epic.done = epic.tasks.iter().all(|task| task.done);
        epic.status = if epic.done {
            EpicStatus::Done
        } else {
            EpicStatus::InProgress
        };
    }

    Ok(view)
}

/// Render the human-readable progress listing: one epic-id header line
/// followed by `- [x]`/`- [ ]` per task in task order.
pub fn render_progress(view: &PrdView) -> String {
    let mut out = String::new();
    for (index, epic) in view.epics.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&epic.id);
        out.push('\n');
        for task in &epic.tasks {
            let mark = if task.done { 'x' } else { ' ' };
            out.push_str(&format!("- [{mark}] {}\n", task.id));
        }
    }
    out
}

fn ensure_epic<'a>(view: &'a mut PrdView, id: &str) -> &'a mut Epic {
    let index = match view.epics.iter().position(|epic| epic.id == id) {
        Some(index) => index,
        None => {
            view.epics.push(Epic {
                id: id.to_string(),
                tasks: Vec::new(),
                done: false,
                status: EpicStatus::InProgress,
            });
            view.epics.len() - 1
        }
    };
    &mut view.epics[index]
}

fn ensure_task<'a>(epic: &'a mut Epic, id: &str) -> &'a mut Task {
    let index = match epic.tasks.iter().position(|task| task.id == id) {
        Some(index) => index,
        None => {
            epic.tasks.push(Task {
                id: id.to_string(),
                ..Task::default()
            });
            epic.tasks.len() - 1
        }
    };
    &mut epic.tasks[index]
}

fn merge_task(task: &mut Task, upsert: &TaskUpsert) {
    merge(&mut task.noop, &upsert.noop);
    merge(&mut task.requires_input, &upsert.requires_input);
    merge(&mut task.requires_input_reason, &upsert.requires_input_reason);
    merge(
        &mut task.requires_integration_check,
        &upsert.requires_integration_check,
    );
    merge(
        &mut task.requires_oracle_review,
        &upsert.requires_oracle_review,
    );
    merge(&mut task.ux_sensitive, &upsert.ux_sensitive);
    merge(&mut task.artifacts_to_touch, &upsert.artifacts_to_touch);
    merge(&mut task.strategy, &upsert.strategy);
}

fn merge<T: Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        *target = incoming.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SCHEMA_VERSION;

    fn event(op: EventOp, id: &str, data: serde_json::Value) -> Event {
        Event {
            ts: "2026-01-01T00:00:00Z".to_string(),
            schema_version: SCHEMA_VERSION,
            op,
            id: id.to_string(),
            data,
        }
    }

    #[test]
    fn replay_marks_selected_epic_and_done_task() {
        let events = vec![
            event(EventOp::EpicSelected, "EPIC-1", serde_json::Value::Null),
            event(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
            event(
                EventOp::TaskDone,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
        ];

        let view = fold_events(&events).expect("fold");
        assert_eq!(view.active_epic_id.as_deref(), Some("EPIC-1"));
        assert!(view.epics[0].tasks[0].done);
        assert!(view.epics[0].done);
        assert_eq!(view.epics[0].status, EpicStatus::Done);
    }

    #[test]
    fn upsert_merges_fields_without_clearing_existing_ones() {
        let events = vec![
            event(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1", "noop": true}),
            ),
            event(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1", "uxSensitive": true}),
            ),
        ];

        let view = fold_events(&events).expect("fold");
        let task = &view.epics[0].tasks[0];
        assert_eq!(task.noop, Some(true));
        assert_eq!(task.ux_sensitive, Some(true));
        assert!(!task.done);
    }

    #[test]
    fn task_done_is_one_way() {
        let events = vec![
            event(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
            event(
                EventOp::TaskDone,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
            event(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1", "noop": false}),
            ),
        ];

        let view = fold_events(&events).expect("fold");
        assert!(view.epics[0].tasks[0].done);
    }

    #[test]
    fn epic_done_requires_every_task_done() {
        let events = vec![
            event(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
            event(
                EventOp::TaskUpsert,
                "TASK-2",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
            event(
                EventOp::TaskDone,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
        ];

        let view = fold_events(&events).expect("fold");
        assert!(!view.epics[0].done);
        assert_eq!(view.epics[0].status, EpicStatus::InProgress);
    }

    #[test]
    fn progress_listing_uses_checkbox_lines_in_task_order() {
        let events = vec![
            event(
                EventOp::TaskUpsert,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
            event(
                EventOp::TaskUpsert,
                "TASK-2",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
            event(
                EventOp::TaskDone,
                "TASK-1",
                serde_json::json!({"epicId": "EPIC-1"}),
            ),
        ];

        let view = fold_events(&events).expect("fold");
        assert_eq!(
            render_progress(&view),
            "EPIC-1\n- [x] TASK-1\n- [ ] TASK-2\n"
        );
    }

    #[test]
    fn fold_is_deterministic_across_replays() {
        let events = vec![
            event(EventOp::EpicSelected, "EPIC-2", serde_json::Value::Null),
            event(
                EventOp::TaskUpsert,
                "TASK-9",
                serde_json::json!({"epicId": "EPIC-2", "artifactsToTouch": ["src/a.rs"]}),
            ),
        ];

        let first = serde_json::to_string(&fold_events(&events).expect("fold")).expect("json");
        let second = serde_json::to_string(&fold_events(&events).expect("fold")).expect("json");
        assert_eq!(first, second);
    }
}
