//! Greedy selection of a bundle of non-overlapping open tasks.

use std::collections::HashSet;

use crate::core::types::Task;

/// Select up to `max` open tasks whose declared touched-artifact sets are
/// pairwise disjoint.
///
/// The first open task is always taken. A task with no declared artifacts
/// cannot prove non-overlap, so it terminates bundling: as the first pick it
/// forms a bundle of one, as a later candidate it ends the scan. Overlapping
/// candidates are skipped and picked up by a later invocation.
pub fn select_bundle<'a>(open_tasks: &[&'a Task], max: usize) -> Vec<&'a Task> {
    let mut bundle: Vec<&Task> = Vec::new();
    let mut claimed: HashSet<&str> = HashSet::new();

    for task in open_tasks {
        if bundle.len() >= max {
            break;
        }
        let artifacts = task.artifacts();
        if artifacts.is_empty() {
            if bundle.is_empty() {
                bundle.push(task);
            }
            break;
        }
        if artifacts.iter().any(|a| claimed.contains(a.as_str())) {
            continue;
        }
        for artifact in artifacts {
            claimed.insert(artifact.as_str());
        }
        bundle.push(task);
    }

    bundle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, artifacts: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            artifacts_to_touch: if artifacts.is_empty() {
                None
            } else {
                Some(artifacts.iter().map(|a| a.to_string()).collect())
            },
            ..Task::default()
        }
    }

    #[test]
    fn empty_artifact_list_bundles_alone() {
        let a = task("A", &[]);
        let b = task("B", &["src/b.rs"]);
        let bundle = select_bundle(&[&a, &b], 2);
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle[0].id, "A");
    }

    #[test]
    fn disjoint_tasks_fill_the_bundle() {
        let a = task("A", &["src/a.rs"]);
        let b = task("B", &["src/b.rs"]);
        let c = task("C", &["src/c.rs"]);
        let bundle = select_bundle(&[&a, &b, &c], 2);
        let ids: Vec<&str> = bundle.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn overlapping_candidate_is_skipped() {
        let a = task("A", &["src/a.rs", "src/shared.rs"]);
        let b = task("B", &["src/shared.rs"]);
        let c = task("C", &["src/c.rs"]);
        let bundle = select_bundle(&[&a, &b, &c], 2);
        let ids: Vec<&str> = bundle.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn later_empty_artifact_list_ends_the_scan() {
        let a = task("A", &["src/a.rs"]);
        let b = task("B", &[]);
        let c = task("C", &["src/c.rs"]);
        let bundle = select_bundle(&[&a, &b, &c], 3);
        let ids: Vec<&str> = bundle.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["A"]);
    }
}
