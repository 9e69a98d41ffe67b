//! Lexical path containment helpers.

use std::path::{Component, Path, PathBuf};

/// Normalize `candidate` under `root` without touching the filesystem.
///
/// Relative candidates are joined to `root` first. `.` components drop out
/// and `..` pops; a `..` that would climb past `root` is an escape and yields
/// `None`, as does an absolute candidate outside `root`.
pub fn normalize_under_root(root: &Path, candidate: &Path) -> Option<PathBuf> {
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.starts_with(root) {
        Some(normalized)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_stays_inside_root() {
        let root = Path::new("/work");
        let resolved = normalize_under_root(root, Path::new("scripts/run.js")).expect("inside");
        assert_eq!(resolved, PathBuf::from("/work/scripts/run.js"));
    }

    #[test]
    fn dot_dot_traversal_escaping_root_is_rejected() {
        let root = Path::new("/work");
        assert!(normalize_under_root(root, Path::new("../outside.js")).is_none());
        assert!(normalize_under_root(root, Path::new("a/../../outside.js")).is_none());
    }

    #[test]
    fn internal_dot_dot_is_normalized() {
        let root = Path::new("/work");
        let resolved = normalize_under_root(root, Path::new("a/../b/run.js")).expect("inside");
        assert_eq!(resolved, PathBuf::from("/work/b/run.js"));
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let root = Path::new("/work");
        assert!(normalize_under_root(root, Path::new("/etc/passwd")).is_none());
        assert!(normalize_under_root(root, Path::new("/work/ok.js")).is_some());
    }
}
