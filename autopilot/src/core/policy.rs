//! Role-based write policy.
//!
//! Evaluated per attempted write, before and independent of the state
//! machine, so it acts as a capability boundary: no role other than the
//! ledger keeper may touch the ledger directory or the materialized views,
//! and the ledger keeper may touch nothing else. Unknown roles, writes with
//! no extractable targets, and unsupported payload shapes are all denied
//! (fail-closed).

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::path::normalize_under_root;
use crate::core::types::LEDGER_KEEPER_ROLE;

/// Whether a role may use write tools at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAccess {
    Allow,
    Deny,
}

/// Which paths a writing role may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathScope {
    Any,
    LedgerOnly,
}

/// A tool invocation classified up front, one variant per tool kind.
///
/// Each write variant carries its own explicit target; `RawWrite` is the
/// escape hatch for unmodeled payloads, whose extraction may fail.
#[derive(Debug, Clone)]
pub enum ToolRequest {
    WriteFile { path: PathBuf },
    EditFile { path: PathBuf },
    AppendFile { path: PathBuf },
    RawWrite { tool: String, payload: Value },
    ReadOnly { tool: String },
}

/// Policy verdict for one attempted tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Fixed role table plus the ledger/view paths it protects.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    root: PathBuf,
    ledger_dir: PathBuf,
    prd_path: PathBuf,
    progress_path: PathBuf,
}

impl RolePolicy {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ledger_dir: root.join("_ledger"),
            prd_path: root.join("prd.json"),
            progress_path: root.join("progress.txt"),
        }
    }

    /// Evaluate one attempted tool call for `role`.
    pub fn evaluate(&self, role: &str, request: &ToolRequest) -> Decision {
        let targets = match request {
            ToolRequest::ReadOnly { .. } => return Decision::Allow,
            ToolRequest::WriteFile { path }
            | ToolRequest::EditFile { path }
            | ToolRequest::AppendFile { path } => vec![path.clone()],
            ToolRequest::RawWrite { tool, payload } => {
                match extract_raw_targets(tool, payload) {
                    Ok(targets) => targets,
                    Err(detail) => {
                        return Decision::Deny(format!("target extraction failed: {detail}"));
                    }
                }
            }
        };

        let Some((access, scope)) = role_grant(role) else {
            return Decision::Deny(format!("unknown role '{role}'"));
        };
        if access == WriteAccess::Deny {
            return Decision::Deny(format!("role '{role}' may not use write tools"));
        }
        if targets.is_empty() {
            return Decision::Deny("write with no extractable targets".to_string());
        }

        for target in &targets {
            let is_ledger = self.is_ledger_target(target);
            if is_ledger && role != LEDGER_KEEPER_ROLE {
                return Decision::Deny(format!(
                    "role '{role}' may not write ledger/view path {}",
                    target.display()
                ));
            }
            if !is_ledger && scope == PathScope::LedgerOnly {
                return Decision::Deny(format!(
                    "role '{role}' may only write ledger/view paths, not {}",
                    target.display()
                ));
            }
        }

        Decision::Allow
    }

    /// True when `target` is the ledger directory subtree, the materialized
    /// PRD view, or the progress listing.
    pub fn is_ledger_target(&self, target: &Path) -> bool {
        let Some(normalized) = normalize_under_root(&self.root, target) else {
            return false;
        };
        normalized.starts_with(&self.ledger_dir)
            || normalized == self.prd_path
            || normalized == self.progress_path
    }
}

fn role_grant(role: &str) -> Option<(WriteAccess, PathScope)> {
    match role {
        "ledger-keeper" => Some((WriteAccess::Allow, PathScope::LedgerOnly)),
        "executor" | "scout" => Some((WriteAccess::Allow, PathScope::Any)),
        "verifier" | "oracle" => Some((WriteAccess::Deny, PathScope::Any)),
        _ => None,
    }
}

fn extract_raw_targets(tool: &str, payload: &Value) -> Result<Vec<PathBuf>, String> {
    match tool {
        "write_file" | "edit_file" | "append_file" => {
            let path = payload
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("tool '{tool}' payload missing string 'path'"))?;
            Ok(vec![PathBuf::from(path)])
        }
        other => Err(format!("unsupported write tool '{other}'")),
    }
}
