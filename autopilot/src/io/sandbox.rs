//! Constrained subprocess execution for task strategies.
//!
//! The sandbox vets a command's shape before spawning anything: one
//! allow-listed binary identity, no eval/print flags at any argument
//! position, and script arguments that must resolve (lexically) inside the
//! workspace root. Spawned processes get bounded output capture and a hard
//! timeout. Failures here surface to the state machine as strategy failures,
//! never as crashes.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::path::normalize_under_root;
use crate::core::types::{ExecutionRecord, truncate_chars};
use crate::core::verify::{EXECUTED_PREFIX, SUMMARY_LIMIT_CHARS, sha256_hex};

/// Default wall-clock budget for one strategy command.
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default byte budget for captured stdout/stderr, each.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Arguments that would let a command evaluate arbitrary inline code.
const FORBIDDEN_FLAGS: [&str; 4] = ["-e", "--eval", "-p", "--print"];

/// Shape constraints on the commands a strategy may run.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// The single allow-listed executable identity (compared by file name).
    pub allowed_binary: String,
    /// Extensions that mark an argument as a script path subject to
    /// workspace containment.
    pub script_extensions: Vec<String>,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allowed_binary: "node".to_string(),
            script_extensions: vec!["js".to_string(), "mjs".to_string(), "cjs".to_string()],
        }
    }
}

/// One successful strategy command: the digest-bound record plus the
/// human-readable evidence line.
#[derive(Debug, Clone)]
pub struct ExecutionEvidence {
    pub record: ExecutionRecord,
    pub evidence: String,
}

/// Constrained executor for a task's strategy commands.
#[derive(Debug, Clone)]
pub struct Sandbox {
    pub workspace_root: PathBuf,
    pub policy: SandboxPolicy,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Sandbox {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            policy: SandboxPolicy::default(),
            timeout: DEFAULT_STRATEGY_TIMEOUT,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    /// Run one vetted command line to completion.
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    pub fn run(&self, command_line: &str) -> Result<ExecutionEvidence> {
        let argv: Vec<&str> = command_line.split_whitespace().collect();
        self.vet(&argv)?;

        let mut cmd = Command::new(argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&self.workspace_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = command_line, "spawning strategy command");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn '{command_line}'"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;
        let limit = self.output_limit_bytes;
        let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
        let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

        let status = match child
            .wait_timeout(self.timeout)
            .context("wait for strategy command")?
        {
            Some(status) => status,
            None => {
                warn!(command = command_line, "strategy command timed out, killing");
                child.kill().context("kill strategy command")?;
                child.wait().context("wait strategy command after kill")?;
                bail!("Command timed out");
            }
        };

        let stdout = join_output(stdout_handle).context("join stdout")?;
        let stderr = join_output(stderr_handle).context("join stderr")?;
        let exit_code = i64::from(status.code().unwrap_or(-1));

        if !status.success() {
            let detail = truncate_chars(combine_streams(&stderr, &stdout).trim(), SUMMARY_LIMIT_CHARS);
            bail!("command exited with {exit_code}: {detail}");
        }

        let summary = truncate_chars(combine_streams(&stdout, &stderr).trim(), SUMMARY_LIMIT_CHARS);
        let record = ExecutionRecord {
            command: command_line.to_string(),
            exit_code,
            output_summary: summary.clone(),
            output_digest: sha256_hex(&summary),
        };
        let evidence = format!("{EXECUTED_PREFIX}{command_line}: {summary}");
        debug!(command = command_line, "strategy command succeeded");
        Ok(ExecutionEvidence { record, evidence })
    }

    /// Reject disallowed command shapes before anything is spawned.
    fn vet(&self, argv: &[&str]) -> Result<()> {
        let Some(binary) = argv.first() else {
            bail!("empty command");
        };
        let identity = Path::new(binary)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| (*binary).to_string());
        if identity != self.policy.allowed_binary {
            bail!(
                "binary '{identity}' is not allow-listed (only '{}')",
                self.policy.allowed_binary
            );
        }

        for arg in &argv[1..] {
            if FORBIDDEN_FLAGS.contains(arg) {
                bail!("flag '{arg}' is not allowed");
            }
            if self.is_script_arg(arg)
                && normalize_under_root(&self.workspace_root, Path::new(arg)).is_none()
            {
                bail!("script path '{arg}' escapes the workspace");
            }
        }
        Ok(())
    }

    fn is_script_arg(&self, arg: &str) -> bool {
        let lower = arg.to_ascii_lowercase();
        self.policy
            .script_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }
}

fn combine_streams(preferred: &[u8], fallback: &[u8]) -> String {
    if !preferred.is_empty() {
        String::from_utf8_lossy(preferred).into_owned()
    } else {
        String::from_utf8_lossy(fallback).into_owned()
    }
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream up to `limit` bytes; further bytes are drained and dropped.
///
/// When the budget cuts into a multi-byte UTF-8 sequence, the partial
/// sequence is dropped too, so truncation lands on whole-character
/// boundaries.
fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            if keep < n {
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }

    if truncated {
        trim_partial_utf8(&mut buf);
    }
    Ok(buf)
}

fn trim_partial_utf8(buf: &mut Vec<u8>) {
    // Drop trailing continuation bytes, then an incomplete lead byte if the
    // sequence it opens was cut short.
    let mut tail = 0usize;
    while tail < buf.len() && tail < 4 {
        let byte = buf[buf.len() - 1 - tail];
        if byte & 0b1100_0000 == 0b1000_0000 {
            tail += 1;
            continue;
        }
        let expected = match byte {
            b if b & 0b1000_0000 == 0 => 1,
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => 1,
        };
        if expected > tail + 1 {
            buf.truncate(buf.len() - 1 - tail);
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_with(binary: &str, root: &Path) -> Sandbox {
        let mut sandbox = Sandbox::new(root);
        sandbox.policy.allowed_binary = binary.to_string();
        sandbox
    }

    #[test]
    fn rejects_forbidden_flags_at_any_position() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_with("node", temp.path());
        for command in [
            "node -e console.log(1)",
            "node --eval x",
            "node script.js -p",
            "node a.js --print",
        ] {
            let err = sandbox.run(command).unwrap_err();
            assert!(err.to_string().contains("not allowed"), "command: {command}");
        }
    }

    #[test]
    fn rejects_disallowed_binary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_with("node", temp.path());
        let err = sandbox.run("python script.py").unwrap_err();
        assert!(err.to_string().contains("not allow-listed"));
    }

    #[test]
    fn rejects_script_paths_escaping_the_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_with("node", temp.path());
        for command in ["node ../evil.js", "node a/../../evil.js"] {
            let err = sandbox.run(command).unwrap_err();
            assert!(
                err.to_string().contains("escapes the workspace"),
                "command: {command}"
            );
        }
    }

    #[test]
    fn rejects_empty_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_with("node", temp.path());
        assert!(sandbox.run("   ").is_err());
    }

    #[test]
    fn captures_output_and_binds_digest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_with("echo", temp.path());
        let evidence = sandbox.run("echo hello world").expect("run");

        assert_eq!(evidence.record.exit_code, 0);
        assert_eq!(evidence.record.output_summary, "hello world");
        assert_eq!(
            evidence.record.output_digest,
            sha256_hex(&evidence.record.output_summary)
        );
        assert_eq!(evidence.evidence, "executed:echo hello world: hello world");
    }

    #[test]
    fn nonzero_exit_is_a_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_with("false", temp.path());
        let err = sandbox.run("false").unwrap_err();
        assert!(err.to_string().contains("command exited with"));
    }

    #[test]
    fn hanging_process_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = sandbox_with("sleep", temp.path());
        sandbox.timeout = Duration::from_millis(100);
        let err = sandbox.run("sleep 5").unwrap_err();
        assert!(err.to_string().contains("Command timed out"));
    }

    #[test]
    fn truncation_lands_on_character_boundaries() {
        // "é" is two bytes; a 3-byte budget must not keep half of the second one.
        let mut buf = "éé".as_bytes().to_vec();
        buf.truncate(3);
        let mut trimmed = buf.clone();
        trim_partial_utf8(&mut trimmed);
        assert_eq!(trimmed, "é".as_bytes());
    }
}
