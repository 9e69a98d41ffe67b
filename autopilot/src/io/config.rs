//! Environment-driven runtime configuration.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::types::LEDGER_KEEPER_ROLE;
use crate::io::sandbox::{DEFAULT_STRATEGY_TIMEOUT, SandboxPolicy};

pub const RUN_ID_ENV: &str = "AUTOPILOT_RUN_ID";
pub const WORKFLOW_MODE_ENV: &str = "AUTOPILOT_WORKFLOW_MODE";
pub const CONTINUOUS_ENV: &str = "AUTOPILOT_CONTINUOUS";
pub const STRATEGY_TIMEOUT_ENV: &str = "AUTOPILOT_STRATEGY_TIMEOUT_MS";
pub const ROLE_ENV: &str = "AUTOPILOT_ROLE";
pub const SANDBOX_BINARY_ENV: &str = "AUTOPILOT_SANDBOX_BINARY";

/// Default cap on artifact-disjoint tasks per bundle.
pub const DEFAULT_BUNDLE_MAX: usize = 2;

/// How much of the pipeline one invocation drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowMode {
    /// Full pipeline with verification gates between execution and commit.
    #[default]
    ReceiptGated,
    /// One task at a time, no bundling, stop after each epic step.
    SingleAgent,
    /// Drain every epic in one invocation.
    BatchValidation,
}

impl WorkflowMode {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "receipt_gated" => Ok(Self::ReceiptGated),
            "single_agent" => Ok(Self::SingleAgent),
            "batch_validation" => Ok(Self::BatchValidation),
            other => bail!("unknown workflow mode '{other}'"),
        }
    }
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct AutopilotConfig {
    pub workflow_mode: WorkflowMode,
    pub continuous: bool,
    pub bundle_max: usize,
    pub strategy_timeout: Duration,
    pub run_id_override: Option<String>,
    pub role: String,
    pub sandbox_policy: SandboxPolicy,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            workflow_mode: WorkflowMode::ReceiptGated,
            continuous: false,
            bundle_max: DEFAULT_BUNDLE_MAX,
            strategy_timeout: DEFAULT_STRATEGY_TIMEOUT,
            run_id_override: None,
            role: LEDGER_KEEPER_ROLE.to_string(),
            sandbox_policy: SandboxPolicy::default(),
        }
    }
}

impl AutopilotConfig {
    /// Build a configuration from process environment variables, applying
    /// mode presets before explicit overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = read_env(WORKFLOW_MODE_ENV) {
            config.workflow_mode = WorkflowMode::parse(&raw)
                .with_context(|| format!("parse {WORKFLOW_MODE_ENV}"))?;
        }
        match config.workflow_mode {
            WorkflowMode::ReceiptGated => {}
            WorkflowMode::SingleAgent => {
                config.continuous = false;
                config.bundle_max = 1;
            }
            WorkflowMode::BatchValidation => {
                config.continuous = true;
                config.bundle_max = DEFAULT_BUNDLE_MAX;
            }
        }

        if let Some(raw) = read_env(CONTINUOUS_ENV) {
            config.continuous = parse_bool(&raw)
                .with_context(|| format!("parse {CONTINUOUS_ENV}"))?;
        }
        if let Some(raw) = read_env(STRATEGY_TIMEOUT_ENV) {
            let millis: u64 = raw
                .parse()
                .with_context(|| format!("parse {STRATEGY_TIMEOUT_ENV} as milliseconds"))?;
            config.strategy_timeout = Duration::from_millis(millis);
        }
        config.run_id_override = read_env(RUN_ID_ENV);
        if let Some(role) = read_env(ROLE_ENV) {
            config.role = role;
        }
        if let Some(binary) = read_env(SANDBOX_BINARY_ENV) {
            config.sandbox_policy.allowed_binary = binary;
        }

        debug!(?config.workflow_mode, config.continuous, config.bundle_max, "configuration resolved");
        Ok(config)
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => bail!("expected a boolean, found '{other}'"),
    }
}
