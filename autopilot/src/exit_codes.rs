//! Stable exit codes for autopilot CLI commands.

/// Command succeeded; for `run`, work advanced or the run finalized.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/ledger or other errors.
pub const INVALID: i32 = 1;
/// `autopilot run` stopped on a structured halt; the code was printed.
pub const HALTED: i32 = 2;
