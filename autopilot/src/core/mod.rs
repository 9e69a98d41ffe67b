//! Pure, deterministic autopilot logic.
//!
//! No I/O lives here: folding, verification, bundling, and policy decisions
//! are all functions of their inputs so they can be re-run (and re-trusted)
//! anywhere.

pub mod bundle;
pub mod journeys;
pub mod path;
pub mod policy;
pub mod types;
pub mod verify;
pub mod views;
