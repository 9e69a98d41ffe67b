//! Side-effecting layer: filesystem storage, subprocesses, environment.

pub mod config;
pub mod ledger;
pub mod log;
pub mod paths;
pub mod receipts;
pub mod run_id;
pub mod sandbox;
