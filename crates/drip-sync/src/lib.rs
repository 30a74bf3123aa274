//! Orchestration: the reconciliation engine, the tried-coffee ledger, mirror
//! rebuild, and destructive maintenance, wired together from configuration.

pub mod config;
pub mod engine;
pub mod maintenance;
pub mod sync;
pub mod tried;

pub const CRATE_NAME: &str = "drip-sync";

pub use config::MonitorConfig;
pub use engine::{simulate, simulate_items, Monitor, RunOptions, RunSummary};
pub use sync::{rebuild_mirror, SyncReport};
pub use tried::{ItemRef, TriedLedger};
