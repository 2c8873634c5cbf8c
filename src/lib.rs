//! Adaptive parallel MySQL backup library
//!
//! Exports the full content of a MySQL database into a single replayable
//! `.sql` script. Every table is analyzed right before its export and the
//! cheapest safe extraction strategy is chosen per table:
//!
//! - small tables get a plain full scan,
//! - large tables with an auto-increment, integer primary-key, or temporal
//!   column get keyset pagination over that column,
//! - tables without a usable ordering column fall back to the hidden
//!   `_rowid` pseudo-column or, when the server does not expose it, to a
//!   streaming scan with multi-row INSERT batching.
//!
//! Per-table exports run concurrently under a bounded worker pool while the
//! output file is assembled strictly in catalog-listing order, so the result
//! is deterministic regardless of task completion interleaving.

pub mod analyzer;
pub mod config;
pub mod exporter;
pub mod orchestrator;
pub mod session;
pub mod strategy;
pub mod value;

pub use config::BackupConfig;
pub use session::{run_backup, BackupSummary};
