//! Persistence layer
//!
//! This module contains the on-disk storage components:
//! - Storage engine (schema files, record files, checkpoint/export)
//! - Write-ahead log entries and replay diagnostics

pub mod engine;
pub mod wal;

pub use engine::{DiskStats, StorageEngine, TableDiskStats};
pub use wal::{MalformedLine, WalEntry, WalOp, WalReplay};
