//! Write-ahead log entry types
//!
//! One JSON line per entry. The WAL is the durable, low-latency path; the
//! per-table record files are the periodically-materialized snapshot.

use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of logged operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalOp {
    CreateTable,
    Insert,
    Update,
    Delete,
    DropTable,
}

/// A single WAL entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// When the operation happened
    pub timestamp: DateTime<Utc>,
    /// Type of operation
    pub operation: WalOp,
    /// Table the operation applied to
    pub table: String,
    /// After image (inserts and updates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    /// Before image (updates and deletes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Record>,
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(operation: WalOp, table: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            table: table.into(),
            record: None,
            old_record: None,
        }
    }

    /// Attach the after image
    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    /// Attach the before image
    pub fn with_old_record(mut self, old_record: Record) -> Self {
        self.old_record = Some(old_record);
        self
    }
}

/// A WAL line that failed to parse during replay
#[derive(Debug, Clone)]
pub struct MalformedLine {
    /// 1-based line number within the segment
    pub line: usize,
    /// Parser diagnostic
    pub reason: String,
}

/// Result of replaying the current WAL segment: the parseable entries in file
/// order, plus diagnostics for every line that was skipped.
#[derive(Debug, Default)]
pub struct WalReplay {
    pub entries: Vec<WalEntry>,
    pub malformed: Vec<MalformedLine>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use indexmap::indexmap;

    #[test]
    fn test_entry_line_shape() {
        let entry = WalEntry::new(WalOp::Insert, "users")
            .with_record(indexmap! {"id".to_string() => Value::Integer(1)});

        let line = serde_json::to_string(&entry).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed["operation"], "INSERT");
        assert_eq!(parsed["table"], "users");
        assert_eq!(parsed["record"]["id"], 1);
        assert!(parsed.get("old_record").is_none());
        assert!(parsed["timestamp"].is_string());
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = WalEntry::new(WalOp::Delete, "users")
            .with_old_record(indexmap! {"id".to_string() => Value::Integer(2)});

        let line = serde_json::to_string(&entry).unwrap();
        let back: WalEntry = serde_json::from_str(&line).unwrap();

        assert_eq!(back.operation, WalOp::Delete);
        assert_eq!(back.table, "users");
        assert!(back.record.is_none());
        assert_eq!(
            back.old_record.unwrap().get("id"),
            Some(&Value::Integer(2))
        );
    }
}
