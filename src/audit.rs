//! Audit sink boundary.
//!
//! The core does not persist anything. Callers that need an audit trail pass
//! an [`AuditSink`]; each reasoning result is appended as one record.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GateError, GateResult};
use crate::reasoner::ReasoningResult;

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record id.
    pub record_id: Uuid,
    /// When the result was recorded.
    pub timestamp: DateTime<Utc>,
    /// The recorded result.
    pub result: ReasoningResult,
}

impl AuditRecord {
    /// Wraps `result` with a fresh id and the current time.
    #[must_use]
    pub fn new(result: ReasoningResult) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            result,
        }
    }
}

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Implementation-defined; a failing sink never changes a decision.
    fn append(&self, record: AuditRecord) -> GateResult<()>;
}

/// Append-only in-memory sink.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out all records in append order.
    ///
    /// # Errors
    ///
    /// `GateError::Audit` if the log lock is poisoned.
    pub fn records(&self) -> GateResult<Vec<AuditRecord>> {
        let guard = self
            .records
            .read()
            .map_err(|_| GateError::audit("audit log lock poisoned"))?;
        Ok(guard.clone())
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes the log as JSON lines.
    ///
    /// # Errors
    ///
    /// `GateError::Audit` on a poisoned lock or encoding failure.
    pub fn to_json_lines(&self) -> GateResult<String> {
        let mut out = String::new();
        for record in self.records()? {
            let line = serde_json::to_string(&record).map_err(|e| GateError::audit(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, record: AuditRecord) -> GateResult<()> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| GateError::audit("audit log lock poisoned"))?;
        guard.push(record);
        Ok(())
    }
}
