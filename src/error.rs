//! Error types for agentgate.
//!
//! All errors are strongly typed using thiserror. Registration and mutation
//! errors reject the whole operation; nothing is clamped or corrected on the
//! caller's behalf. Advisor errors never escape `reason()`: the reasoner
//! recovers from them locally and records the fallback in the proof.

use thiserror::Error;

/// Errors returned by rule registration and registry mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Rule id '{rule_id}' is already registered")]
    DuplicateRuleId {
        rule_id: String,
    },

    #[error("Rule '{rule_id}' has priority {priority}, allowed range is [{min}, {max})")]
    PriorityOutOfRange {
        rule_id: String,
        priority: i64,
        min: i64,
        max: i64,
    },

    #[error("Rule '{rule_id}' is immutable and cannot be {operation}")]
    ImmutableRuleError {
        rule_id: String,
        operation: String,
    },

    #[error("Rule '{rule_id}' is malformed: field '{field}' {reason}")]
    MalformedRule {
        rule_id: String,
        field: String,
        reason: String,
    },

    #[error("Registry is sealed; system rule '{rule_id}' can no longer be registered")]
    RegistryAlreadySealed {
        rule_id: String,
    },

    #[error("Rule '{rule_id}' uses unknown action type '{action_type}'")]
    UnknownActionType {
        rule_id: String,
        action_type: String,
    },

    #[error("Rule not found: {rule_id}")]
    RuleNotFound {
        rule_id: String,
    },

    #[error("Internal registry error: {message}")]
    Internal {
        message: String,
    },
}

impl PolicyError {
    /// Creates a malformed-rule error.
    pub fn malformed(
        rule_id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedRule {
            rule_id: rule_id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an immutable-rule error for the named operation.
    pub fn immutable(rule_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::ImmutableRuleError {
            rule_id: rule_id.into(),
            operation: operation.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short stable name of the error kind, suitable for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateRuleId { .. } => "DuplicateRuleId",
            Self::PriorityOutOfRange { .. } => "PriorityOutOfRange",
            Self::ImmutableRuleError { .. } => "ImmutableRuleError",
            Self::MalformedRule { .. } => "MalformedRule",
            Self::RegistryAlreadySealed { .. } => "RegistryAlreadySealed",
            Self::UnknownActionType { .. } => "UnknownActionType",
            Self::RuleNotFound { .. } => "RuleNotFound",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Returns the offending rule id, if the error is tied to one.
    #[must_use]
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            Self::DuplicateRuleId { rule_id }
            | Self::PriorityOutOfRange { rule_id, .. }
            | Self::ImmutableRuleError { rule_id, .. }
            | Self::MalformedRule { rule_id, .. }
            | Self::RegistryAlreadySealed { rule_id }
            | Self::UnknownActionType { rule_id, .. }
            | Self::RuleNotFound { rule_id } => Some(rule_id),
            Self::Internal { .. } => None,
        }
    }

    /// Returns true if the error was raised by an attempt to touch system rules
    /// or the reserved priority band.
    #[must_use]
    pub const fn is_tamper_attempt(&self) -> bool {
        matches!(
            self,
            Self::ImmutableRuleError { .. }
                | Self::PriorityOutOfRange { .. }
                | Self::RegistryAlreadySealed { .. }
        )
    }
}

/// Failures of the neural advisor collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvisorError {
    #[error("advisor timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("advisor transport failure: {message}")]
    Transport {
        message: String,
    },

    #[error("advisor returned an invalid advisory: {reason}")]
    InvalidAdvisory {
        reason: String,
    },

    #[error("advisor queue full (capacity {capacity})")]
    Saturated {
        capacity: usize,
    },

    #[error("advisor worker disconnected before replying")]
    Disconnected,

    #[error("advisor unavailable")]
    Unavailable,
}

impl AdvisorError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns true if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Top-level error type for agentgate.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Rule table error: {message}")]
    RuleTable {
        message: String,
    },

    #[error("Audit sink error: {message}")]
    Audit {
        message: String,
    },
}

impl GateError {
    /// Creates a rule table error.
    pub fn rule_table(message: impl Into<String>) -> Self {
        Self::RuleTable {
            message: message.into(),
        }
    }

    /// Creates an audit sink error.
    pub fn audit(message: impl Into<String>) -> Self {
        Self::Audit {
            message: message.into(),
        }
    }

    /// Returns true if this is a policy error.
    #[must_use]
    pub const fn is_policy(&self) -> bool {
        matches!(self, Self::Policy(_))
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        Self::rule_table(err.to_string())
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        Self::rule_table(err.to_string())
    }
}

/// Result type alias for agentgate operations.
pub type GateResult<T> = Result<T, GateError>;
