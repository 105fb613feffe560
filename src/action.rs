//! Decisions a rule (or the advisor) can prescribe.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// The closed set of actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Let the agent go ahead.
    Proceed,
    /// Refuse the action.
    Reject,
    /// Postpone until dependencies are met.
    Defer,
    /// Proceed, but surface a warning.
    Warn,
    /// Proceed, with an improvement suggestion attached.
    Suggest,
    /// Abort the workflow immediately.
    FailFast,
    /// Break the task into smaller pieces first.
    Split,
    /// Block until the named capability is provided (documentation, review, ...).
    Require {
        /// Capability the agent must supply.
        capability: String,
    },
}

impl Action {
    /// Creates a `Require` action.
    pub fn require(capability: impl Into<String>) -> Self {
        Self::Require {
            capability: capability.into(),
        }
    }

    /// Returns true if the action stops the agent from proceeding as planned.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::Reject | Self::Defer | Self::FailFast | Self::Split | Self::Require { .. }
        )
    }

    /// Returns true for the non-blocking annotations (`WARN`, `SUGGEST`).
    #[must_use]
    pub const fn is_advisory_note(&self) -> bool {
        matches!(self, Self::Warn | Self::Suggest)
    }

    /// Parses the wire form, attributing failures to `rule_id`.
    ///
    /// # Errors
    ///
    /// - `UnknownActionType` if `spec.action_type` names no known action.
    /// - `MalformedRule` if `require` lacks a non-empty `capability` param.
    pub fn from_spec(rule_id: &str, spec: &ActionSpec) -> Result<Self, PolicyError> {
        let raw = spec.action_type.trim();
        let normalized = raw.to_ascii_lowercase().replace('-', "_");

        let action = match normalized.as_str() {
            "proceed" => Self::Proceed,
            "reject" => Self::Reject,
            "defer" => Self::Defer,
            "warn" => Self::Warn,
            "suggest" => Self::Suggest,
            "fail_fast" => Self::FailFast,
            "split" => Self::Split,
            "require" => {
                let capability = spec
                    .params
                    .get("capability")
                    .map(|c| c.trim())
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        PolicyError::malformed(
                            rule_id,
                            "action.params.capability",
                            "is required for REQUIRE actions",
                        )
                    })?;
                Self::require(capability)
            }
            // Legacy literals such as `require_documentation`.
            other => match other.strip_prefix("require_") {
                Some(capability) if !capability.is_empty() => Self::require(capability),
                _ => {
                    return Err(PolicyError::UnknownActionType {
                        rule_id: rule_id.to_string(),
                        action_type: raw.to_string(),
                    })
                }
            },
        };
        Ok(action)
    }

    /// Converts back into the wire form.
    #[must_use]
    pub fn to_spec(&self) -> ActionSpec {
        let (action_type, params) = match self {
            Self::Proceed => ("proceed", BTreeMap::new()),
            Self::Reject => ("reject", BTreeMap::new()),
            Self::Defer => ("defer", BTreeMap::new()),
            Self::Warn => ("warn", BTreeMap::new()),
            Self::Suggest => ("suggest", BTreeMap::new()),
            Self::FailFast => ("fail_fast", BTreeMap::new()),
            Self::Split => ("split", BTreeMap::new()),
            Self::Require { capability } => (
                "require",
                BTreeMap::from([("capability".to_string(), capability.clone())]),
            ),
        };
        ActionSpec {
            action_type: action_type.to_string(),
            params,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proceed => write!(f, "PROCEED"),
            Self::Reject => write!(f, "REJECT"),
            Self::Defer => write!(f, "DEFER"),
            Self::Warn => write!(f, "WARN"),
            Self::Suggest => write!(f, "SUGGEST"),
            Self::FailFast => write!(f, "FAIL_FAST"),
            Self::Split => write!(f, "SPLIT"),
            Self::Require { capability } => write!(f, "REQUIRE({capability})"),
        }
    }
}

/// Wire form of an action: `{"type": "require", "params": {"capability": "review"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Action name.
    #[serde(rename = "type")]
    pub action_type: String,

    /// Optional parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl ActionSpec {
    /// Creates a spec without parameters.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}
