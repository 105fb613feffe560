//! Rule types.
//!
//! Rules come in two structurally different kinds. A [`SystemRule`] can only
//! be created by the registry during bootstrap and exposes no mutators; a
//! [`CustomRule`] is confined to the unreserved priority band and is the only
//! kind that can be toggled, re-prioritized or removed.

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionSpec};
use crate::condition::{Condition, ConditionSpec, Predicate};
use crate::error::{GateResult, PolicyError};

/// First priority of the reserved band. Custom rules live in `[0, RESERVED_MIN)`.
pub const RESERVED_MIN: u32 = 80;

/// Highest priority any rule may carry.
pub const MAX_PRIORITY: u32 = 100;

const MAX_RULE_ID_LEN: usize = 128;

/// Rule identifier.
pub type RuleId = String;

/// Rule category. The category is a precedence lane: it decides which rules
/// can win before priority is consulted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// Never-bypassable safety rules.
    Safety,
    /// Hard policy constraints.
    Constraint,
    /// Ordering/dependency requirements; a triggered dependency defers.
    Dependency,
    /// Consequences of an action.
    Implication,
    /// Recommendations.
    BestPractice,
}

impl RuleType {
    /// All rule types in lane order.
    pub const ALL: [Self; 5] = [
        Self::Safety,
        Self::Constraint,
        Self::Dependency,
        Self::Implication,
        Self::BestPractice,
    ];

    /// Returns true for the lanes whose decisions override the advisor.
    #[must_use]
    pub const fn is_binding(self) -> bool {
        matches!(self, Self::Safety | Self::Constraint)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safety => write!(f, "SAFETY"),
            Self::Constraint => write!(f, "CONSTRAINT"),
            Self::Dependency => write!(f, "DEPENDENCY"),
            Self::Implication => write!(f, "IMPLICATION"),
            Self::BestPractice => write!(f, "BEST_PRACTICE"),
        }
    }
}

/// A validated rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    rule_id: RuleId,
    rule_type: RuleType,
    conditions: Vec<Condition>,
    action: Action,
    priority: u32,
    immutable: bool,
    enabled: bool,
    description: String,
}

impl Rule {
    /// Unique id.
    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Category / precedence lane.
    #[must_use]
    pub const fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    /// AND-combined conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Prescribed action when triggered.
    #[must_use]
    pub const fn action(&self) -> &Action {
        &self.action
    }

    /// Tie-breaking priority within the lane.
    #[must_use]
    pub const fn priority(&self) -> u32 {
        self.priority
    }

    /// True for system rules.
    #[must_use]
    pub const fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Disabled rules are skipped by the engine.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluation order: priority descending, then rule id ascending.
    #[must_use]
    pub fn evaluation_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.rule_id.cmp(&other.rule_id))
    }

    /// Wire form of this rule.
    #[must_use]
    pub fn to_spec(&self) -> RuleSpec {
        RuleSpec {
            rule_id: self.rule_id.clone(),
            rule_type: self.rule_type,
            priority: i64::from(self.priority),
            conditions: self.conditions.iter().cloned().map(ConditionSpec::from).collect(),
            action: self.action.to_spec(),
            description: self.description.clone(),
        }
    }
}

/// Immutable rule loaded at bootstrap. Has no mutators.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemRule(Rule);

impl SystemRule {
    pub(crate) fn new(mut rule: Rule) -> Self {
        rule.immutable = true;
        rule.enabled = true;
        Self(rule)
    }

    /// Read-only view.
    #[must_use]
    pub const fn rule(&self) -> &Rule {
        &self.0
    }
}

/// Runtime rule confined to the unreserved band.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomRule(Rule);

impl CustomRule {
    pub(crate) fn new(mut rule: Rule) -> Self {
        rule.immutable = false;
        rule.enabled = true;
        Self(rule)
    }

    /// Read-only view.
    #[must_use]
    pub const fn rule(&self) -> &Rule {
        &self.0
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.0.enabled = enabled;
    }

    /// Caller must have checked the band.
    pub(crate) fn set_priority(&mut self, priority: u32) {
        debug_assert!(priority < RESERVED_MIN);
        self.0.priority = priority;
    }
}

/// A rule as held by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisteredRule {
    /// Bootstrap-only, immutable.
    System(SystemRule),
    /// Runtime-managed.
    Custom(CustomRule),
}

impl RegisteredRule {
    /// Read-only view regardless of kind.
    #[must_use]
    pub const fn rule(&self) -> &Rule {
        match self {
            Self::System(r) => r.rule(),
            Self::Custom(r) => r.rule(),
        }
    }
}

/// Wire/config form of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Unique id.
    pub rule_id: String,
    /// Category.
    pub rule_type: RuleType,
    /// Priority; validated against the band of the registering call.
    pub priority: i64,
    /// AND-combined conditions.
    pub conditions: Vec<ConditionSpec>,
    /// Action.
    pub action: ActionSpec,
    /// Description.
    #[serde(default)]
    pub description: String,
}

impl RuleSpec {
    /// Starts a spec with no conditions.
    pub fn new(
        rule_id: impl Into<String>,
        rule_type: RuleType,
        priority: i64,
        action: &Action,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            rule_type,
            priority,
            conditions: Vec::new(),
            action: action.to_spec(),
            description: String::new(),
        }
    }

    /// Adds a condition.
    #[must_use]
    pub fn condition(mut self, description: impl Into<String>, predicate: Predicate) -> Self {
        self.conditions.push(ConditionSpec {
            description: description.into(),
            predicate_ref: predicate,
        });
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Overrides the action with a raw wire form (for untrusted input).
    #[must_use]
    pub fn raw_action(mut self, action: ActionSpec) -> Self {
        self.action = action;
        self
    }

    /// Validates the spec against the priority range `[0, max_exclusive)`.
    ///
    /// # Errors
    ///
    /// `MalformedRule`, `PriorityOutOfRange` or `UnknownActionType`,
    /// checked in that order of fields: id, priority, conditions, action.
    pub(crate) fn validate(&self, max_exclusive: u32) -> Result<Rule, PolicyError> {
        let rule_id = self.rule_id.trim();
        validate_rule_id(rule_id)?;

        let priority = u32::try_from(self.priority)
            .ok()
            .filter(|p| *p < max_exclusive)
            .ok_or_else(|| PolicyError::PriorityOutOfRange {
                rule_id: rule_id.to_string(),
                priority: self.priority,
                min: 0,
                max: i64::from(max_exclusive),
            })?;

        if self.conditions.is_empty() {
            return Err(PolicyError::malformed(rule_id, "conditions", "must not be empty"));
        }
        let conditions = self
            .conditions
            .iter()
            .enumerate()
            .map(|(idx, c)| c.validate(rule_id, idx))
            .collect::<Result<Vec<_>, _>>()?;

        let action = Action::from_spec(rule_id, &self.action)?;

        Ok(Rule {
            rule_id: rule_id.to_string(),
            rule_type: self.rule_type,
            conditions,
            action,
            priority,
            immutable: false,
            enabled: true,
            description: self.description.trim().to_string(),
        })
    }
}

fn validate_rule_id(rule_id: &str) -> Result<(), PolicyError> {
    if rule_id.is_empty() {
        return Err(PolicyError::malformed(rule_id, "rule_id", "must not be empty"));
    }
    if rule_id.len() > MAX_RULE_ID_LEN {
        return Err(PolicyError::malformed(
            rule_id,
            "rule_id",
            format!("exceeds {MAX_RULE_ID_LEN} characters"),
        ));
    }
    if let Some(bad) = rule_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
    {
        return Err(PolicyError::malformed(
            rule_id,
            "rule_id",
            format!("contains invalid character {bad:?}"),
        ));
    }
    Ok(())
}

/// A versioned table of rule specs, as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    /// Table version.
    pub version: u32,
    /// Rules in the table.
    pub rules: Vec<RuleSpec>,
}

impl RuleTable {
    /// Parses a table from JSON.
    ///
    /// # Errors
    ///
    /// Returns `GateError::RuleTable` on malformed JSON.
    pub fn from_json(json: &str) -> GateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `GateError::RuleTable` on I/O or parse failure.
    pub fn from_path(path: impl AsRef<Path>) -> GateResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}
