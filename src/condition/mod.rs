//! Rule conditions.
//!
//! A condition is a named predicate over a [`Context`](crate::Context).
//! Predicates form a closed set: no condition can execute arbitrary code.

mod evaluator;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::value::Value;

pub use evaluator::{ConditionEvaluator, ConditionOutcome, MissingContext, MissingKind};

pub(crate) use evaluator::cached_regex;

/// Predicates a condition can check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Fact equals the value (numbers compare numerically).
    Equals {
        /// Fact key.
        key: String,
        /// Expected value.
        value: Value,
    },

    /// Fact is present and differs from the value.
    NotEquals {
        /// Fact key.
        key: String,
        /// Rejected value.
        value: Value,
    },

    /// Boolean fact is true.
    IsTrue {
        /// Fact key.
        key: String,
    },

    /// Boolean fact is false.
    IsFalse {
        /// Fact key.
        key: String,
    },

    /// Numeric fact is strictly greater than the bound.
    GreaterThan {
        /// Fact key.
        key: String,
        /// Bound.
        bound: f64,
    },

    /// Numeric fact is greater than or equal to the bound.
    GreaterOrEqual {
        /// Fact key.
        key: String,
        /// Bound.
        bound: f64,
    },

    /// Numeric fact is strictly less than the bound.
    LessThan {
        /// Fact key.
        key: String,
        /// Bound.
        bound: f64,
    },

    /// Numeric fact is less than or equal to the bound.
    LessOrEqual {
        /// Fact key.
        key: String,
        /// Bound.
        bound: f64,
    },

    /// Fact equals one of the listed values.
    OneOf {
        /// Fact key.
        key: String,
        /// Allowed values.
        values: Vec<Value>,
    },

    /// String fact matches the regex.
    Matches {
        /// Fact key.
        key: String,
        /// Regex pattern.
        pattern: String,
    },

    /// Fact is present (any type).
    Exists {
        /// Fact key.
        key: String,
    },

    /// Fact is absent.
    Missing {
        /// Fact key.
        key: String,
    },
}

impl Predicate {
    /// Creates an `equals` predicate.
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a `not_equals` predicate.
    pub fn not_equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEquals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates an `is_true` predicate.
    pub fn is_true(key: impl Into<String>) -> Self {
        Self::IsTrue { key: key.into() }
    }

    /// Creates an `is_false` predicate.
    pub fn is_false(key: impl Into<String>) -> Self {
        Self::IsFalse { key: key.into() }
    }

    /// Creates a `greater_than` predicate.
    pub fn greater_than(key: impl Into<String>, bound: f64) -> Self {
        Self::GreaterThan {
            key: key.into(),
            bound,
        }
    }

    /// Creates a `less_than` predicate.
    pub fn less_than(key: impl Into<String>, bound: f64) -> Self {
        Self::LessThan {
            key: key.into(),
            bound,
        }
    }

    /// Creates a `one_of` predicate.
    pub fn one_of<V: Into<Value>>(key: impl Into<String>, values: Vec<V>) -> Self {
        Self::OneOf {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a `matches` predicate.
    pub fn matches(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Matches {
            key: key.into(),
            pattern: pattern.into(),
        }
    }

    /// Creates an `exists` predicate.
    pub fn exists(key: impl Into<String>) -> Self {
        Self::Exists { key: key.into() }
    }

    /// Creates a `missing` predicate.
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    /// The context key this predicate reads.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. }
            | Self::NotEquals { key, .. }
            | Self::IsTrue { key }
            | Self::IsFalse { key }
            | Self::GreaterThan { key, .. }
            | Self::GreaterOrEqual { key, .. }
            | Self::LessThan { key, .. }
            | Self::LessOrEqual { key, .. }
            | Self::OneOf { key, .. }
            | Self::Matches { key, .. }
            | Self::Exists { key }
            | Self::Missing { key } => key,
        }
    }

    /// Checks that the predicate can be evaluated at all.
    ///
    /// Regexes are compiled here so evaluation never meets a bad pattern.
    pub(crate) fn validate(&self, rule_id: &str, field: &str) -> Result<(), PolicyError> {
        if self.key().trim().is_empty() {
            return Err(PolicyError::malformed(rule_id, field, "has an empty context key"));
        }

        match self {
            Self::GreaterThan { bound, .. }
            | Self::GreaterOrEqual { bound, .. }
            | Self::LessThan { bound, .. }
            | Self::LessOrEqual { bound, .. } => {
                if !bound.is_finite() {
                    return Err(PolicyError::malformed(
                        rule_id,
                        field,
                        format!("has a non-finite bound {bound}"),
                    ));
                }
            }
            Self::OneOf { values, .. } => {
                if values.is_empty() {
                    return Err(PolicyError::malformed(rule_id, field, "has an empty value set"));
                }
            }
            Self::Matches { pattern, .. } => {
                cached_regex(pattern).map_err(|reason| {
                    PolicyError::malformed(rule_id, field, format!("has an invalid regex: {reason}"))
                })?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { key, value } => write!(f, "{key} == {value}"),
            Self::NotEquals { key, value } => write!(f, "{key} != {value}"),
            Self::IsTrue { key } => write!(f, "{key} == true"),
            Self::IsFalse { key } => write!(f, "{key} == false"),
            Self::GreaterThan { key, bound } => write!(f, "{key} > {bound}"),
            Self::GreaterOrEqual { key, bound } => write!(f, "{key} >= {bound}"),
            Self::LessThan { key, bound } => write!(f, "{key} < {bound}"),
            Self::LessOrEqual { key, bound } => write!(f, "{key} <= {bound}"),
            Self::OneOf { key, values } => write!(f, "{key} in {}", Value::List(values.clone())),
            Self::Matches { key, pattern } => write!(f, "{key} =~ /{pattern}/"),
            Self::Exists { key } => write!(f, "exists({key})"),
            Self::Missing { key } => write!(f, "missing({key})"),
        }
    }
}

/// A predicate plus a human-readable description used in proofs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Description shown in proof lines.
    pub description: String,
    /// The predicate.
    pub predicate: Predicate,
}

impl Condition {
    /// Creates a condition.
    pub fn new(description: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            description: description.into(),
            predicate,
        }
    }

    /// Creates a condition whose description is the predicate's own rendering.
    #[must_use]
    pub fn from_predicate(predicate: Predicate) -> Self {
        Self {
            description: predicate.to_string(),
            predicate,
        }
    }
}

/// Wire form of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Description shown in proof lines; defaults to the predicate rendering.
    #[serde(default)]
    pub description: String,
    /// The serialized predicate.
    pub predicate_ref: Predicate,
}

impl ConditionSpec {
    /// Validates the spec, producing a [`Condition`].
    pub(crate) fn validate(&self, rule_id: &str, index: usize) -> Result<Condition, PolicyError> {
        let field = format!("conditions[{index}]");
        self.predicate_ref.validate(rule_id, &field)?;
        let description = self.description.trim();
        Ok(if description.is_empty() {
            Condition::from_predicate(self.predicate_ref.clone())
        } else {
            Condition::new(description, self.predicate_ref.clone())
        })
    }
}

impl From<Condition> for ConditionSpec {
    fn from(condition: Condition) -> Self {
        Self {
            description: condition.description,
            predicate_ref: condition.predicate,
        }
    }
}
