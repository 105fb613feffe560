//! Total evaluation of conditions against a context.

use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use crate::context::Context;
use crate::value::Value;

use super::{Condition, Predicate};

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();

/// Compiles `pattern`, reusing a bounded process-wide cache.
pub(crate) fn cached_regex(pattern: &str) -> Result<regex::Regex, String> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern).map_err(|e| e.to_string())?;

    // A poisoned cache only costs a recompile next time.
    if let Ok(mut guard) = cache.write() {
        if guard.len() >= REGEX_CACHE_MAX {
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }
    Ok(compiled)
}

/// Why a condition could not be evaluated against the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingKind {
    /// The key is absent.
    Absent,
    /// The key is present with an unusable type.
    TypeMismatch,
}

/// Note recorded when a condition falls back to `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingContext {
    /// Context key involved.
    pub key: String,
    /// What went wrong.
    pub kind: MissingKind,
    /// Expected type (for mismatches) or `None`.
    pub expected: Option<&'static str>,
    /// Actual type found (for mismatches) or `None`.
    pub found: Option<&'static str>,
}

impl fmt::Display for MissingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MissingKind::Absent => write!(f, "missing-context: key '{}' is absent", self.key),
            MissingKind::TypeMismatch => write!(
                f,
                "missing-context: key '{}' type-mismatch (expected {}, found {})",
                self.key,
                self.expected.unwrap_or("?"),
                self.found.unwrap_or("?"),
            ),
        }
    }
}

/// Result of evaluating one condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionOutcome {
    /// Whether the condition holds.
    pub satisfied: bool,
    /// Present when the condition was forced to `false` by an incomplete context.
    pub note: Option<MissingContext>,
}

impl ConditionOutcome {
    const fn holds(satisfied: bool) -> Self {
        Self {
            satisfied,
            note: None,
        }
    }

    fn absent(key: &str) -> Self {
        Self {
            satisfied: false,
            note: Some(MissingContext {
                key: key.to_string(),
                kind: MissingKind::Absent,
                expected: None,
                found: None,
            }),
        }
    }

    fn mismatch(key: &str, expected: &'static str, found: &Value) -> Self {
        Self {
            satisfied: false,
            note: Some(MissingContext {
                key: key.to_string(),
                kind: MissingKind::TypeMismatch,
                expected: Some(expected),
                found: Some(found.type_name()),
            }),
        }
    }
}

/// Pure, total condition evaluator.
///
/// Never panics and never errors: anything that cannot be evaluated is
/// `false` plus a [`MissingContext`] note.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates `condition` and reports why it failed when the context was incomplete.
    #[must_use]
    pub fn evaluate(&self, condition: &Condition, context: &Context) -> ConditionOutcome {
        let outcome = Self::evaluate_predicate(&condition.predicate, context);
        if let Some(note) = &outcome.note {
            tracing::warn!(
                condition = %condition.description,
                key = %note.key,
                "condition evaluated as false: {note}"
            );
        }
        outcome
    }

    /// Shorthand for `evaluate(..).satisfied`.
    #[must_use]
    pub fn is_satisfied(&self, condition: &Condition, context: &Context) -> bool {
        self.evaluate(condition, context).satisfied
    }

    fn evaluate_predicate(predicate: &Predicate, context: &Context) -> ConditionOutcome {
        let key = predicate.key();

        match predicate {
            Predicate::Exists { .. } => return ConditionOutcome::holds(context.contains(key)),
            Predicate::Missing { .. } => return ConditionOutcome::holds(!context.contains(key)),
            _ => {}
        }

        let Some(fact) = context.get(key) else {
            return ConditionOutcome::absent(key);
        };

        match predicate {
            Predicate::Equals { value, .. } => Self::equality(key, fact, value, true),
            Predicate::NotEquals { value, .. } => Self::equality(key, fact, value, false),
            Predicate::IsTrue { .. } => match fact.as_bool() {
                Some(b) => ConditionOutcome::holds(b),
                None => ConditionOutcome::mismatch(key, "bool", fact),
            },
            Predicate::IsFalse { .. } => match fact.as_bool() {
                Some(b) => ConditionOutcome::holds(!b),
                None => ConditionOutcome::mismatch(key, "bool", fact),
            },
            Predicate::GreaterThan { bound, .. } => Self::compare(key, fact, |v| v > *bound),
            Predicate::GreaterOrEqual { bound, .. } => Self::compare(key, fact, |v| v >= *bound),
            Predicate::LessThan { bound, .. } => Self::compare(key, fact, |v| v < *bound),
            Predicate::LessOrEqual { bound, .. } => Self::compare(key, fact, |v| v <= *bound),
            Predicate::OneOf { values, .. } => {
                let mut candidates = values.iter().filter(|v| fact.comparable(v)).peekable();
                if candidates.peek().is_none() {
                    let expected = values.first().map_or("list member", Value::expected_name);
                    return ConditionOutcome::mismatch(key, expected, fact);
                }
                ConditionOutcome::holds(candidates.any(|v| fact.loosely_equals(v)))
            }
            Predicate::Matches { pattern, .. } => match fact.as_str() {
                Some(s) => match cached_regex(pattern) {
                    Ok(re) => ConditionOutcome::holds(re.is_match(s)),
                    // Validated at registration; unreachable for registered rules.
                    Err(_) => ConditionOutcome::holds(false),
                },
                None => ConditionOutcome::mismatch(key, "string", fact),
            },
            Predicate::Exists { .. } => ConditionOutcome::holds(true),
            Predicate::Missing { .. } => ConditionOutcome::holds(false),
        }
    }

    // A fact of another type is a mismatch, never a silent inequality.
    fn equality(key: &str, fact: &Value, value: &Value, expect_equal: bool) -> ConditionOutcome {
        if !fact.comparable(value) {
            return ConditionOutcome::mismatch(key, value.expected_name(), fact);
        }
        ConditionOutcome::holds(fact.loosely_equals(value) == expect_equal)
    }

    fn compare(key: &str, fact: &Value, op: impl Fn(f64) -> bool) -> ConditionOutcome {
        match fact.as_float() {
            Some(v) if v.is_finite() => ConditionOutcome::holds(op(v)),
            _ => ConditionOutcome::mismatch(key, "number", fact),
        }
    }
}
