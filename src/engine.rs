//! Deterministic rule evaluation.
//!
//! The engine walks the enabled rules of one [`RuleSnapshot`] in
//! `(priority desc, rule_id asc)` order and records one [`RuleEvaluation`]
//! per rule, triggered or not. Disabled rules are not recorded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::condition::{ConditionEvaluator, MissingContext};
use crate::context::Context;
use crate::registry::RuleSnapshot;
use crate::rule::{Rule, RuleId, RuleType};

/// Outcome of evaluating one enabled rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    /// Rule id.
    pub rule_id: RuleId,
    /// True iff all conditions held.
    pub triggered: bool,
    /// The rule's action.
    pub action: Action,
    /// The rule's type.
    pub rule_type: RuleType,
    /// The rule's priority.
    pub priority: u32,
}

/// A condition that fell back to `false` because the context was incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationNote {
    /// Rule whose condition was affected.
    pub rule_id: RuleId,
    /// Description of the condition.
    pub condition: String,
    /// What was missing.
    pub missing: MissingContext,
}

/// Everything one evaluation pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// One record per enabled rule, in evaluation order.
    pub evaluations: Vec<RuleEvaluation>,
    /// Missing-context notes, in evaluation order.
    pub notes: Vec<EvaluationNote>,
}

impl EngineOutput {
    /// Records of triggered rules, in evaluation order.
    pub fn triggered(&self) -> impl Iterator<Item = &RuleEvaluation> {
        self.evaluations.iter().filter(|e| e.triggered)
    }

    /// Returns true if at least one rule triggered.
    #[must_use]
    pub fn any_triggered(&self) -> bool {
        self.evaluations.iter().any(|e| e.triggered)
    }
}

/// Evaluates a fixed rule snapshot against contexts.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    snapshot: Arc<RuleSnapshot>,
    evaluator: ConditionEvaluator,
}

impl RuleEngine {
    /// Creates an engine bound to `snapshot`.
    #[must_use]
    pub fn new(snapshot: Arc<RuleSnapshot>) -> Self {
        Self {
            snapshot,
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// The snapshot this engine evaluates.
    #[must_use]
    pub fn snapshot(&self) -> &RuleSnapshot {
        &self.snapshot
    }

    /// Evaluates every enabled rule against `context`.
    #[must_use]
    pub fn evaluate(&self, context: &Context) -> EngineOutput {
        let mut output = EngineOutput::default();

        for rule in self.snapshot.enabled_rules() {
            let triggered = self.rule_triggers(rule, context, &mut output.notes);
            output.evaluations.push(RuleEvaluation {
                rule_id: rule.rule_id().to_string(),
                triggered,
                action: rule.action().clone(),
                rule_type: rule.rule_type(),
                priority: rule.priority(),
            });
        }

        tracing::debug!(
            generation = self.snapshot.generation(),
            evaluated = output.evaluations.len(),
            triggered = output.triggered().count(),
            "rule evaluation pass complete"
        );
        output
    }

    // AND semantics; stops at the first condition that does not hold.
    fn rule_triggers(&self, rule: &Rule, context: &Context, notes: &mut Vec<EvaluationNote>) -> bool {
        for condition in rule.conditions() {
            let outcome = self.evaluator.evaluate(condition, context);
            if let Some(missing) = outcome.note {
                notes.push(EvaluationNote {
                    rule_id: rule.rule_id().to_string(),
                    condition: condition.description.clone(),
                    missing,
                });
            }
            if !outcome.satisfied {
                return false;
            }
        }
        true
    }
}
