use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::engine::RuleEvaluation;
use crate::rule::{RuleId, RuleType};

/// Precedence lane that produced a decision.
///
/// Rule type selects the lane; priority only breaks ties inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lane {
    /// A SAFETY rule decided.
    Safety,
    /// A CONSTRAINT rule decided.
    Constraint,
    /// A DEPENDENCY rule forced a deferral.
    Dependency,
    /// An IMPLICATION or BEST_PRACTICE rule decided.
    Advisory,
    /// Nothing triggered; default allow.
    Default,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safety => write!(f, "SAFETY"),
            Self::Constraint => write!(f, "CONSTRAINT"),
            Self::Dependency => write!(f, "DEPENDENCY"),
            Self::Advisory => write!(f, "ADVISORY"),
            Self::Default => write!(f, "DEFAULT"),
        }
    }
}

/// The rule that decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    /// Rule id.
    pub rule_id: RuleId,
    /// Rule type.
    pub rule_type: RuleType,
    /// Rule priority.
    pub priority: u32,
    /// The rule's own action (a DEPENDENCY winner still decides DEFER).
    pub action: Action,
}

/// Outcome of conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Final symbolic decision.
    pub decision: Action,
    /// Deciding rule; `None` when nothing triggered.
    pub winner: Option<Winner>,
    /// Lane that decided.
    pub lane: Lane,
    /// False iff a SAFETY/CONSTRAINT winner blocks.
    pub constraints_satisfied: bool,
    /// Number of triggered rules considered.
    pub triggered: usize,
    /// Proof lines describing the resolution.
    pub proof_lines: Vec<String>,
}

impl Resolution {
    /// Returns the winning rule id.
    #[must_use]
    pub fn winning_rule_id(&self) -> Option<&str> {
        self.winner.as_ref().map(|w| w.rule_id.as_str())
    }

    /// Returns true if a SAFETY or CONSTRAINT rule decided.
    #[must_use]
    pub fn is_binding(&self) -> bool {
        matches!(self.lane, Lane::Safety | Lane::Constraint)
    }
}

/// Turns triggered rules into one decision.
///
/// Precedence, applied in order:
/// 1. highest-priority triggered SAFETY rule
/// 2. highest-priority triggered CONSTRAINT rule
/// 3. any triggered DEPENDENCY rule decides `DEFER`
/// 4. highest-priority triggered IMPLICATION / BEST_PRACTICE rule
/// 5. nothing triggered: `PROCEED`
///
/// Ties inside a lane go to the lexicographically smallest rule id. The
/// input order of `evaluations` never matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Creates a resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Resolves `evaluations` into a decision.
    #[must_use]
    pub fn resolve(&self, evaluations: &[RuleEvaluation]) -> Resolution {
        let triggered: Vec<&RuleEvaluation> = evaluations.iter().filter(|e| e.triggered).collect();

        let lanes: [(Lane, &[RuleType]); 4] = [
            (Lane::Safety, &[RuleType::Safety]),
            (Lane::Constraint, &[RuleType::Constraint]),
            (Lane::Dependency, &[RuleType::Dependency]),
            (Lane::Advisory, &[RuleType::Implication, RuleType::BestPractice]),
        ];

        for (lane, types) in lanes {
            let in_lane: Vec<&RuleEvaluation> = triggered
                .iter()
                .copied()
                .filter(|e| types.contains(&e.rule_type))
                .collect();
            let Some(best) = Self::pick(&in_lane) else {
                continue;
            };

            let decision = if lane == Lane::Dependency {
                Action::Defer
            } else {
                best.action.clone()
            };
            let constraints_satisfied = !(best.rule_type.is_binding() && decision.is_blocking());

            let mut proof_lines = vec![format!(
                "RESOLVE lane={lane} winner={} priority={} action={decision} candidates={}",
                best.rule_id,
                best.priority,
                in_lane.len(),
            )];
            let outranked = triggered.len() - in_lane.len();
            if outranked > 0 && matches!(lane, Lane::Safety | Lane::Constraint) {
                proof_lines.push(format!(
                    "RESOLVE {outranked} triggered rule(s) in lower lanes cannot change a {lane} decision"
                ));
            }

            return Resolution {
                decision,
                winner: Some(Winner {
                    rule_id: best.rule_id.clone(),
                    rule_type: best.rule_type,
                    priority: best.priority,
                    action: best.action.clone(),
                }),
                lane,
                constraints_satisfied,
                triggered: triggered.len(),
                proof_lines,
            };
        }

        Resolution {
            decision: Action::Proceed,
            winner: None,
            lane: Lane::Default,
            constraints_satisfied: true,
            triggered: 0,
            proof_lines: vec!["RESOLVE lane=DEFAULT no rule triggered; default-allow PROCEED".to_string()],
        }
    }

    fn pick<'a>(candidates: &[&'a RuleEvaluation]) -> Option<&'a RuleEvaluation> {
        candidates
            .iter()
            .copied()
            .min_by(|a, b| {
                Reverse(a.priority)
                    .cmp(&Reverse(b.priority))
                    .then_with(|| a.rule_id.cmp(&b.rule_id))
            })
    }
}
