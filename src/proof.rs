//! Human-readable justification trail.
//!
//! A proof is an ordered list of lines in four sections, always rendered in
//! this order: rule evaluation (triggered rules first, then untriggered
//! ones, then missing-context notes and the resolution), the advisor call,
//! the merge/override step, and the final decision.

use crate::action::Action;
use crate::advisor::Advisory;
use crate::engine::{EngineOutput, RuleEvaluation};
use crate::inference::Resolution;
use crate::rule::RuleType;

/// Marker every fallback line starts with.
pub const NEURAL_FALLBACK: &str = "neural-fallback";

/// Marker every override line starts with.
pub const OVERRIDE: &str = "OVERRIDE";

/// Proof under construction.
#[derive(Debug, Clone, Default)]
pub struct Proof {
    rules: Vec<String>,
    advisor: Vec<String>,
    merge: Vec<String>,
    decision: Vec<String>,
}

impl Proof {
    /// Starts an empty proof.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the evaluation pass and its resolution.
    pub fn record_rules(&mut self, output: &EngineOutput, resolution: &Resolution) {
        let (triggered, quiet): (Vec<&RuleEvaluation>, Vec<&RuleEvaluation>) =
            output.evaluations.iter().partition(|e| e.triggered);

        for eval in triggered.into_iter().chain(quiet) {
            self.rules.push(format!(
                "EVAL rule={} type={} priority={} triggered={} action={}",
                eval.rule_id, eval.rule_type, eval.priority, eval.triggered, eval.action
            ));
        }
        for note in &output.notes {
            self.rules.push(format!(
                "NOTE rule={} condition=\"{}\" {}",
                note.rule_id, note.condition, note.missing
            ));
        }
        self.rules.extend(resolution.proof_lines.iter().cloned());
    }

    /// Records a successful advisor call.
    pub fn record_advisory(&mut self, advisor: &str, advisory: &Advisory) {
        self.advisor.push(format!(
            "NEURAL advisor={advisor} suggested={} confidence={:.3} rationale=\"{}\"",
            advisory.suggested_action,
            advisory.confidence,
            single_line(&advisory.rationale),
        ));
    }

    /// Records that the advisor could not be used and symbolic-only was applied.
    pub fn record_fallback(&mut self, reason: &str) {
        self.advisor.push(format!(
            "{NEURAL_FALLBACK}: {}; reasoning as SYMBOLIC_ONLY",
            single_line(reason)
        ));
    }

    /// Records a SAFETY/CONSTRAINT override of the advisor.
    pub fn record_override(
        &mut self,
        rule_id: &str,
        rule_type: RuleType,
        action: &Action,
        suggestion: &Action,
    ) {
        self.merge.push(format!(
            "{OVERRIDE} rule={rule_id} type={rule_type} action={action} replaces advisor suggestion {suggestion}"
        ));
    }

    /// Records that the advisor's suggestion stands.
    pub fn record_advisor_stands(&mut self, suggestion: &Action) {
        self.merge.push(format!("MERGE advisor suggestion {suggestion} stands"));
    }

    /// Records a non-blocking rule annotating the advisor's suggestion.
    pub fn record_annotation(&mut self, eval: &RuleEvaluation) {
        self.merge.push(format!(
            "ANNOTATE rule={} type={} action={}",
            eval.rule_id, eval.rule_type, eval.action
        ));
    }

    /// Records the final decision.
    pub fn record_decision(&mut self, decision: &Action, constraints_satisfied: bool, confidence: f64) {
        self.decision.push(format!(
            "DECISION {decision} constraints_satisfied={constraints_satisfied} confidence={confidence:.3}"
        ));
    }

    /// Renders the ordered lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        let mut lines =
            Vec::with_capacity(self.rules.len() + self.advisor.len() + self.merge.len() + self.decision.len());
        lines.extend(self.rules);
        lines.extend(self.advisor);
        lines.extend(self.merge);
        lines.extend(self.decision);
        lines
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
