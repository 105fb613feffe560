//! Top-level reasoning entry point.
//!
//! A [`Reasoner`] combines the symbolic rule engine with an optional neural
//! advisor under one invariant: a triggered SAFETY or CONSTRAINT rule always
//! has the last word. The advisor's suggestion only stands when no such rule
//! disagrees with it.
//!
//! Every call works on the registry snapshot taken at invocation start, so
//! concurrent registry mutation never shows up halfway through a pass.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::advisor::{Advisory, AdvisorCall, AdvisorPool, NeuralAdvisor};
use crate::audit::{AuditRecord, AuditSink};
use crate::context::Context;
use crate::engine::{EngineOutput, RuleEngine};
use crate::error::{AdvisorError, GateResult};
use crate::inference::{ConflictResolver, Resolution};
use crate::proof::Proof;
use crate::registry::RuleRegistry;
use crate::rule::RuleId;

/// Confidence reported when no rule triggered.
pub const BASELINE_CONFIDENCE: f64 = 0.5;

/// How neural and symbolic signals are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasoningMode {
    /// Rules only; the advisor is never called.
    SymbolicOnly,
    /// Advisor first, then rules may override it.
    NeuralThenSymbolic,
    /// Advisor and rules run independently; confidences are blended.
    Hybrid,
}

impl ReasoningMode {
    /// Returns true if the mode consults the advisor.
    #[must_use]
    pub const fn uses_advisor(self) -> bool {
        !matches!(self, Self::SymbolicOnly)
    }
}

impl Default for ReasoningMode {
    fn default() -> Self {
        Self::SymbolicOnly
    }
}

impl fmt::Display for ReasoningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SymbolicOnly => write!(f, "SYMBOLIC_ONLY"),
            Self::NeuralThenSymbolic => write!(f, "NEURAL_THEN_SYMBOLIC"),
            Self::Hybrid => write!(f, "HYBRID"),
        }
    }
}

/// Reasoner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// Deadline for one advisor call, in milliseconds.
    pub advisor_timeout_ms: u64,
    /// Mode used by [`Reasoner::reason_default`].
    pub default_mode: ReasoningMode,
    /// Whether missing-context notes are written into the proof.
    pub record_missing_context: bool,
    /// Worker threads serving the advisor.
    pub advisor_workers: usize,
    /// Advisor calls that may wait for a worker before new calls fail fast.
    pub advisor_queue_capacity: usize,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            advisor_timeout_ms: 2_000,
            default_mode: ReasoningMode::SymbolicOnly,
            record_missing_context: true,
            advisor_workers: 4,
            advisor_queue_capacity: 32,
        }
    }
}

impl ReasonerConfig {
    /// Advisor deadline as a `Duration`.
    #[must_use]
    pub const fn advisor_timeout(&self) -> Duration {
        Duration::from_millis(self.advisor_timeout_ms)
    }
}

/// The single, auditable outcome of one reasoning pass.
///
/// Produced once by the reasoner; there are no mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    decision: Action,
    constraints_satisfied: bool,
    triggered_rules: Vec<RuleId>,
    proof: Vec<String>,
    confidence: f64,
    reasoning_mode: ReasoningMode,
    requested_mode: ReasoningMode,
    neural_output: Option<Advisory>,
    winning_rule: Option<RuleId>,
    ruleset_generation: u64,
}

impl ReasoningResult {
    /// Final decision.
    #[must_use]
    pub const fn decision(&self) -> &Action {
        &self.decision
    }

    /// False iff a SAFETY/CONSTRAINT rule won with a blocking action.
    #[must_use]
    pub const fn constraints_satisfied(&self) -> bool {
        self.constraints_satisfied
    }

    /// Ids of triggered rules, in evaluation order.
    #[must_use]
    pub fn triggered_rules(&self) -> &[RuleId] {
        &self.triggered_rules
    }

    /// Ordered justification trail.
    #[must_use]
    pub fn proof(&self) -> &[String] {
        &self.proof
    }

    /// Confidence in [0.0, 1.0].
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Mode actually executed (`SYMBOLIC_ONLY` after an advisor fallback).
    #[must_use]
    pub const fn reasoning_mode(&self) -> ReasoningMode {
        self.reasoning_mode
    }

    /// Mode the caller asked for.
    #[must_use]
    pub const fn requested_mode(&self) -> ReasoningMode {
        self.requested_mode
    }

    /// Advisor output, when the advisor was used.
    #[must_use]
    pub const fn neural_output(&self) -> Option<&Advisory> {
        self.neural_output.as_ref()
    }

    /// Rule that decided symbolically, if any triggered.
    #[must_use]
    pub fn winning_rule(&self) -> Option<&str> {
        self.winning_rule.as_deref()
    }

    /// Registry generation the pass ran against.
    #[must_use]
    pub const fn ruleset_generation(&self) -> u64 {
        self.ruleset_generation
    }

    /// Returns true if the advisor was requested but could not be used.
    #[must_use]
    pub fn fell_back(&self) -> bool {
        self.requested_mode != self.reasoning_mode
    }
}

struct SymbolicPass {
    output: EngineOutput,
    resolution: Resolution,
    generation: u64,
}

impl SymbolicPass {
    fn strength(&self) -> f64 {
        if self.output.any_triggered() {
            1.0
        } else {
            BASELINE_CONFIDENCE
        }
    }

    fn triggered_rules(&self) -> Vec<RuleId> {
        self.output.triggered().map(|e| e.rule_id.clone()).collect()
    }
}

/// Hybrid decision engine.
///
/// Constructed explicitly and passed around by the orchestrator.
pub struct Reasoner {
    registry: Arc<RuleRegistry>,
    advisor: Option<AdvisorPool>,
    resolver: ConflictResolver,
    config: ReasonerConfig,
}

impl fmt::Debug for Reasoner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reasoner")
            .field("registry", &self.registry)
            .field("advisor", &self.advisor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reasoner {
    /// Creates a reasoner without an advisor.
    #[must_use]
    pub fn new(registry: Arc<RuleRegistry>, config: ReasonerConfig) -> Self {
        Self {
            registry,
            advisor: None,
            resolver: ConflictResolver::new(),
            config,
        }
    }

    /// Attaches a neural advisor, served by a pool of
    /// `advisor_workers` threads with a queue of `advisor_queue_capacity`.
    ///
    /// If no worker can be spawned the reasoner keeps running without an
    /// advisor, and neural modes fall back as for any advisor failure.
    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<dyn NeuralAdvisor>) -> Self {
        match AdvisorPool::start(
            advisor,
            self.config.advisor_workers,
            self.config.advisor_queue_capacity,
        ) {
            Ok(pool) => self.advisor = Some(pool),
            Err(err) => {
                tracing::error!(error = %err, "advisor pool could not start; neural modes will fall back");
                self.advisor = None;
            }
        }
        self
    }

    /// The registry this reasoner reads.
    #[must_use]
    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    /// Reasons with the configured default mode.
    #[must_use]
    pub fn reason_default(&self, context: &Context) -> ReasoningResult {
        self.reason(context, self.config.default_mode)
    }

    /// Produces one decision for `context`.
    ///
    /// Never fails: advisor problems fall back to symbolic-only and are
    /// recorded in the proof.
    #[must_use]
    pub fn reason(&self, context: &Context, mode: ReasoningMode) -> ReasoningResult {
        let engine = RuleEngine::new(self.registry.snapshot());

        let result = match mode {
            ReasoningMode::SymbolicOnly => {
                let pass = self.symbolic(&engine, context);
                Self::symbolic_result(pass, mode, None)
            }
            ReasoningMode::NeuralThenSymbolic => {
                let advised = self.start_advisor(context).and_then(AdvisorCall::join);
                let pass = self.symbolic(&engine, context);
                self.combine(pass, advised, mode)
            }
            ReasoningMode::Hybrid => {
                // The advisor runs on its worker while the rules are evaluated.
                let call = self.start_advisor(context);
                let pass = self.symbolic(&engine, context);
                let advised = call.and_then(AdvisorCall::join);
                self.combine(pass, advised, mode)
            }
        };

        tracing::debug!(
            requested = %mode,
            executed = %result.reasoning_mode,
            decision = %result.decision,
            constraints_satisfied = result.constraints_satisfied,
            triggered = result.triggered_rules.len(),
            "reasoning pass complete"
        );
        result
    }

    /// Reasons and appends the result to `sink`.
    ///
    /// # Errors
    ///
    /// Only if the sink rejects the record; the decision itself is unaffected.
    pub fn reason_and_record(
        &self,
        context: &Context,
        mode: ReasoningMode,
        sink: &dyn AuditSink,
    ) -> GateResult<ReasoningResult> {
        let result = self.reason(context, mode);
        sink.append(AuditRecord::new(result.clone()))?;
        Ok(result)
    }

    fn symbolic(&self, engine: &RuleEngine, context: &Context) -> SymbolicPass {
        let mut output = engine.evaluate(context);
        if !self.config.record_missing_context {
            output.notes.clear();
        }
        let resolution = self.resolver.resolve(&output.evaluations);
        SymbolicPass {
            output,
            resolution,
            generation: engine.snapshot().generation(),
        }
    }

    fn start_advisor(&self, context: &Context) -> Result<AdvisorCall, AdvisorError> {
        let pool = self.advisor.as_ref().ok_or(AdvisorError::Unavailable)?;
        pool.submit(context, self.config.advisor_timeout())
    }

    fn advisor_name(&self) -> &str {
        self.advisor.as_ref().map_or("none", AdvisorPool::name)
    }

    fn combine(
        &self,
        pass: SymbolicPass,
        advised: Result<Advisory, AdvisorError>,
        mode: ReasoningMode,
    ) -> ReasoningResult {
        match advised {
            Ok(advisory) => self.merge(pass, advisory, mode),
            Err(err) => {
                let reason = match err {
                    AdvisorError::Unavailable => "advisor unavailable".to_string(),
                    other => format!("advisor {} failed: {other}", self.advisor_name()),
                };
                tracing::warn!(requested = %mode, "{reason}; falling back to symbolic-only");
                Self::symbolic_result(pass, mode, Some(&reason))
            }
        }
    }

    fn symbolic_result(
        pass: SymbolicPass,
        requested_mode: ReasoningMode,
        fallback: Option<&str>,
    ) -> ReasoningResult {
        let confidence = pass.strength();
        let decision = pass.resolution.decision.clone();
        let constraints_satisfied = pass.resolution.constraints_satisfied;

        let mut proof = Proof::new();
        proof.record_rules(&pass.output, &pass.resolution);
        if let Some(reason) = fallback {
            proof.record_fallback(reason);
        }
        proof.record_decision(&decision, constraints_satisfied, confidence);

        ReasoningResult {
            decision,
            constraints_satisfied,
            triggered_rules: pass.triggered_rules(),
            proof: proof.into_lines(),
            confidence,
            reasoning_mode: ReasoningMode::SymbolicOnly,
            requested_mode,
            neural_output: None,
            winning_rule: pass.resolution.winning_rule_id().map(str::to_string),
            ruleset_generation: pass.generation,
        }
    }

    fn merge(&self, pass: SymbolicPass, advisory: Advisory, mode: ReasoningMode) -> ReasoningResult {
        let resolution = &pass.resolution;
        let suggestion = &advisory.suggested_action;

        let mut proof = Proof::new();
        proof.record_rules(&pass.output, resolution);
        proof.record_advisory(self.advisor_name(), &advisory);

        let overriding = resolution
            .winner
            .as_ref()
            .filter(|_| resolution.is_binding() && resolution.decision != *suggestion);

        let decision = if let Some(winner) = overriding {
            proof.record_override(&winner.rule_id, winner.rule_type, &resolution.decision, suggestion);
            resolution.decision.clone()
        } else {
            proof.record_advisor_stands(suggestion);
            for eval in pass.output.triggered().filter(|e| e.action.is_advisory_note()) {
                proof.record_annotation(eval);
            }
            suggestion.clone()
        };

        let confidence = match mode {
            ReasoningMode::Hybrid => 0.5 * advisory.confidence + 0.5 * pass.strength(),
            _ if overriding.is_some() => 1.0,
            _ => advisory.confidence,
        };
        let constraints_satisfied = resolution.constraints_satisfied;
        proof.record_decision(&decision, constraints_satisfied, confidence);

        ReasoningResult {
            decision,
            constraints_satisfied,
            triggered_rules: pass.triggered_rules(),
            proof: proof.into_lines(),
            confidence,
            reasoning_mode: mode,
            requested_mode: mode,
            winning_rule: resolution.winning_rule_id().map(str::to_string),
            ruleset_generation: pass.generation,
            neural_output: Some(advisory),
        }
    }
}
