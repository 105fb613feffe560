//! # agentgate - hybrid decision engine for autonomous agents
//!
//! agentgate gates and advises the actions of task-executing agents. It
//! combines an immutable set of safety/policy rules (the symbolic layer) with
//! an optional opinion from a language-model backend (the neural layer) and
//! produces one auditable decision with a human-readable proof.
//!
//! ## Core Concepts
//!
//! - **System rule**: loaded once at bootstrap, never disabled, removed or outranked
//! - **Custom rule**: added at runtime, confined to priorities below [`RESERVED_MIN`]
//! - **Lane**: rule type decides precedence; priority only breaks ties within a lane
//! - **Neural advisor**: non-authoritative, time-boxed opinion
//! - **Proof**: ordered trail justifying every decision
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use agentgate::{Action, Context, Reasoner, ReasonerConfig, ReasoningMode, RuleRegistry};
//!
//! let registry = Arc::new(RuleRegistry::with_default_system_rules().unwrap());
//! let reasoner = Reasoner::new(registry, ReasonerConfig::default());
//!
//! let ctx = Context::builder()
//!     .fact("action_type", "delete")
//!     .fact("has_backup", false)
//!     .build();
//!
//! let result = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);
//! assert_eq!(result.decision(), &Action::Reject);
//! assert!(!result.constraints_satisfied());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod advisor;
pub mod audit;
pub mod condition;
pub mod context;
pub mod engine;
pub mod error;
pub mod inference;
pub mod proof;
pub mod reasoner;
pub mod registry;
pub mod rule;
pub mod value;

pub use action::{Action, ActionSpec};
pub use advisor::{Advisory, AdvisorCall, AdvisorPool, CancelToken, NeuralAdvisor};
pub use audit::{AuditRecord, AuditSink, InMemoryAuditLog};
pub use condition::{Condition, ConditionEvaluator, ConditionOutcome, ConditionSpec, Predicate};
pub use context::{Context, ContextBuilder};
pub use engine::{EngineOutput, RuleEngine, RuleEvaluation};
pub use error::{AdvisorError, GateError, GateResult, PolicyError};
pub use inference::{ConflictResolver, Lane, Resolution};
pub use reasoner::{Reasoner, ReasonerConfig, ReasoningMode, ReasoningResult};
pub use registry::{PriorityBand, RuleRegistry, RuleSnapshot, RuleStats};
pub use rule::{Rule, RuleId, RuleSpec, RuleTable, RuleType, MAX_PRIORITY, RESERVED_MIN};
pub use value::Value;
