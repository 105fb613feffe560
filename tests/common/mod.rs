#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use agentgate::{
    Action, Advisory, AdvisorError, CancelToken, Context, NeuralAdvisor, Predicate, RuleRegistry,
    RuleSpec, RuleType,
};

/// Always returns the same advisory and counts calls.
pub struct FixedAdvisor {
    advisory: Advisory,
    calls: AtomicUsize,
}

impl FixedAdvisor {
    pub fn new(action: Action, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            advisory: Advisory::new(action, confidence, "fixed test opinion").unwrap(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NeuralAdvisor for FixedAdvisor {
    fn name(&self) -> &str {
        "fixed"
    }

    fn advise(
        &self,
        _context: &Context,
        _task: &str,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<Advisory, AdvisorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.advisory.clone())
    }
}

/// Sleeps far past any test deadline unless cancelled.
pub struct HangingAdvisor;

impl NeuralAdvisor for HangingAdvisor {
    fn name(&self) -> &str {
        "hanging"
    }

    fn advise(
        &self,
        _context: &Context,
        _task: &str,
        _timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Advisory, AdvisorError> {
        let started = Instant::now();
        while !cancel.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        Advisory::new(Action::Proceed, 1.0, "too late")
    }
}

/// Fails with a transport error.
pub struct BrokenAdvisor;

impl NeuralAdvisor for BrokenAdvisor {
    fn name(&self) -> &str {
        "broken"
    }

    fn advise(
        &self,
        _context: &Context,
        _task: &str,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<Advisory, AdvisorError> {
        Err(AdvisorError::transport("503 service unavailable"))
    }
}

pub fn no_delete_without_backup() -> RuleSpec {
    RuleSpec::new("no_delete_without_backup", RuleType::Safety, 90, &Action::Reject)
        .condition("action is a delete", Predicate::equals("action_type", "delete"))
        .condition("no backup exists", Predicate::is_false("has_backup"))
        .description("Destructive deletes require a backup")
}

/// Sealed registry holding only `no_delete_without_backup`.
pub fn sealed_registry() -> Arc<RuleRegistry> {
    let registry = RuleRegistry::new();
    registry.register_system_rule(&no_delete_without_backup()).unwrap();
    registry.seal().unwrap();
    Arc::new(registry)
}

pub fn delete_without_backup() -> Context {
    Context::builder()
        .task("clean up the old release directory")
        .fact("action_type", "delete")
        .fact("has_backup", false)
        .build()
}
