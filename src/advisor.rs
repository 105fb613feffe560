//! Neural advisor boundary.
//!
//! The advisor is an external, non-authoritative opinion generator (usually
//! an LLM behind a network call). It is the only part of a reasoning pass
//! that may block, so calls run on a fixed [`AdvisorPool`] and are awaited
//! with a deadline. On expiry the call is cancelled and the caller gets
//! [`AdvisorError::Timeout`]; the reasoner then falls back to symbolic-only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::context::Context;
use crate::error::AdvisorError;

/// Cooperative cancellation flag shared with a running advisor call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The advisor's opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    /// Suggested decision.
    pub suggested_action: Action,
    /// Confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Free-text rationale.
    #[serde(default)]
    pub rationale: String,
}

impl Advisory {
    /// Creates a validated advisory.
    ///
    /// # Errors
    ///
    /// `InvalidAdvisory` if `confidence` is not a finite value in [0.0, 1.0].
    pub fn new(
        suggested_action: Action,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Result<Self, AdvisorError> {
        let advisory = Self {
            suggested_action,
            confidence,
            rationale: rationale.into(),
        };
        advisory.validate()?;
        Ok(advisory)
    }

    /// Checks the confidence range.
    ///
    /// # Errors
    ///
    /// `InvalidAdvisory` if `confidence` is not a finite value in [0.0, 1.0].
    pub fn validate(&self) -> Result<(), AdvisorError> {
        if self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence) {
            Ok(())
        } else {
            Err(AdvisorError::InvalidAdvisory {
                reason: format!("confidence {} is out of range [0.0, 1.0]", self.confidence),
            })
        }
    }
}

/// Neural advisor interface.
///
/// Implementations should give up once `cancel` is set; the reasoner stops
/// waiting at the deadline either way.
pub trait NeuralAdvisor: Send + Sync {
    /// Name of the advisor (for proofs and logs).
    fn name(&self) -> &str;

    /// Produces an advisory for `context`.
    ///
    /// # Errors
    ///
    /// Any [`AdvisorError`]; all of them are recovered by the caller.
    fn advise(
        &self,
        context: &Context,
        task_description: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Advisory, AdvisorError>;
}

struct AdvisorJob {
    context: Context,
    timeout: Duration,
    cancel: CancelToken,
    reply: Sender<Result<Advisory, AdvisorError>>,
}

/// Fixed set of worker threads running one advisor, fed by a bounded queue.
///
/// The number of threads never grows with the number of calls: an advisor
/// that ignores cancellation can pin at most `workers` threads, and once the
/// queue is full further calls fail fast with [`AdvisorError::Saturated`].
/// Dropping the pool closes the queue; idle workers then exit.
pub struct AdvisorPool {
    name: String,
    tx: Sender<AdvisorJob>,
    workers: usize,
    queue_capacity: usize,
}

impl fmt::Debug for AdvisorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorPool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl AdvisorPool {
    /// Starts `workers` threads (at least one) serving `advisor`.
    ///
    /// # Errors
    ///
    /// `Transport` if no worker thread could be spawned.
    pub fn start(
        advisor: Arc<dyn NeuralAdvisor>,
        workers: usize,
        queue_capacity: usize,
    ) -> Result<Self, AdvisorError> {
        let name = advisor.name().to_string();
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<AdvisorJob>(queue_capacity);

        let mut spawned = 0;
        let mut last_error = None;
        for idx in 0..workers.max(1) {
            let rx: Receiver<AdvisorJob> = rx.clone();
            let advisor = Arc::clone(&advisor);
            let result = thread::Builder::new()
                .name(format!("agentgate-advisor-{name}-{idx}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        // The caller already gave up on jobs cancelled while queued.
                        if job.cancel.is_cancelled() {
                            continue;
                        }
                        let result = advisor
                            .advise(&job.context, job.context.task_description(), job.timeout, &job.cancel)
                            .and_then(|advisory| advisory.validate().map(|()| advisory));
                        let _ = job.reply.send(result);
                    }
                });
            match result {
                Ok(_) => spawned += 1,
                Err(e) => last_error = Some(e),
            }
        }

        if spawned == 0 {
            let reason = last_error.map_or_else(|| "no workers".to_string(), |e| e.to_string());
            return Err(AdvisorError::transport(format!(
                "failed to spawn advisor workers: {reason}"
            )));
        }
        tracing::debug!(advisor = %name, workers = spawned, queue_capacity, "advisor pool started");

        Ok(Self {
            name,
            tx,
            workers: spawned,
            queue_capacity,
        })
    }

    /// Name of the advisor served by this pool.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Queues one advisor call; the deadline starts now.
    ///
    /// # Errors
    ///
    /// `Saturated` if the queue is full, `Disconnected` if every worker is gone.
    pub fn submit(&self, context: &Context, timeout: Duration) -> Result<AdvisorCall, AdvisorError> {
        let (reply, rx) = bounded::<Result<Advisory, AdvisorError>>(1);
        let cancel = CancelToken::new();
        let job = AdvisorJob {
            context: context.clone(),
            timeout,
            cancel: cancel.clone(),
            reply,
        };

        match self.tx.try_send(job) {
            Ok(()) => Ok(AdvisorCall {
                rx,
                cancel,
                deadline: Instant::now() + timeout,
                timeout,
            }),
            Err(TrySendError::Full(_)) => Err(AdvisorError::Saturated {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(AdvisorError::Disconnected),
        }
    }
}

/// An in-flight advisor call.
pub struct AdvisorCall {
    rx: Receiver<Result<Advisory, AdvisorError>>,
    cancel: CancelToken,
    deadline: Instant,
    timeout: Duration,
}

impl AdvisorCall {
    /// Waits for the advisory until the deadline.
    ///
    /// # Errors
    ///
    /// `Timeout` (the call is cancelled), `Disconnected`, or whatever the
    /// advisor itself returned.
    pub fn join(self) -> Result<Advisory, AdvisorError> {
        match self.rx.recv_deadline(self.deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.cancel.cancel();
                Err(AdvisorError::Timeout {
                    duration_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(AdvisorError::Disconnected),
        }
    }

    /// Token shared with the worker.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct Fixed(Result<Advisory, AdvisorError>);

    impl NeuralAdvisor for Fixed {
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
            self.0.clone()
        }
    }

    struct Sleepy {
        delay: Duration,
        saw_cancel: Arc<AtomicBool>,
    }

    impl NeuralAdvisor for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn advise(
            &self,
            _context: &Context,
            _task: &str,
            _timeout: Duration,
            cancel: &CancelToken,
        ) -> Result<Advisory, AdvisorError> {
            let started = Instant::now();
            while started.elapsed() < self.delay {
                if cancel.is_cancelled() {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return Err(AdvisorError::transport("cancelled"));
                }
                thread::sleep(Duration::from_millis(5));
            }
            Advisory::new(Action::Proceed, 0.5, "slow")
        }
    }

    fn pool(advisor: impl NeuralAdvisor + 'static) -> AdvisorPool {
        AdvisorPool::start(Arc::new(advisor), 2, 4).unwrap()
    }

    /// Ignores cancellation and records how many calls ran at once.
    struct Stubborn {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl NeuralAdvisor for Stubborn {
        fn name(&self) -> &str {
            "stubborn"
        }

        fn advise(
            &self,
            _context: &Context,
            _task: &str,
            _timeout: Duration,
            _cancel: &CancelToken,
        ) -> Result<Advisory, AdvisorError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Advisory::new(Action::Proceed, 0.5, "eventually")
        }
    }

    #[test]
    fn advisory_confidence_is_validated() {
        assert!(Advisory::new(Action::Proceed, 1.0, "").is_ok());
        assert!(Advisory::new(Action::Proceed, 1.01, "").is_err());
        assert!(Advisory::new(Action::Proceed, f64::NAN, "").is_err());
    }

    #[test]
    fn join_returns_advisory() {
        let advisory = Advisory::new(Action::Warn, 0.7, "looks risky").unwrap();
        let call = pool(Fixed(Ok(advisory.clone())))
            .submit(&Context::default(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(call.join().unwrap(), advisory);
    }

    #[test]
    fn invalid_advisory_from_advisor_is_rejected() {
        let bogus = Advisory {
            suggested_action: Action::Proceed,
            confidence: 7.0,
            rationale: String::new(),
        };
        let call = pool(Fixed(Ok(bogus)))
            .submit(&Context::default(), Duration::from_secs(1))
            .unwrap();
        assert!(matches!(call.join(), Err(AdvisorError::InvalidAdvisory { .. })));
    }

    #[test]
    fn timeout_cancels_the_call() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let pool = pool(Sleepy {
            delay: Duration::from_secs(2),
            saw_cancel: Arc::clone(&saw_cancel),
        });
        let call = pool.submit(&Context::default(), Duration::from_millis(30)).unwrap();
        let token = call.cancel_token().clone();

        let started = Instant::now();
        let err = call.join().unwrap_err();
        assert_eq!(err, AdvisorError::Timeout { duration_ms: 30 });
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(token.is_cancelled());

        let wait = Instant::now();
        while !saw_cancel.load(Ordering::SeqCst) && wait.elapsed() < Duration::from_secs(1) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[test]
    fn transport_errors_pass_through() {
        let call = pool(Fixed(Err(AdvisorError::transport("connection reset"))))
            .submit(&Context::default(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(call.join().unwrap_err(), AdvisorError::transport("connection reset"));
    }

    #[test]
    fn stuck_advisor_never_grows_the_pool() {
        let advisor = Arc::new(Stubborn {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = AdvisorPool::start(Arc::clone(&advisor) as Arc<dyn NeuralAdvisor>, 2, 3).unwrap();
        assert_eq!(pool.workers(), 2);

        let mut timeouts = 0;
        let mut saturated = 0;
        for _ in 0..40 {
            match pool.submit(&Context::default(), Duration::from_millis(5)) {
                Ok(call) => {
                    assert!(call.join().unwrap_err().is_timeout());
                    timeouts += 1;
                }
                Err(AdvisorError::Saturated { capacity }) => {
                    assert_eq!(capacity, 3);
                    saturated += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert!(timeouts >= 1);
        assert!(saturated >= 1);
        assert!(advisor.peak.load(Ordering::SeqCst) <= 2);
    }
}
