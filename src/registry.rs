//! Rule registry with tamper-resistant system rules.
//!
//! The registry owns every rule. System rules are registered once during
//! bootstrap, after which the registry is sealed and the system rule set is
//! fixed for the lifetime of the process. Custom rules can be added,
//! toggled, re-prioritized and removed at runtime, but only inside the
//! unreserved priority band `[0, RESERVED_MIN)`.
//!
//! Readers never lock the rule map itself: every mutation publishes a fresh
//! immutable [`RuleSnapshot`], and `reason()` works against the snapshot it
//! grabbed at invocation start. Mutations are serialized by a writer mutex.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;

use crate::error::{GateResult, PolicyError};
use crate::rule::{
    CustomRule, RegisteredRule, Rule, RuleId, RuleSpec, RuleTable, RuleType, SystemRule,
    MAX_PRIORITY, RESERVED_MIN,
};

const DEFAULT_SYSTEM_RULES: &str = include_str!("../rules/system_rules.json");

/// Immutable view of the rule set at one point in time.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    rules: Vec<Rule>,
    generation: u64,
    fingerprint: String,
}

impl RuleSnapshot {
    fn build(rules: &BTreeMap<RuleId, RegisteredRule>, generation: u64) -> Result<Self, PolicyError> {
        let mut ordered: Vec<Rule> = rules.values().map(|r| r.rule().clone()).collect();
        ordered.sort_by(Rule::evaluation_order);

        let mut hasher = blake3::Hasher::new();
        for rule in &ordered {
            let bytes = serde_json::to_vec(rule)
                .map_err(|e| PolicyError::internal(format!("failed to encode rule: {e}")))?;
            hasher.update(&bytes);
            hasher.update(b"\n");
        }

        Ok(Self {
            rules: ordered,
            generation,
            fingerprint: hasher.finalize().to_hex().to_string(),
        })
    }

    /// All rules (enabled or not) in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Enabled rules in evaluation order.
    pub fn enabled_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_enabled())
    }

    /// Increments on every successful mutation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// blake3 hash of the ordered rule set.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Looks up a rule by id.
    #[must_use]
    pub fn get(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.rule_id() == rule_id)
    }
}

/// Priority band a rule falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityBand {
    /// `[0, RESERVED_MIN)`.
    Custom,
    /// `[RESERVED_MIN, MAX_PRIORITY]`.
    Reserved,
}

impl PriorityBand {
    /// Band of a priority value.
    #[must_use]
    pub const fn of(priority: u32) -> Self {
        if priority >= RESERVED_MIN {
            Self::Reserved
        } else {
            Self::Custom
        }
    }
}

impl fmt::Display for PriorityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom => write!(f, "custom"),
            Self::Reserved => write!(f, "reserved"),
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleStats {
    /// Number of rules, enabled or not.
    pub total_rules: usize,
    /// Number of enabled rules.
    pub enabled_rules: usize,
    /// Number of system rules.
    pub system_rules: usize,
    /// Number of custom rules.
    pub custom_rules: usize,
    /// Rule count per type.
    pub by_type: BTreeMap<RuleType, usize>,
    /// Rule count per priority band.
    pub by_priority_band: BTreeMap<PriorityBand, usize>,
    /// Snapshot generation the stats were taken from.
    pub generation: u64,
    /// Fingerprint of that snapshot.
    pub fingerprint: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    rules: BTreeMap<RuleId, RegisteredRule>,
    sealed: bool,
    generation: u64,
}

/// Owner of the rule set.
///
/// Constructed explicitly and shared by `Arc`; there is no global instance.
#[derive(Debug)]
pub struct RuleRegistry {
    writer: Mutex<RegistryState>,
    published: RwLock<Arc<RuleSnapshot>>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleRegistry {
    /// Creates an empty, unsealed registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(RegistryState::default()),
            published: RwLock::new(Arc::new(RuleSnapshot {
                rules: Vec::new(),
                generation: 0,
                fingerprint: blake3::hash(b"").to_hex().to_string(),
            })),
        }
    }

    /// Registers every rule of `table` as a system rule, then seals.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid rule; no registry is returned in that case.
    pub fn bootstrap(table: &RuleTable) -> Result<Self, PolicyError> {
        let registry = Self::new();
        for spec in &table.rules {
            registry.register_system_rule(spec)?;
        }
        registry.seal()?;
        tracing::info!(
            version = table.version,
            system_rules = table.rules.len(),
            "rule registry bootstrapped and sealed"
        );
        Ok(registry)
    }

    /// Bootstraps from the built-in system rule table.
    ///
    /// # Errors
    ///
    /// Only fails if the shipped table itself is broken.
    pub fn with_default_system_rules() -> GateResult<Self> {
        let table = RuleTable::from_json(DEFAULT_SYSTEM_RULES)?;
        Ok(Self::bootstrap(&table)?)
    }

    /// Registers an immutable system rule. Only valid before [`seal`](Self::seal).
    ///
    /// System rules may use the full priority range `[0, MAX_PRIORITY]`.
    ///
    /// # Errors
    ///
    /// `RegistryAlreadySealed`, `DuplicateRuleId`, or any validation error.
    pub fn register_system_rule(&self, spec: &RuleSpec) -> Result<RuleId, PolicyError> {
        let mut state = self.lock_writer()?;
        if state.sealed {
            tracing::warn!(rule_id = %spec.rule_id, "rejected system rule registration after seal");
            return Err(PolicyError::RegistryAlreadySealed {
                rule_id: spec.rule_id.trim().to_string(),
            });
        }

        let rule = spec.validate(MAX_PRIORITY + 1)?;
        let rule_id = rule.rule_id().to_string();
        if state.rules.contains_key(&rule_id) {
            return Err(PolicyError::DuplicateRuleId { rule_id });
        }

        state
            .rules
            .insert(rule_id.clone(), RegisteredRule::System(SystemRule::new(rule)));
        self.publish(&mut state)?;
        tracing::debug!(rule_id = %rule_id, "system rule registered");
        Ok(rule_id)
    }

    /// Seals the registry. One-way; calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Only on a poisoned writer lock.
    pub fn seal(&self) -> Result<(), PolicyError> {
        let mut state = self.lock_writer()?;
        if !state.sealed {
            state.sealed = true;
            tracing::info!(rules = state.rules.len(), "rule registry sealed");
        }
        Ok(())
    }

    /// Returns true once the registry is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.writer
            .lock()
            .map(|s| s.sealed)
            .unwrap_or_else(|poisoned| poisoned.into_inner().sealed)
    }

    /// Adds a custom rule.
    ///
    /// # Errors
    ///
    /// - `PriorityOutOfRange` if `priority >= RESERVED_MIN` (never clamped)
    /// - `DuplicateRuleId` if the id is taken
    /// - `MalformedRule` for bad conditions, a bad id, or `rule_type = SAFETY`
    /// - `UnknownActionType` for an unknown action
    ///
    /// The registry is unchanged on failure.
    pub fn add_custom_rule(&self, spec: &RuleSpec) -> Result<RuleId, PolicyError> {
        let mut state = self.lock_writer()?;
        let rule_id = Self::insert_custom(&mut state.rules, spec).map_err(|err| {
            Self::log_rejection(&err);
            err
        })?;
        self.publish(&mut state)?;
        tracing::info!(rule_id = %rule_id, "custom rule added");
        Ok(rule_id)
    }

    /// Adds every rule of `table` as a custom rule, all or nothing.
    ///
    /// # Errors
    ///
    /// The first failing rule's error; nothing is added in that case.
    pub fn load_custom_rules(&self, table: &RuleTable) -> Result<Vec<RuleId>, PolicyError> {
        let mut state = self.lock_writer()?;
        let mut staged = state.rules.clone();
        let mut added = Vec::with_capacity(table.rules.len());
        for spec in &table.rules {
            let id = Self::insert_custom(&mut staged, spec).map_err(|err| {
                Self::log_rejection(&err);
                err
            })?;
            added.push(id);
        }
        state.rules = staged;
        self.publish(&mut state)?;
        tracing::info!(version = table.version, added = added.len(), "custom rule table loaded");
        Ok(added)
    }

    /// Enables a custom rule.
    ///
    /// # Errors
    ///
    /// `ImmutableRuleError` for system rules, `RuleNotFound` for unknown ids.
    pub fn enable_rule(&self, rule_id: &str) -> Result<(), PolicyError> {
        self.mutate_custom(rule_id, "enabled", |rule| rule.set_enabled(true))
    }

    /// Disables a custom rule.
    ///
    /// # Errors
    ///
    /// `ImmutableRuleError` for system rules, `RuleNotFound` for unknown ids.
    pub fn disable_rule(&self, rule_id: &str) -> Result<(), PolicyError> {
        self.mutate_custom(rule_id, "disabled", |rule| rule.set_enabled(false))
    }

    /// Changes a custom rule's priority.
    ///
    /// # Errors
    ///
    /// `ImmutableRuleError` for system rules, `PriorityOutOfRange` outside
    /// the custom band, `RuleNotFound` for unknown ids.
    pub fn set_rule_priority(&self, rule_id: &str, priority: i64) -> Result<(), PolicyError> {
        let new_priority = u32::try_from(priority).ok().filter(|p| *p < RESERVED_MIN);
        let mut state = self.lock_writer()?;
        let rule = Self::custom_mut(&mut state.rules, rule_id, "re-prioritized")?;
        let Some(new_priority) = new_priority else {
            let err = PolicyError::PriorityOutOfRange {
                rule_id: rule_id.to_string(),
                priority,
                min: 0,
                max: i64::from(RESERVED_MIN),
            };
            Self::log_rejection(&err);
            return Err(err);
        };
        rule.set_priority(new_priority);
        self.publish(&mut state)?;
        tracing::info!(rule_id, priority = new_priority, "custom rule re-prioritized");
        Ok(())
    }

    /// Removes a custom rule.
    ///
    /// # Errors
    ///
    /// `ImmutableRuleError` for system rules, `RuleNotFound` for unknown ids.
    pub fn remove_rule(&self, rule_id: &str) -> Result<(), PolicyError> {
        let mut state = self.lock_writer()?;
        Self::custom_mut(&mut state.rules, rule_id, "removed")?;
        state.rules.remove(rule_id);
        self.publish(&mut state)?;
        tracing::info!(rule_id, "custom rule removed");
        Ok(())
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        // The published Arc is replaced in a single assignment, so a
        // poisoned lock still guards a consistent snapshot.
        let guard = self.published.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Returns a copy of the rule with this id.
    #[must_use]
    pub fn get_rule(&self, rule_id: &str) -> Option<Rule> {
        self.snapshot().get(rule_id).cloned()
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().rules().len()
    }

    /// Returns true if no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts by type and by priority band.
    #[must_use]
    pub fn get_rule_stats(&self) -> RuleStats {
        let snapshot = self.snapshot();
        let mut by_type: BTreeMap<RuleType, usize> =
            RuleType::ALL.iter().map(|t| (*t, 0)).collect();
        let mut by_priority_band: BTreeMap<PriorityBand, usize> =
            [(PriorityBand::Custom, 0), (PriorityBand::Reserved, 0)].into_iter().collect();
        let mut enabled_rules = 0;
        let mut system_rules = 0;

        for rule in snapshot.rules() {
            *by_type.entry(rule.rule_type()).or_default() += 1;
            *by_priority_band.entry(PriorityBand::of(rule.priority())).or_default() += 1;
            if rule.is_enabled() {
                enabled_rules += 1;
            }
            if rule.is_immutable() {
                system_rules += 1;
            }
        }

        let total_rules = snapshot.rules().len();
        RuleStats {
            total_rules,
            enabled_rules,
            system_rules,
            custom_rules: total_rules - system_rules,
            by_type,
            by_priority_band,
            generation: snapshot.generation(),
            fingerprint: snapshot.fingerprint().to_string(),
        }
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, RegistryState>, PolicyError> {
        self.writer
            .lock()
            .map_err(|_| PolicyError::internal("registry writer lock poisoned"))
    }

    fn publish(&self, state: &mut RegistryState) -> Result<(), PolicyError> {
        let snapshot = RuleSnapshot::build(&state.rules, state.generation + 1)?;
        state.generation += 1;
        let mut guard = self.published.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
        Ok(())
    }

    fn insert_custom(
        rules: &mut BTreeMap<RuleId, RegisteredRule>,
        spec: &RuleSpec,
    ) -> Result<RuleId, PolicyError> {
        let rule = spec.validate(RESERVED_MIN)?;
        let rule_id = rule.rule_id().to_string();

        if rule.rule_type() == RuleType::Safety {
            return Err(PolicyError::malformed(
                rule_id,
                "rule_type",
                "SAFETY is reserved for system rules",
            ));
        }
        if rules.contains_key(&rule_id) {
            return Err(PolicyError::DuplicateRuleId { rule_id });
        }

        rules.insert(rule_id.clone(), RegisteredRule::Custom(CustomRule::new(rule)));
        Ok(rule_id)
    }

    fn custom_mut<'a>(
        rules: &'a mut BTreeMap<RuleId, RegisteredRule>,
        rule_id: &str,
        operation: &str,
    ) -> Result<&'a mut CustomRule, PolicyError> {
        match rules.get_mut(rule_id) {
            Some(RegisteredRule::Custom(rule)) => Ok(rule),
            Some(RegisteredRule::System(_)) => {
                let err = PolicyError::immutable(rule_id, operation);
                Self::log_rejection(&err);
                Err(err)
            }
            None => Err(PolicyError::RuleNotFound {
                rule_id: rule_id.to_string(),
            }),
        }
    }

    fn mutate_custom(
        &self,
        rule_id: &str,
        operation: &str,
        apply: impl FnOnce(&mut CustomRule),
    ) -> Result<(), PolicyError> {
        let mut state = self.lock_writer()?;
        let rule = Self::custom_mut(&mut state.rules, rule_id, operation)?;
        apply(rule);
        self.publish(&mut state)?;
        tracing::info!(rule_id, operation, "custom rule updated");
        Ok(())
    }

    fn log_rejection(err: &PolicyError) {
        if err.is_tamper_attempt() {
            tracing::warn!(kind = err.kind(), rule_id = err.rule_id(), "rejected tamper attempt: {err}");
        } else {
            tracing::debug!(kind = err.kind(), "rejected rule mutation: {err}");
        }
    }
}
