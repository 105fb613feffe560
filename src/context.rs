//! Decision context supplied by the orchestrator.
//!
//! A [`Context`] is an immutable snapshot of the facts relevant to one
//! decision. It is owned by the caller; the engine only borrows it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Immutable snapshot of task/situation facts.
///
/// Facts are kept in a `BTreeMap` so every rendering of a context (proof
/// lines, audit records) is independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Free-form description of the task, forwarded to the neural advisor.
    #[serde(default)]
    task_description: String,

    /// Named facts.
    #[serde(default)]
    facts: BTreeMap<String, Value>,
}

impl Context {
    /// Starts building a context.
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Looks up a fact by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }

    /// Returns true if the fact is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.facts.contains_key(key)
    }

    /// Task description handed to the advisor.
    #[must_use]
    pub fn task_description(&self) -> &str {
        &self.task_description
    }

    /// Iterates facts in key order.
    pub fn facts(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if the context carries no facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Builder for [`Context`].
///
/// # Example
/// ```
/// use agentgate::Context;
///
/// let ctx = Context::builder()
///     .task("remove stale build artifacts")
///     .fact("action_type", "delete")
///     .fact("has_backup", false)
///     .build();
///
/// assert_eq!(ctx.get("has_backup").and_then(|v| v.as_bool()), Some(false));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    task_description: String,
    facts: BTreeMap<String, Value>,
}

impl ContextBuilder {
    /// Sets the task description.
    #[must_use]
    pub fn task(mut self, description: impl Into<String>) -> Self {
        self.task_description = description.into();
        self
    }

    /// Adds (or replaces) a fact.
    #[must_use]
    pub fn fact(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.facts.insert(key.into(), value.into());
        self
    }

    /// Freezes the context.
    #[must_use]
    pub fn build(self) -> Context {
        Context {
            task_description: self.task_description,
            facts: self.facts,
        }
    }
}
