//! Matcher trait and implementations for hook matching.
//!
//! | Matcher | Description |
//! |---------|-------------|
//! | [`CallMatcher`] | Match one or more operations |
//! | [`InterfaceMatcher`] | Match calls on objects that are-a given interface |
//! | [`RuntimeMatcher`] | Match by inspecting the call context |
//!
//! All matchers on a hook must match (AND semantics).

use std::sync::Arc;

use crate::{
    capture::hook::types::HookContext,
    format::CallId,
    object::InterfaceKind,
};

/// Type alias for runtime matcher predicates.
pub type RuntimePredicate = dyn Fn(&HookContext<'_>) -> bool + Send + Sync;

/// A single matching criterion.
pub trait HookMatcher: Send + Sync {
    /// Returns `true` if the call described by `context` matches.
    fn matches(&self, context: &HookContext<'_>) -> bool;

    /// Human-readable description for debugging.
    fn description(&self) -> String;
}

/// Matches a fixed set of operations.
#[derive(Clone, Debug)]
pub struct CallMatcher {
    calls: Vec<CallId>,
}

impl CallMatcher {
    /// Matches any of `calls`.
    #[must_use]
    pub fn new(calls: impl IntoIterator<Item = CallId>) -> Self {
        Self {
            calls: calls.into_iter().collect(),
        }
    }
}

impl HookMatcher for CallMatcher {
    fn matches(&self, context: &HookContext<'_>) -> bool {
        self.calls.contains(&context.call)
    }

    fn description(&self) -> String {
        let names: Vec<_> = self.calls.iter().map(|call| call.name()).collect();
        format!("call in [{}]", names.join(", "))
    }
}

/// Matches calls whose `this` is-a given interface.
///
/// Never matches free functions.
#[derive(Clone, Copy, Debug)]
pub struct InterfaceMatcher {
    kind: InterfaceKind,
}

impl InterfaceMatcher {
    /// Matches calls on objects that are or extend `kind`.
    #[must_use]
    pub fn new(kind: InterfaceKind) -> Self {
        Self { kind }
    }
}

impl HookMatcher for InterfaceMatcher {
    fn matches(&self, context: &HookContext<'_>) -> bool {
        context.kind().is_some_and(|kind| kind.is_a(self.kind))
    }

    fn description(&self) -> String {
        format!("this is-a {}", self.kind.name())
    }
}

/// Matches with an arbitrary predicate.
#[derive(Clone)]
pub struct RuntimeMatcher {
    description: String,
    predicate: Arc<RuntimePredicate>,
}

impl RuntimeMatcher {
    /// Creates a matcher from a predicate.
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl HookMatcher for RuntimeMatcher {
    fn matches(&self, context: &HookContext<'_>) -> bool {
        (self.predicate)(context)
    }

    fn description(&self) -> String {
        format!("runtime: {}", self.description)
    }
}

impl std::fmt::Debug for RuntimeMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeMatcher")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
