//! Hook registration and execution.

use std::cmp::Reverse;

use crate::capture::{
    hook::{core::Hook, types::HookContext},
    CallReturn,
};

/// Registered hooks, sorted by priority (highest first).
///
/// Unlike a dispatcher that picks one handler, every matching hook runs: hooks only observe,
/// so there is nothing to arbitrate. Hooks of equal priority run in registration order.
#[derive(Default)]
pub struct HookManager {
    hooks: Vec<Hook>,
}

impl HookManager {
    /// Creates a new, empty hook manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager holding the built-in bookkeeping hooks.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut manager = Self::new();
        for hook in crate::capture::hook::builtin::hooks() {
            manager.register(hook);
        }
        manager
    }

    /// Registers a hook.
    pub fn register(&mut self, hook: Hook) {
        self.hooks.push(hook);
        self.hooks.sort_by_key(|h| Reverse(h.priority()));
    }

    /// Removes every hook named `name`. Returns how many were removed.
    pub fn unregister(&mut self, name: &str) -> usize {
        let before = self.hooks.len();
        self.hooks.retain(|hook| hook.name() != name);
        before - self.hooks.len()
    }

    /// Runs the pre-hooks of every matching hook. Returns how many ran.
    pub fn run_pre(&self, context: &HookContext<'_>) -> usize {
        self.hooks
            .iter()
            .filter(|hook| hook.has_pre_hook() && hook.matches(context))
            .filter(|hook| hook.execute_pre(context))
            .count()
    }

    /// Runs the post-hooks of every matching hook. Returns how many ran.
    pub fn run_post(&self, context: &HookContext<'_>, result: &CallReturn) -> usize {
        self.hooks
            .iter()
            .filter(|hook| hook.has_post_hook() && hook.matches(context))
            .filter(|hook| hook.execute_post(context, result))
            .count()
    }

    /// Returns the number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Returns an iterator over all registered hooks, highest priority first.
    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.iter()
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("hook_count", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capture::HookPriority, format::CallId, object::ObjectRegistry};
    use std::sync::{Arc, Mutex};

    fn context(registry: &ObjectRegistry) -> HookContext<'_> {
        HookContext {
            call: CallId::Close,
            this: None,
            inputs: &[],
            outputs: &[],
            thread_id: 1,
            registry,
        }
    }

    #[test]
    fn test_hook_manager_empty() {
        let manager = HookManager::new();
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_hook_manager_priority_sorting() {
        let mut manager = HookManager::new();
        manager.register(
            Hook::new("low")
                .with_priority(HookPriority::LOW)
                .match_call(CallId::Close),
        );
        manager.register(
            Hook::new("high")
                .with_priority(HookPriority::HIGH)
                .match_call(CallId::Close),
        );
        manager.register(Hook::new("normal").match_call(CallId::Close));

        let names: Vec<_> = manager.iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["high", "normal", "low"]);
    }

    #[test]
    fn test_all_matching_hooks_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = HookManager::new();
        for (name, priority) in [("b", HookPriority::LOW), ("a", HookPriority::HIGH)] {
            let order = Arc::clone(&order);
            manager.register(
                Hook::new(name)
                    .with_priority(priority)
                    .match_call(CallId::Close)
                    .pre(move |_| order.lock().unwrap().push(name)),
            );
        }
        manager.register(Hook::new("other").match_call(CallId::Reset).pre(|_| {
            panic!("must not run");
        }));

        let registry = ObjectRegistry::new();
        assert_eq!(manager.run_pre(&context(&registry)), 2);
        assert_eq!(manager.run_post(&context(&registry), &CallReturn::ok()), 0);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_unregister() {
        let mut manager = HookManager::with_builtin();
        let builtin = manager.len();
        assert!(builtin > 0);
        manager.register(Hook::new("mine").match_call(CallId::Close));
        assert_eq!(manager.unregister("mine"), 1);
        assert_eq!(manager.len(), builtin);
    }
}
