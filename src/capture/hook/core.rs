//! Hook definition and builder.

use std::sync::Arc;

use crate::{
    capture::{
        hook::{
            matcher::{CallMatcher, HookMatcher, InterfaceMatcher, RuntimeMatcher},
            types::{HookContext, HookPriority, PostHookFn, PreHookFn},
        },
        CallReturn,
    },
    format::CallId,
    object::InterfaceKind,
};

/// An observer attached to intercepted calls.
///
/// Hooks combine matchers (which calls) with handlers (what to observe). They run only for
/// outermost calls and can never change the status, return value or out-parameters the
/// application receives.
///
/// ```rust,no_run
/// use capscope::capture::{Hook, HookPriority};
/// use capscope::format::CallId;
///
/// let hook = Hook::new("count-submits")
///     .with_priority(HookPriority::HIGH)
///     .match_call(CallId::ExecuteCommandLists)
///     .post(|ctx, ret| {
///         println!("{} lists submitted: {}", ctx.inputs.len(), ret.status);
///     });
/// ```
///
/// A hook with no matchers never matches.
pub struct Hook {
    name: String,
    priority: HookPriority,
    matchers: Vec<Box<dyn HookMatcher>>,
    pre_hook: Option<PreHookFn>,
    post_hook: Option<PostHookFn>,
}

impl Hook {
    /// Creates a new hook with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: HookPriority::NORMAL,
            matchers: Vec::new(),
            pre_hook: None,
            post_hook: None,
        }
    }

    /// Returns the hook's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hook's priority.
    #[must_use]
    pub fn priority(&self) -> HookPriority {
        self.priority
    }

    /// Sets the hook's priority. Higher priority hooks run first.
    #[must_use]
    pub fn with_priority(mut self, priority: HookPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a custom matcher.
    #[must_use]
    pub fn add_matcher<M: HookMatcher + 'static>(mut self, matcher: M) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// Matches one operation.
    #[must_use]
    pub fn match_call(self, call: CallId) -> Self {
        self.add_matcher(CallMatcher::new([call]))
    }

    /// Matches any of several operations.
    #[must_use]
    pub fn match_calls(self, calls: impl IntoIterator<Item = CallId>) -> Self {
        self.add_matcher(CallMatcher::new(calls))
    }

    /// Matches calls on objects that are or extend `kind`.
    #[must_use]
    pub fn match_interface(self, kind: InterfaceKind) -> Self {
        self.add_matcher(InterfaceMatcher::new(kind))
    }

    /// Matches with a predicate over the call context.
    #[must_use]
    pub fn match_runtime<F>(self, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_matcher(RuntimeMatcher::new(description, predicate))
    }

    /// Sets the handler run before the call is forwarded.
    #[must_use]
    pub fn pre<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HookContext<'_>) + Send + Sync + 'static,
    {
        self.pre_hook = Some(Arc::new(handler));
        self
    }

    /// Sets the handler run after the call returned and its outputs were wrapped.
    #[must_use]
    pub fn post<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HookContext<'_>, &CallReturn) + Send + Sync + 'static,
    {
        self.post_hook = Some(Arc::new(handler));
        self
    }

    /// Checks if all matchers match the given context.
    pub fn matches(&self, context: &HookContext<'_>) -> bool {
        if self.matchers.is_empty() {
            return false;
        }
        self.matchers.iter().all(|m| m.matches(context))
    }

    /// Runs the pre-hook if present. Returns `true` if it ran.
    pub fn execute_pre(&self, context: &HookContext<'_>) -> bool {
        self.pre_hook.as_ref().map(|hook| hook(context)).is_some()
    }

    /// Runs the post-hook if present. Returns `true` if it ran.
    pub fn execute_post(&self, context: &HookContext<'_>, result: &CallReturn) -> bool {
        self.post_hook
            .as_ref()
            .map(|hook| hook(context, result))
            .is_some()
    }

    /// Returns true if this hook has a pre-hook handler.
    #[must_use]
    pub fn has_pre_hook(&self) -> bool {
        self.pre_hook.is_some()
    }

    /// Returns true if this hook has a post-hook handler.
    #[must_use]
    pub fn has_post_hook(&self) -> bool {
        self.post_hook.is_some()
    }

    /// Descriptions of all matchers.
    #[must_use]
    pub fn describe_matchers(&self) -> Vec<String> {
        self.matchers.iter().map(|m| m.description()).collect()
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("matcher_count", &self.matchers.len())
            .field("has_pre_hook", &self.pre_hook.is_some())
            .field("has_post_hook", &self.post_hook.is_some())
            .finish()
    }
}
