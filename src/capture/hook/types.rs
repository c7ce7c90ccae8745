//! Core types for the hook system.
//!
//! - [`HookPriority`]: order in which hooks run
//! - [`HookContext`]: the intercepted call as hooks see it
//! - [`PreHookFn`] / [`PostHookFn`]: handler closures

use std::sync::Arc;

use crate::{
    capture::CallReturn,
    format::CallId,
    object::{InterfaceKind, ObjectRegistry, Wrapper},
    resolve::{Out, Value},
};

/// Priority level for hooks, controlling execution order.
///
/// Higher priority hooks run first.
///
/// | Constant | Value |
/// |----------|-------|
/// | [`HIGHEST`](Self::HIGHEST) | 1000 |
/// | [`HIGH`](Self::HIGH) | 500 |
/// | [`NORMAL`](Self::NORMAL) | 0 |
/// | [`LOW`](Self::LOW) | -500 |
/// | [`LOWEST`](Self::LOWEST) | -1000 |
///
/// ```rust,no_run
/// use capscope::capture::HookPriority;
///
/// assert!(HookPriority::HIGHEST > HookPriority::HIGH);
/// let between = HookPriority(750);
/// assert!(between > HookPriority::HIGH);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookPriority(pub i32);

impl HookPriority {
    /// Highest priority (value: 1000).
    pub const HIGHEST: Self = Self(1000);

    /// High priority (value: 500).
    pub const HIGH: Self = Self(500);

    /// Normal priority, the default (value: 0).
    pub const NORMAL: Self = Self(0);

    /// Low priority (value: -500).
    pub const LOW: Self = Self(-500);

    /// Lowest priority (value: -1000).
    ///
    /// Built-in bookkeeping hooks run here, after every user hook.
    pub const LOWEST: Self = Self(-1000);
}

impl Default for HookPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// The intercepted call as seen by hooks.
///
/// Only outermost calls reach hooks. Inputs are the arguments exactly as the application
/// passed them; outputs are the slots before the call (pre-hooks) or after wrapping
/// (post-hooks).
pub struct HookContext<'a> {
    /// The operation.
    pub call: CallId,
    /// The wrapper the method was invoked on, `None` for free functions.
    pub this: Option<&'a Arc<Wrapper>>,
    /// Inputs as supplied by the application.
    pub inputs: &'a [Value],
    /// Out-parameter slots.
    pub outputs: &'a [Out],
    /// Capture-local id of the calling thread.
    pub thread_id: u64,
    /// The registry, for looking up wrappers and registering handle ranges.
    pub registry: &'a ObjectRegistry,
}

impl HookContext<'_> {
    /// Interface kind of `this`, `None` for free functions.
    #[must_use]
    pub fn kind(&self) -> Option<InterfaceKind> {
        self.this.map(|wrapper| wrapper.kind())
    }
}

impl std::fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookContext")
            .field("call", &self.call)
            .field("this", &self.this.map(|wrapper| wrapper.capture_id()))
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

/// Handler run before the call is forwarded.
pub type PreHookFn = Arc<dyn Fn(&HookContext<'_>) + Send + Sync>;

/// Handler run after the call returned, with its result.
pub type PostHookFn = Arc<dyn Fn(&HookContext<'_>, &CallReturn) + Send + Sync>;
