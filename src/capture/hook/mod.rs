//! Observers for intercepted calls.
//!
//! A [`Hook`] pairs matchers with pre- and post-call handlers. The [`HookManager`] keeps hooks
//! sorted by [`HookPriority`] and runs every matching one for each outermost call:
//!
//! ```text
//! outermost call
//!   ├─ pre-hooks (highest priority first)
//!   ├─ unwrap inputs, forward, wrap outputs
//!   ├─ builtin range hooks
//!   ├─ encode
//!   └─ post-hooks (highest priority first)
//! ```
//!
//! Hooks only observe. They receive shared references to the call's arguments and result and
//! cannot alter what the application sees. The capture manager runs the [`builtin`] hooks,
//! which register pool handle ranges, ahead of encoding so a call's own record can already
//! express the handles it returned relative to their owner.
//!
//! # Example
//!
//! ```rust,no_run
//! use capscope::capture::{Hook, HookManager};
//! use capscope::format::CallId;
//! use capscope::object::InterfaceKind;
//!
//! let mut hooks = HookManager::new();
//! hooks.register(
//!     Hook::new("fence-signals")
//!         .match_call(CallId::Signal)
//!         .match_interface(InterfaceKind::CommandQueue)
//!         .pre(|ctx| log::info!("signal on thread {}", ctx.thread_id)),
//! );
//! ```

pub mod builtin;
mod core;
mod manager;
mod matcher;
mod types;

pub use core::Hook;
pub use manager::HookManager;
pub use matcher::{CallMatcher, HookMatcher, InterfaceMatcher, RuntimeMatcher, RuntimePredicate};
pub use types::{HookContext, HookPriority, PostHookFn, PreHookFn};
