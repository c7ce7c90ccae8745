//! Call interception and capture coordination.
//!
//! This module holds everything an intercepted call runs through:
//!
//! - [`CaptureManager`]: owns the registry, dispatch table, hooks and sink, and implements the
//!   interception pattern in [`CaptureManager::intercept`]
//! - [`DispatchTable`]: the real entry points, resolved once and read without locking
//! - [`scope`]: per-thread reentrancy depth, scratch memory and thread ids
//! - [`ScratchMemory`]: recycled buffers for resolved argument copies and encoded records
//! - [`hook`]: prioritized observers of outermost calls
//! - [`instance`]: the optional process-wide manager slot with lazy initialization
//!
//! # Example
//!
//! ```rust,no_run
//! use std::borrow::Cow;
//! use capscope::capture::{CallReturn, CaptureManager, DispatchTable};
//! use capscope::format::{CallId, MemorySink};
//! use capscope::object::ObjectPtr;
//! use capscope::resolve::{Out, Value};
//! use capscope::settings::CaptureSettings;
//!
//! let dispatch = DispatchTable::builder()
//!     .entry(CallId::Close, |_: ObjectPtr, _: &[Cow<'_, Value>], _: &mut [Out]| {
//!         CallReturn::ok()
//!     })
//!     .build();
//! let sink = MemorySink::new();
//! let manager = CaptureManager::new(CaptureSettings::default(), dispatch, Box::new(sink.clone()));
//!
//! let result = manager.intercept(CallId::Close, None, &[], &mut []);
//! assert!(result.is_success());
//! assert_eq!(manager.stats().records_written, 1);
//! ```

mod dispatch;
pub mod hook;
pub mod instance;
mod manager;
pub mod scope;
mod scratch;

pub use dispatch::{
    CallReturn, DispatchTable, DispatchTableBuilder, EntryPoint, EntryPointSource, Status,
};
pub use hook::{
    CallMatcher, Hook, HookContext, HookManager, HookMatcher, HookPriority, InterfaceMatcher,
    RuntimeMatcher,
};
pub use manager::{CaptureManager, CaptureStats};
pub use scope::{CallScope, call_depth, thread_id, with_scratch};
pub use scratch::{ScratchMemory, DEFAULT_POOL_LIMIT};
