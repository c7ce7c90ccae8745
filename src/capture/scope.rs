//! Per-thread call scope tracking.
//!
//! Every intercepted entry point enters a call scope. Only the outermost scope on a thread
//! runs hooks, resolves arguments and encodes the call; scopes entered while a forwarded call
//! is still executing (the driver calling back into the API, or the API implementing one entry
//! point on top of another) forward straight to the driver.
//!
//! The depth counter, the thread's [`ScratchMemory`] and the thread's capture-local id all live
//! in thread-local storage and are never shared.

use std::{
    cell::{Cell, RefCell},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::capture::ScratchMemory;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CALL_DEPTH: Cell<u32> = const { Cell::new(0) };
    static SCRATCH: RefCell<ScratchMemory> = RefCell::new(ScratchMemory::default());
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Increments the calling thread's call depth and returns the new depth.
///
/// A result of `1` means the caller is the outermost intercepted call.
pub fn increment_call_scope() -> u32 {
    CALL_DEPTH.with(|depth| {
        let next = depth.get().saturating_add(1);
        depth.set(next);
        next
    })
}

/// Decrements the calling thread's call depth and returns the new depth.
///
/// Never goes below zero.
pub fn decrement_call_scope() -> u32 {
    CALL_DEPTH.with(|depth| {
        let next = depth.get().saturating_sub(1);
        depth.set(next);
        next
    })
}

/// Current call depth of the calling thread.
#[must_use]
pub fn call_depth() -> u32 {
    CALL_DEPTH.with(Cell::get)
}

/// Process-unique id of the calling thread, assigned on first use starting at `1`.
#[must_use]
pub fn thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// Runs `f` with the calling thread's scratch memory.
///
/// If the scratch memory is already borrowed further up the stack, `f` receives a temporary
/// instance instead, so a callback that reaches this point cannot panic.
pub fn with_scratch<R>(f: impl FnOnce(&mut ScratchMemory) -> R) -> R {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut scratch) => f(&mut scratch),
        Err(_) => f(&mut ScratchMemory::default()),
    })
}

/// RAII call scope.
///
/// Entering increments the thread's depth; dropping decrements it, also while unwinding.
#[derive(Debug)]
pub struct CallScope {
    depth: u32,
}

impl CallScope {
    /// Enters a call scope on the calling thread.
    #[must_use]
    pub fn enter() -> Self {
        Self {
            depth: increment_call_scope(),
        }
    }

    /// Depth of this scope, `1` for the outermost.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns `true` for the outermost scope on this thread.
    #[must_use]
    pub fn is_outermost(&self) -> bool {
        self.depth == 1
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        decrement_call_scope();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_nested_scopes() {
        let outer = CallScope::enter();
        assert!(outer.is_outermost());
        {
            let inner = CallScope::enter();
            assert_eq!(inner.depth(), 2);
            assert!(!inner.is_outermost());
        }
        assert_eq!(call_depth(), 1);
        drop(outer);
        assert_eq!(call_depth(), 0);
    }

    #[test]
    fn test_decrement_never_underflows() {
        assert_eq!(call_depth(), 0);
        assert_eq!(decrement_call_scope(), 0);
        assert_eq!(increment_call_scope(), 1);
        assert_eq!(decrement_call_scope(), 0);
    }

    #[test]
    fn test_depth_is_per_thread() {
        let _scope = CallScope::enter();
        let other = thread::spawn(|| {
            let scope = CallScope::enter();
            scope.is_outermost()
        })
        .join()
        .unwrap();
        assert!(other);
    }

    #[test]
    fn test_thread_ids_are_distinct_and_stable() {
        let mine = thread_id();
        assert_eq!(mine, thread_id());
        assert_ne!(mine, 0);
        let theirs = thread::spawn(thread_id).join().unwrap();
        assert_ne!(mine, theirs);
    }

    #[test]
    fn test_reentrant_scratch_access_does_not_panic() {
        let nested = with_scratch(|outer| {
            outer.alloc_values(1);
            with_scratch(|inner| inner.allocations())
        });
        assert_eq!(nested, 0);
    }
}
