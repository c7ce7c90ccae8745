//! The wrapper record shared by every intercepted interface.
//!
//! A [`Wrapper`] stands in for one interface view of one real object. The application only
//! ever sees the wrapper's own address ([`Wrapper::ptr`]); the real reference stays inside the
//! record and is recovered in O(1) when a call is forwarded.
//!
//! Wrappers carry their own application reference count. It starts at one when a call first
//! hands the object out, grows every time the same object is handed out again and shrinks on
//! `Release`. When it reaches zero the registry destroys the wrapper: the map entry is removed
//! synchronously and the destroy callback runs.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Mutex, PoisonError,
};

use crate::object::{CaptureId, HandlePool, InterfaceId, InterfaceKind, ObjectPtr};

/// Callback invoked once when a wrapper is destroyed.
pub type DestroyCallback = Box<dyn FnOnce(&WrapperRecord) + Send>;

/// Identity information held by a wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrapperRecord {
    /// The real object. Not owned; the wrapper forwards reference counting to the driver.
    pub real: ObjectPtr,
    /// Capture identity shared by all wrappers of the same real object.
    pub capture_id: CaptureId,
    /// Interface type this wrapper presents.
    pub kind: InterfaceKind,
    /// Interface identifier the application requested.
    pub riid: InterfaceId,
}

/// A live wrapper.
pub struct Wrapper {
    record: WrapperRecord,
    app_refs: AtomicU32,
    destroyed: AtomicBool,
    extent: AtomicU64,
    handle_ranges: Mutex<Vec<(HandlePool, u64)>>,
    on_destroy: Mutex<Option<DestroyCallback>>,
}

impl Wrapper {
    pub(crate) fn new(record: WrapperRecord) -> Self {
        Self {
            record,
            app_refs: AtomicU32::new(1),
            destroyed: AtomicBool::new(false),
            extent: AtomicU64::new(0),
            handle_ranges: Mutex::new(Vec::new()),
            on_destroy: Mutex::new(None),
        }
    }

    /// The address the application holds in place of the real object.
    #[must_use]
    pub fn ptr(&self) -> ObjectPtr {
        ObjectPtr::from_ref(self)
    }

    /// Returns the real object reference.
    #[must_use]
    pub fn real(&self) -> ObjectPtr {
        self.record.real
    }

    /// Returns the capture identity.
    #[must_use]
    pub fn capture_id(&self) -> CaptureId {
        self.record.capture_id
    }

    /// Returns the interface kind this wrapper presents.
    #[must_use]
    pub fn kind(&self) -> InterfaceKind {
        self.record.kind
    }

    /// Returns the identity record.
    #[must_use]
    pub fn record(&self) -> &WrapperRecord {
        &self.record
    }

    /// Current application reference count.
    #[must_use]
    pub fn app_refs(&self) -> u32 {
        self.app_refs.load(Ordering::Acquire)
    }

    /// Returns `true` once the registry destroyed this wrapper.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Size of the object's addressable range in bytes, `0` when unknown.
    #[must_use]
    pub fn extent(&self) -> u64 {
        self.extent.load(Ordering::Relaxed)
    }

    /// Records the size of the object's addressable range.
    pub fn set_extent(&self, extent: u64) {
        self.extent.store(extent, Ordering::Relaxed);
    }

    /// Installs the callback run when this wrapper is destroyed, replacing any previous one.
    pub fn set_destroy_callback(&self, callback: DestroyCallback) {
        *self
            .on_destroy
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub(crate) fn add_app_ref(&self) -> u32 {
        self.app_refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops one application reference and returns the remaining count.
    ///
    /// Saturates at zero so an over-released wrapper is destroyed exactly once.
    pub(crate) fn release_app_ref(&self) -> u32 {
        let previous = self
            .app_refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
                Some(refs.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Marks the wrapper destroyed; returns `false` if it already was.
    pub(crate) fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn track_handle_range(&self, pool: HandlePool, app_base: u64) {
        let mut ranges = self
            .handle_ranges
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !ranges.contains(&(pool, app_base)) {
            ranges.push((pool, app_base));
        }
    }

    pub(crate) fn take_handle_ranges(&self) -> Vec<(HandlePool, u64)> {
        std::mem::take(
            &mut *self
                .handle_ranges
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    pub(crate) fn run_destroy_callback(&self) {
        let callback = self
            .on_destroy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback(&self.record);
        }
    }
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapper")
            .field("ptr", &self.ptr())
            .field("record", &self.record)
            .field("app_refs", &self.app_refs())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{atomic::AtomicUsize, Arc};

    fn record() -> WrapperRecord {
        WrapperRecord {
            real: ObjectPtr::new(0x1000),
            capture_id: CaptureId::from_raw(1),
            kind: InterfaceKind::Fence,
            riid: InterfaceKind::Fence.iid(),
        }
    }

    #[test]
    fn test_ptr_is_distinct_from_real() {
        let wrapper = Wrapper::new(record());
        assert_ne!(wrapper.ptr(), wrapper.real());
        assert!(!wrapper.ptr().is_null());
    }

    #[test]
    fn test_app_refs_saturate() {
        let wrapper = Wrapper::new(record());
        assert_eq!(wrapper.add_app_ref(), 2);
        assert_eq!(wrapper.release_app_ref(), 1);
        assert_eq!(wrapper.release_app_ref(), 0);
        assert_eq!(wrapper.release_app_ref(), 0);
    }

    #[test]
    fn test_destroy_callback_runs_once() {
        let wrapper = Wrapper::new(record());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        wrapper.set_destroy_callback(Box::new(move |rec| {
            assert_eq!(rec.capture_id, CaptureId::from_raw(1));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        wrapper.run_destroy_callback();
        wrapper.run_destroy_callback();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mark_destroyed_once() {
        let wrapper = Wrapper::new(record());
        assert!(wrapper.mark_destroyed());
        assert!(!wrapper.mark_destroyed());
        assert!(wrapper.is_destroyed());
    }

    #[test]
    fn test_handle_ranges_deduplicated() {
        let wrapper = Wrapper::new(record());
        wrapper.track_handle_range(HandlePool::GpuVirtualAddress, 0x1000);
        wrapper.track_handle_range(HandlePool::GpuVirtualAddress, 0x1000);
        assert_eq!(wrapper.take_handle_ranges().len(), 1);
        assert!(wrapper.take_handle_ranges().is_empty());
    }
}
