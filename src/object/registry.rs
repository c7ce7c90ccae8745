//! Object identity registry.
//!
//! The registry answers two questions in O(1): "is this real object already wrapped as this
//! interface type?" and "which real object does this wrapper stand for?". State is split so
//! unrelated traffic does not contend:
//!
//! - one shard per [`InterfaceKind`], each a `Mutex<HashMap<real, Arc<Wrapper>>>`. Wrapping,
//!   finding and removing lock exactly one shard.
//! - a [`DashMap`] from real object to its [`CaptureId`], shared by all shards so that
//!   wrapping the same object under different interfaces yields the same identifier.
//! - a [`DashMap`] from wrapper address to wrapper, used to unwrap references the application
//!   passes back in.
//! - a [`HandleTable`] for pool-relative handles.
//!
//! Lock order is always shard, then the identifier map. The trace sink is never touched while a
//! shard lock is held.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use dashmap::{mapref::entry::Entry, DashMap};
use strum::{EnumCount, IntoEnumIterator};

use crate::{
    object::{
        CaptureId, CaptureIdAllocator, HandlePool, HandleRange, HandleTable, InterfaceId,
        InterfaceKind, ObjectPtr, Wrapper, WrapperRecord,
    },
    Error, Result,
};

type Shard = Mutex<HashMap<ObjectPtr, Arc<Wrapper>>>;

#[derive(Debug, Clone, Copy)]
struct IdEntry {
    id: CaptureId,
    live_wrappers: usize,
}

/// The result of a successful [`ObjectRegistry::wrap`].
#[derive(Debug, Clone)]
pub struct WrapOutcome {
    /// The wrapper now standing for the real object.
    pub wrapper: Arc<Wrapper>,
    /// `true` if this call created the wrapper, `false` if it already existed.
    pub created: bool,
}

/// Point-in-time registry counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Wrappers currently registered across all shards.
    pub live_wrappers: usize,
    /// Real objects that currently own a capture identifier.
    pub tracked_objects: usize,
    /// Capture identifiers issued since the registry was created.
    pub ids_issued: u64,
}

/// Sharded map from real objects to their wrappers and capture identities.
#[derive(Debug)]
pub struct ObjectRegistry {
    shards: [Shard; InterfaceKind::COUNT],
    ids: DashMap<ObjectPtr, IdEntry>,
    wrappers: DashMap<ObjectPtr, Weak<Wrapper>>,
    handles: HandleTable,
    allocator: CaptureIdAllocator,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: std::array::from_fn(|_| Mutex::new(HashMap::new())),
            ids: DashMap::new(),
            wrappers: DashMap::new(),
            handles: HandleTable::new(),
            allocator: CaptureIdAllocator::new(),
        }
    }

    // A poisoned shard still holds consistent data: every mutation is a single insert or
    // remove. Recover the guard instead of failing the host call.
    fn shard(&self, kind: InterfaceKind) -> MutexGuard<'_, HashMap<ObjectPtr, Arc<Wrapper>>> {
        self.shards[kind as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the wrapper registered for `real` as `kind`, if any.
    #[must_use]
    pub fn find_wrapper(&self, real: ObjectPtr, kind: InterfaceKind) -> Option<Arc<Wrapper>> {
        self.shard(kind).get(&real).cloned()
    }

    /// Wraps `real` as the interface identified by `riid`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedInterface`] if no wrapper type exists for `riid`. Callers
    /// inside an intercepted call treat this as "leave the reference raw".
    pub fn wrap(&self, real: ObjectPtr, riid: &InterfaceId) -> Result<WrapOutcome> {
        let kind = InterfaceKind::from_iid(riid).ok_or(Error::UnsupportedInterface(*riid))?;
        Ok(self.wrap_as(real, kind, *riid))
    }

    /// Wraps `real` as `kind`, returning the existing wrapper if there is one.
    ///
    /// Wrapping is atomic with respect to concurrent wraps of the same object: the shard lock
    /// is held from lookup to insert, so the first thread in creates the wrapper and every
    /// other thread observes it. Handing out an existing wrapper again counts as one more
    /// application reference, matching the reference the real call added.
    ///
    /// The first wrap of a real object under any kind assigns its capture identifier; later
    /// wraps under other kinds share it.
    pub fn wrap_as(&self, real: ObjectPtr, kind: InterfaceKind, riid: InterfaceId) -> WrapOutcome {
        let mut shard = self.shard(kind);
        if let Some(existing) = shard.get(&real) {
            existing.add_app_ref();
            return WrapOutcome {
                wrapper: Arc::clone(existing),
                created: false,
            };
        }

        let capture_id = {
            let mut entry = self.ids.entry(real).or_insert_with(|| IdEntry {
                id: self.allocator.allocate(),
                live_wrappers: 0,
            });
            entry.live_wrappers += 1;
            entry.id
        };

        let wrapper = Arc::new(Wrapper::new(WrapperRecord {
            real,
            capture_id,
            kind,
            riid,
        }));
        self.wrappers.insert(wrapper.ptr(), Arc::downgrade(&wrapper));
        shard.insert(real, Arc::clone(&wrapper));

        WrapOutcome {
            wrapper,
            created: true,
        }
    }

    /// Erases the entry for `real` as `kind`.
    ///
    /// The capture identifier association is dropped when the last wrapper of the object goes
    /// away; the numeric value is never handed out again. Pool handle ranges owned by the
    /// wrapper are unregistered.
    pub fn remove(&self, real: ObjectPtr, kind: InterfaceKind) -> Option<Arc<Wrapper>> {
        let removed = {
            let mut shard = self.shard(kind);
            let removed = shard.remove(&real)?;
            self.release_id(real);
            removed
        };
        self.forget(&removed);
        Some(removed)
    }

    /// Destroys `wrapper`: removes its entry, drops its handle ranges and runs its destroy
    /// callback. Does nothing if the wrapper was already destroyed.
    pub fn destroy(&self, wrapper: &Arc<Wrapper>) {
        let removed = {
            let mut shard = self.shard(wrapper.kind());
            if !wrapper.mark_destroyed() {
                return;
            }
            self.take_entry(&mut shard, wrapper)
        };
        self.finish_destroy(wrapper, removed);
    }

    /// Drops one application reference to `wrapper` and destroys it when that was the last.
    ///
    /// The count is decremented under the same lock [`ObjectRegistry::wrap_as`] takes to hand
    /// out an existing wrapper, so a wrapper is never returned and destroyed at once. Returns
    /// the remaining application reference count.
    pub fn release(&self, wrapper: &Arc<Wrapper>) -> u32 {
        let removed = {
            let mut shard = self.shard(wrapper.kind());
            let remaining = wrapper.release_app_ref();
            if remaining > 0 || !wrapper.mark_destroyed() {
                return remaining;
            }
            self.take_entry(&mut shard, wrapper)
        };
        self.finish_destroy(wrapper, removed);
        0
    }

    fn take_entry(
        &self,
        shard: &mut HashMap<ObjectPtr, Arc<Wrapper>>,
        wrapper: &Arc<Wrapper>,
    ) -> Option<Arc<Wrapper>> {
        match shard.get(&wrapper.real()) {
            Some(current) if Arc::ptr_eq(current, wrapper) => {
                let removed = shard.remove(&wrapper.real());
                self.release_id(wrapper.real());
                removed
            }
            _ => None,
        }
    }

    fn finish_destroy(&self, wrapper: &Arc<Wrapper>, removed: Option<Arc<Wrapper>>) {
        self.forget(wrapper);
        drop(removed);

        log::debug!(
            "destroyed {} wrapper {} for {}",
            wrapper.kind().name(),
            wrapper.capture_id(),
            wrapper.real()
        );
        wrapper.run_destroy_callback();
    }

    fn release_id(&self, real: ObjectPtr) {
        if let Entry::Occupied(mut entry) = self.ids.entry(real) {
            let state = entry.get_mut();
            state.live_wrappers = state.live_wrappers.saturating_sub(1);
            if state.live_wrappers == 0 {
                entry.remove();
            }
        }
    }

    fn forget(&self, wrapper: &Wrapper) {
        self.wrappers.remove(&wrapper.ptr());
        for (pool, app_base) in wrapper.take_handle_ranges() {
            self.handles.remove(pool, app_base, wrapper.capture_id());
        }
    }

    /// Looks up the live wrapper whose application-visible address is `ptr`.
    #[must_use]
    pub fn lookup(&self, ptr: ObjectPtr) -> Option<Arc<Wrapper>> {
        if ptr.is_null() {
            return None;
        }
        self.wrappers.get(&ptr).and_then(|weak| weak.upgrade())
    }

    /// Returns the real reference behind `ptr`, or `ptr` unchanged when it is not a wrapper.
    #[must_use]
    pub fn unwrap_ptr(&self, ptr: ObjectPtr) -> ObjectPtr {
        self.lookup(ptr).map_or(ptr, |wrapper| wrapper.real())
    }

    /// Returns the capture identifier of the wrapper at `ptr`, or [`CaptureId::NULL`] for null
    /// and unwrapped references.
    #[must_use]
    pub fn capture_id_of(&self, ptr: ObjectPtr) -> CaptureId {
        self.lookup(ptr)
            .map_or(CaptureId::NULL, |wrapper| wrapper.capture_id())
    }

    /// Returns the capture identifier currently associated with a real object.
    #[must_use]
    pub fn capture_id_of_real(&self, real: ObjectPtr) -> Option<CaptureId> {
        self.ids.get(&real).map(|entry| entry.id)
    }

    /// Registers a pool handle range owned by `owner`.
    pub fn register_handle_range(
        &self,
        owner: &Wrapper,
        pool: HandlePool,
        app_base: u64,
        real_base: u64,
        len: Option<u64>,
    ) {
        if app_base == 0 || owner.is_destroyed() {
            return;
        }
        self.handles.insert(
            pool,
            HandleRange {
                app_base,
                real_base,
                len,
                owner: owner.capture_id(),
            },
        );
        owner.track_handle_range(pool, app_base);
    }

    /// Returns the pool handle table.
    #[must_use]
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Number of wrappers registered as `kind`.
    #[must_use]
    pub fn shard_len(&self, kind: InterfaceKind) -> usize {
        self.shard(kind).len()
    }

    /// Returns point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live_wrappers: InterfaceKind::iter().map(|kind| self.shard_len(kind)).sum(),
            tracked_objects: self.ids.len(),
            ids_issued: self.allocator.issued(),
        }
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Barrier,
        },
        thread,
    };
    use uguid::guid;

    use crate::object::Handle;

    const REAL_A: ObjectPtr = ObjectPtr::new(0x1000);
    const REAL_B: ObjectPtr = ObjectPtr::new(0x2000);

    #[test]
    fn test_wrap_same_kind_returns_same_instance() {
        let registry = ObjectRegistry::new();
        let first = registry.wrap_as(REAL_A, InterfaceKind::Device, InterfaceKind::Device.iid());
        let second = registry.wrap_as(REAL_A, InterfaceKind::Device, InterfaceKind::Device.iid());

        assert!(first.created);
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.wrapper, &second.wrapper));
        assert_eq!(first.wrapper.app_refs(), 2);
        assert_eq!(registry.shard_len(InterfaceKind::Device), 1);
    }

    #[test]
    fn test_wrap_other_kind_shares_capture_id() {
        let registry = ObjectRegistry::new();
        let device = registry
            .wrap(REAL_A, &InterfaceKind::Device.iid())
            .unwrap()
            .wrapper;
        let device1 = registry
            .wrap(REAL_A, &InterfaceKind::Device1.iid())
            .unwrap()
            .wrapper;

        assert!(!Arc::ptr_eq(&device, &device1));
        assert_eq!(device.capture_id(), device1.capture_id());
        assert_eq!(registry.stats().ids_issued, 1);
        assert_eq!(registry.stats().live_wrappers, 2);
    }

    #[test]
    fn test_wrap_unsupported_interface() {
        let registry = ObjectRegistry::new();
        let iid = guid!("12345678-1234-1234-1234-123456789abc");
        assert!(matches!(
            registry.wrap(REAL_A, &iid),
            Err(Error::UnsupportedInterface(found)) if found == iid
        ));
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn test_unwrap_roundtrip() {
        let registry = ObjectRegistry::new();
        let wrapper = registry
            .wrap_as(REAL_A, InterfaceKind::Resource, InterfaceKind::Resource.iid())
            .wrapper;

        assert_eq!(registry.unwrap_ptr(wrapper.ptr()), REAL_A);
        assert_eq!(registry.unwrap_ptr(REAL_B), REAL_B);
        assert_eq!(registry.unwrap_ptr(ObjectPtr::NULL), ObjectPtr::NULL);
        assert_eq!(registry.capture_id_of(wrapper.ptr()), wrapper.capture_id());
        assert_eq!(registry.capture_id_of(REAL_B), CaptureId::NULL);
    }

    #[test]
    fn test_find_wrapper() {
        let registry = ObjectRegistry::new();
        assert!(registry.find_wrapper(REAL_A, InterfaceKind::Fence).is_none());
        let wrapper = registry
            .wrap_as(REAL_A, InterfaceKind::Fence, InterfaceKind::Fence.iid())
            .wrapper;
        let found = registry.find_wrapper(REAL_A, InterfaceKind::Fence).unwrap();
        assert!(Arc::ptr_eq(&wrapper, &found));
        assert!(registry.find_wrapper(REAL_A, InterfaceKind::Heap).is_none());
    }

    #[test]
    fn test_remove_keeps_id_while_other_views_live() {
        let registry = ObjectRegistry::new();
        let device = registry
            .wrap_as(REAL_A, InterfaceKind::Device, InterfaceKind::Device.iid())
            .wrapper;
        registry.wrap_as(REAL_A, InterfaceKind::Device1, InterfaceKind::Device1.iid());

        assert!(registry.remove(REAL_A, InterfaceKind::Device1).is_some());
        assert_eq!(registry.capture_id_of_real(REAL_A), Some(device.capture_id()));

        assert!(registry.remove(REAL_A, InterfaceKind::Device).is_some());
        assert_eq!(registry.capture_id_of_real(REAL_A), None);
        assert!(registry.lookup(device.ptr()).is_none());
        assert!(registry.remove(REAL_A, InterfaceKind::Device).is_none());
    }

    #[test]
    fn test_destroyed_ids_are_not_reused() {
        let registry = ObjectRegistry::new();
        let first = registry
            .wrap_as(REAL_A, InterfaceKind::Fence, InterfaceKind::Fence.iid())
            .wrapper;
        registry.destroy(&first);

        let second = registry
            .wrap_as(REAL_B, InterfaceKind::Fence, InterfaceKind::Fence.iid())
            .wrapper;
        assert_ne!(first.capture_id(), second.capture_id());
        assert!(second.capture_id() > first.capture_id());

        // Same address reused by the driver for a new object gets a fresh identity too.
        let third = registry
            .wrap_as(REAL_A, InterfaceKind::Fence, InterfaceKind::Fence.iid())
            .wrapper;
        assert!(third.capture_id() > second.capture_id());
    }

    #[test]
    fn test_destroy_runs_callback_and_clears_ranges() {
        let registry = ObjectRegistry::new();
        let wrapper = registry
            .wrap_as(REAL_A, InterfaceKind::Resource, InterfaceKind::Resource.iid())
            .wrapper;
        registry.register_handle_range(
            &wrapper,
            HandlePool::GpuVirtualAddress,
            0x10_0000,
            0x10_0000,
            Some(0x1000),
        );
        assert!(registry
            .handles()
            .resolve(Handle::new(HandlePool::GpuVirtualAddress, 0x10_0010))
            .is_some());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        wrapper.set_destroy_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.destroy(&wrapper);
        registry.destroy(&wrapper);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.shard_len(InterfaceKind::Resource), 0);
        assert!(registry.handles().is_empty());
    }

    #[test]
    fn test_destroy_stale_wrapper_leaves_replacement() {
        let registry = ObjectRegistry::new();
        let stale = registry
            .wrap_as(REAL_A, InterfaceKind::Heap, InterfaceKind::Heap.iid())
            .wrapper;
        registry.remove(REAL_A, InterfaceKind::Heap);
        let fresh = registry
            .wrap_as(REAL_A, InterfaceKind::Heap, InterfaceKind::Heap.iid())
            .wrapper;

        registry.destroy(&stale);
        let found = registry.find_wrapper(REAL_A, InterfaceKind::Heap).unwrap();
        assert!(Arc::ptr_eq(&found, &fresh));
    }

    #[test]
    fn test_release_destroys_on_last_reference() {
        let registry = ObjectRegistry::new();
        let first = registry
            .wrap_as(REAL_A, InterfaceKind::Fence, InterfaceKind::Fence.iid())
            .wrapper;
        let second = registry
            .wrap_as(REAL_A, InterfaceKind::Fence, InterfaceKind::Fence.iid())
            .wrapper;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.app_refs(), 2);

        assert_eq!(registry.release(&first), 1);
        assert!(!first.is_destroyed());
        assert!(registry.lookup(first.ptr()).is_some());

        assert_eq!(registry.release(&second), 0);
        assert!(first.is_destroyed());
        assert!(registry.lookup(first.ptr()).is_none());
        assert!(registry.find_wrapper(REAL_A, InterfaceKind::Fence).is_none());

        // Releasing past zero does not destroy twice.
        assert_eq!(registry.release(&first), 0);
    }

    #[test]
    fn test_release_racing_wrap_never_returns_destroyed_wrapper() {
        let registry = ObjectRegistry::new();
        for i in 0..200 {
            let real = ObjectPtr::new(0x10_0000 + i * 0x10);
            let initial = registry
                .wrap_as(real, InterfaceKind::Resource, InterfaceKind::Resource.iid())
                .wrapper;
            let barrier = Barrier::new(2);

            let rewrapped = thread::scope(|s| {
                let releaser = s.spawn(|| {
                    barrier.wait();
                    registry.release(&initial);
                });
                let wrapper = s.spawn(|| {
                    barrier.wait();
                    registry
                        .wrap_as(real, InterfaceKind::Resource, InterfaceKind::Resource.iid())
                        .wrapper
                });
                releaser.join().unwrap();
                wrapper.join().unwrap()
            });

            assert!(!rewrapped.is_destroyed());
            assert_eq!(rewrapped.app_refs(), 1);
            let found = registry.lookup(rewrapped.ptr()).unwrap();
            assert!(Arc::ptr_eq(&found, &rewrapped));
        }
    }

    #[test]
    fn test_concurrent_wrap_single_winner() {
        const THREADS: usize = 16;
        let registry = Arc::new(ObjectRegistry::new());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let outcome = registry.wrap_as(
                        REAL_A,
                        InterfaceKind::CommandQueue,
                        InterfaceKind::CommandQueue.iid(),
                    );
                    (outcome.wrapper.ptr(), outcome.wrapper.capture_id(), outcome.created)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|(_, _, created)| *created).count();
        assert_eq!(created, 1);
        assert!(results.iter().all(|(ptr, _, _)| *ptr == results[0].0));
        assert!(results.iter().all(|(_, id, _)| *id == results[0].1));
        assert_eq!(registry.shard_len(InterfaceKind::CommandQueue), 1);
        assert_eq!(registry.stats().ids_issued, 1);
    }
}
