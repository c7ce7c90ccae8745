//! Pool-relative handles.
//!
//! Some arguments do not carry an object reference but a numeric handle into a pool owned by
//! an object: a GPU virtual address inside a resource, or a descriptor handle inside a
//! descriptor heap. These are resolved through [`HandleTable`], keyed by the handle value
//! instead of by reference identity. Each registered range maps an application-visible base
//! to the real base and names its owner, so a handle can be both translated for the driver and
//! written to a trace as `(owner, offset)`.

use std::ops::Bound;

use crossbeam_skiplist::SkipMap;
use strum::{EnumCount, EnumIter, FromRepr, IntoStaticStr};

use crate::object::CaptureId;

/// Pool a handle value belongs to.
#[repr(u8)]
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter, FromRepr, IntoStaticStr,
)]
pub enum HandlePool {
    /// GPU virtual address inside a resource.
    GpuVirtualAddress = 0,
    /// CPU descriptor handle inside a descriptor heap.
    CpuDescriptor = 1,
    /// GPU descriptor handle inside a shader-visible descriptor heap.
    GpuDescriptor = 2,
}

/// A handle value tagged with its pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Pool the value belongs to.
    pub pool: HandlePool,
    /// Raw handle value.
    pub value: u64,
}

impl Handle {
    /// Creates a handle.
    #[must_use]
    pub const fn new(pool: HandlePool, value: u64) -> Self {
        Self { pool, value }
    }

    /// Returns `true` for the zero handle, which is passed through untouched.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.value == 0
    }
}

/// A registered block of handle values owned by one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleRange {
    /// First value as seen by the application.
    pub app_base: u64,
    /// First value as understood by the driver.
    pub real_base: u64,
    /// Number of addressable values, `None` when the extent is unknown.
    ///
    /// Unbounded ranges extend up to the next registered base.
    pub len: Option<u64>,
    /// Object owning the range.
    pub owner: CaptureId,
}

impl HandleRange {
    fn contains(&self, value: u64) -> bool {
        value >= self.app_base && self.len.map_or(true, |len| value - self.app_base < len)
    }
}

/// The outcome of resolving a handle value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedHandle {
    /// Value to forward to the driver.
    pub real: u64,
    /// Object owning the range.
    pub owner: CaptureId,
    /// Offset from the range base.
    pub offset: u64,
}

/// Ordered, lock-free range maps, one per [`HandlePool`].
#[derive(Debug)]
pub struct HandleTable {
    pools: [SkipMap<u64, HandleRange>; HandlePool::COUNT],
}

impl HandleTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pools: std::array::from_fn(|_| SkipMap::new()),
        }
    }

    /// Registers `range` in `pool`, replacing any range with the same base.
    pub fn insert(&self, pool: HandlePool, range: HandleRange) {
        self.pools[pool as usize].insert(range.app_base, range);
    }

    /// Removes the range starting at `app_base`, if it is still owned by `owner`.
    ///
    /// Returns `true` if a range was removed.
    pub fn remove(&self, pool: HandlePool, app_base: u64, owner: CaptureId) -> bool {
        let map = &self.pools[pool as usize];
        match map.get(&app_base) {
            Some(entry) if entry.value().owner == owner => {
                entry.remove();
                true
            }
            _ => false,
        }
    }

    /// Resolves `handle` against the registered ranges.
    ///
    /// Returns `None` for the null handle and for values outside every range.
    #[must_use]
    pub fn resolve(&self, handle: Handle) -> Option<ResolvedHandle> {
        if handle.is_null() {
            return None;
        }

        let entry = self.pools[handle.pool as usize].upper_bound(Bound::Included(&handle.value))?;
        let range = entry.value();
        if !range.contains(handle.value) {
            return None;
        }

        let offset = handle.value - range.app_base;
        Some(ResolvedHandle {
            real: range.real_base.wrapping_add(offset),
            owner: range.owner,
            offset,
        })
    }

    /// Number of ranges registered in `pool`.
    #[must_use]
    pub fn len(&self, pool: HandlePool) -> usize {
        self.pools[pool as usize].len()
    }

    /// Returns `true` when no pool holds a range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.iter().all(SkipMap::is_empty)
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(app_base: u64, real_base: u64, len: Option<u64>, owner: u64) -> HandleRange {
        HandleRange {
            app_base,
            real_base,
            len,
            owner: CaptureId::from_raw(owner),
        }
    }

    #[test]
    fn test_resolve_inside_bounded_range() {
        let table = HandleTable::new();
        table.insert(
            HandlePool::GpuVirtualAddress,
            range(0x1000, 0x1000, Some(0x100), 3),
        );

        let resolved = table
            .resolve(Handle::new(HandlePool::GpuVirtualAddress, 0x1040))
            .unwrap();
        assert_eq!(resolved.real, 0x1040);
        assert_eq!(resolved.owner, CaptureId::from_raw(3));
        assert_eq!(resolved.offset, 0x40);

        assert!(table
            .resolve(Handle::new(HandlePool::GpuVirtualAddress, 0x1100))
            .is_none());
        assert!(table
            .resolve(Handle::new(HandlePool::GpuVirtualAddress, 0x0fff))
            .is_none());
    }

    #[test]
    fn test_resolve_translates_between_bases() {
        let table = HandleTable::new();
        table.insert(HandlePool::CpuDescriptor, range(0x5000, 0x9000, None, 1));

        let resolved = table
            .resolve(Handle::new(HandlePool::CpuDescriptor, 0x5020))
            .unwrap();
        assert_eq!(resolved.real, 0x9020);
    }

    #[test]
    fn test_unbounded_range_stops_at_next_base() {
        let table = HandleTable::new();
        table.insert(HandlePool::CpuDescriptor, range(0x1000, 0x1000, None, 1));
        table.insert(HandlePool::CpuDescriptor, range(0x2000, 0x2000, None, 2));

        let a = table
            .resolve(Handle::new(HandlePool::CpuDescriptor, 0x1fff))
            .unwrap();
        let b = table
            .resolve(Handle::new(HandlePool::CpuDescriptor, 0x2001))
            .unwrap();
        assert_eq!(a.owner, CaptureId::from_raw(1));
        assert_eq!(b.owner, CaptureId::from_raw(2));
    }

    #[test]
    fn test_pools_are_independent() {
        let table = HandleTable::new();
        table.insert(HandlePool::GpuDescriptor, range(0x1000, 0x1000, None, 1));
        assert!(table
            .resolve(Handle::new(HandlePool::CpuDescriptor, 0x1000))
            .is_none());
        assert_eq!(table.len(HandlePool::GpuDescriptor), 1);
        assert_eq!(table.len(HandlePool::CpuDescriptor), 0);
    }

    #[test]
    fn test_null_handle_never_resolves() {
        let table = HandleTable::new();
        table.insert(HandlePool::GpuVirtualAddress, range(0, 0, None, 1));
        assert!(table
            .resolve(Handle::new(HandlePool::GpuVirtualAddress, 0))
            .is_none());
    }

    #[test]
    fn test_remove_checks_owner() {
        let table = HandleTable::new();
        table.insert(HandlePool::GpuVirtualAddress, range(0x1000, 0x1000, None, 1));
        assert!(!table.remove(HandlePool::GpuVirtualAddress, 0x1000, CaptureId::from_raw(2)));
        assert!(table.remove(HandlePool::GpuVirtualAddress, 0x1000, CaptureId::from_raw(1)));
        assert!(table.is_empty());
    }
}
