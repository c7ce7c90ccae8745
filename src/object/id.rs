//! Object addresses and capture identifiers.
//!
//! Two kinds of numbers identify an object inside this crate:
//!
//! - [`ObjectPtr`] is what crosses the API boundary: the address of a real driver object or
//!   of a wrapper. Addresses are not portable and are never written to a trace.
//! - [`CaptureId`] is the stable, process-unique identity assigned the first time a real
//!   object is wrapped. Traces refer to objects exclusively through these identifiers.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// A pointer-sized opaque reference as seen by the application and the driver.
///
/// `ObjectPtr` never dereferences anything; it only carries identity. A value of `0`
/// represents a null reference.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPtr(usize);

impl ObjectPtr {
    /// The null reference.
    pub const NULL: Self = Self(0);

    /// Creates a reference from a raw address.
    #[must_use]
    pub const fn new(address: usize) -> Self {
        Self(address)
    }

    /// Creates a reference from the address of any value.
    ///
    /// Wrappers use this with their own heap allocation so the application observes a
    /// distinct, stable address per wrapper.
    #[must_use]
    pub fn from_ref<T>(value: &T) -> Self {
        Self(std::ptr::from_ref(value) as usize)
    }

    /// Returns the raw address.
    #[must_use]
    pub const fn address(self) -> usize {
        self.0
    }

    /// Returns `true` for the null reference.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Stable identifier of a real object inside a capture.
///
/// Identifiers are handed out in increasing order starting at `1`. The value `0`
/// ([`CaptureId::NULL`]) is the sentinel for "no object", used for null references and for
/// the owner of free-function calls.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureId(u64);

impl CaptureId {
    /// Sentinel for null references and free functions.
    pub const NULL: Self = Self(0);

    /// Creates an identifier from its raw value, as read back from a trace.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value as written to a trace.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `true` for the sentinel value.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic source of [`CaptureId`]s.
///
/// Values are never reused, even after the object they named has been destroyed.
#[derive(Debug)]
pub struct CaptureIdAllocator {
    next: AtomicU64,
}

impl CaptureIdAllocator {
    /// Creates an allocator whose first identifier is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next unused identifier.
    pub fn allocate(&self) -> CaptureId {
        CaptureId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of identifiers handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for CaptureIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
