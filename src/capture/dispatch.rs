//! The dispatch table: the real, unhooked entry points.
//!
//! Entry points are resolved once from an [`EntryPointSource`] when the capture manager is
//! created and never change afterwards, so every intercepted call reads the table without
//! locking.

use std::{borrow::Cow, collections::HashMap, fmt, sync::Arc};

use strum::IntoEnumIterator;

use crate::{
    format::CallId,
    object::ObjectPtr,
    resolve::{Out, Value},
};

/// HRESULT-style status code. Negative values are failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Status(pub i32);

impl Status {
    /// Success.
    pub const OK: Self = Self(0);
    /// Success, negative answer.
    pub const FALSE: Self = Self(1);
    /// Not implemented.
    pub const E_NOTIMPL: Self = Self(0x8000_4001_u32 as i32);
    /// Interface not supported.
    pub const E_NOINTERFACE: Self = Self(0x8000_4002_u32 as i32);
    /// Invalid pointer.
    pub const E_POINTER: Self = Self(0x8000_4003_u32 as i32);
    /// Unspecified failure.
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    /// Out of memory.
    pub const E_OUTOFMEMORY: Self = Self(0x8007_000E_u32 as i32);
    /// Invalid argument.
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);

    /// Returns `true` for success codes.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

/// What an entry point hands back.
#[derive(Clone, Debug, PartialEq)]
pub struct CallReturn {
    /// Status code.
    pub status: Status,
    /// Return value for operations that have one.
    pub value: Option<Value>,
}

impl CallReturn {
    /// A bare status.
    #[must_use]
    pub const fn status(status: Status) -> Self {
        Self {
            status,
            value: None,
        }
    }

    /// Success without a value.
    #[must_use]
    pub const fn ok() -> Self {
        Self::status(Status::OK)
    }

    /// Success carrying `value`.
    #[must_use]
    pub fn value(value: Value) -> Self {
        Self {
            status: Status::OK,
            value: Some(value),
        }
    }

    /// Returns `true` if the status is a success code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A real entry point.
///
/// Receives the real `this` ([`ObjectPtr::NULL`] for free functions), the resolved inputs and
/// the out-parameter slots to fill.
pub type EntryPoint =
    Arc<dyn Fn(ObjectPtr, &[Cow<'_, Value>], &mut [Out]) -> CallReturn + Send + Sync>;

/// Supplies real entry points, e.g. a loaded driver module.
pub trait EntryPointSource {
    /// Returns the implementation of `call`, or `None` if the driver does not export it.
    fn resolve(&self, call: CallId) -> Option<EntryPoint>;
}

impl<F> EntryPointSource for F
where
    F: Fn(CallId) -> Option<EntryPoint>,
{
    fn resolve(&self, call: CallId) -> Option<EntryPoint> {
        self(call)
    }
}

/// Resolved entry points, read-only after construction.
#[derive(Clone, Default)]
pub struct DispatchTable {
    entries: HashMap<CallId, EntryPoint>,
}

impl DispatchTable {
    /// Asks `source` for every known call once.
    pub fn resolve(source: &dyn EntryPointSource) -> Self {
        let entries: HashMap<_, _> = CallId::iter()
            .filter_map(|call| source.resolve(call).map(|entry| (call, entry)))
            .collect();
        log::debug!(
            "resolved {} of {} entry points",
            entries.len(),
            CallId::iter().count()
        );
        Self { entries }
    }

    /// Starts an empty table builder.
    #[must_use]
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    /// Returns the entry point for `call`.
    #[must_use]
    pub fn entry(&self, call: CallId) -> Option<&EntryPoint> {
        self.entries.get(&call)
    }

    /// Number of resolved entry points.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.entries.len()
    }

    /// Forwards `call` to the real implementation.
    ///
    /// Unresolved calls return [`Status::E_NOTIMPL`] without touching the outputs.
    pub fn forward(
        &self,
        call: CallId,
        this: ObjectPtr,
        inputs: &[Cow<'_, Value>],
        outputs: &mut [Out],
    ) -> CallReturn {
        match self.entry(call) {
            Some(entry) => entry(this, inputs, outputs),
            None => {
                log::debug!("no entry point for {}", call.name());
                CallReturn::status(Status::E_NOTIMPL)
            }
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("resolved", &self.entries.len())
            .finish()
    }
}

/// Assembles a [`DispatchTable`] from closures.
#[derive(Default)]
pub struct DispatchTableBuilder {
    entries: HashMap<CallId, EntryPoint>,
}

impl DispatchTableBuilder {
    /// Sets the entry point for `call`, replacing any previous one.
    #[must_use]
    pub fn entry<F>(mut self, call: CallId, entry: F) -> Self
    where
        F: Fn(ObjectPtr, &[Cow<'_, Value>], &mut [Out]) -> CallReturn + Send + Sync + 'static,
    {
        self.entries.insert(call, Arc::new(entry));
        self
    }

    /// Finishes the table.
    #[must_use]
    pub fn build(self) -> DispatchTable {
        DispatchTable {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert!(Status::OK.is_success());
        assert!(Status::FALSE.is_success());
        assert!(!Status::E_FAIL.is_success());
        assert!(!Status::E_NOINTERFACE.is_success());
        assert_eq!(Status::E_INVALIDARG.to_string(), "0x80070057");
    }

    #[test]
    fn test_resolve_from_source() {
        let source = |call: CallId| -> Option<EntryPoint> {
            (call == CallId::Close).then(|| {
                let entry: EntryPoint =
                    Arc::new(|_: ObjectPtr, _: &[Cow<'_, Value>], _: &mut [Out]| {
                        CallReturn::ok()
                    });
                entry
            })
        };
        let table = DispatchTable::resolve(&source);
        assert_eq!(table.resolved_count(), 1);
        assert!(table.entry(CallId::Close).is_some());
        assert!(table.entry(CallId::Reset).is_none());
    }

    #[test]
    fn test_forward_missing_entry() {
        let table = DispatchTable::builder().build();
        let mut outputs = [Out::object(crate::object::InterfaceKind::Fence.iid())];
        let ret = table.forward(CallId::CreateFence, ObjectPtr::new(1), &[], &mut outputs);
        assert_eq!(ret.status, Status::E_NOTIMPL);
        assert_eq!(outputs[0].object_ptr(), Some(ObjectPtr::NULL));
    }

    #[test]
    fn test_forward_passes_arguments() {
        let table = DispatchTable::builder()
            .entry(CallId::GetCompletedValue, |this, inputs, _| {
                assert_eq!(this, ObjectPtr::new(0x10));
                assert!(inputs.is_empty());
                CallReturn::value(Value::U64(42))
            })
            .build();
        let ret = table.forward(CallId::GetCompletedValue, ObjectPtr::new(0x10), &[], &mut []);
        assert_eq!(ret.value, Some(Value::U64(42)));
    }
}
