//! The capture manager: the single place every intercepted call passes through.
//!
//! [`CaptureManager::intercept`] implements the interception pattern once for every entry
//! point:
//!
//! 1. enter the thread's call scope;
//! 2. nested calls forward straight to the driver and return;
//! 3. outermost calls run pre-hooks, unwrap input references into scratch copies, forward,
//!    wrap new references produced on success, register pool handle ranges, encode one
//!    record and run post-hooks.
//!
//! The manager owns the registry, the dispatch table, the hooks and the trace sink. It is
//! shared as an `Arc` and handed to every wrapper facade; nothing reaches it through ambient
//! global state except via the optional [`crate::capture::instance`] slot.

use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use crate::{
    capture::{
        scope::{self, CallScope},
        CallReturn, DispatchTable, Hook, HookContext, HookManager, ScratchMemory,
    },
    format::{CallId, Encoder, TraceRecord, TraceSink},
    object::{CaptureId, InterfaceId, ObjectPtr, ObjectRegistry, WrapOutcome, Wrapper},
    resolve::{Out, Resolver, Value},
    settings::CaptureSettings,
    Error, Result,
};

/// Point-in-time capture counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    /// Records handed to the sink successfully.
    pub records_written: u64,
    /// Records that were encoded but could not be written.
    pub records_dropped: u64,
    /// Outermost calls intercepted.
    pub outermost_calls: u64,
    /// Nested calls forwarded without capture.
    pub nested_calls: u64,
}

#[derive(Debug, Default)]
struct Counters {
    records_written: AtomicU64,
    records_dropped: AtomicU64,
    outermost_calls: AtomicU64,
    nested_calls: AtomicU64,
}

/// Process-wide capture coordinator.
pub struct CaptureManager {
    settings: CaptureSettings,
    registry: ObjectRegistry,
    dispatch: DispatchTable,
    bookkeeping: HookManager,
    hooks: RwLock<HookManager>,
    sink: Mutex<Box<dyn TraceSink>>,
    encoding: AtomicBool,
    sink_failed: AtomicBool,
    finalized: AtomicBool,
    counters: Counters,
}

impl CaptureManager {
    /// Creates a manager.
    ///
    /// The built-in handle range hooks always run before the record is encoded and are kept
    /// apart from the hooks registered through [`CaptureManager::register_hook`].
    #[must_use]
    pub fn new(
        settings: CaptureSettings,
        dispatch: DispatchTable,
        sink: Box<dyn TraceSink>,
    ) -> Arc<Self> {
        log::debug!(
            "capture manager created, encoding {}, {} entry points",
            if settings.capture_enabled { "on" } else { "off" },
            dispatch.resolved_count()
        );
        Arc::new(Self {
            encoding: AtomicBool::new(settings.capture_enabled),
            settings,
            registry: ObjectRegistry::new(),
            dispatch,
            bookkeeping: HookManager::with_builtin(),
            hooks: RwLock::new(HookManager::new()),
            sink: Mutex::new(sink),
            sink_failed: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    /// Creates a manager from `settings`, opening the sink they describe.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the capture file cannot be created.
    pub fn from_settings(settings: CaptureSettings, dispatch: DispatchTable) -> Result<Arc<Self>> {
        let sink = settings.create_sink()?;
        Ok(Self::new(settings, dispatch, sink))
    }

    /// The settings this manager was created with.
    #[must_use]
    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// The object identity registry.
    #[must_use]
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// The real entry points.
    #[must_use]
    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }

    /// Registers a hook.
    ///
    /// Must not be called from inside a hook handler.
    pub fn register_hook(&self, hook: Hook) {
        write_lock!(self.hooks).register(hook);
    }

    /// Removes every hook named `name`, returning how many were removed.
    pub fn unregister_hook(&self, name: &str) -> usize {
        write_lock!(self.hooks).unregister(name)
    }

    /// Returns `true` while calls are being encoded.
    #[must_use]
    pub fn is_encoding(&self) -> bool {
        self.encoding.load(Ordering::Acquire)
    }

    /// Turns encoding on or off.
    ///
    /// Has no effect once the sink failed or the manager was finalized.
    pub fn set_encoding(&self, enabled: bool) {
        if enabled && (self.sink_failed.load(Ordering::Acquire) || self.is_finalized()) {
            return;
        }
        self.encoding.store(enabled, Ordering::Release);
    }

    /// Returns `true` after [`CaptureManager::finalize`].
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Returns point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            records_written: self.counters.records_written.load(Ordering::Relaxed),
            records_dropped: self.counters.records_dropped.load(Ordering::Relaxed),
            outermost_calls: self.counters.outermost_calls.load(Ordering::Relaxed),
            nested_calls: self.counters.nested_calls.load(Ordering::Relaxed),
        }
    }

    /// Wraps `real` as `riid`.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedInterface`] if there is no wrapper type for `riid`.
    pub fn wrap(&self, real: ObjectPtr, riid: &InterfaceId) -> Result<WrapOutcome> {
        self.registry.wrap(real, riid)
    }

    /// Returns the real reference behind `ptr`, or `ptr` when it is not a wrapper.
    #[must_use]
    pub fn unwrap(&self, ptr: ObjectPtr) -> ObjectPtr {
        self.registry.unwrap_ptr(ptr)
    }

    /// Returns the live wrapper at the application-visible address `ptr`.
    #[must_use]
    pub fn find(&self, ptr: ObjectPtr) -> Option<Arc<Wrapper>> {
        self.registry.lookup(ptr)
    }

    /// Pushes buffered trace data to its destination.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the sink lock is poisoned, or the sink's I/O error.
    pub fn flush(&self) -> Result<()> {
        let mut sink = try_lock!(self.sink).ok_or(Error::LockError)?;
        sink.flush()
    }

    /// Stops encoding and flushes the sink. Calls keep being forwarded afterwards.
    ///
    /// # Errors
    /// Returns [`Error::Finalized`] when called twice, otherwise as [`CaptureManager::flush`].
    pub fn finalize(&self) -> Result<()> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Err(Error::Finalized);
        }
        self.encoding.store(false, Ordering::Release);
        let stats = self.stats();
        log::debug!(
            "finalizing capture: {} records written, {} dropped",
            stats.records_written,
            stats.records_dropped
        );
        self.flush()
    }

    /// Intercepts one call.
    ///
    /// `this` is the wrapper the method was invoked on, `None` for free functions. `inputs`
    /// are the arguments exactly as the application supplied them and are never modified.
    /// `outputs` are the application's out-parameter slots; on success, new references in
    /// them are replaced by wrappers before this returns.
    ///
    /// The returned status and value are always the driver's own. Capture-side failures are
    /// logged and never change them.
    pub fn intercept(
        &self,
        call: CallId,
        this: Option<&Arc<Wrapper>>,
        inputs: &[Value],
        outputs: &mut [Out],
    ) -> CallReturn {
        let scope = CallScope::enter();
        let real_this = this.map_or(ObjectPtr::NULL, |wrapper| wrapper.real());

        if !scope.is_outermost() {
            self.counters.nested_calls.fetch_add(1, Ordering::Relaxed);
            let forwarded: Vec<Cow<'_, Value>> = inputs.iter().map(Cow::Borrowed).collect();
            return self.dispatch.forward(call, real_this, &forwarded, outputs);
        }

        self.counters.outermost_calls.fetch_add(1, Ordering::Relaxed);
        let thread_id = scope::thread_id();

        scope::with_scratch(|scratch| {
            scratch.set_pool_limit(self.settings.scratch_pool_limit);
            scratch.reset();

            {
                let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
                let context = HookContext {
                    call,
                    this,
                    inputs,
                    outputs: &*outputs,
                    thread_id,
                    registry: &self.registry,
                };
                hooks.run_pre(&context);
            }

            let resolver = Resolver::new(&self.registry);
            let resolved = resolver.unwrap_inputs(inputs, scratch);
            let result = self.dispatch.forward(call, real_this, &resolved, outputs);
            Resolver::release(resolved, scratch);

            let created = if result.is_success() {
                resolver.wrap_outputs(outputs)
            } else {
                Vec::new()
            };

            let context = HookContext {
                call,
                this,
                inputs,
                outputs: &*outputs,
                thread_id,
                registry: &self.registry,
            };
            self.bookkeeping.run_post(&context, &result);

            if self.is_encoding() {
                let record = TraceRecord {
                    call,
                    thread_id,
                    object: this.map_or(CaptureId::NULL, |wrapper| wrapper.capture_id()),
                    status: result.status,
                    ret: result.value.as_ref(),
                    inputs,
                    outputs: &*outputs,
                    new_objects: &created,
                };
                self.encode(&record, scratch);
            }

            let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
            hooks.run_post(&context, &result);

            result
        })
    }

    /// Encodes `record` and writes it to the sink.
    ///
    /// The block is built in the thread's encode buffer before the sink lock is taken, so the
    /// lock is held only for the write itself.
    pub fn encode(&self, record: &TraceRecord<'_>, scratch: &mut ScratchMemory) {
        let mut buffer = scratch.take_encode_buffer();
        Encoder::new(&self.registry).encode(record, &mut buffer);
        self.write_block(&buffer);
        scratch.restore_encode_buffer(buffer);
    }

    fn write_block(&self, block: &[u8]) {
        let written = match try_lock!(self.sink) {
            Some(mut sink) => sink.write_block(block),
            None => Err(Error::LockError),
        };

        match written {
            Ok(()) => {
                self.counters.records_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                self.counters.records_dropped.fetch_add(1, Ordering::Relaxed);
                self.encoding.store(false, Ordering::Release);
                if !self.sink_failed.swap(true, Ordering::AcqRel) {
                    log::error!("trace sink failed, capture disabled: {error}");
                }
            }
        }
    }
}

impl std::fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureManager")
            .field("settings", &self.settings)
            .field("dispatch", &self.dispatch)
            .field("encoding", &self.is_encoding())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::Status,
        format::{MemorySink, TraceReader},
        object::InterfaceKind,
    };

    fn manager_with(dispatch: DispatchTable) -> (Arc<CaptureManager>, MemorySink) {
        let sink = MemorySink::new();
        let manager = CaptureManager::new(
            CaptureSettings::default(),
            dispatch,
            Box::new(sink.clone()),
        );
        (manager, sink)
    }

    #[test]
    fn test_missing_entry_returns_not_implemented_and_is_encoded() {
        let (manager, sink) = manager_with(DispatchTable::builder().build());
        let result = manager.intercept(CallId::CreateDevice, None, &[], &mut []);
        assert_eq!(result.status, Status::E_NOTIMPL);

        let reader = TraceReader::from_bytes(&sink.contents()).unwrap();
        assert_eq!(reader.records().len(), 1);
        assert_eq!(reader.records()[0].status, Status::E_NOTIMPL);
        assert_eq!(manager.stats().records_written, 1);
    }

    #[test]
    fn test_encoding_toggle() {
        let (manager, sink) = manager_with(DispatchTable::builder().build());
        manager.set_encoding(false);
        manager.intercept(CallId::Close, None, &[], &mut []);
        assert_eq!(manager.stats().records_written, 0);
        assert_eq!(manager.stats().outermost_calls, 1);

        manager.set_encoding(true);
        manager.intercept(CallId::Close, None, &[], &mut []);
        assert_eq!(TraceReader::from_bytes(&sink.contents()).unwrap().records().len(), 1);
    }

    #[test]
    fn test_finalize_twice() {
        let (manager, _sink) = manager_with(DispatchTable::builder().build());
        manager.finalize().unwrap();
        assert!(!manager.is_encoding());
        assert!(matches!(manager.finalize(), Err(Error::Finalized)));
        manager.set_encoding(true);
        assert!(!manager.is_encoding());
    }

    #[test]
    fn test_output_wrapped_only_on_success() {
        let dispatch = DispatchTable::builder()
            .entry(
                CallId::CreateFence,
                |_: ObjectPtr, inputs: &[Cow<'_, Value>], outputs: &mut [Out]| {
                    outputs[0].set_object(ObjectPtr::new(0xF00));
                    if inputs[0].as_u64() == Some(0) {
                        CallReturn::ok()
                    } else {
                        CallReturn::status(Status::E_INVALIDARG)
                    }
                },
            )
            .build();
        let (manager, _sink) = manager_with(dispatch);

        let mut outputs = [Out::object(InterfaceKind::Fence.iid())];
        let failed = manager.intercept(
            CallId::CreateFence,
            None,
            &[Value::U64(1), Value::U32(0)],
            &mut outputs,
        );
        assert_eq!(failed.status, Status::E_INVALIDARG);
        assert_eq!(outputs[0].object_ptr(), Some(ObjectPtr::new(0xF00)));
        assert_eq!(manager.registry().stats().ids_issued, 0);

        let mut outputs = [Out::object(InterfaceKind::Fence.iid())];
        manager.intercept(
            CallId::CreateFence,
            None,
            &[Value::U64(0), Value::U32(0)],
            &mut outputs,
        );
        let wrapper = manager.find(outputs[0].object_ptr().unwrap()).unwrap();
        assert_eq!(wrapper.real(), ObjectPtr::new(0xF00));
        assert_eq!(manager.unwrap(wrapper.ptr()), ObjectPtr::new(0xF00));
    }
}
