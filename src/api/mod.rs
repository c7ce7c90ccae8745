//! Wrapper facades: the calling surface the application sees.
//!
//! Every wrapped object is reachable through an [`Interface`], a pairing of the shared
//! [`CaptureManager`] with one [`Wrapper`]. All calls go through [`Interface::call`], which is
//! [`CaptureManager::intercept`] with `this` filled in, so the interception pattern exists
//! exactly once.
//!
//! The wrapped API's interface inheritance is expressed as capability traits rather than as a
//! type hierarchy. Each trait is implemented once with default methods and reused by every
//! facade whose interface has that capability:
//!
//! | Trait | Operations | Implemented by |
//! |-------|------------|----------------|
//! | [`UnknownCalls`] | `QueryInterface`, `AddRef`, `Release` | every facade |
//! | [`ObjectCalls`] | `SetName` | every facade except [`Interface`] |
//! | [`DeviceChildCalls`] | `GetDevice` | device children |
//! | [`PageableCalls`] | marker | pageable objects |
//! | [`DeviceCalls`] | object creation, residency | [`Device`] |
//! | [`CommandQueueCalls`] | submission, signalling | [`CommandQueue`] |
//! | [`CommandListCalls`] | recording | [`GraphicsCommandList`] |
//! | [`ResourceCalls`] | GPU virtual address | [`Resource`] |
//! | [`FenceCalls`] | completion | [`Fence`] |
//! | [`DescriptorHeapCalls`] | heap start handles | [`DescriptorHeap`] |
//!
//! A facade accepts any wrapper whose kind is-a the facade's kind, so a `Device1` wrapper can
//! be used as a [`Device`].
//!
//! # Example
//!
//! ```rust,no_run
//! use capscope::api::{create_device, Device, DeviceCalls, Facade, FenceCalls};
//! use capscope::capture::{CaptureManager, DispatchTable};
//! use capscope::object::{InterfaceKind, ObjectPtr};
//! use capscope::settings::CaptureSettings;
//!
//! # fn driver() -> DispatchTable { DispatchTable::builder().build() }
//! let manager = CaptureManager::from_settings(CaptureSettings::load()?, driver())?;
//! let created = create_device(&manager, ObjectPtr::NULL, InterfaceKind::Device.iid());
//! if let Some(device) = created.into_facade::<Device>(&manager).into_object() {
//!     let fence = device.create_fence(0, 0).into_object();
//!     println!("fence completed: {:?}", fence.map(|f| f.get_completed_value()));
//! }
//! # Ok::<(), capscope::Error>(())
//! ```

mod calls;
mod desc;

use std::sync::Arc;

pub use calls::{
    CommandListCalls, CommandQueueCalls, DescriptorHeapCalls, DeviceCalls, DeviceChildCalls,
    FenceCalls, ObjectCalls, PageableCalls, ResourceCalls, UnknownCalls,
};
pub use desc::{
    CommandQueueDesc, DescriptorHeapDesc, HeapProperties, ResourceBarrier, ResourceDesc,
};

use crate::{
    capture::{CallReturn, CaptureManager, Status},
    format::CallId,
    object::{CaptureId, InterfaceId, InterfaceKind, ObjectPtr, Wrapper},
    resolve::{Out, Value},
};

/// The status of a call together with the object it produced.
///
/// `object` is set only when the call succeeded and produced a usable reference. `status` is
/// always the driver's own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome<T> {
    /// Status returned by the driver.
    pub status: Status,
    /// Object handed back to the application.
    pub object: Option<T>,
}

impl<T> Outcome<T> {
    /// Returns `true` if the status is a success code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the object, discarding the status.
    #[must_use]
    pub fn into_object(self) -> Option<T> {
        self.object
    }
}

impl Outcome<ObjectPtr> {
    fn from_slot(status: Status, slot: &Out) -> Self {
        let object = slot
            .object_ptr()
            .filter(|ptr| status.is_success() && !ptr.is_null());
        Self { status, object }
    }

    /// Converts the produced address into facade `F`.
    ///
    /// The object is dropped when the address is not a wrapper (unsupported interface) or its
    /// kind is not-a `F::KIND`; the status is kept.
    #[must_use]
    pub fn into_facade<F: Facade>(self, manager: &Arc<CaptureManager>) -> Outcome<F> {
        Outcome {
            status: self.status,
            object: self.object.and_then(|ptr| F::from_ptr(manager, ptr)),
        }
    }
}

/// A wrapped object bound to its capture manager.
#[derive(Clone)]
pub struct Interface {
    manager: Arc<CaptureManager>,
    wrapper: Arc<Wrapper>,
}

impl Interface {
    /// Binds `wrapper` to `manager`.
    #[must_use]
    pub fn new(manager: Arc<CaptureManager>, wrapper: Arc<Wrapper>) -> Self {
        Self { manager, wrapper }
    }

    /// Looks up the live wrapper at the application-visible address `ptr`.
    #[must_use]
    pub fn from_ptr(manager: &Arc<CaptureManager>, ptr: ObjectPtr) -> Option<Self> {
        manager
            .find(ptr)
            .map(|wrapper| Self::new(Arc::clone(manager), wrapper))
    }

    /// Intercepts `call` with this object as `this`.
    pub fn call(&self, call: CallId, inputs: &[Value], outputs: &mut [Out]) -> CallReturn {
        self.manager.intercept(call, Some(&self.wrapper), inputs, outputs)
    }

    /// Intercepts a call that returns one object through an out slot for `riid`.
    pub fn call_for_object(
        &self,
        call: CallId,
        inputs: &[Value],
        riid: InterfaceId,
    ) -> Outcome<ObjectPtr> {
        let mut outputs = [Out::object(riid)];
        let result = self.call(call, inputs, &mut outputs);
        Outcome::from_slot(result.status, &outputs[0])
    }

    /// The address the application holds.
    #[must_use]
    pub fn ptr(&self) -> ObjectPtr {
        self.wrapper.ptr()
    }

    /// Capture identity of the object.
    #[must_use]
    pub fn capture_id(&self) -> CaptureId {
        self.wrapper.capture_id()
    }

    /// Interface type of this view.
    #[must_use]
    pub fn kind(&self) -> InterfaceKind {
        self.wrapper.kind()
    }

    /// The wrapper behind this view.
    #[must_use]
    pub fn wrapper(&self) -> &Arc<Wrapper> {
        &self.wrapper
    }

    /// The capture manager this object reports to.
    #[must_use]
    pub fn manager(&self) -> &Arc<CaptureManager> {
        &self.manager
    }
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("kind", &self.kind())
            .field("capture_id", &self.capture_id())
            .field("ptr", &self.ptr())
            .finish()
    }
}

/// A typed view of a wrapped object.
pub trait Facade: Sized {
    /// The interface this facade presents.
    const KIND: InterfaceKind;

    /// Wraps `interface` if its kind is-a [`Self::KIND`].
    fn from_interface(interface: Interface) -> Option<Self>;

    /// The untyped view.
    fn interface(&self) -> &Interface;

    /// Looks up the wrapper at `ptr` and converts it.
    fn from_ptr(manager: &Arc<CaptureManager>, ptr: ObjectPtr) -> Option<Self> {
        Interface::from_ptr(manager, ptr).and_then(Self::from_interface)
    }
}

impl Facade for Interface {
    const KIND: InterfaceKind = InterfaceKind::Unknown;

    fn from_interface(interface: Interface) -> Option<Self> {
        Some(interface)
    }

    fn interface(&self) -> &Interface {
        self
    }
}

macro_rules! facade {
    ($(#[$meta:meta])* $name:ident => $kind:ident: $($capability:ident),* $(,)?) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name(Interface);

        impl Facade for $name {
            const KIND: InterfaceKind = InterfaceKind::$kind;

            fn from_interface(interface: Interface) -> Option<Self> {
                interface.kind().is_a(Self::KIND).then_some(Self(interface))
            }

            fn interface(&self) -> &Interface {
                &self.0
            }
        }

        $(impl $capability for $name {})*
    };
}

facade!(
    /// The device: creates every other object.
    Device => Device: UnknownCalls, ObjectCalls, DeviceCalls
);
facade!(
    /// A command submission queue.
    CommandQueue => CommandQueue:
        UnknownCalls, ObjectCalls, DeviceChildCalls, PageableCalls, CommandQueueCalls
);
facade!(
    /// Backing memory for recorded commands.
    CommandAllocator => CommandAllocator:
        UnknownCalls, ObjectCalls, DeviceChildCalls, PageableCalls
);
facade!(
    /// A graphics command list.
    GraphicsCommandList => GraphicsCommandList:
        UnknownCalls, ObjectCalls, DeviceChildCalls, CommandListCalls
);
facade!(
    /// A CPU/GPU synchronization fence.
    Fence => Fence: UnknownCalls, ObjectCalls, DeviceChildCalls, PageableCalls, FenceCalls
);
facade!(
    /// A buffer or texture.
    Resource => Resource:
        UnknownCalls, ObjectCalls, DeviceChildCalls, PageableCalls, ResourceCalls
);
facade!(
    /// A memory heap.
    Heap => Heap: UnknownCalls, ObjectCalls, DeviceChildCalls, PageableCalls
);
facade!(
    /// A descriptor heap.
    DescriptorHeap => DescriptorHeap:
        UnknownCalls, ObjectCalls, DeviceChildCalls, PageableCalls, DescriptorHeapCalls
);

impl UnknownCalls for Interface {}

/// Creates a device on `adapter` (null for the default adapter).
///
/// The returned address is a wrapper when `riid` names a wrappable interface and the raw
/// device otherwise.
pub fn create_device(
    manager: &Arc<CaptureManager>,
    adapter: ObjectPtr,
    riid: InterfaceId,
) -> Outcome<ObjectPtr> {
    let inputs = [Value::object(adapter, InterfaceKind::Unknown)];
    let mut outputs = [Out::object(riid)];
    let result = manager.intercept(CallId::CreateDevice, None, &inputs, &mut outputs);
    Outcome::from_slot(result.status, &outputs[0])
}
