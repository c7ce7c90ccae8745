//! Capability traits.
//!
//! Every method is a default method built on [`Facade::interface`]. Inputs are marshalled
//! the same way for every call site, which keeps the trace layout of an operation fixed.

use crate::{
    api::{
        CommandAllocator, CommandQueue, CommandQueueDesc, DescriptorHeap, DescriptorHeapDesc,
        Device, Facade, Fence, GraphicsCommandList, HeapProperties, Outcome, Resource,
        ResourceBarrier, ResourceDesc,
    },
    capture::{CallReturn, Status},
    format::CallId,
    object::{HandlePool, InterfaceId, InterfaceKind, ObjectPtr},
    resolve::Value,
};

fn returned_u64(result: &CallReturn) -> u64 {
    result.value.as_ref().and_then(Value::as_u64).unwrap_or(0)
}

fn returned_handle(result: &CallReturn) -> u64 {
    result
        .value
        .as_ref()
        .and_then(|value| value.as_handle().map(|handle| handle.value).or_else(|| value.as_u64()))
        .unwrap_or(0)
}

/// Reference counting and interface querying.
pub trait UnknownCalls: Facade {
    /// Asks the object for another interface view.
    ///
    /// On success the out slot holds a wrapper for `riid`, or the raw reference when `riid`
    /// cannot be wrapped.
    fn query_interface(&self, riid: InterfaceId) -> Outcome<ObjectPtr> {
        self.interface()
            .call_for_object(CallId::QueryInterface, &[], riid)
    }

    /// [`UnknownCalls::query_interface`] converted to facade `F`.
    fn query<F: Facade>(&self) -> Outcome<F> {
        let manager = self.interface().manager();
        self.query_interface(F::KIND.iid()).into_facade(manager)
    }

    /// Adds a reference. Returns the driver's new count.
    fn add_ref(&self) -> u32 {
        let iface = self.interface();
        let result = iface.call(CallId::AddRef, &[], &mut []);
        iface.wrapper().add_app_ref();
        u32::try_from(returned_u64(&result)).unwrap_or(u32::MAX)
    }

    /// Drops a reference. Returns the driver's remaining count.
    ///
    /// When the application's last reference to this view goes away the wrapper is destroyed:
    /// its registry entry is removed and its capture identity released.
    fn release(&self) -> u32 {
        let iface = self.interface();
        let result = iface.call(CallId::Release, &[], &mut []);
        iface.manager().registry().release(iface.wrapper());
        u32::try_from(returned_u64(&result)).unwrap_or(u32::MAX)
    }
}

/// Debug naming.
pub trait ObjectCalls: Facade {
    /// Assigns a debug name.
    fn set_name(&self, name: &str) -> Status {
        self.interface()
            .call(CallId::SetName, &[Value::wstr(name)], &mut [])
            .status
    }
}

/// Objects owned by a device.
pub trait DeviceChildCalls: Facade {
    /// Returns the owning device as `riid`.
    fn get_device(&self, riid: InterfaceId) -> Outcome<ObjectPtr> {
        self.interface().call_for_object(CallId::GetDevice, &[], riid)
    }

    /// Returns the owning device.
    fn device(&self) -> Outcome<Device> {
        let manager = self.interface().manager();
        self.get_device(InterfaceKind::Device.iid())
            .into_facade(manager)
    }
}

/// Objects whose residency can be managed. Residency itself is driven through
/// [`DeviceCalls::make_resident`] and [`DeviceCalls::evict`].
pub trait PageableCalls: Facade {}

/// Object creation and residency.
pub trait DeviceCalls: Facade {
    /// Creates a command queue.
    fn create_command_queue(&self, desc: &CommandQueueDesc) -> Outcome<CommandQueue> {
        let iface = self.interface();
        iface
            .call_for_object(
                CallId::CreateCommandQueue,
                &[desc.to_value()],
                InterfaceKind::CommandQueue.iid(),
            )
            .into_facade(iface.manager())
    }

    /// Creates a command allocator for lists of `list_type`.
    fn create_command_allocator(&self, list_type: i32) -> Outcome<CommandAllocator> {
        let iface = self.interface();
        iface
            .call_for_object(
                CallId::CreateCommandAllocator,
                &[Value::I32(list_type)],
                InterfaceKind::CommandAllocator.iid(),
            )
            .into_facade(iface.manager())
    }

    /// Creates a graphics command list recording into `allocator`.
    fn create_command_list(
        &self,
        node_mask: u32,
        list_type: i32,
        allocator: &CommandAllocator,
        initial_state: ObjectPtr,
    ) -> Outcome<GraphicsCommandList> {
        let iface = self.interface();
        let inputs = [
            Value::U32(node_mask),
            Value::I32(list_type),
            Value::object(allocator.interface().ptr(), InterfaceKind::CommandAllocator),
            Value::object(initial_state, InterfaceKind::PipelineState),
        ];
        iface
            .call_for_object(
                CallId::CreateCommandList,
                &inputs,
                InterfaceKind::GraphicsCommandList.iid(),
            )
            .into_facade(iface.manager())
    }

    /// Creates a fence starting at `initial_value`.
    fn create_fence(&self, initial_value: u64, flags: u32) -> Outcome<Fence> {
        let iface = self.interface();
        iface
            .call_for_object(
                CallId::CreateFence,
                &[Value::U64(initial_value), Value::U32(flags)],
                InterfaceKind::Fence.iid(),
            )
            .into_facade(iface.manager())
    }

    /// Creates a resource with its own implicit heap.
    fn create_committed_resource(
        &self,
        heap: &HeapProperties,
        heap_flags: u32,
        desc: &ResourceDesc,
        initial_state: i32,
        clear_value: Option<Value>,
    ) -> Outcome<Resource> {
        let iface = self.interface();
        let inputs = [
            heap.to_value(),
            Value::U32(heap_flags),
            desc.to_value(),
            Value::I32(initial_state),
            clear_value.unwrap_or(Value::Null),
        ];
        iface
            .call_for_object(
                CallId::CreateCommittedResource,
                &inputs,
                InterfaceKind::Resource.iid(),
            )
            .into_facade(iface.manager())
    }

    /// Creates a descriptor heap.
    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> Outcome<DescriptorHeap> {
        let iface = self.interface();
        iface
            .call_for_object(
                CallId::CreateDescriptorHeap,
                &[desc.to_value()],
                InterfaceKind::DescriptorHeap.iid(),
            )
            .into_facade(iface.manager())
    }

    /// Writes a shader resource view of `resource` into the descriptor at `dest`.
    fn create_shader_resource_view(
        &self,
        resource: Option<&Resource>,
        desc: Option<Value>,
        dest: u64,
    ) {
        let resource = resource.map_or(ObjectPtr::NULL, |r| r.interface().ptr());
        let inputs = [
            Value::object(resource, InterfaceKind::Resource),
            desc.unwrap_or(Value::Null),
            Value::handle(HandlePool::CpuDescriptor, dest),
        ];
        self.interface()
            .call(CallId::CreateShaderResourceView, &inputs, &mut []);
    }

    /// Makes `objects` resident.
    fn make_resident(&self, objects: &[ObjectPtr]) -> Status {
        let inputs = [Value::objects(objects, InterfaceKind::Pageable)];
        self.interface()
            .call(CallId::MakeResident, &inputs, &mut [])
            .status
    }

    /// Allows `objects` to be evicted.
    fn evict(&self, objects: &[ObjectPtr]) -> Status {
        let inputs = [Value::objects(objects, InterfaceKind::Pageable)];
        self.interface().call(CallId::Evict, &inputs, &mut []).status
    }
}

/// Command submission.
pub trait CommandQueueCalls: Facade {
    /// Submits command lists in order.
    fn execute_command_lists(&self, lists: &[ObjectPtr]) {
        let inputs = [Value::objects(lists, InterfaceKind::CommandList)];
        self.interface()
            .call(CallId::ExecuteCommandLists, &inputs, &mut []);
    }

    /// Sets `fence` to `value` once preceding work completes.
    fn signal(&self, fence: &Fence, value: u64) -> Status {
        let inputs = [
            Value::object(fence.interface().ptr(), InterfaceKind::Fence),
            Value::U64(value),
        ];
        self.interface().call(CallId::Signal, &inputs, &mut []).status
    }
}

/// Command recording.
pub trait CommandListCalls: Facade {
    /// Finishes recording.
    fn close(&self) -> Status {
        self.interface().call(CallId::Close, &[], &mut []).status
    }

    /// Restarts recording into `allocator`.
    fn reset(&self, allocator: &CommandAllocator, initial_state: ObjectPtr) -> Status {
        let inputs = [
            Value::object(allocator.interface().ptr(), InterfaceKind::CommandAllocator),
            Value::object(initial_state, InterfaceKind::PipelineState),
        ];
        self.interface().call(CallId::Reset, &inputs, &mut []).status
    }

    /// Records resource state transitions.
    fn resource_barrier(&self, barriers: &[ResourceBarrier]) {
        let inputs = [Value::array(
            barriers.iter().map(ResourceBarrier::to_value).collect(),
        )];
        self.interface()
            .call(CallId::ResourceBarrier, &inputs, &mut []);
    }

    /// Binds a constant buffer by GPU virtual address.
    fn set_graphics_root_constant_buffer_view(&self, index: u32, address: u64) {
        let inputs = [
            Value::U32(index),
            Value::handle(HandlePool::GpuVirtualAddress, address),
        ];
        self.interface()
            .call(CallId::SetGraphicsRootConstantBufferView, &inputs, &mut []);
    }

    /// Copies `src` into `dst`.
    fn copy_resource(&self, dst: &Resource, src: &Resource) {
        let inputs = [
            Value::object(dst.interface().ptr(), InterfaceKind::Resource),
            Value::object(src.interface().ptr(), InterfaceKind::Resource),
        ];
        self.interface()
            .call(CallId::CopyResource, &inputs, &mut []);
    }
}

/// GPU memory.
pub trait ResourceCalls: Facade {
    /// Base GPU virtual address of a buffer.
    fn get_gpu_virtual_address(&self) -> u64 {
        let result = self
            .interface()
            .call(CallId::GetGpuVirtualAddress, &[], &mut []);
        returned_handle(&result)
    }
}

/// CPU/GPU synchronization.
pub trait FenceCalls: Facade {
    /// Last value the GPU reached.
    fn get_completed_value(&self) -> u64 {
        let result = self
            .interface()
            .call(CallId::GetCompletedValue, &[], &mut []);
        returned_u64(&result)
    }

    /// Signals `event` once the fence reaches `value`.
    fn set_event_on_completion(&self, value: u64, event: u64) -> Status {
        self.interface()
            .call(
                CallId::SetEventOnCompletion,
                &[Value::U64(value), Value::U64(event)],
                &mut [],
            )
            .status
    }
}

/// Descriptor handle ranges.
pub trait DescriptorHeapCalls: Facade {
    /// CPU handle of the first descriptor.
    fn get_cpu_descriptor_handle_for_heap_start(&self) -> u64 {
        let result =
            self.interface()
                .call(CallId::GetCpuDescriptorHandleForHeapStart, &[], &mut []);
        returned_handle(&result)
    }

    /// GPU handle of the first descriptor.
    fn get_gpu_descriptor_handle_for_heap_start(&self) -> u64 {
        let result =
            self.interface()
                .call(CallId::GetGpuDescriptorHandleForHeapStart, &[], &mut []);
        returned_handle(&result)
    }
}
