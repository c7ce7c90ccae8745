//! Bookkeeping hooks run by every capture manager.
//!
//! Calls that hand out pool-relative handles (GPU virtual addresses, descriptor heap starts)
//! do not produce object references, so the generic resolver never sees them. These hooks
//! observe the returned values and register handle ranges in the registry, which lets later
//! calls that pass such handles be encoded as `(owner, offset)` pairs.
//!
//! The manager runs these after wrapping outputs and before encoding, so the record of the
//! call that returned a handle already encodes it relative to its owner.

use crate::{
    capture::hook::{core::Hook, types::HookPriority},
    format::CallId,
    object::HandlePool,
};

/// Field index of the width in a `ResourceDesc` structure.
const RESOURCE_DESC_WIDTH: usize = 2;

/// Returns every built-in hook.
#[must_use]
pub fn hooks() -> Vec<Hook> {
    vec![resource_extent(), gpu_virtual_address(), descriptor_heap_start()]
}

/// Records the byte width of committed resources on their wrapper.
#[must_use]
pub fn resource_extent() -> Hook {
    Hook::new("resource-extent")
        .with_priority(HookPriority::LOWEST)
        .match_call(CallId::CreateCommittedResource)
        .post(|ctx, ret| {
            if !ret.is_success() {
                return;
            }
            let Some(width) = ctx
                .inputs
                .get(2)
                .and_then(|desc| desc.as_struct())
                .and_then(|desc| desc.field(RESOURCE_DESC_WIDTH))
                .and_then(|width| width.as_u64())
            else {
                return;
            };
            let Some(resource) = ctx
                .outputs
                .first()
                .and_then(|out| out.object_ptr())
                .and_then(|ptr| ctx.registry.lookup(ptr))
            else {
                return;
            };
            resource.set_extent(width);
        })
}

/// Registers the GPU virtual address range of a resource.
///
/// The address may come back as a [`HandlePool::GpuVirtualAddress`] handle or a bare `u64`.
#[must_use]
pub fn gpu_virtual_address() -> Hook {
    Hook::new("gpu-virtual-address")
        .with_priority(HookPriority::LOWEST)
        .match_call(CallId::GetGpuVirtualAddress)
        .post(|ctx, ret| {
            let address = ret
                .value
                .as_ref()
                .and_then(|v| v.as_handle().map(|handle| handle.value).or_else(|| v.as_u64()));
            let (Some(this), Some(address)) = (ctx.this, address) else {
                return;
            };
            let extent = this.extent();
            let len = (extent > 0).then_some(extent);
            ctx.registry.register_handle_range(
                this,
                HandlePool::GpuVirtualAddress,
                address,
                address,
                len,
            );
        })
}

/// Registers the descriptor handle range starting at a heap's base.
///
/// The range is unbounded: it extends up to the next registered heap.
#[must_use]
pub fn descriptor_heap_start() -> Hook {
    Hook::new("descriptor-heap-start")
        .with_priority(HookPriority::LOWEST)
        .match_calls([
            CallId::GetCpuDescriptorHandleForHeapStart,
            CallId::GetGpuDescriptorHandleForHeapStart,
        ])
        .post(|ctx, ret| {
            let (Some(this), Some(handle)) =
                (ctx.this, ret.value.as_ref().and_then(|v| v.as_handle()))
            else {
                return;
            };
            ctx.registry
                .register_handle_range(this, handle.pool, handle.value, handle.value, None);
        })
}
