//! Typed descriptions passed to creation and recording calls.
//!
//! Each description marshals into a [`Value::Struct`] with a fixed field order. Field order
//! is part of the trace format: consumers address fields by index.

use crate::{
    object::{InterfaceKind, ObjectPtr},
    resolve::Value,
};

/// Command queue description.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandQueueDesc {
    /// Command list type the queue executes.
    pub list_type: i32,
    /// Scheduling priority.
    pub priority: i32,
    /// Queue flags.
    pub flags: u32,
    /// Node the queue runs on.
    pub node_mask: u32,
}

impl CommandQueueDesc {
    /// Marshals the description.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::structure(
            "CommandQueueDesc",
            vec![
                Value::I32(self.list_type),
                Value::I32(self.priority),
                Value::U32(self.flags),
                Value::U32(self.node_mask),
            ],
        )
    }
}

/// Heap properties of a committed resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapProperties {
    /// Heap type (default, upload, readback, custom).
    pub heap_type: i32,
    /// CPU page property for custom heaps.
    pub cpu_page_property: i32,
    /// Memory pool preference for custom heaps.
    pub memory_pool_preference: i32,
    /// Node the memory is created on.
    pub creation_node_mask: u32,
    /// Nodes the memory is visible to.
    pub visible_node_mask: u32,
}

impl HeapProperties {
    /// Marshals the properties.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::structure(
            "HeapProperties",
            vec![
                Value::I32(self.heap_type),
                Value::I32(self.cpu_page_property),
                Value::I32(self.memory_pool_preference),
                Value::U32(self.creation_node_mask),
                Value::U32(self.visible_node_mask),
            ],
        )
    }
}

/// Resource description.
///
/// `width` is field 2 of the marshalled structure; the resource extent hook reads it there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceDesc {
    /// Buffer or texture dimension.
    pub dimension: i32,
    /// Placement alignment.
    pub alignment: u64,
    /// Width in bytes (buffers) or texels.
    pub width: u64,
    /// Height in texels.
    pub height: u32,
    /// Depth or array size.
    pub depth_or_array_size: u32,
    /// Mip level count.
    pub mip_levels: u32,
    /// Pixel format.
    pub format: u32,
    /// Resource flags.
    pub flags: u32,
}

impl ResourceDesc {
    /// A buffer of `width` bytes.
    #[must_use]
    pub fn buffer(width: u64) -> Self {
        Self {
            dimension: 1,
            width,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            ..Self::default()
        }
    }

    /// Marshals the description.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::structure(
            "ResourceDesc",
            vec![
                Value::I32(self.dimension),
                Value::U64(self.alignment),
                Value::U64(self.width),
                Value::U32(self.height),
                Value::U32(self.depth_or_array_size),
                Value::U32(self.mip_levels),
                Value::U32(self.format),
                Value::U32(self.flags),
            ],
        )
    }
}

/// Descriptor heap description.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DescriptorHeapDesc {
    /// Descriptor type held by the heap.
    pub heap_type: i32,
    /// Number of descriptors.
    pub num_descriptors: u32,
    /// Heap flags (shader visibility).
    pub flags: u32,
    /// Node the heap lives on.
    pub node_mask: u32,
}

impl DescriptorHeapDesc {
    /// Marshals the description.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::structure(
            "DescriptorHeapDesc",
            vec![
                Value::I32(self.heap_type),
                Value::U32(self.num_descriptors),
                Value::U32(self.flags),
                Value::U32(self.node_mask),
            ],
        )
    }
}

/// A state transition of one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceBarrier {
    /// Barrier flags.
    pub flags: u32,
    /// Resource being transitioned, as held by the application.
    pub resource: ObjectPtr,
    /// Subresource index, `u32::MAX` for all.
    pub subresource: u32,
    /// State before the barrier.
    pub before: i32,
    /// State after the barrier.
    pub after: i32,
}

impl ResourceBarrier {
    /// Barrier type of transitions.
    pub const TRANSITION: i32 = 0;

    /// A transition of every subresource of `resource`.
    #[must_use]
    pub fn transition(resource: ObjectPtr, before: i32, after: i32) -> Self {
        Self {
            flags: 0,
            resource,
            subresource: u32::MAX,
            before,
            after,
        }
    }

    /// Marshals the barrier, nesting the transition structure.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::structure(
            "ResourceBarrier",
            vec![
                Value::I32(Self::TRANSITION),
                Value::U32(self.flags),
                Value::structure(
                    "ResourceTransitionBarrier",
                    vec![
                        Value::object(self.resource, InterfaceKind::Resource),
                        Value::U32(self.subresource),
                        Value::I32(self.before),
                        Value::I32(self.after),
                    ],
                ),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_desc_width_position() {
        let value = ResourceDesc::buffer(4096).to_value();
        let desc = value.as_struct().unwrap();
        assert_eq!(desc.name, "ResourceDesc");
        assert_eq!(desc.field(2).and_then(Value::as_u64), Some(4096));
    }

    #[test]
    fn test_barrier_nests_resource() {
        let barrier = ResourceBarrier::transition(ObjectPtr::new(0x77), 0, 4).to_value();
        let transition = barrier.as_struct().unwrap().field(2).unwrap().as_struct().unwrap();
        let resource = transition.field(0).unwrap().as_object().unwrap();
        assert_eq!(resource.ptr, ObjectPtr::new(0x77));
        assert_eq!(resource.iid, InterfaceKind::Resource.iid());
        assert!(barrier.has_references());
    }
}
