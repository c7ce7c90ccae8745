//! Interface identifiers and the set of interface types this crate can wrap.
//!
//! The wrapped API is object-oriented with deep "is-a" chains (a resource is a pageable,
//! which is a device child, which is an object, which is an unknown). Rather than mirror those
//! chains as a type hierarchy, every wrappable interface is one [`InterfaceKind`] carrying its
//! parent link and a flattened [`Capabilities`] set. Wrapper facades in [`crate::api`] test
//! capabilities instead of walking inheritance.

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};
use uguid::{guid, Guid};

/// 128-bit interface identifier as used by the wrapped API.
pub type InterfaceId = Guid;

bitflags! {
    /// Behaviour groups an interface provides, flattened over its inheritance chain.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Reference counting and interface querying.
        const UNKNOWN = 0x0001;
        /// Debug naming.
        const OBJECT = 0x0002;
        /// Owned by a device, can report it.
        const DEVICE_CHILD = 0x0004;
        /// Residency can be managed (`MakeResident` / `Evict`).
        const PAGEABLE = 0x0008;
        /// Device entry points (object creation).
        const DEVICE = 0x0010;
        /// Command submission.
        const COMMAND_QUEUE = 0x0020;
        /// Command recording.
        const COMMAND_LIST = 0x0040;
        /// GPU memory with a virtual address range.
        const RESOURCE = 0x0080;
        /// CPU/GPU synchronization.
        const FENCE = 0x0100;
        /// Descriptor handle ranges.
        const DESCRIPTOR_HEAP = 0x0200;
    }
}

/// An interface type with a known wrapper.
///
/// Each kind owns one shard of the [`crate::object::ObjectRegistry`]. The discriminant is used
/// as the shard index.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumCount, EnumIter, IntoStaticStr,
)]
pub enum InterfaceKind {
    /// Root interface.
    Unknown,
    /// Named object.
    Object,
    /// Object owned by a device.
    DeviceChild,
    /// Device child whose residency can be managed.
    Pageable,
    /// The device.
    Device,
    /// Revised device interface.
    Device1,
    /// Command submission queue.
    CommandQueue,
    /// Command memory allocator.
    CommandAllocator,
    /// Base command list.
    CommandList,
    /// Graphics command list.
    GraphicsCommandList,
    /// Synchronization fence.
    Fence,
    /// Buffer or texture.
    Resource,
    /// Memory heap.
    Heap,
    /// Descriptor heap.
    DescriptorHeap,
    /// Compiled pipeline state.
    PipelineState,
    /// Root signature.
    RootSignature,
    /// Query heap.
    QueryHeap,
}

impl InterfaceKind {
    /// Returns the interface identifier for this kind.
    #[must_use]
    pub const fn iid(self) -> InterfaceId {
        match self {
            Self::Unknown => guid!("00000000-0000-0000-c000-000000000046"),
            Self::Object => guid!("c4fec28f-7966-4e95-9f94-f431cb56c3b8"),
            Self::DeviceChild => guid!("905db94b-a00c-4140-9df5-2b64ca9ea357"),
            Self::Pageable => guid!("63ee58fb-1268-4835-86da-f008ce62f0d6"),
            Self::Device => guid!("189819f1-1db6-4b57-be54-1821339b85f7"),
            Self::Device1 => guid!("77acce80-638e-4e65-8895-c1f23386863e"),
            Self::CommandQueue => guid!("0ec870a6-5d7e-4c22-8cfc-5baae07616ed"),
            Self::CommandAllocator => guid!("6102dee4-af59-4b09-b999-b44d73f09b24"),
            Self::CommandList => guid!("7116d91c-e7e4-47ce-b8c6-ec8168f437e5"),
            Self::GraphicsCommandList => guid!("5b160d0f-ac1b-4185-8ba8-b3ae42a5a455"),
            Self::Fence => guid!("0a753dcf-c4d8-4b91-adf6-be5a60d95a76"),
            Self::Resource => guid!("696442be-a72e-4059-bc79-5b5c98040fad"),
            Self::Heap => guid!("6b3b2502-6e51-45b3-90ee-9884265e8df3"),
            Self::DescriptorHeap => guid!("8efb471d-616c-4f49-90f7-127bb763fa51"),
            Self::PipelineState => guid!("765a30f3-f624-4c6f-a828-ace948622445"),
            Self::RootSignature => guid!("c54a6b66-72df-4ee8-8be5-a946a1429214"),
            Self::QueryHeap => guid!("0d9658ae-ed45-469e-a61d-970ec583cab4"),
        }
    }

    /// Looks up the kind that wraps `iid`.
    ///
    /// Returns `None` for identifiers without a wrapper; callers then hand the raw reference
    /// back to the application unwrapped.
    #[must_use]
    pub fn from_iid(iid: &InterfaceId) -> Option<Self> {
        Self::iter().find(|kind| kind.iid() == *iid)
    }

    /// Returns the interface this one directly extends, `None` for [`InterfaceKind::Unknown`].
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Unknown => None,
            Self::Object => Some(Self::Unknown),
            Self::DeviceChild | Self::Device => Some(Self::Object),
            Self::Pageable | Self::CommandList | Self::RootSignature => Some(Self::DeviceChild),
            Self::Device1 => Some(Self::Device),
            Self::GraphicsCommandList => Some(Self::CommandList),
            Self::CommandQueue
            | Self::CommandAllocator
            | Self::Fence
            | Self::Resource
            | Self::Heap
            | Self::DescriptorHeap
            | Self::PipelineState
            | Self::QueryHeap => Some(Self::Pageable),
        }
    }

    const fn own_capabilities(self) -> Capabilities {
        match self {
            Self::Unknown => Capabilities::UNKNOWN,
            Self::Object => Capabilities::OBJECT,
            Self::DeviceChild => Capabilities::DEVICE_CHILD,
            Self::Pageable => Capabilities::PAGEABLE,
            Self::Device => Capabilities::DEVICE,
            Self::CommandQueue => Capabilities::COMMAND_QUEUE,
            Self::CommandList => Capabilities::COMMAND_LIST,
            Self::Fence => Capabilities::FENCE,
            Self::Resource => Capabilities::RESOURCE,
            Self::DescriptorHeap => Capabilities::DESCRIPTOR_HEAP,
            Self::Device1
            | Self::CommandAllocator
            | Self::GraphicsCommandList
            | Self::Heap
            | Self::PipelineState
            | Self::RootSignature
            | Self::QueryHeap => Capabilities::empty(),
        }
    }

    /// Returns every capability of this interface including the inherited ones.
    #[must_use]
    pub fn capabilities(self) -> Capabilities {
        let mut caps = self.own_capabilities();
        let mut current = self.parent();
        while let Some(kind) = current {
            caps |= kind.own_capabilities();
            current = kind.parent();
        }
        caps
    }

    /// Returns `true` if this interface is `base` or extends it.
    #[must_use]
    pub fn is_a(self, base: InterfaceKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == base {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Returns the display name of this kind.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}
