//! Binary trace format.
//!
//! A trace is a file header followed by a sequence of blocks. Every block starts with a
//! `u32` block type and a `u64` payload size, so readers can skip blocks they do not
//! understand. The only block written today is the call record ([`BLOCK_CALL`]).
//!
//! # File Layout
//!
//! ```text
//! +--------+-------+-------+-------+----------+
//! | "CPSC" | major | minor | flags | reserved |   header, 16 bytes
//! +--------+-------+-------+-------+----------+
//! | type u32 | size u64 | payload ...         |   block
//! +----------+----------+---------------------+
//! | type u32 | size u64 | payload ...         |   block
//! ```
//!
//! # Call Record Payload
//!
//! | Field | Encoding |
//! |-------|----------|
//! | call | `u32` [`CallId`] |
//! | thread | `u64` capture-local thread id |
//! | object | `u64` [`crate::object::CaptureId`], `0` for free functions |
//! | status | `i32` |
//! | return value | tagged value, [`tags::NONE`] when absent |
//! | inputs | `u32` count, tagged values |
//! | outputs | `u32` count, tagged out slots |
//! | new objects | `u32` count, `(u64 id, [u8; 16] iid)` pairs |
//!
//! All integers are little-endian. Objects are always written as capture identifiers, never
//! as addresses. Variable-length data is length-prefixed.

mod encoder;
mod io;
mod parser;
mod reader;
mod record;
mod sink;

pub use encoder::Encoder;
pub use io::TraceIO;
pub use parser::Parser;
pub use reader::TraceReader;
pub use record::{DecodedRecord, NewObject, TraceOut, TraceRecord, TraceValue};
pub use sink::{FileSink, MemorySink, NullSink, TraceSink};

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, FromRepr, IntoStaticStr};

use crate::object::InterfaceKind;

/// File magic, `"CPSC"`.
pub const MAGIC: [u8; 4] = *b"CPSC";
/// Major format version. Readers reject other majors.
pub const VERSION_MAJOR: u16 = 1;
/// Minor format version. Additions only.
pub const VERSION_MINOR: u16 = 0;
/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;
/// Size of a block header in bytes.
pub const BLOCK_HEADER_SIZE: usize = 12;
/// Block type of a call record.
pub const BLOCK_CALL: u32 = 1;

bitflags! {
    /// Properties of a trace file, stored in its header.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TraceFlags: u32 {
        /// Every block was flushed to disk as soon as it was written.
        const FLUSHED_PER_BLOCK = 0x0001;
        /// Records carry the capture-local thread id.
        const THREAD_IDS = 0x0002;
    }
}

/// Value and out-slot tags.
pub mod tags {
    /// No value (absent return value).
    pub const NONE: u8 = 0;
    /// Null pointer.
    pub const NULL: u8 = 1;
    /// `u8` 0 or 1.
    pub const BOOL: u8 = 2;
    /// `i32`.
    pub const I32: u8 = 3;
    /// `u32`.
    pub const U32: u8 = 4;
    /// `u64`.
    pub const U64: u8 = 5;
    /// `f32`.
    pub const F32: u8 = 6;
    /// `u32` length, bytes.
    pub const BYTES: u8 = 7;
    /// `u32` length, UTF-8 bytes.
    pub const STR: u8 = 8;
    /// `u32` unit count, UTF-16 units.
    pub const WSTR: u8 = 9;
    /// `u64` capture id, `[u8; 16]` interface id.
    pub const OBJECT: u8 = 10;
    /// `u8` pool, `u64` owner id, `u64` offset.
    pub const HANDLE: u8 = 11;
    /// `u32` count, `u8` present, items.
    pub const ARRAY: u8 = 12;
    /// `u32` field count, fields.
    pub const STRUCT: u8 = 13;

    /// `[u8; 16]` riid, `u8` present, `u64` capture id.
    pub const OUT_OBJECT: u8 = 0x20;
    /// `[u8; 16]` riid, `u32` count, `u8` present, `u64` ids.
    pub const OUT_OBJECT_ARRAY: u8 = 0x21;
    /// `u8` present, tagged value.
    pub const OUT_VALUE: u8 = 0x22;
}

/// Every intercepted operation.
///
/// The discriminant is the wire value. Values are grouped by the interface that declares the
/// method (`0x00xx` free functions, `0x01xx` unknown, ...) and never change once assigned.
#[repr(u32)]
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter, FromRepr, IntoStaticStr,
)]
pub enum CallId {
    /// Free function creating the device.
    CreateDevice = 0x0001,

    /// Requests another interface view of an object.
    QueryInterface = 0x0100,
    /// Adds an application reference.
    AddRef = 0x0101,
    /// Drops an application reference.
    Release = 0x0102,

    /// Attaches a debug name.
    SetName = 0x0200,

    /// Returns the device owning a child object.
    GetDevice = 0x0300,

    /// Creates a command queue.
    CreateCommandQueue = 0x0400,
    /// Creates a command allocator.
    CreateCommandAllocator = 0x0401,
    /// Creates a command list.
    CreateCommandList = 0x0402,
    /// Creates a fence.
    CreateFence = 0x0403,
    /// Creates a resource with its own implicit heap.
    CreateCommittedResource = 0x0404,
    /// Creates a descriptor heap.
    CreateDescriptorHeap = 0x0405,
    /// Writes a shader resource view into a descriptor slot.
    CreateShaderResourceView = 0x0406,
    /// Makes pageable objects resident.
    MakeResident = 0x0407,
    /// Evicts pageable objects.
    Evict = 0x0408,

    /// Returns the first CPU descriptor handle of a heap.
    GetCpuDescriptorHandleForHeapStart = 0x0500,
    /// Returns the first GPU descriptor handle of a heap.
    GetGpuDescriptorHandleForHeapStart = 0x0501,

    /// Returns the GPU virtual address of a buffer.
    GetGpuVirtualAddress = 0x0600,

    /// Submits command lists.
    ExecuteCommandLists = 0x0700,
    /// Signals a fence from the GPU timeline.
    Signal = 0x0701,

    /// Finishes recording.
    Close = 0x0800,
    /// Restarts recording with an allocator.
    Reset = 0x0801,
    /// Records resource transitions.
    ResourceBarrier = 0x0802,
    /// Binds a constant buffer by GPU virtual address.
    SetGraphicsRootConstantBufferView = 0x0803,
    /// Copies one resource into another.
    CopyResource = 0x0804,

    /// Returns the fence's completed value.
    GetCompletedValue = 0x0900,
    /// Arms an event for a fence value.
    SetEventOnCompletion = 0x0901,
}

impl CallId {
    /// Decodes a wire value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownCall`] for values not assigned to any call.
    pub fn from_wire(value: u32) -> crate::Result<Self> {
        Self::from_repr(value).ok_or(crate::Error::UnknownCall(value))
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn wire(self) -> u32 {
        self as u32
    }

    /// Returns the interface declaring this method, `None` for free functions.
    #[must_use]
    pub const fn interface(self) -> Option<InterfaceKind> {
        match self {
            Self::CreateDevice => None,
            Self::QueryInterface | Self::AddRef | Self::Release => Some(InterfaceKind::Unknown),
            Self::SetName => Some(InterfaceKind::Object),
            Self::GetDevice => Some(InterfaceKind::DeviceChild),
            Self::CreateCommandQueue
            | Self::CreateCommandAllocator
            | Self::CreateCommandList
            | Self::CreateFence
            | Self::CreateCommittedResource
            | Self::CreateDescriptorHeap
            | Self::CreateShaderResourceView
            | Self::MakeResident
            | Self::Evict => Some(InterfaceKind::Device),
            Self::GetCpuDescriptorHandleForHeapStart | Self::GetGpuDescriptorHandleForHeapStart => {
                Some(InterfaceKind::DescriptorHeap)
            }
            Self::GetGpuVirtualAddress => Some(InterfaceKind::Resource),
            Self::ExecuteCommandLists | Self::Signal => Some(InterfaceKind::CommandQueue),
            Self::Close
            | Self::Reset
            | Self::ResourceBarrier
            | Self::SetGraphicsRootConstantBufferView
            | Self::CopyResource => Some(InterfaceKind::GraphicsCommandList),
            Self::GetCompletedValue | Self::SetEventOnCompletion => Some(InterfaceKind::Fence),
        }
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_call_ids_unique_and_decodable() {
        let wires: HashSet<_> = CallId::iter().map(CallId::wire).collect();
        assert_eq!(wires.len(), CallId::COUNT);
        for call in CallId::iter() {
            assert_eq!(CallId::from_wire(call.wire()).unwrap(), call);
        }
    }

    #[test]
    fn test_stable_wire_values() {
        assert_eq!(CallId::CreateDevice.wire(), 0x0001);
        assert_eq!(CallId::Release.wire(), 0x0102);
        assert_eq!(CallId::CreateCommittedResource.wire(), 0x0404);
        assert_eq!(CallId::SetEventOnCompletion.wire(), 0x0901);
    }

    #[test]
    fn test_unknown_call() {
        assert!(matches!(
            CallId::from_wire(0xffff),
            Err(crate::Error::UnknownCall(0xffff))
        ));
    }

    #[test]
    fn test_interface_grouping() {
        assert_eq!(CallId::CreateDevice.interface(), None);
        assert_eq!(
            CallId::GetGpuVirtualAddress.interface(),
            Some(InterfaceKind::Resource)
        );
        for call in CallId::iter().filter(|call| call.wire() >= 0x0100) {
            assert!(call.interface().is_some(), "{call:?}");
        }
    }
}
