//! # capscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the capscope library. Import this module to get quick access to the essential
//! types for intercepting calls and reading traces.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all capscope operations
pub use crate::Error;

/// The result type used throughout capscope
pub use crate::Result;

// ================================================================================================
// Capture
// ================================================================================================

/// Capture coordination and dispatch
pub use crate::capture::{
    CallReturn, CaptureManager, CaptureStats, DispatchTable, EntryPoint, EntryPointSource,
    Status,
};

/// Hooks
pub use crate::capture::{Hook, HookContext, HookPriority};

/// Settings
pub use crate::settings::CaptureSettings;

// ================================================================================================
// Objects and Values
// ================================================================================================

/// Object identity
pub use crate::object::{
    CaptureId, Handle, HandlePool, InterfaceId, InterfaceKind, ObjectPtr, ObjectRegistry, Wrapper,
};

/// Marshalled arguments
pub use crate::resolve::{Array, Out, Struct, Value};

// ================================================================================================
// Facades
// ================================================================================================

/// Wrapper facades and capability traits
pub use crate::api::{
    create_device, CommandAllocator, CommandListCalls, CommandQueue, CommandQueueCalls,
    DescriptorHeap, DescriptorHeapCalls, Device, DeviceCalls, DeviceChildCalls, Facade, Fence,
    FenceCalls, GraphicsCommandList, Interface, ObjectCalls, Outcome, Resource, ResourceCalls,
    UnknownCalls,
};

// ================================================================================================
// Trace Format
// ================================================================================================

/// Trace encoding and decoding
pub use crate::format::{
    CallId, DecodedRecord, FileSink, MemorySink, NullSink, TraceReader, TraceSink,
};
