//! Trace records, as produced by a capture and as read back.

use widestring::U16String;

use crate::{
    capture::Status,
    format::CallId,
    object::{CaptureId, HandlePool, InterfaceId},
    resolve::{Out, Value},
};

/// An object introduced by a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewObject {
    /// Identity assigned to the object.
    pub capture_id: CaptureId,
    /// Interface the object was wrapped as.
    pub iid: InterfaceId,
}

/// One outermost call, ready to encode.
///
/// Borrows everything from the intercepting frame; nothing is copied until the encoder writes
/// the bytes.
#[derive(Clone, Copy, Debug)]
pub struct TraceRecord<'a> {
    /// Operation.
    pub call: CallId,
    /// Capture-local id of the calling thread.
    pub thread_id: u64,
    /// Owning object, [`CaptureId::NULL`] for free functions.
    pub object: CaptureId,
    /// Status the driver returned.
    pub status: Status,
    /// Return value, if the operation has one.
    pub ret: Option<&'a Value>,
    /// Arguments exactly as the application supplied them.
    pub inputs: &'a [Value],
    /// Out-parameters as the application observes them.
    pub outputs: &'a [Out],
    /// Objects wrapped because of this call.
    pub new_objects: &'a [NewObject],
}

/// A decoded value. Object references are capture identities.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceValue {
    /// Null pointer.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 32-bit integer.
    I32(i32),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// 32-bit float.
    F32(f32),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Narrow string.
    Str(String),
    /// Wide string.
    WStr(U16String),
    /// Object reference; `id` is [`CaptureId::NULL`] for null and unwrapped references.
    Object {
        /// Identity of the referenced object.
        id: CaptureId,
        /// Declared interface.
        iid: InterfaceId,
    },
    /// Pool handle relative to its owner. Unresolved handles carry a null owner and the raw
    /// value as offset.
    Handle {
        /// Pool.
        pool: HandlePool,
        /// Object owning the range.
        owner: CaptureId,
        /// Offset from the range base.
        offset: u64,
    },
    /// Pointer/count pair.
    Array {
        /// Count supplied by the caller.
        count: u32,
        /// Items, `None` for a null pointer.
        items: Option<Vec<TraceValue>>,
    },
    /// Structure fields in declaration order.
    Struct(Vec<TraceValue>),
}

impl TraceValue {
    /// Returns the referenced object identity.
    #[must_use]
    pub fn as_object_id(&self) -> Option<CaptureId> {
        match self {
            Self::Object { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Returns the items of a non-null array.
    #[must_use]
    pub fn as_items(&self) -> Option<&[TraceValue]> {
        match self {
            Self::Array { items, .. } => items.as_deref(),
            _ => None,
        }
    }
}

/// A decoded out-parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceOut {
    /// Object slot; `id` is `None` when the slot pointer was null.
    Object {
        /// Requested interface.
        riid: InterfaceId,
        /// Identity written to the slot.
        id: Option<CaptureId>,
    },
    /// Object array slot.
    ObjectArray {
        /// Interface of every element.
        riid: InterfaceId,
        /// Count supplied by the caller.
        count: u32,
        /// Identities, `None` for a null pointer.
        ids: Option<Vec<CaptureId>>,
    },
    /// Any other out value.
    Value(Option<TraceValue>),
}

/// A call record read back from a trace.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedRecord {
    /// Operation.
    pub call: CallId,
    /// Capture-local thread id.
    pub thread_id: u64,
    /// Owning object, [`CaptureId::NULL`] for free functions.
    pub object: CaptureId,
    /// Status.
    pub status: Status,
    /// Return value.
    pub ret: Option<TraceValue>,
    /// Inputs.
    pub inputs: Vec<TraceValue>,
    /// Outputs.
    pub outputs: Vec<TraceOut>,
    /// Objects introduced by the call.
    pub new_objects: Vec<NewObject>,
}
