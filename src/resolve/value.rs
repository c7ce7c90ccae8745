//! Marshalled call arguments.
//!
//! Intercepted entry points exchange their parameters with the capture core as [`Value`]
//! trees (inputs) and [`Out`] slots (out-parameters). The shape mirrors what the native calling
//! surface can express:
//!
//! | Native construct | Representation |
//! |------------------|----------------|
//! | scalar / enum / flags | [`Value::Bool`], [`Value::I32`], [`Value::U32`], [`Value::U64`], [`Value::F32`] |
//! | interface pointer | [`Value::Object`] |
//! | GPU address / descriptor handle | [`Value::Handle`] |
//! | pointer + count | [`Value::Array`] with `items: None` for a null pointer |
//! | pointer to struct / inline struct | [`Value::Struct`], nesting allowed |
//! | `T**` out-parameter | [`Out::Object`] |

use widestring::U16String;

use crate::object::{Handle, HandlePool, InterfaceId, InterfaceKind, ObjectPtr};

/// An interface pointer together with the interface it is declared as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    /// The reference as held by the caller: a wrapper address, a raw address or null.
    pub ptr: ObjectPtr,
    /// Declared interface of the parameter or field.
    pub iid: InterfaceId,
}

/// A pointer/count pair.
///
/// `count` is what the caller claimed; `items` is what the pointer actually refers to.
/// The two normally agree. When they do not, the argument is malformed and is forwarded
/// untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    /// Element count supplied by the caller.
    pub count: u32,
    /// Elements, `None` for a null pointer.
    pub items: Option<Vec<Value>>,
}

impl Array {
    /// Creates an array whose count matches its items.
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            count: u32::try_from(items.len()).unwrap_or(u32::MAX),
            items: Some(items),
        }
    }

    /// Creates a null pointer with count zero.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            count: 0,
            items: None,
        }
    }

    /// Returns `true` when `count` agrees with the pointed-to items.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match &self.items {
            None => self.count == 0,
            Some(items) => items.len() == self.count as usize,
        }
    }

    /// Returns `true` for a null pointer or zero count.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.items.is_none()
    }
}

/// A structure argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Struct {
    /// Structure type name, for diagnostics only.
    pub name: &'static str,
    /// Fields in declaration order.
    pub fields: Vec<Value>,
}

impl Struct {
    /// Creates a structure.
    #[must_use]
    pub fn new(name: &'static str, fields: Vec<Value>) -> Self {
        Self { name, fields }
    }

    /// Returns the field at `index`.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }
}

/// A marshalled input value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A null pointer argument.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 32-bit integer or enum.
    I32(i32),
    /// Unsigned 32-bit integer or flags.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// 32-bit float.
    F32(f32),
    /// Opaque bytes (initial data, shader bytecode, ...).
    Bytes(Vec<u8>),
    /// Narrow string.
    Str(String),
    /// Wide string.
    WStr(U16String),
    /// Interface pointer.
    Object(ObjectRef),
    /// Pool-relative handle.
    Handle(Handle),
    /// Pointer/count pair.
    Array(Array),
    /// Structure.
    Struct(Struct),
}

impl Value {
    /// An interface pointer declared as `kind`.
    #[must_use]
    pub fn object(ptr: ObjectPtr, kind: InterfaceKind) -> Self {
        Self::Object(ObjectRef {
            ptr,
            iid: kind.iid(),
        })
    }

    /// A handle in `pool`.
    #[must_use]
    pub fn handle(pool: HandlePool, value: u64) -> Self {
        Self::Handle(Handle::new(pool, value))
    }

    /// An array whose count matches `items`.
    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Array::new(items))
    }

    /// An array of interface pointers declared as `kind`.
    #[must_use]
    pub fn objects(ptrs: &[ObjectPtr], kind: InterfaceKind) -> Self {
        Self::array(ptrs.iter().map(|ptr| Self::object(*ptr, kind)).collect())
    }

    /// A structure value.
    #[must_use]
    pub fn structure(name: &'static str, fields: Vec<Value>) -> Self {
        Self::Struct(Struct::new(name, fields))
    }

    /// A wide string.
    #[must_use]
    pub fn wstr(text: &str) -> Self {
        Self::WStr(U16String::from_str(text))
    }

    /// Returns `true` if this value, or anything nested in it, is a non-null object reference
    /// or handle.
    #[must_use]
    pub fn has_references(&self) -> bool {
        match self {
            Self::Object(obj) => !obj.ptr.is_null(),
            Self::Handle(handle) => !handle.is_null(),
            Self::Array(array) => array
                .items
                .as_ref()
                .is_some_and(|items| items.iter().any(Self::has_references)),
            Self::Struct(value) => value.fields.iter().any(Self::has_references),
            _ => false,
        }
    }

    /// Returns the value as `bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as `u32`.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as `u64`, widening `u32`.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(value) => Some(*value),
            Self::U32(value) => Some(u64::from(*value)),
            _ => None,
        }
    }

    /// Returns the object reference.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns the handle.
    #[must_use]
    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Self::Handle(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Returns the array.
    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Returns the structure.
    #[must_use]
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(value) => Some(value),
            _ => None,
        }
    }
}

/// An out-parameter slot.
///
/// The driver writes into the slot during the forwarded call. Object slots are rewritten with
/// wrapper addresses afterwards, so the application never sees a real reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Out {
    /// `void**` paired with a requested interface identifier. `slot: None` is a null pointer.
    Object {
        /// Interface the caller asked for.
        riid: InterfaceId,
        /// Storage the driver writes the produced reference into.
        slot: Option<ObjectPtr>,
    },
    /// Caller-allocated array of interface pointers.
    ObjectArray {
        /// Interface of every element.
        riid: InterfaceId,
        /// Element count supplied by the caller.
        count: u32,
        /// Storage, `None` for a null pointer.
        slots: Option<Vec<ObjectPtr>>,
    },
    /// Any other out value; may be a structure embedding object references.
    Value(Option<Value>),
}

impl Out {
    /// An object slot for `riid`, initialized to null.
    #[must_use]
    pub fn object(riid: InterfaceId) -> Self {
        Self::Object {
            riid,
            slot: Some(ObjectPtr::NULL),
        }
    }

    /// An object slot passed as a null pointer.
    #[must_use]
    pub fn null_object(riid: InterfaceId) -> Self {
        Self::Object { riid, slot: None }
    }

    /// An array of `count` object slots.
    #[must_use]
    pub fn object_array(riid: InterfaceId, count: u32) -> Self {
        Self::ObjectArray {
            riid,
            count,
            slots: Some(vec![ObjectPtr::NULL; count as usize]),
        }
    }

    /// A plain value slot.
    #[must_use]
    pub fn value() -> Self {
        Self::Value(Some(Value::Null))
    }

    /// Returns the reference held by an object slot.
    #[must_use]
    pub fn object_ptr(&self) -> Option<ObjectPtr> {
        match self {
            Self::Object { slot, .. } => *slot,
            _ => None,
        }
    }

    /// Returns the interface identifier of an object or object-array slot.
    #[must_use]
    pub fn riid(&self) -> Option<InterfaceId> {
        match self {
            Self::Object { riid, .. } | Self::ObjectArray { riid, .. } => Some(*riid),
            Self::Value(_) => None,
        }
    }

    /// Stores `ptr` into an object slot. Returns `false` for null pointers and other slot kinds.
    pub fn set_object(&mut self, ptr: ObjectPtr) -> bool {
        match self {
            Self::Object {
                slot: Some(slot), ..
            } => {
                *slot = ptr;
                true
            }
            _ => false,
        }
    }

    /// Stores `value` into a value slot. Returns `false` for null pointers and other slot kinds.
    pub fn set_value(&mut self, value: Value) -> bool {
        match self {
            Self::Value(Some(slot)) => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    /// Returns the contents of a value slot.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => value.as_ref(),
            _ => None,
        }
    }
}
