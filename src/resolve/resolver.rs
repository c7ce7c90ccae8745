//! Reference resolution for call arguments.
//!
//! Before a call is forwarded every wrapper address reachable from its inputs is replaced by
//! the real reference, and every application-visible handle by the driver's value. The caller's
//! argument tree is never modified: the resolver returns [`Cow`] views that borrow the original
//! when nothing needed rewriting and otherwise own a copy built from scratch buffers.
//!
//! After a successful call the reverse direction runs over the out-parameters, wrapping every
//! newly produced reference.

use std::borrow::Cow;

use crate::{
    capture::ScratchMemory,
    format::NewObject,
    object::{Handle, InterfaceId, ObjectPtr, ObjectRegistry},
    resolve::{Array, ObjectRef, Out, Struct, Value},
    Error,
};

/// Resolves references against one registry.
#[derive(Clone, Copy, Debug)]
pub struct Resolver<'r> {
    registry: &'r ObjectRegistry,
}

impl<'r> Resolver<'r> {
    /// Creates a resolver over `registry`.
    #[must_use]
    pub fn new(registry: &'r ObjectRegistry) -> Self {
        Self { registry }
    }

    /// Returns the real reference behind `ptr`, or `ptr` itself if it is not a wrapper.
    ///
    /// Raw references passed by the application pass through untouched.
    #[must_use]
    pub fn unwrap_one(&self, ptr: ObjectPtr) -> ObjectPtr {
        self.registry.unwrap_ptr(ptr)
    }

    /// Translates an application-visible handle to the driver's value.
    ///
    /// Handles outside every registered range pass through untouched.
    #[must_use]
    pub fn unwrap_handle(&self, handle: Handle) -> Handle {
        match self.registry.handles().resolve(handle) {
            Some(resolved) => Handle::new(handle.pool, resolved.real),
            None => handle,
        }
    }

    /// Resolves one input value.
    pub fn unwrap_value<'v>(&self, value: &'v Value, scratch: &mut ScratchMemory) -> Cow<'v, Value> {
        match value {
            Value::Object(obj) => {
                let real = self.unwrap_one(obj.ptr);
                if real == obj.ptr {
                    Cow::Borrowed(value)
                } else {
                    Cow::Owned(Value::Object(ObjectRef {
                        ptr: real,
                        iid: obj.iid,
                    }))
                }
            }
            Value::Handle(handle) => {
                let real = self.unwrap_handle(*handle);
                if real == *handle {
                    Cow::Borrowed(value)
                } else {
                    Cow::Owned(Value::Handle(real))
                }
            }
            Value::Array(array) => match self.unwrap_array(array, scratch) {
                Cow::Borrowed(_) => Cow::Borrowed(value),
                Cow::Owned(array) => Cow::Owned(Value::Array(array)),
            },
            Value::Struct(inner) => match self.unwrap_struct(inner, scratch) {
                Cow::Borrowed(_) => Cow::Borrowed(value),
                Cow::Owned(inner) => Cow::Owned(Value::Struct(inner)),
            },
            _ => Cow::Borrowed(value),
        }
    }

    /// Resolves every element of a pointer/count pair.
    ///
    /// A null pointer or a zero count is returned as is, without touching scratch memory. So
    /// is a malformed pair whose count disagrees with its items: it reaches the driver exactly
    /// as the application supplied it.
    pub fn unwrap_array<'v>(&self, array: &'v Array, scratch: &mut ScratchMemory) -> Cow<'v, Array> {
        if !array.is_consistent() {
            log::debug!(
                "forwarding malformed array unresolved: count {} with {} items",
                array.count,
                array.items.as_ref().map_or(0, Vec::len)
            );
            return Cow::Borrowed(array);
        }
        if array.is_empty() {
            return Cow::Borrowed(array);
        }

        let Some(items) = &array.items else {
            return Cow::Borrowed(array);
        };
        match self.unwrap_items(items, scratch) {
            Some(resolved) => Cow::Owned(Array {
                count: array.count,
                items: Some(resolved),
            }),
            None => Cow::Borrowed(array),
        }
    }

    /// Resolves every field of a structure, recursing into nested structures and arrays.
    ///
    /// Structures without references are returned borrowed.
    pub fn unwrap_struct<'v>(&self, value: &'v Struct, scratch: &mut ScratchMemory) -> Cow<'v, Struct> {
        match self.unwrap_items(&value.fields, scratch) {
            Some(fields) => Cow::Owned(Struct {
                name: value.name,
                fields,
            }),
            None => Cow::Borrowed(value),
        }
    }

    // Returns `None` when no item changed. The copy is started at the first changed item, so
    // untouched prefixes are not resolved twice.
    fn unwrap_items(&self, items: &[Value], scratch: &mut ScratchMemory) -> Option<Vec<Value>> {
        let mut resolved: Option<Vec<Value>> = None;
        for (index, item) in items.iter().enumerate() {
            let item = self.unwrap_value(item, scratch);
            if let Some(buffer) = resolved.as_mut() {
                buffer.push(item.into_owned());
            } else if let Cow::Owned(item) = item {
                let mut buffer = scratch.alloc_values(items.len());
                buffer.extend(items[..index].iter().cloned());
                buffer.push(item);
                resolved = Some(buffer);
            }
        }
        resolved
    }

    /// Resolves a whole input list.
    pub fn unwrap_inputs<'v>(
        &self,
        inputs: &'v [Value],
        scratch: &mut ScratchMemory,
    ) -> Vec<Cow<'v, Value>> {
        inputs
            .iter()
            .map(|value| self.unwrap_value(value, scratch))
            .collect()
    }

    /// Hands the buffers of resolved copies back to scratch memory.
    pub fn release(resolved: Vec<Cow<'_, Value>>, scratch: &mut ScratchMemory) {
        for value in resolved {
            if let Cow::Owned(value) = value {
                reclaim(value, scratch);
            }
        }
    }

    /// Wraps `real` as `riid` and returns the address to hand to the application.
    ///
    /// Null stays null. An address that already is a wrapper is returned unchanged. An
    /// interface without a wrapper type leaves the raw reference in place. The second element
    /// is set when this call created the wrapper.
    pub fn wrap_one(&self, real: ObjectPtr, riid: &InterfaceId) -> (ObjectPtr, Option<NewObject>) {
        if real.is_null() || self.registry.lookup(real).is_some() {
            return (real, None);
        }

        match self.registry.wrap(real, riid) {
            Ok(outcome) => {
                let created = outcome.created.then(|| NewObject {
                    capture_id: outcome.wrapper.capture_id(),
                    iid: *riid,
                });
                (outcome.wrapper.ptr(), created)
            }
            Err(Error::UnsupportedInterface(iid)) => {
                log::debug!("no wrapper for interface {iid}, returning {real} unwrapped");
                (real, None)
            }
            Err(error) => {
                log::warn!("failed to wrap {real}: {error}");
                (real, None)
            }
        }
    }

    /// Wraps every reference produced through `outputs`, rewriting the slots in place.
    ///
    /// Returns the objects whose wrappers were created, in slot order.
    pub fn wrap_outputs(&self, outputs: &mut [Out]) -> Vec<NewObject> {
        let mut created = Vec::new();
        for out in outputs.iter_mut() {
            match out {
                Out::Object {
                    riid,
                    slot: Some(ptr),
                } => {
                    let (wrapped, new) = self.wrap_one(*ptr, riid);
                    *ptr = wrapped;
                    created.extend(new);
                }
                Out::ObjectArray {
                    riid,
                    slots: Some(slots),
                    ..
                } => {
                    for ptr in slots.iter_mut() {
                        let (wrapped, new) = self.wrap_one(*ptr, riid);
                        *ptr = wrapped;
                        created.extend(new);
                    }
                }
                Out::Value(Some(value)) => self.wrap_value(value, &mut created),
                _ => {}
            }
        }
        created
    }

    /// Wraps references embedded in an out value (structures and arrays included).
    pub fn wrap_value(&self, value: &mut Value, created: &mut Vec<NewObject>) {
        match value {
            Value::Object(obj) => {
                let (wrapped, new) = self.wrap_one(obj.ptr, &obj.iid);
                obj.ptr = wrapped;
                created.extend(new);
            }
            Value::Array(Array {
                items: Some(items), ..
            }) => {
                for item in items.iter_mut() {
                    self.wrap_value(item, created);
                }
            }
            Value::Struct(inner) => {
                for field in &mut inner.fields {
                    self.wrap_value(field, created);
                }
            }
            _ => {}
        }
    }
}

fn reclaim(value: Value, scratch: &mut ScratchMemory) {
    let mut buffer = match value {
        Value::Array(Array {
            items: Some(items), ..
        }) => items,
        Value::Struct(inner) => inner.fields,
        _ => return,
    };
    for item in buffer.drain(..) {
        reclaim(item, scratch);
    }
    scratch.recycle(buffer);
}
