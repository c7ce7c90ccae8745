//! Call record encoder.
//!
//! Turns a [`TraceRecord`] into a complete call block. Object references are translated to
//! capture identities through the registry and handles to `(owner, offset)` pairs through its
//! handle table, so no process address ever reaches the trace.

use crate::{
    format::{
        io::write_le, tags, TraceFlags, TraceRecord, BLOCK_CALL, MAGIC, VERSION_MAJOR,
        VERSION_MINOR, HEADER_SIZE,
    },
    object::{CaptureId, Handle, ObjectPtr, ObjectRegistry},
    resolve::{Out, Value},
};

/// Encodes call records against a registry.
#[derive(Clone, Copy, Debug)]
pub struct Encoder<'r> {
    registry: &'r ObjectRegistry,
}

impl<'r> Encoder<'r> {
    /// Creates an encoder resolving identities through `registry`.
    #[must_use]
    pub fn new(registry: &'r ObjectRegistry) -> Self {
        Self { registry }
    }

    /// Builds the file header.
    #[must_use]
    pub fn header(flags: TraceFlags) -> [u8; HEADER_SIZE] {
        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&MAGIC);
        write_le(&mut header, VERSION_MAJOR);
        write_le(&mut header, VERSION_MINOR);
        write_le(&mut header, flags.bits());
        write_le(&mut header, 0_u32);

        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(&header);
        bytes
    }

    /// Appends one call block for `record` to `buffer`.
    pub fn encode(&self, record: &TraceRecord<'_>, buffer: &mut Vec<u8>) {
        let start = buffer.len();
        write_le(buffer, BLOCK_CALL);
        write_le(buffer, 0_u64);
        let payload_start = buffer.len();

        write_le(buffer, record.call.wire());
        write_le(buffer, record.thread_id);
        write_le(buffer, record.object.value());
        write_le(buffer, record.status.0);

        match record.ret {
            Some(value) => self.write_value(buffer, value),
            None => write_le(buffer, tags::NONE),
        }

        write_count(buffer, record.inputs.len());
        for value in record.inputs {
            self.write_value(buffer, value);
        }

        write_count(buffer, record.outputs.len());
        for out in record.outputs {
            self.write_out(buffer, out);
        }

        write_count(buffer, record.new_objects.len());
        for object in record.new_objects {
            write_le(buffer, object.capture_id.value());
            buffer.extend_from_slice(&object.iid.to_bytes());
        }

        let payload_size = (buffer.len() - payload_start) as u64;
        buffer[start + 4..payload_start].copy_from_slice(&payload_size.to_le_bytes());
    }

    fn object_id(&self, ptr: ObjectPtr) -> CaptureId {
        if ptr.is_null() {
            return CaptureId::NULL;
        }
        match self.registry.capture_id_of(ptr) {
            id if !id.is_null() => id,
            _ => self
                .registry
                .capture_id_of_real(ptr)
                .unwrap_or(CaptureId::NULL),
        }
    }

    fn write_handle(&self, buffer: &mut Vec<u8>, handle: Handle) {
        write_le(buffer, tags::HANDLE);
        write_le(buffer, handle.pool as u8);
        match self.registry.handles().resolve(handle) {
            Some(resolved) => {
                write_le(buffer, resolved.owner.value());
                write_le(buffer, resolved.offset);
            }
            None => {
                write_le(buffer, CaptureId::NULL.value());
                write_le(buffer, handle.value);
            }
        }
    }

    fn write_value(&self, buffer: &mut Vec<u8>, value: &Value) {
        match value {
            Value::Null => write_le(buffer, tags::NULL),
            Value::Bool(flag) => {
                write_le(buffer, tags::BOOL);
                write_le(buffer, u8::from(*flag));
            }
            Value::I32(v) => {
                write_le(buffer, tags::I32);
                write_le(buffer, *v);
            }
            Value::U32(v) => {
                write_le(buffer, tags::U32);
                write_le(buffer, *v);
            }
            Value::U64(v) => {
                write_le(buffer, tags::U64);
                write_le(buffer, *v);
            }
            Value::F32(v) => {
                write_le(buffer, tags::F32);
                write_le(buffer, *v);
            }
            Value::Bytes(bytes) => {
                write_le(buffer, tags::BYTES);
                write_count(buffer, bytes.len());
                buffer.extend_from_slice(bytes);
            }
            Value::Str(text) => {
                write_le(buffer, tags::STR);
                write_count(buffer, text.len());
                buffer.extend_from_slice(text.as_bytes());
            }
            Value::WStr(text) => {
                write_le(buffer, tags::WSTR);
                write_count(buffer, text.len());
                for unit in text.as_slice() {
                    write_le(buffer, *unit);
                }
            }
            Value::Object(obj) => {
                write_le(buffer, tags::OBJECT);
                write_le(buffer, self.object_id(obj.ptr).value());
                buffer.extend_from_slice(&obj.iid.to_bytes());
            }
            Value::Handle(handle) => self.write_handle(buffer, *handle),
            Value::Array(array) => {
                write_le(buffer, tags::ARRAY);
                write_le(buffer, array.count);
                match &array.items {
                    Some(items) => {
                        write_le(buffer, 1_u8);
                        write_count(buffer, items.len());
                        for item in items {
                            self.write_value(buffer, item);
                        }
                    }
                    None => write_le(buffer, 0_u8),
                }
            }
            Value::Struct(value) => {
                write_le(buffer, tags::STRUCT);
                write_count(buffer, value.fields.len());
                for field in &value.fields {
                    self.write_value(buffer, field);
                }
            }
        }
    }

    fn write_out(&self, buffer: &mut Vec<u8>, out: &Out) {
        match out {
            Out::Object { riid, slot } => {
                write_le(buffer, tags::OUT_OBJECT);
                buffer.extend_from_slice(&riid.to_bytes());
                match slot {
                    Some(ptr) => {
                        write_le(buffer, 1_u8);
                        write_le(buffer, self.object_id(*ptr).value());
                    }
                    None => write_le(buffer, 0_u8),
                }
            }
            Out::ObjectArray { riid, count, slots } => {
                write_le(buffer, tags::OUT_OBJECT_ARRAY);
                buffer.extend_from_slice(&riid.to_bytes());
                write_le(buffer, *count);
                match slots {
                    Some(slots) => {
                        write_le(buffer, 1_u8);
                        write_count(buffer, slots.len());
                        for ptr in slots {
                            write_le(buffer, self.object_id(*ptr).value());
                        }
                    }
                    None => write_le(buffer, 0_u8),
                }
            }
            Out::Value(value) => {
                write_le(buffer, tags::OUT_VALUE);
                match value {
                    Some(value) => {
                        write_le(buffer, 1_u8);
                        self.write_value(buffer, value);
                    }
                    None => write_le(buffer, 0_u8),
                }
            }
        }
    }
}

// Lengths beyond u32 cannot come from the native calling surface.
fn write_count(buffer: &mut Vec<u8>, len: usize) {
    write_le(buffer, u32::try_from(len).unwrap_or(u32::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::Status,
        format::{CallId, NewObject, BLOCK_HEADER_SIZE},
        object::{HandlePool, InterfaceKind},
    };

    fn record<'a>(inputs: &'a [Value], outputs: &'a [Out], new: &'a [NewObject]) -> TraceRecord<'a> {
        TraceRecord {
            call: CallId::CopyResource,
            thread_id: 1,
            object: CaptureId::from_raw(4),
            status: Status::OK,
            ret: None,
            inputs,
            outputs,
            new_objects: new,
        }
    }

    #[test]
    fn test_header_layout() {
        let header = Encoder::header(TraceFlags::THREAD_IDS);
        assert_eq!(&header[..4], b"CPSC");
        assert_eq!(u16::from_le_bytes([header[4], header[5]]), VERSION_MAJOR);
        assert_eq!(
            u32::from_le_bytes([header[8], header[9], header[10], header[11]]),
            TraceFlags::THREAD_IDS.bits()
        );
    }

    #[test]
    fn test_block_size_patched() {
        let registry = ObjectRegistry::new();
        let encoder = Encoder::new(&registry);
        let mut buffer = vec![0xaa];
        encoder.encode(&record(&[Value::U32(5)], &[], &[]), &mut buffer);

        let size = u64::from_le_bytes(buffer[5..13].try_into().unwrap());
        assert_eq!(size as usize, buffer.len() - 1 - BLOCK_HEADER_SIZE);
        assert_eq!(u32::from_le_bytes(buffer[1..5].try_into().unwrap()), BLOCK_CALL);
    }

    #[test]
    fn test_objects_written_as_ids() {
        let registry = ObjectRegistry::new();
        let wrapper = registry
            .wrap_as(
                ObjectPtr::new(0xdead_0000),
                InterfaceKind::Resource,
                InterfaceKind::Resource.iid(),
            )
            .wrapper;
        let encoder = Encoder::new(&registry);

        let inputs = [Value::object(wrapper.ptr(), InterfaceKind::Resource)];
        let mut buffer = Vec::new();
        encoder.encode(&record(&inputs, &[], &[]), &mut buffer);

        let id = wrapper.capture_id().value().to_le_bytes();
        let address = wrapper.ptr().address().to_le_bytes();
        assert!(buffer.windows(8).any(|w| w == id));
        assert!(!buffer.windows(address.len()).any(|w| w == address));
    }

    #[test]
    fn test_unresolved_handle_keeps_raw_value() {
        let registry = ObjectRegistry::new();
        let encoder = Encoder::new(&registry);
        let mut buffer = Vec::new();
        encoder.write_value(
            &mut buffer,
            &Value::handle(HandlePool::GpuVirtualAddress, 0x1234),
        );

        assert_eq!(buffer[0], tags::HANDLE);
        assert_eq!(buffer[1], HandlePool::GpuVirtualAddress as u8);
        assert_eq!(u64::from_le_bytes(buffer[2..10].try_into().unwrap()), 0);
        assert_eq!(u64::from_le_bytes(buffer[10..18].try_into().unwrap()), 0x1234);
    }
}
