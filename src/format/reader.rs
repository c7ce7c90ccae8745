//! Trace decoding.
//!
//! [`TraceReader`] turns a trace back into [`DecodedRecord`]s. It exists to verify captures
//! and to feed tooling; it does not replay anything.

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::{
    capture::Status,
    format::{
        tags, CallId, DecodedRecord, NewObject, Parser, TraceFlags, TraceOut, TraceValue,
        BLOCK_CALL, HEADER_SIZE, MAGIC, VERSION_MAJOR,
    },
    object::{CaptureId, HandlePool},
    Error, Result,
};

// Nesting deeper than this only comes from corrupted data.
const MAX_DEPTH: usize = 64;

/// A fully decoded trace.
#[derive(Debug, Clone)]
pub struct TraceReader {
    version: (u16, u16),
    flags: TraceFlags,
    records: Vec<DecodedRecord>,
    skipped_blocks: usize,
}

impl TraceReader {
    /// Memory-maps and decodes the trace file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Io`] if the file cannot be opened or mapped, and any error of
    /// [`TraceReader::from_bytes`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        Self::from_bytes(&mmap)
    }

    /// Decodes a trace held in memory.
    ///
    /// Blocks of unknown type are skipped.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad header, unsupported version or invalid
    /// tag, [`crate::Error::OutOfBounds`] for truncated data and [`crate::Error::UnknownCall`]
    /// for call identifiers this build does not know.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(malformed_error!(
                "Trace too short for header - {} bytes",
                data.len()
            ));
        }

        let mut parser = Parser::new(data);
        if parser.read_bytes(4)? != MAGIC {
            return Err(malformed_error!("Invalid trace magic"));
        }
        let major = parser.read_le::<u16>()?;
        let minor = parser.read_le::<u16>()?;
        if major != VERSION_MAJOR {
            return Err(malformed_error!("Unsupported trace version {}.{}", major, minor));
        }
        let flags = TraceFlags::from_bits_truncate(parser.read_le::<u32>()?);
        parser.read_le::<u32>()?;

        let mut records = Vec::new();
        let mut skipped_blocks = 0;
        while parser.has_more_data() {
            let block_type = parser.read_le::<u32>()?;
            let size = usize::try_from(parser.read_le::<u64>()?).map_err(|_| Error::OutOfBounds)?;
            let mut block = parser.sub_parser(size)?;

            if block_type == BLOCK_CALL {
                records.push(read_record(&mut block)?);
            } else {
                skipped_blocks += 1;
            }
        }

        Ok(Self {
            version: (major, minor),
            flags,
            records,
            skipped_blocks,
        })
    }

    /// `(major, minor)` format version.
    #[must_use]
    pub fn version(&self) -> (u16, u16) {
        self.version
    }

    /// Header flags.
    #[must_use]
    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// Decoded call records in file order.
    #[must_use]
    pub fn records(&self) -> &[DecodedRecord] {
        &self.records
    }

    /// Consumes the reader, returning its records.
    #[must_use]
    pub fn into_records(self) -> Vec<DecodedRecord> {
        self.records
    }

    /// Blocks of unknown type that were skipped.
    #[must_use]
    pub fn skipped_blocks(&self) -> usize {
        self.skipped_blocks
    }
}

fn read_record(parser: &mut Parser<'_>) -> Result<DecodedRecord> {
    let call = CallId::from_wire(parser.read_le::<u32>()?)?;
    let thread_id = parser.read_le::<u64>()?;
    let object = CaptureId::from_raw(parser.read_le::<u64>()?);
    let status = Status(parser.read_le::<i32>()?);

    let ret = match parser.read_le::<u8>()? {
        tags::NONE => None,
        tag => Some(read_value_tagged(parser, tag, 0)?),
    };

    let input_count = parser.read_le::<u32>()?;
    let mut inputs = Vec::with_capacity(bounded_capacity(input_count, parser));
    for _ in 0..input_count {
        inputs.push(read_value(parser, 0)?);
    }

    let output_count = parser.read_le::<u32>()?;
    let mut outputs = Vec::with_capacity(bounded_capacity(output_count, parser));
    for _ in 0..output_count {
        outputs.push(read_out(parser)?);
    }

    let new_count = parser.read_le::<u32>()?;
    let mut new_objects = Vec::with_capacity(bounded_capacity(new_count, parser));
    for _ in 0..new_count {
        let capture_id = CaptureId::from_raw(parser.read_le::<u64>()?);
        let iid = parser.read_guid()?;
        new_objects.push(NewObject { capture_id, iid });
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes in {} record",
            parser.remaining(),
            call.name()
        ));
    }

    Ok(DecodedRecord {
        call,
        thread_id,
        object,
        status,
        ret,
        inputs,
        outputs,
        new_objects,
    })
}

// Never trust a count for preallocation beyond what the remaining bytes could hold.
fn bounded_capacity(count: u32, parser: &Parser<'_>) -> usize {
    (count as usize).min(parser.remaining())
}

fn read_value(parser: &mut Parser<'_>, depth: usize) -> Result<TraceValue> {
    let tag = parser.read_le::<u8>()?;
    read_value_tagged(parser, tag, depth)
}

fn read_value_tagged(parser: &mut Parser<'_>, tag: u8, depth: usize) -> Result<TraceValue> {
    if depth > MAX_DEPTH {
        return Err(malformed_error!("Value nesting exceeds {}", MAX_DEPTH));
    }

    let value = match tag {
        tags::NULL => TraceValue::Null,
        tags::BOOL => TraceValue::Bool(parser.read_le::<u8>()? != 0),
        tags::I32 => TraceValue::I32(parser.read_le()?),
        tags::U32 => TraceValue::U32(parser.read_le()?),
        tags::U64 => TraceValue::U64(parser.read_le()?),
        tags::F32 => TraceValue::F32(parser.read_le()?),
        tags::BYTES => TraceValue::Bytes(parser.read_prefixed_bytes()?.to_vec()),
        tags::STR => TraceValue::Str(parser.read_prefixed_string_utf8()?),
        tags::WSTR => TraceValue::WStr(parser.read_prefixed_string_utf16()?),
        tags::OBJECT => TraceValue::Object {
            id: CaptureId::from_raw(parser.read_le()?),
            iid: parser.read_guid()?,
        },
        tags::HANDLE => {
            let raw_pool = parser.read_le::<u8>()?;
            let pool = HandlePool::from_repr(raw_pool)
                .ok_or_else(|| malformed_error!("Invalid handle pool {}", raw_pool))?;
            TraceValue::Handle {
                pool,
                owner: CaptureId::from_raw(parser.read_le()?),
                offset: parser.read_le()?,
            }
        }
        tags::ARRAY => {
            let count = parser.read_le::<u32>()?;
            let items = if parser.read_le::<u8>()? == 0 {
                None
            } else {
                let len = parser.read_le::<u32>()?;
                let mut items = Vec::with_capacity(bounded_capacity(len, parser));
                for _ in 0..len {
                    items.push(read_value(parser, depth + 1)?);
                }
                Some(items)
            };
            TraceValue::Array { count, items }
        }
        tags::STRUCT => {
            let len = parser.read_le::<u32>()?;
            let mut fields = Vec::with_capacity(bounded_capacity(len, parser));
            for _ in 0..len {
                fields.push(read_value(parser, depth + 1)?);
            }
            TraceValue::Struct(fields)
        }
        other => return Err(malformed_error!("Invalid value tag {:#x}", other)),
    };
    Ok(value)
}

fn read_out(parser: &mut Parser<'_>) -> Result<TraceOut> {
    let tag = parser.read_le::<u8>()?;
    let out = match tag {
        tags::OUT_OBJECT => {
            let riid = parser.read_guid()?;
            let id = if parser.read_le::<u8>()? == 0 {
                None
            } else {
                Some(CaptureId::from_raw(parser.read_le()?))
            };
            TraceOut::Object { riid, id }
        }
        tags::OUT_OBJECT_ARRAY => {
            let riid = parser.read_guid()?;
            let count = parser.read_le::<u32>()?;
            let ids = if parser.read_le::<u8>()? == 0 {
                None
            } else {
                let len = parser.read_le::<u32>()?;
                let mut ids = Vec::with_capacity(bounded_capacity(len, parser));
                for _ in 0..len {
                    ids.push(CaptureId::from_raw(parser.read_le()?));
                }
                Some(ids)
            };
            TraceOut::ObjectArray { riid, count, ids }
        }
        tags::OUT_VALUE => {
            if parser.read_le::<u8>()? == 0 {
                TraceOut::Value(None)
            } else {
                TraceOut::Value(Some(read_value(parser, 0)?))
            }
        }
        other => return Err(malformed_error!("Invalid out tag {:#x}", other)),
    };
    Ok(out)
}
