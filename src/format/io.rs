//! Little-endian primitive encoding shared by the encoder and the parser.
//!
//! [`TraceIO`] is implemented for every fixed-size primitive that appears in a trace. Writing
//! appends to a growable buffer; reading is bounds-checked and reports
//! [`crate::Error::OutOfBounds`] instead of panicking.

use crate::{Error::OutOfBounds, Result};

/// A primitive with a fixed little-endian byte representation.
pub trait TraceIO: Sized + Copy {
    /// Byte array holding one encoded value.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decodes from little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encodes to little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_trace_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl TraceIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_trace_io!(u8, u16, u32, u64, i32, f32);

/// Reads a `T` at `offset` and advances `offset` past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: TraceIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Appends `value` to `buffer` in little-endian order.
pub fn write_le<T: TraceIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}
