use thiserror::Error;

use crate::object::InterfaceId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// None of these errors ever reach the intercepted application as an API failure. They are
/// returned by the capture-side operations (settings parsing, sink setup, trace decoding,
/// explicit registry calls) and are otherwise logged and absorbed by the
/// [`crate::capture::CaptureManager`].
///
/// # Error Categories
///
/// ## Trace Errors
/// - [`Error::Malformed`] - A trace buffer or file could not be decoded
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a trace buffer
/// - [`Error::UnknownCall`] - A record carried a call identifier this build does not know
/// - [`Error::Io`] - Filesystem I/O errors from sinks and readers
///
/// ## Capture Errors
/// - [`Error::UnsupportedInterface`] - No wrapper type exists for an interface identifier
/// - [`Error::NotInitialized`] - The process-wide capture instance does not exist
/// - [`Error::Finalized`] - The capture manager was already torn down
/// - [`Error::LockError`] - Thread synchronization failure
///
/// ## Configuration Errors
/// - [`Error::Settings`] - A settings value could not be interpreted
///
/// # Examples
///
/// ```rust,no_run
/// use capscope::{Error, format::TraceReader};
/// use std::path::Path;
///
/// match TraceReader::open(Path::new("capture.cpsc")) {
///     Ok(reader) => println!("{} records", reader.records().len()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed trace: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The trace data is damaged and could not be decoded.
    ///
    /// Includes the source location where the malformation was detected for debugging
    /// purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding a trace.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A trace record referenced a call identifier that is not part of [`crate::format::CallId`].
    #[error("Unknown call identifier - {0:#x}")]
    UnknownCall(u32),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors raised by trace sinks, readers and the settings loader.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// There is no wrapper type for the requested interface identifier.
    ///
    /// Inside an intercepted call this is never surfaced; the raw reference is handed back to
    /// the application instead.
    #[error("No wrapper available for interface {0}")]
    UnsupportedInterface(InterfaceId),

    /// The process-wide capture instance has not been created.
    #[error("The capture manager has not been initialized")]
    NotInitialized,

    /// The capture manager has already been finalized.
    #[error("The capture manager has already been finalized")]
    Finalized,

    /// A settings value could not be interpreted.
    ///
    /// The associated string names the offending key and value.
    #[error("Invalid setting - {0}")]
    Settings(String),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when a mutex was poisoned by a panicking thread.
    #[error("Failed to lock target")]
    LockError,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
