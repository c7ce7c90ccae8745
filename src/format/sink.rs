//! Trace sinks.
//!
//! A sink receives fully encoded blocks. The capture manager serializes access to its sink,
//! so implementations need no internal locking of their own.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    format::{Encoder, TraceFlags},
    Result,
};

/// Destination for encoded trace blocks.
pub trait TraceSink: Send {
    /// Appends one encoded block.
    ///
    /// # Errors
    /// Returns [`crate::Error::Io`] if the block could not be written.
    fn write_block(&mut self, block: &[u8]) -> Result<()>;

    /// Pushes buffered data to its destination.
    ///
    /// # Errors
    /// Returns [`crate::Error::Io`] if buffered data could not be written.
    fn flush(&mut self) -> Result<()>;
}

/// Buffered trace file.
#[derive(Debug)]
pub struct FileSink {
    writer: BufWriter<File>,
    path: PathBuf,
    flush_each_block: bool,
}

impl FileSink {
    /// Creates (or truncates) the file at `path` and writes the trace header.
    ///
    /// With `flush_each_block` every block reaches the OS before `write_block` returns, so a
    /// crashing host loses nothing that was already encoded.
    ///
    /// # Errors
    /// Returns [`crate::Error::Io`] if the file cannot be created or the header written.
    pub fn create(path: impl AsRef<Path>, flush_each_block: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);

        let mut flags = TraceFlags::THREAD_IDS;
        if flush_each_block {
            flags |= TraceFlags::FLUSHED_PER_BLOCK;
        }
        writer.write_all(&Encoder::header(flags))?;

        log::debug!("writing capture to {}", path.display());
        Ok(Self {
            writer,
            path,
            flush_each_block,
        })
    }

    /// Path of the trace file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for FileSink {
    fn write_block(&mut self, block: &[u8]) -> Result<()> {
        self.writer.write_all(block)?;
        if self.flush_each_block {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory trace shared with whoever holds a clone.
///
/// Starts with a file header, so [`MemorySink::contents`] is a complete trace at any time.
#[derive(Clone, Debug)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Creates a sink holding only the trace header.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(
                Encoder::header(TraceFlags::THREAD_IDS).to_vec(),
            )),
        }
    }

    /// Copy of the trace written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for MemorySink {
    fn write_block(&mut self, block: &[u8]) -> Result<()> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(block);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn write_block(&mut self, _block: &[u8]) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::HEADER_SIZE;

    #[test]
    fn test_memory_sink_shared_buffer() {
        let sink = MemorySink::new();
        let mut writer: Box<dyn TraceSink> = Box::new(sink.clone());
        writer.write_block(&[1, 2, 3]).unwrap();

        let contents = sink.contents();
        assert_eq!(contents.len(), HEADER_SIZE + 3);
        assert_eq!(&contents[..4], b"CPSC");
        assert_eq!(&contents[HEADER_SIZE..], &[1, 2, 3]);
    }

    #[test]
    fn test_file_sink_writes_header_and_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.cpsc");

        let mut sink = FileSink::create(&path, false).unwrap();
        sink.write_block(&[9; 4]).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.path(), path.as_path());

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 4);
        assert_eq!(&bytes[..4], b"CPSC");
    }

    #[test]
    fn test_file_sink_flush_each_block_sets_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flushed.cpsc");

        let mut sink = FileSink::create(&path, true).unwrap();
        sink.write_block(&[7]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let flags = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        assert!(TraceFlags::from_bits_truncate(flags).contains(TraceFlags::FLUSHED_PER_BLOCK));
        assert_eq!(bytes.len(), HEADER_SIZE + 1);
    }

    #[test]
    fn test_file_sink_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("trace.cpsc");
        assert!(matches!(
            FileSink::create(path, false),
            Err(crate::Error::Io(_))
        ));
    }
}
