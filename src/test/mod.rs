//! Test fixtures: a mock driver and helpers that build a capture manager on top of it.



use std::sync::Arc;

use crate::{
    capture::CaptureManager,
    format::{DecodedRecord, MemorySink, TraceReader},
    settings::CaptureSettings,
};

pub use driver::MockDriver;

/// A capture manager over a fresh [`MockDriver`], encoding into memory.
pub fn capture() -> (Arc<MockDriver>, Arc<CaptureManager>, MemorySink) {
    capture_with(CaptureSettings::default())
}

/// Like [`capture`] with explicit settings.
pub fn capture_with(settings: CaptureSettings) -> (Arc<MockDriver>, Arc<CaptureManager>, MemorySink) {
    let driver = MockDriver::new();
    let sink = MemorySink::new();
    let manager = CaptureManager::new(settings, driver.dispatch_table(), Box::new(sink.clone()));
    (driver, manager, sink)
}

/// Every record written to `sink` so far.
pub fn records(sink: &MemorySink) -> Vec<DecodedRecord> {
    TraceReader::from_bytes(&sink.contents())
        .unwrap()
        .into_records()
}
