//! Integration tests for capturing into a trace file and reading it back.

use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use capscope::{
    format::{TraceFlags, TraceValue},
    prelude::*,
};

/// A driver with just enough surface for a device, a fence and its signalling.
fn fence_driver() -> DispatchTable {
    let next = Arc::new(AtomicUsize::new(0x4000));
    let fences = Arc::new(Mutex::new(HashMap::<ObjectPtr, u64>::new()));

    let create = {
        let next = Arc::clone(&next);
        move |_: ObjectPtr, _: &[Cow<'_, Value>], outputs: &mut [Out]| {
            let ptr = ObjectPtr::new(next.fetch_add(0x40, Ordering::SeqCst));
            if outputs[0].set_object(ptr) {
                CallReturn::ok()
            } else {
                CallReturn::status(Status::E_POINTER)
            }
        }
    };
    let create_fence = {
        let next = Arc::clone(&next);
        let fences = Arc::clone(&fences);
        move |_: ObjectPtr, inputs: &[Cow<'_, Value>], outputs: &mut [Out]| {
            let ptr = ObjectPtr::new(next.fetch_add(0x40, Ordering::SeqCst));
            let initial = inputs[0].as_u64().unwrap_or(0);
            fences.lock().unwrap().insert(ptr, initial);
            outputs[0].set_object(ptr);
            CallReturn::ok()
        }
    };
    let signal = {
        let fences = Arc::clone(&fences);
        move |_: ObjectPtr, inputs: &[Cow<'_, Value>], _: &mut [Out]| {
            let fence = inputs[0].as_object().map(|obj| obj.ptr);
            let value = inputs[1].as_u64().unwrap_or(0);
            match fence.and_then(|fence| fences.lock().unwrap().get_mut(&fence).map(|v| *v = value)) {
                Some(()) => CallReturn::ok(),
                None => CallReturn::status(Status::E_INVALIDARG),
            }
        }
    };
    let completed = {
        let fences = Arc::clone(&fences);
        move |this: ObjectPtr, _: &[Cow<'_, Value>], _: &mut [Out]| {
            let value = fences.lock().unwrap().get(&this).copied().unwrap_or(0);
            CallReturn::value(Value::U64(value))
        }
    };

    DispatchTable::builder()
        .entry(CallId::CreateDevice, create.clone())
        .entry(CallId::CreateCommandQueue, create)
        .entry(CallId::CreateFence, create_fence)
        .entry(CallId::Signal, signal)
        .entry(CallId::GetCompletedValue, completed)
        .build()
}

#[test]
fn test_file_trace_roundtrip() -> capscope::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("capture.cpsc");

    let settings = CaptureSettings {
        capture_file: Some(path.clone()),
        capture_file_flush: true,
        ..CaptureSettings::default()
    };
    let manager = CaptureManager::from_settings(settings, fence_driver())?;

    let device = create_device(&manager, ObjectPtr::NULL, InterfaceKind::Device.iid())
        .into_facade::<Device>(&manager)
        .into_object()
        .expect("device is wrapped");
    device.set_name("main device");
    let queue = device
        .create_command_queue(&Default::default())
        .into_object()
        .expect("queue is wrapped");
    let fence = device
        .create_fence(0, 0)
        .into_object()
        .expect("fence is wrapped");
    assert_eq!(queue.signal(&fence, 7), Status::OK);
    assert_eq!(fence.get_completed_value(), 7);
    manager.finalize()?;

    let reader = TraceReader::open(&path)?;
    assert!(reader.flags().contains(TraceFlags::FLUSHED_PER_BLOCK));
    assert!(reader.flags().contains(TraceFlags::THREAD_IDS));
    assert_eq!(reader.skipped_blocks(), 0);

    let calls: Vec<CallId> = reader.records().iter().map(|r| r.call).collect();
    assert_eq!(
        calls,
        vec![
            CallId::CreateDevice,
            CallId::SetName,
            CallId::CreateCommandQueue,
            CallId::CreateFence,
            CallId::Signal,
            CallId::GetCompletedValue,
        ]
    );

    // SetName has no entry in this driver.
    assert_eq!(reader.records()[1].status, Status::E_NOTIMPL);

    let signal = &reader.records()[4];
    assert_eq!(signal.object, queue.interface().capture_id());
    assert_eq!(
        signal.inputs[0].as_object_id(),
        Some(fence.interface().capture_id())
    );
    assert_eq!(signal.inputs[1], TraceValue::U64(7));

    let completed = &reader.records()[5];
    assert_eq!(completed.ret, Some(TraceValue::U64(7)));

    let ids: Vec<_> = reader
        .records()
        .iter()
        .flat_map(|r| r.new_objects.iter().map(|obj| obj.capture_id))
        .collect();
    assert_eq!(
        ids,
        vec![
            device.interface().capture_id(),
            queue.interface().capture_id(),
            fence.interface().capture_id(),
        ]
    );
    Ok(())
}

#[test]
fn test_disabled_capture_writes_no_file() -> capscope::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("never.cpsc");

    let settings = CaptureSettings {
        capture_enabled: false,
        capture_file: Some(path.clone()),
        ..CaptureSettings::default()
    };
    let manager = CaptureManager::from_settings(settings, fence_driver())?;
    let created = create_device(&manager, ObjectPtr::NULL, InterfaceKind::Device.iid());
    assert!(created.is_success());
    assert!(manager.find(created.object.unwrap()).is_some());
    manager.finalize()?;

    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_truncated_trace_is_rejected() -> capscope::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("short.cpsc");
    std::fs::write(&path, b"CPSC")?;

    assert!(TraceReader::open(&path).is_err());
    Ok(())
}
