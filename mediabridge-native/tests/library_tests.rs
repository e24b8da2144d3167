//! Lifecycle tests for the process-wide factory, driven through the C ABI

mod common;

use common::*;
use mediabridge_native::ffi::enumeration::{mb_enum_video_capture_devices_async, mb_enum_video_capture_formats_async, MbVideoCaptureFormat};
use mediabridge_native::ffi::library::*;
use mediabridge_native::ffi::object::{mb_object_add_ref, mb_object_remove_ref};
use mediabridge_native::ffi::{MB_FALSE, MB_TRUE};
use mediabridge_native::{ResultCode, ShutdownOptions};
use mediabridge_logging::Severity;
use parking_lot::Mutex;
use serial_test::serial;
use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;
use std::time::Duration;

#[test]
#[serial]
fn test_lazy_initialization_and_shutdown_on_last_release() {
    reset_library();
    assert!(!is_initialized());
    assert_eq!(mb_library_report_live_objects(), 0);
    // Diagnostics never initialize the library.
    assert!(!is_initialized());

    let source = create_external_source("camera");
    assert!(is_initialized());
    assert_eq!(mb_library_report_live_objects(), 1);
    assert_eq!(mb_library_try_shutdown(), MB_FALSE);
    assert!(is_initialized());

    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
    assert_eq!(mb_library_report_live_objects(), 0);
    assert_eq!(mb_library_try_shutdown(), MB_TRUE);
}

#[test]
#[serial]
fn test_shared_references_keep_object_alive() {
    reset_library();
    let source = create_external_source("shared");
    mb_object_add_ref(source);

    mb_object_remove_ref(source);
    assert!(is_initialized());
    assert_eq!(mb_library_report_live_objects(), 1);

    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_reinitialization_after_shutdown() {
    reset_library();
    for round in 0..3 {
        let source = create_external_source(&format!("round {}", round));
        assert!(is_initialized());
        mb_object_remove_ref(source);
        assert!(wait_for_shutdown());
    }
}

#[test]
#[serial]
fn test_force_shutdown_with_live_objects() {
    reset_library();
    mb_library_set_shutdown_options(ShutdownOptions::LOG_LIVE_OBJECTS.bits());
    let source = create_external_source("leaked");

    assert_eq!(mb_library_force_shutdown(), ResultCode::Success);
    assert!(!is_initialized());
    assert_eq!(mb_library_report_live_objects(), 0);

    // The leaked handle can still be released after the forced shutdown.
    mb_object_remove_ref(source);
    assert!(!is_initialized());

    // The next object starts a fresh initialization.
    let source = create_external_source("fresh");
    assert!(is_initialized());
    assert_eq!(mb_library_report_live_objects(), 1);
    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_force_shutdown_fails_on_live_objects_when_asked() {
    reset_library();
    let options = ShutdownOptions::LOG_LIVE_OBJECTS | ShutdownOptions::FAIL_ON_LIVE_OBJECTS;
    mb_library_set_shutdown_options(options.bits());
    let source = create_external_source("leaked");

    assert_eq!(mb_library_force_shutdown(), ResultCode::InvalidOperation);
    // The shutdown happened regardless.
    assert!(!is_initialized());
    mb_object_remove_ref(source);

    // Nothing alive: a forced shutdown of an uninitialized library succeeds.
    assert_eq!(mb_library_force_shutdown(), ResultCode::Success);
    mb_library_set_shutdown_options(ShutdownOptions::default().bits());
}

/// Force-shut down with one leaked object and collect what was logged
fn force_shutdown_logs(options: ShutdownOptions) -> Vec<String> {
    reset_library();
    mb_library_set_shutdown_options(options.bits());
    let source = create_external_source("reported");

    let messages = Arc::new(Mutex::new(Vec::new()));
    let collected = Arc::clone(&messages);
    let sink = mediabridge_logging::add_sink(Severity::Verbose, move |_, message| {
        collected.lock().push(message.to_string());
    })
    .unwrap();
    let _ = mb_library_force_shutdown();
    mediabridge_logging::remove_sink(sink);

    mb_object_remove_ref(source);
    mb_library_set_shutdown_options(ShutdownOptions::default().bits());
    let messages = messages.lock().clone();
    messages
}

#[test]
#[serial]
fn test_force_shutdown_reports_live_objects_only_when_asked() {
    let reported = force_shutdown_logs(ShutdownOptions::LOG_LIVE_OBJECTS);
    assert!(reported.iter().any(|message| message.contains("Live objects report")));
    assert!(reported.iter().any(|message| message.contains("reported")));

    let silent = force_shutdown_logs(ShutdownOptions::empty());
    assert!(!silent.is_empty());
    assert!(!silent.iter().any(|message| message.contains("Live objects report")));
}

#[test]
#[serial]
fn test_shutdown_options_round_trip() {
    mb_library_set_shutdown_options(0x7);
    assert_eq!(mb_library_get_shutdown_options(), 0x7);
    mb_library_set_shutdown_options(0xF0 | 0x4);
    assert_eq!(mb_library_get_shutdown_options(), 0x4);
    mb_library_set_shutdown_options(ShutdownOptions::default().bits());
    assert_eq!(mb_library_get_shutdown_options(), ShutdownOptions::LOG_LIVE_OBJECTS.bits());
}

#[test]
#[serial]
fn test_backend_selection_requires_shutdown() {
    reset_library();
    assert_eq!(mb_library_use_backend(7), ResultCode::InvalidParameter);

    let source = create_external_source("busy");
    assert_eq!(mb_library_use_backend(0), ResultCode::InvalidOperation);
    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
    assert_eq!(mb_library_use_backend(0), ResultCode::Success);
}

#[test]
#[serial]
fn test_dispatcher_backend_without_dispatcher_fails_to_initialize() {
    reset_library();
    assert_eq!(mb_library_use_backend(1), ResultCode::Success);

    let mut source = std::ptr::null_mut();
    let name = cstring("orphan");
    let result = unsafe {
        mediabridge_native::ffi::track_source::mb_external_video_track_source_create(
            name.as_ptr(),
            &mut source,
        )
    };
    assert_eq!(result, ResultCode::InvalidOperation);
    assert!(source.is_null());
    assert!(!is_initialized());

    assert_eq!(mb_library_use_backend(0), ResultCode::Success);
}

#[test]
#[serial]
fn test_set_dispatcher_requires_callbacks() {
    let result = unsafe { mb_library_set_dispatcher(None, None, std::ptr::null_mut(), std::ptr::null()) };
    assert_eq!(result, ResultCode::InvalidParameter);
}

#[derive(Default)]
struct Enumeration {
    devices: Mutex<Vec<(String, String)>>,
    formats: Mutex<Vec<(u32, u32)>>,
    completed: Mutex<Option<ResultCode>>,
}

unsafe extern "C" fn on_device(user_data: *mut c_void, id: *const c_char, name: *const c_char) {
    let state = unsafe { &*(user_data as *const Enumeration) };
    let id = unsafe { CStr::from_ptr(id) }.to_string_lossy().into_owned();
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
    state.devices.lock().push((id, name));
}

unsafe extern "C" fn on_format(user_data: *mut c_void, format: *const MbVideoCaptureFormat) {
    let state = unsafe { &*(user_data as *const Enumeration) };
    let format = unsafe { &*format };
    state.formats.lock().push((format.width, format.height));
}

unsafe extern "C" fn on_completed(user_data: *mut c_void, result: ResultCode) {
    let state = unsafe { &*(user_data as *const Enumeration) };
    *state.completed.lock() = Some(result);
}

#[test]
#[serial]
fn test_enumerate_devices_and_formats() {
    reset_library();
    let state = Enumeration::default();
    let user = &state as *const Enumeration as *mut c_void;

    let result = mb_enum_video_capture_devices_async(Some(on_device), user, Some(on_completed), user);
    assert_eq!(result, ResultCode::Success);
    assert!(wait_until(Duration::from_secs(5), || state.completed.lock().is_some()));
    assert_eq!(*state.completed.lock(), Some(ResultCode::Success));
    let device_id = {
        let devices = state.devices.lock();
        assert!(!devices.is_empty());
        devices[0].0.clone()
    };

    *state.completed.lock() = None;
    let id = cstring(&device_id);
    let result = unsafe {
        mb_enum_video_capture_formats_async(id.as_ptr(), Some(on_format), user, Some(on_completed), user)
    };
    assert_eq!(result, ResultCode::Success);
    assert!(wait_until(Duration::from_secs(5), || state.completed.lock().is_some()));
    assert_eq!(*state.completed.lock(), Some(ResultCode::Success));
    assert!(!state.formats.lock().is_empty());

    // Enumeration holds the library only while it runs.
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_enumeration_rejects_missing_callback() {
    let result = mb_enum_video_capture_devices_async(None, std::ptr::null_mut(), None, std::ptr::null_mut());
    assert_eq!(result, ResultCode::InvalidParameter);
}
