//! Shared helpers for the C ABI integration tests

#![allow(dead_code)]

use mediabridge_native::ffi::library::{mb_library_force_shutdown, mb_library_is_initialized};
use mediabridge_native::ffi::track_source::mb_external_video_track_source_create;
use mediabridge_native::ffi::{MB_FALSE, MB_TRUE};
use mediabridge_native::handle::Handle;
use mediabridge_native::ResultCode;
use std::ffi::CString;
use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Wait for the library to shut down after the last release
pub fn wait_for_shutdown() -> bool {
    wait_until(Duration::from_secs(5), || mb_library_is_initialized() == MB_FALSE)
}

pub fn is_initialized() -> bool {
    mb_library_is_initialized() == MB_TRUE
}

/// Make sure no state leaks from a previous test
pub fn reset_library() {
    let _ = mb_library_force_shutdown();
}

pub fn cstring(value: &str) -> CString {
    CString::new(value).unwrap()
}

pub fn create_external_source(name: &str) -> Handle {
    let name = cstring(name);
    let mut source: Handle = std::ptr::null_mut();
    let result = unsafe { mb_external_video_track_source_create(name.as_ptr(), &mut source) };
    assert_eq!(result, ResultCode::Success);
    assert!(!source.is_null());
    source
}
