//! Handle validation, names, user data and reference counting through the
//! C ABI

mod common;

use common::*;
use mediabridge_native::ffi::library::mb_library_report_live_objects;
use mediabridge_native::ffi::object::*;
use mediabridge_native::ffi::track::{mb_local_track_create, mb_media_track_get_kind};
use mediabridge_native::ffi::track_source::{mb_device_audio_track_source_create, mb_external_video_track_source_push_frame, MbVideoFrame};
use mediabridge_native::handle::Handle;
use mediabridge_native::{ObjectType, ResultCode};
use serial_test::serial;
use std::ffi::{c_char, c_void, CStr};
use std::thread;

#[test]
#[serial]
fn test_null_and_stale_handles() {
    reset_library();
    let mut object_type = 0u32;
    let result = unsafe { mb_object_get_type(std::ptr::null_mut(), &mut object_type) };
    assert_eq!(result, ResultCode::InvalidNativeHandle);

    // Reference functions tolerate invalid handles.
    mb_object_add_ref(std::ptr::null_mut());
    mb_object_remove_ref(std::ptr::null_mut());
    assert!(mb_object_get_user_data(std::ptr::null_mut()).is_null());

    let source = create_external_source("stale");
    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());

    // A released handle is detected instead of being dereferenced.
    let result = unsafe { mb_object_get_type(source, &mut object_type) };
    assert_eq!(result, ResultCode::InvalidNativeHandle);
    mb_object_remove_ref(source);
    assert_eq!(mb_library_report_live_objects(), 0);
}

#[test]
#[serial]
fn test_object_type_and_kind() {
    reset_library();
    let source = create_external_source("frames");
    let mut object_type = 0u32;
    assert_eq!(unsafe { mb_object_get_type(source, &mut object_type) }, ResultCode::Success);
    assert_eq!(object_type, ObjectType::ExternalVideoTrackSource as u32);

    let name = cstring("video");
    let mut track: Handle = std::ptr::null_mut();
    assert_eq!(unsafe { mb_local_track_create(source, name.as_ptr(), &mut track) }, ResultCode::Success);
    assert_eq!(unsafe { mb_object_get_type(track, &mut object_type) }, ResultCode::Success);
    assert_eq!(object_type, ObjectType::LocalVideoTrack as u32);

    let mut kind = u32::MAX;
    assert_eq!(unsafe { mb_media_track_get_kind(track, &mut kind) }, ResultCode::Success);
    assert_eq!(kind, 1);

    // Wrong object family for the call.
    assert_eq!(unsafe { mb_media_track_get_kind(source, &mut kind) }, ResultCode::InvalidNativeHandle);

    mb_object_remove_ref(track);
    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_name_buffer_semantics() {
    reset_library();
    let source = create_external_source("camera");

    let mut size = 0u64;
    let result = unsafe { mb_object_get_name(source, std::ptr::null_mut(), &mut size) };
    assert_eq!(result, ResultCode::BufferTooSmall);
    assert_eq!(size, 7);

    let mut small = [0 as c_char; 3];
    size = small.len() as u64;
    let result = unsafe { mb_object_get_name(source, small.as_mut_ptr(), &mut size) };
    assert_eq!(result, ResultCode::BufferTooSmall);
    assert_eq!(size, 7);

    let mut buffer = [0 as c_char; 16];
    size = buffer.len() as u64;
    let result = unsafe { mb_object_get_name(source, buffer.as_mut_ptr(), &mut size) };
    assert_eq!(result, ResultCode::Success);
    assert_eq!(size, 7);
    assert_eq!(unsafe { CStr::from_ptr(buffer.as_ptr()) }.to_str().unwrap(), "camera");

    let renamed = cstring("front camera");
    assert_eq!(unsafe { mb_object_set_name(source, renamed.as_ptr()) }, ResultCode::Success);
    size = buffer.len() as u64;
    assert_eq!(unsafe { mb_object_get_name(source, buffer.as_mut_ptr(), &mut size) }, ResultCode::Success);
    assert_eq!(unsafe { CStr::from_ptr(buffer.as_ptr()) }.to_str().unwrap(), "front camera");

    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_default_names_are_generated() {
    reset_library();
    let mut source: Handle = std::ptr::null_mut();
    assert_eq!(
        unsafe { mb_device_audio_track_source_create(std::ptr::null(), &mut source) },
        ResultCode::Success
    );
    let mut buffer = [0 as c_char; 64];
    let mut size = buffer.len() as u64;
    assert_eq!(unsafe { mb_object_get_name(source, buffer.as_mut_ptr(), &mut size) }, ResultCode::Success);
    assert!(size > 1);

    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_user_data_is_stored_per_object() {
    reset_library();
    let first = create_external_source("first");
    let second = create_external_source("second");
    let mut marker = 42u32;
    let marker_ptr = &mut marker as *mut u32 as *mut c_void;

    assert!(mb_object_get_user_data(first).is_null());
    mb_object_set_user_data(first, marker_ptr);
    assert_eq!(mb_object_get_user_data(first), marker_ptr);
    assert!(mb_object_get_user_data(second).is_null());

    mb_object_set_user_data(first, std::ptr::null_mut());
    assert!(mb_object_get_user_data(first).is_null());

    mb_object_remove_ref(first);
    mb_object_remove_ref(second);
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_concurrent_add_and_remove_ref() {
    reset_library();
    let source = create_external_source("contended");
    // Raw pointers are not Send; the address crosses threads instead.
    let address = source as usize;

    let workers: Vec<_> = (0..8)
        .map(|_| {
            thread::spawn(move || {
                let handle = address as Handle;
                for _ in 0..500 {
                    mb_object_add_ref(handle);
                    mb_object_remove_ref(handle);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(is_initialized());
    assert_eq!(mb_library_report_live_objects(), 1);
    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
    assert_eq!(mb_library_report_live_objects(), 0);
}

#[test]
#[serial]
fn test_push_frame_validates_input() {
    reset_library();
    let source = create_external_source("pushed");
    let pixels = vec![0u8; 4 * 4 * 4];
    let frame = MbVideoFrame {
        width: 4,
        height: 4,
        format: 1,
        data: pixels.as_ptr(),
        size: pixels.len() as u64,
    };
    assert_eq!(unsafe { mb_external_video_track_source_push_frame(source, &frame) }, ResultCode::Success);
    assert_eq!(
        unsafe { mb_external_video_track_source_push_frame(source, std::ptr::null()) },
        ResultCode::InvalidParameter
    );

    let mut audio: Handle = std::ptr::null_mut();
    assert_eq!(
        unsafe { mb_device_audio_track_source_create(std::ptr::null(), &mut audio) },
        ResultCode::Success
    );
    assert_eq!(unsafe { mb_external_video_track_source_push_frame(audio, &frame) }, ResultCode::Unsupported);

    mb_object_remove_ref(audio);
    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
}
