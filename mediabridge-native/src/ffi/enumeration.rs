//! Video capture device and format discovery
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use super::{guard, str_arg, to_cstring, UserData};
use crate::engine::{VideoCaptureDevice, VideoCaptureFormat};
use crate::enumeration::{enum_video_capture_devices, enum_video_capture_formats};
use crate::error::{InteropError, InteropResult, ResultCode};
use crate::global_factory::GlobalFactory;
use std::ffi::{c_char, c_void};

#[repr(C)]
pub struct MbVideoCaptureFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    pub fourcc: u32,
}

pub type MbVideoCaptureDeviceCallback =
    unsafe extern "C" fn(user_data: *mut c_void, id: *const c_char, name: *const c_char);
pub type MbVideoCaptureFormatCallback =
    unsafe extern "C" fn(user_data: *mut c_void, format: *const MbVideoCaptureFormat);
pub type MbEnumCompletedCallback = unsafe extern "C" fn(user_data: *mut c_void, result: ResultCode);

fn completion(
    callback: Option<MbEnumCompletedCallback>,
    user: UserData,
) -> impl FnOnce(InteropResult<()>) + Send + 'static {
    move |result| {
        if let Some(callback) = callback {
            unsafe { callback(user.get(), ResultCode::from(result)) }
        }
    }
}

/// Enumerate video capture devices on the worker thread
///
/// `enum_callback` runs once per device, then `completed_callback` (when
/// provided) runs exactly once. No callback runs if this returns an error.
#[no_mangle]
pub extern "C" fn mb_enum_video_capture_devices_async(
    enum_callback: Option<MbVideoCaptureDeviceCallback>,
    enum_user_data: *mut c_void,
    completed_callback: Option<MbEnumCompletedCallback>,
    completed_user_data: *mut c_void,
) -> ResultCode {
    let enum_user = UserData::new(enum_user_data);
    let completed_user = UserData::new(completed_user_data);
    guard("mb_enum_video_capture_devices_async", || {
        let enum_callback = enum_callback
            .ok_or_else(|| InteropError::InvalidParameter("enum_callback is null".to_string()))?;
        let factory = GlobalFactory::instance_ptr()?;
        enum_video_capture_devices(
            factory,
            move |device: &VideoCaptureDevice| {
                let id = to_cstring(&device.id);
                let name = to_cstring(&device.name);
                unsafe { enum_callback(enum_user.get(), id.as_ptr(), name.as_ptr()) }
            },
            completion(completed_callback, completed_user),
        );
        Ok(())
    })
}

/// Enumerate the capture formats of one device on the worker thread
///
/// Same callback contract as [`mb_enum_video_capture_devices_async`].
///
/// # Safety
/// `device_id` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mb_enum_video_capture_formats_async(
    device_id: *const c_char,
    enum_callback: Option<MbVideoCaptureFormatCallback>,
    enum_user_data: *mut c_void,
    completed_callback: Option<MbEnumCompletedCallback>,
    completed_user_data: *mut c_void,
) -> ResultCode {
    let enum_user = UserData::new(enum_user_data);
    let completed_user = UserData::new(completed_user_data);
    guard("mb_enum_video_capture_formats_async", || {
        let enum_callback = enum_callback
            .ok_or_else(|| InteropError::InvalidParameter("enum_callback is null".to_string()))?;
        let device_id = unsafe { str_arg(device_id, "device_id") }?.to_string();
        let factory = GlobalFactory::instance_ptr()?;
        enum_video_capture_formats(
            factory,
            device_id,
            move |format: &VideoCaptureFormat| {
                let raw = MbVideoCaptureFormat {
                    width: format.width,
                    height: format.height,
                    framerate: format.framerate,
                    fourcc: format.fourcc,
                };
                unsafe { enum_callback(enum_user.get(), &raw) }
            },
            completion(completed_callback, completed_user),
        );
        Ok(())
    })
}
