//! Track source functions
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


use super::{guard, object, opt_str_arg, write_out};
use crate::engine::{FrameFormat, VideoFrame};
use crate::error::{InteropError, InteropResult, ResultCode};
use crate::global_factory::GlobalFactory;
use crate::handle::{into_handle, Handle};
use crate::track_source::{create_device_audio_source, create_device_video_source, create_external_video_source};
use crate::tracked_object::TrackedObject;
use bytes::Bytes;
use std::ffi::c_char;
use std::sync::Arc;

super::ref_functions!(mb_track_source_add_ref, mb_track_source_remove_ref);

/// Video frame crossing the ABI
#[repr(C)]
pub struct MbVideoFrame {
    pub width: u32,
    pub height: u32,
    /// `FrameFormat` value
    pub format: u32,
    pub data: *const u8,
    pub size: u64,
}

impl MbVideoFrame {
    /// Copy the frame pixels into an owned frame
    ///
    /// # Safety
    /// `data` must be valid for `size` bytes of reads.
    pub(crate) unsafe fn to_frame(&self) -> InteropResult<VideoFrame> {
        let format = FrameFormat::from_raw(self.format)
            .ok_or_else(|| InteropError::InvalidParameter(format!("unknown frame format {}", self.format)))?;
        if self.data.is_null() {
            return Err(InteropError::InvalidParameter("frame data is null".to_string()));
        }
        // SAFETY: non-null and readable for `size` bytes per the contract.
        let data = unsafe { std::slice::from_raw_parts(self.data, self.size as usize) };
        Ok(VideoFrame {
            width: self.width,
            height: self.height,
            format,
            data: Bytes::copy_from_slice(data),
        })
    }

    /// Borrowing view of `frame`, valid while `frame` is
    pub(crate) fn from_frame(frame: &VideoFrame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            format: frame.format as u32,
            data: frame.data.as_ptr(),
            size: frame.data.len() as u64,
        }
    }
}

/// Write a freshly created object into an out parameter
///
/// # Safety
/// `out` must be valid for writes.
unsafe fn store(out: *mut Handle, created: InteropResult<Arc<TrackedObject>>) -> InteropResult<()> {
    let created = created?;
    unsafe { write_out(out, into_handle(created)) }
}

/// Create a source capturing the default audio device
///
/// # Safety
/// `name` must be null or a NUL-terminated string; `source` must be valid
/// for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_device_audio_track_source_create(
    name: *const c_char,
    source: *mut Handle,
) -> ResultCode {
    guard("mb_device_audio_track_source_create", || {
        if source.is_null() {
            return Err(InteropError::InvalidParameter("source is null".to_string()));
        }
        let name = unsafe { opt_str_arg(name, "name") }?.map(str::to_string);
        let factory = GlobalFactory::instance_ptr()?;
        unsafe { store(source, create_device_audio_source(factory, name)) }
    })
}

/// Create a source capturing a video device; null `device_id` selects the
/// first device
///
/// # Safety
/// `device_id` and `name` must be null or NUL-terminated strings; `source`
/// must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_device_video_track_source_create(
    device_id: *const c_char,
    name: *const c_char,
    source: *mut Handle,
) -> ResultCode {
    guard("mb_device_video_track_source_create", || {
        if source.is_null() {
            return Err(InteropError::InvalidParameter("source is null".to_string()));
        }
        let device_id = unsafe { opt_str_arg(device_id, "device_id") }?;
        let name = unsafe { opt_str_arg(name, "name") }?.map(str::to_string);
        let factory = GlobalFactory::instance_ptr()?;
        unsafe { store(source, create_device_video_source(factory, device_id, name)) }
    })
}

/// Create a source fed with frames pushed by the application
///
/// # Safety
/// `name` must be null or a NUL-terminated string; `source` must be valid
/// for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_external_video_track_source_create(
    name: *const c_char,
    source: *mut Handle,
) -> ResultCode {
    guard("mb_external_video_track_source_create", || {
        if source.is_null() {
            return Err(InteropError::InvalidParameter("source is null".to_string()));
        }
        let name = unsafe { opt_str_arg(name, "name") }?.map(str::to_string);
        let factory = GlobalFactory::instance_ptr()?;
        unsafe { store(source, create_external_video_source(factory, name)) }
    })
}

/// Push a frame to every track fed by an external source
///
/// Returns `Unsupported` for device sources.
///
/// # Safety
/// `frame` must point to a valid frame whose data is readable.
#[no_mangle]
pub unsafe extern "C" fn mb_external_video_track_source_push_frame(
    handle: Handle,
    frame: *const MbVideoFrame,
) -> ResultCode {
    guard("mb_external_video_track_source_push_frame", || {
        let object = object(handle)?;
        let source = object.as_track_source()?;
        let frame = unsafe { frame.as_ref() }
            .ok_or_else(|| InteropError::InvalidParameter("frame is null".to_string()))?;
        let frame = unsafe { frame.to_frame() }?;
        source.push_frame(frame)
    })
}
